//! Logging, metrics exposition and the small HTTP server shared by the
//! overlay binaries

pub mod http;
pub mod logging;
pub mod metrics;

pub use http::{serve, telemetry_response, text_response, HttpBody};
pub use logging::LogFormat;
pub use metrics::encode;
