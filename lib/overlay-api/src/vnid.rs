//! Virtual network identifiers

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::v1alpha1::VNID_LABEL;

/// Virtual network identifier.
///
/// Pods share a VNID (and therefore a broadcast domain) when their
/// namespaces hash to the same value. Only 256 values exist, so unrelated
/// namespaces can collide.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct Vnid(pub u8);

impl Vnid {
    /// Derive the VNID of a namespace: first byte of the MD5 digest of its name
    pub fn from_namespace(namespace: &str) -> Self {
        Vnid(md5::compute(namespace.as_bytes()).0[0])
    }

    /// Flow cookie tagging every rule programmed for this network
    pub fn cookie(self) -> u64 {
        u64::from(self.0)
    }

    /// Label selector matching the NetBindings of this network
    pub fn label_selector(self) -> String {
        format!("{}={}", VNID_LABEL, self.0)
    }
}

impl fmt::Display for Vnid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for Vnid {
    fn from(value: u8) -> Self {
        Vnid(value)
    }
}
