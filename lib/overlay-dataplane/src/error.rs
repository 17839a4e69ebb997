use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataplaneError>;

#[derive(Error, Debug)]
pub enum DataplaneError {
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {code:?}: {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Invalid dataplane configuration: {0}")]
    InvalidConfig(String),

    #[error("{} bootstrap steps failed: {}", .failures.len(), .failures.join("; "))]
    Incomplete { failures: Vec<String> },
}

impl DataplaneError {
    /// Number of failed commands this error stands for
    pub fn failure_count(&self) -> usize {
        match self {
            DataplaneError::Incomplete { failures } => failures.len(),
            _ => 1,
        }
    }
}
