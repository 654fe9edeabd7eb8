use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Test failed on {key}: expected {expected:?}, found {actual:?}")]
    TestFailed {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Event index {requested} is cleared, oldest retained index is {oldest}")]
    EventIndexCleared { requested: u64, oldest: u64 },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

impl StoreError {
    /// Numeric error code reported to clients alongside the message.
    pub fn code(&self) -> u16 {
        match self {
            StoreError::KeyNotFound(_) => 100,
            StoreError::TestFailed { .. } => 101,
            StoreError::EventIndexCleared { .. } => 401,
            StoreError::InvalidArguments(_) => 200,
        }
    }
}
