use thiserror::Error;

/// Status code reported to the caller of a driver operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// Caller-supplied parameters were missing or malformed
    InvalidArgument,
    /// An external process or file operation failed
    Internal,
}

impl Code {
    /// Numeric gRPC status code
    pub fn as_i32(self) -> i32 {
        match self {
            Code::InvalidArgument => 3,
            Code::Internal => 13,
        }
    }
}

/// Main error type for driver operations
#[derive(Error, Debug)]
pub enum CsiError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CsiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CsiError::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CsiError::Internal(msg.into())
    }

    /// Map the error onto the two-kind status taxonomy
    pub fn code(&self) -> Code {
        match self {
            CsiError::InvalidArgument(_) => Code::InvalidArgument,
            CsiError::Internal(_) => Code::Internal,
        }
    }

    /// Process exit status used by the command-line front end
    pub fn exit_code(&self) -> i32 {
        match self.code() {
            Code::InvalidArgument => 2,
            Code::Internal => 1,
        }
    }
}

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, CsiError>;
