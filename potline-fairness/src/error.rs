use thiserror::Error;

pub type Result<T> = std::result::Result<T, FairnessError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FairnessError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Alive set is empty")]
    EmptyAliveSet,
}

impl FairnessError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
