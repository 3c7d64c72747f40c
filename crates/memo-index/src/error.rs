use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("index is at capacity ({capacity})")]
    Full { capacity: usize },
    #[error("row {0} does not exist")]
    UnknownRow(usize),
    #[error("dimension mismatch: index expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("malformed flow-syntax record: {0}")]
    MalformedRecord(String),
    #[error("unknown filter operator: {0}")]
    UnknownOperator(String),
    #[error("tensor error: {0}")]
    TensorError(#[from] memo_tensor::TensorError),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
