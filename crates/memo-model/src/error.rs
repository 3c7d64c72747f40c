use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint file truncated: expected at least {expected} more bytes")]
    TruncatedCheckpoint { expected: usize },
    #[error("tokenizer file truncated while reading entry {index}")]
    TruncatedTokenizer { index: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("tokenizer error: {0}")]
    TokenizerError(String),
    #[error("tensor error: {0}")]
    TensorError(#[from] memo_tensor::TensorError),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
