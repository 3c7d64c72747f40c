pub mod architecture;
pub mod checkpoint;
pub mod embedding;
pub mod error;
pub mod llama;
pub mod run_state;
pub mod tokenizer;

pub use architecture::ModelArchitecture;
pub use checkpoint::{Config, Weights};
pub use embedding::embed;
pub use error::{ModelError, Result};
pub use llama::Model;
pub use tokenizer::Tokenizer;
