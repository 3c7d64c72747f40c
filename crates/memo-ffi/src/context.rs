use std::sync::Arc;

use memo_index::{MetaStore, TextStore, VectorIndex};
use memo_model::{Model, Tokenizer};
use memo_tensor::CpuBackend;

/// Opaque context handle owning the backend, model, tokenizer, and the
/// three stores backing the currently open memory set.
pub struct MemoContext {
    pub backend: Arc<CpuBackend>,
    pub model: Option<Model>,
    pub tokenizer: Option<Tokenizer>,
    pub index: Option<VectorIndex>,
    pub text: Option<TextStore>,
    pub meta: Option<MetaStore>,
    pub base: Option<String>,
}

impl Default for MemoContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoContext {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(CpuBackend::new()),
            model: None,
            tokenizer: None,
            index: None,
            text: None,
            meta: None,
            base: None,
        }
    }
}
