use memo_tensor::ComputeBackend;

/// Trait for model architectures that can perform single-token inference.
///
/// Implementations hold model weights and a KV cache, and process one token
/// at a time through the full transformer forward pass to produce logits.
pub trait ModelArchitecture: Send + Sync {
    /// Run the forward pass for one token at the given sequence position.
    ///
    /// - `token`: the input token ID.
    /// - `pos`: the position in the sequence (drives RoPE and the KV cache).
    /// - `backend`: the compute backend to dispatch matmul/elementwise ops to.
    ///
    /// Returns the logits over the vocabulary for this token.
    fn forward(&mut self, token: u32, pos: usize, backend: &dyn ComputeBackend) -> crate::Result<Vec<f32>>;

    /// Returns a reference to the post-final-norm hidden state from the most
    /// recent `forward` call. This is what the embedding glue reads.
    fn last_hidden_state(&self) -> &[f32];

    /// Returns the vocabulary size (number of output logits).
    fn vocab_size(&self) -> usize;

    /// Embedding dimension of the hidden state.
    fn hidden_size(&self) -> usize;

    /// Reset the KV cache, clearing any stored context.
    fn reset_cache(&mut self);
}
