pub mod kv_cache;

pub use kv_cache::KvCache;

use memo_tensor::ComputeBackend;

use crate::architecture::ModelArchitecture;
use crate::checkpoint::{Config, Weights};
use crate::error::{ModelError, Result};
use crate::run_state::RunState;

/// A llama-style decoder-only transformer: RMSNorm, rotary position
/// embeddings, grouped-query attention with a KV cache, and a SwiGLU
/// feed-forward block.
pub struct Model {
    config: Config,
    weights: Weights,
    state: RunState,
    cache: KvCache,
}

impl Model {
    pub fn new(config: Config, weights: Weights) -> Self {
        let state = RunState::new(&config);
        let cache = KvCache::new(
            config.n_layers,
            config.n_kv_heads,
            config.head_size(),
            config.seq_len,
        );
        Model {
            config,
            weights,
            state,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl ModelArchitecture for Model {
    fn forward(&mut self, token: u32, pos: usize, backend: &dyn ComputeBackend) -> Result<Vec<f32>> {
        let cfg = self.config;
        let dim = cfg.dim;
        let n_heads = cfg.n_heads;
        let n_kv_heads = cfg.n_kv_heads;
        let head_size = cfg.head_size();
        let kv_dim = cfg.kv_dim();
        let heads_per_kv = n_heads / n_kv_heads;

        if pos >= cfg.seq_len {
            return Err(ModelError::Other(format!(
                "position {} exceeds sequence length {}",
                pos, cfg.seq_len
            )));
        }
        if (token as usize) >= cfg.vocab_size {
            return Err(ModelError::Other(format!(
                "token id {} exceeds vocab size {}",
                token, cfg.vocab_size
            )));
        }

        // Step 1: embedding lookup.
        let embd_offset = token as usize * dim;
        let embedding = self.weights.token_embedding()[embd_offset..embd_offset + dim].to_vec();
        self.state.x_mut().copy_from_slice(&embedding);

        for layer_idx in 0..cfg.n_layers {
            let layer = self.weights.layer(layer_idx);

            // 2a. RMSNorm into xb.
            let xb = backend
                .rms_norm(self.state.x(), layer.attn_norm, 1e-5, dim)
                .map_err(|e| ModelError::Other(format!("rms_norm failed: {}", e)))?;
            self.state.xb_mut().copy_from_slice(&xb);

            // 2b. Q/K/V projections, one output element per row of W.
            let q = backend
                .matmul(layer.wq, self.state.xb(), dim, dim, 1)
                .map_err(|e| ModelError::Other(format!("q matmul failed: {}", e)))?;
            self.state.q_mut().copy_from_slice(&q);
            let k = backend
                .matmul(layer.wk, self.state.xb(), kv_dim, dim, 1)
                .map_err(|e| ModelError::Other(format!("k matmul failed: {}", e)))?;
            let v = backend
                .matmul(layer.wv, self.state.xb(), kv_dim, dim, 1)
                .map_err(|e| ModelError::Other(format!("v matmul failed: {}", e)))?;

            // 2c. RoPE on Q and K.
            let (q_roped, k_roped) = backend
                .rope(self.state.q(), &k, head_size, pos, n_heads, n_kv_heads)
                .map_err(|e| ModelError::Other(format!("rope failed: {}", e)))?;
            self.state.q_mut().copy_from_slice(&q_roped);

            // 2d. KV cache update.
            self.cache.update(layer_idx, &k_roped, &v, pos);

            let seq_len = pos + 1;
            let cached_k = self.cache.get_k(layer_idx, seq_len).to_vec();
            let cached_v = self.cache.get_v(layer_idx, seq_len).to_vec();

            // 2e. Multi-head attention with GQA head mapping.
            let mut attn_out = vec![0.0f32; dim];
            let scale = 1.0 / (head_size as f32).sqrt();

            for h in 0..n_heads {
                let kv_h = h / heads_per_kv;
                let q_head = self.state.q()[h * head_size..(h + 1) * head_size].to_vec();

                let att_row = &mut self.state.att_mut()[h * cfg.seq_len..h * cfg.seq_len + seq_len];
                for t in 0..seq_len {
                    let k_off = t * kv_dim + kv_h * head_size;
                    let dot: f32 = (0..head_size)
                        .map(|d| q_head[d] * cached_k[k_off + d])
                        .sum();
                    att_row[t] = dot * scale;
                }

                let max_score = att_row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0f32;
                for s in att_row.iter_mut() {
                    *s = (*s - max_score).exp();
                    sum += *s;
                }
                for s in att_row.iter_mut() {
                    *s /= sum;
                }

                let out_head = &mut attn_out[h * head_size..(h + 1) * head_size];
                for t in 0..seq_len {
                    let v_off = t * kv_dim + kv_h * head_size;
                    let p = att_row[t];
                    for d in 0..head_size {
                        out_head[d] += p * cached_v[v_off + d];
                    }
                }
            }

            // 2f. Output projection + residual.
            let xb2 = backend
                .matmul(layer.wo, &attn_out, dim, dim, 1)
                .map_err(|e| ModelError::Other(format!("wo matmul failed: {}", e)))?;
            self.state.xb2_mut().copy_from_slice(&xb2);
            let x = backend
                .add(self.state.x(), self.state.xb2())
                .map_err(|e| ModelError::Other(format!("residual add failed: {}", e)))?;
            self.state.x_mut().copy_from_slice(&x);

            // 2h. FFN RMSNorm.
            let xb = backend
                .rms_norm(self.state.x(), layer.ffn_norm, 1e-5, dim)
                .map_err(|e| ModelError::Other(format!("ffn rms_norm failed: {}", e)))?;
            self.state.xb_mut().copy_from_slice(&xb);

            // 2i. SwiGLU feed-forward.
            let hb = backend
                .matmul(layer.ffn_gate, self.state.xb(), cfg.hidden_dim, dim, 1)
                .map_err(|e| ModelError::Other(format!("gate matmul failed: {}", e)))?;
            self.state.hb_mut().copy_from_slice(&hb);
            let hb2 = backend
                .matmul(layer.ffn_up, self.state.xb(), cfg.hidden_dim, dim, 1)
                .map_err(|e| ModelError::Other(format!("up matmul failed: {}", e)))?;
            self.state.hb2_mut().copy_from_slice(&hb2);
            let hb = backend
                .silu(self.state.hb())
                .map_err(|e| ModelError::Other(format!("silu failed: {}", e)))?;
            self.state.hb_mut().copy_from_slice(&hb);
            let hb = backend
                .mul(self.state.hb(), self.state.hb2())
                .map_err(|e| ModelError::Other(format!("gate*up failed: {}", e)))?;
            self.state.hb_mut().copy_from_slice(&hb);
            let ffn_out = backend
                .matmul(layer.ffn_down, self.state.hb(), dim, cfg.hidden_dim, 1)
                .map_err(|e| ModelError::Other(format!("down matmul failed: {}", e)))?;

            // 2j. Residual.
            let x = backend
                .add(self.state.x(), &ffn_out)
                .map_err(|e| ModelError::Other(format!("ffn residual add failed: {}", e)))?;
            self.state.x_mut().copy_from_slice(&x);
        }

        // Step 3: final norm.
        let x = backend
            .rms_norm(self.state.x(), self.weights.final_norm(), 1e-5, dim)
            .map_err(|e| ModelError::Other(format!("output rms_norm failed: {}", e)))?;
        self.state.x_mut().copy_from_slice(&x);

        // Step 4: classifier always runs, even though the embedding glue
        // reads `state.x` rather than the logits.
        let logits = backend
            .matmul(self.weights.classifier(), self.state.x(), cfg.vocab_size, dim, 1)
            .map_err(|e| ModelError::Other(format!("logits matmul failed: {}", e)))?;
        self.state.logits_mut().copy_from_slice(&logits);

        Ok(self.state.logits().to_vec())
    }

    fn last_hidden_state(&self) -> &[f32] {
        self.state.x()
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn hidden_size(&self) -> usize {
        self.config.dim
    }

    fn reset_cache(&mut self) {
        self.cache.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_tensor::CpuBackend;

    fn tiny_config() -> Config {
        Config {
            dim: 4,
            hidden_dim: 8,
            n_layers: 1,
            n_heads: 2,
            n_kv_heads: 1,
            vocab_size: 3,
            seq_len: 8,
        }
    }

    fn tiny_weights(cfg: &Config) -> Weights {
        use crate::checkpoint::test_support::write_checkpoint_bytes;
        let bytes = write_checkpoint_bytes(cfg, false);
        let mut cursor = std::io::Cursor::new(bytes);
        let (_loaded_cfg, weights) = crate::checkpoint::load(&mut cursor).unwrap();
        weights
    }

    #[test]
    fn forward_produces_finite_logits_and_hidden_state() {
        let cfg = tiny_config();
        let weights = tiny_weights(&cfg);
        let mut model = Model::new(cfg, weights);
        let backend = CpuBackend::new();

        let logits = model.forward(0, 0, &backend).unwrap();
        assert_eq!(logits.len(), cfg.vocab_size);
        assert!(logits.iter().all(|v| v.is_finite()));
        assert_eq!(model.last_hidden_state().len(), cfg.dim);
        assert!(model.last_hidden_state().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn forward_is_deterministic() {
        let cfg = tiny_config();
        let backend = CpuBackend::new();

        let mut m1 = Model::new(cfg, tiny_weights(&cfg));
        let mut m2 = Model::new(cfg, tiny_weights(&cfg));

        let l1 = m1.forward(1, 0, &backend).unwrap();
        let l2 = m2.forward(1, 0, &backend).unwrap();
        assert_eq!(l1, l2);
    }

    #[test]
    fn forward_rejects_out_of_range_position() {
        let cfg = tiny_config();
        let mut model = Model::new(cfg, tiny_weights(&cfg));
        let backend = CpuBackend::new();
        assert!(model.forward(0, cfg.seq_len, &backend).is_err());
    }

    #[test]
    fn reset_cache_clears_state() {
        let cfg = tiny_config();
        let mut model = Model::new(cfg, tiny_weights(&cfg));
        let backend = CpuBackend::new();
        model.forward(0, 0, &backend).unwrap();
        model.reset_cache();
        assert_eq!(model.cache.len, 0);
    }
}
