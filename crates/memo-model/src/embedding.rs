use memo_tensor::ComputeBackend;

use crate::architecture::ModelArchitecture;
use crate::error::Result;
use crate::tokenizer::Tokenizer;

/// Tokenizes `text`, runs one forward pass per token position, and returns
/// the L2-normalized final hidden state.
///
/// If the hidden state's norm is at or below `1e-5`, the zero vector is
/// returned instead of dividing by a near-zero norm.
pub fn embed(
    text: &str,
    tokenizer: &Tokenizer,
    model: &mut dyn ModelArchitecture,
    backend: &dyn ComputeBackend,
) -> Result<Vec<f32>> {
    model.reset_cache();
    let tokens = tokenizer.encode(text);

    let dim = model.hidden_size();
    if tokens.is_empty() {
        return Ok(vec![0.0; dim]);
    }

    for (pos, &token) in tokens.iter().enumerate() {
        model.forward(token, pos, backend)?;
    }

    let hidden = model.last_hidden_state();
    let norm = hidden.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-5 {
        Ok(hidden.iter().map(|v| v / norm).collect())
    } else {
        Ok(vec![0.0; dim])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Config, Weights};
    use crate::llama::Model;
    use memo_tensor::CpuBackend;
    use std::io::Cursor;

    fn write_vocab_bytes(entries: &[(&str, f32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        let max_len = entries.iter().map(|(s, _)| s.len()).max().unwrap_or(0);
        buf.extend_from_slice(&(max_len as i32).to_le_bytes());
        for (s, score) in entries {
            buf.extend_from_slice(&score.to_le_bytes());
            buf.extend_from_slice(&(s.len() as i32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        buf
    }

    fn tiny_model() -> (Config, Weights) {
        let cfg = Config {
            dim: 4,
            hidden_dim: 8,
            n_layers: 1,
            n_heads: 2,
            n_kv_heads: 1,
            vocab_size: 4,
            seq_len: 8,
        };
        let bytes = crate::checkpoint::test_support::write_checkpoint_bytes(&cfg, false);
        let mut cursor = Cursor::new(bytes);
        let (_loaded_cfg, weights) = crate::checkpoint::load(&mut cursor).unwrap();
        (cfg, weights)
    }

    #[test]
    fn embed_produces_unit_norm_vector() {
        let (cfg, weights) = tiny_model();
        let mut model = Model::new(cfg, weights);
        let backend = CpuBackend::new();

        let bytes = write_vocab_bytes(&[("a", 0.0), ("b", 0.0)]);
        let mut cursor = Cursor::new(bytes);
        let tokenizer = Tokenizer::load(&mut cursor).unwrap();

        let v = embed("ab", &tokenizer, &mut model, &backend).unwrap();
        assert_eq!(v.len(), 4);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[test]
    fn embed_of_empty_text_is_zero_vector() {
        let (cfg, weights) = tiny_model();
        let mut model = Model::new(cfg, weights);
        let backend = CpuBackend::new();

        let bytes = write_vocab_bytes(&[("a", 0.0)]);
        let mut cursor = Cursor::new(bytes);
        let tokenizer = Tokenizer::load(&mut cursor).unwrap();

        let v = embed("", &tokenizer, &mut model, &backend).unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
