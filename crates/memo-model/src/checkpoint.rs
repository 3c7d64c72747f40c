use std::io::{BufReader, Read};

use memo_tensor::{Arena, ArenaRange, Shape};

use crate::error::{ModelError, Result};

/// Fixed model hyperparameters, read as a 7 x int32 header from the
/// checkpoint file.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub dim: usize,
    pub hidden_dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub n_kv_heads: usize,
    pub vocab_size: usize,
    pub seq_len: usize,
}

impl Config {
    /// Dimension of a single attention head.
    pub fn head_size(&self) -> usize {
        self.dim / self.n_heads
    }

    /// Flattened dimension of the key/value projections under GQA.
    pub fn kv_dim(&self) -> usize {
        (self.dim * self.n_kv_heads) / self.n_heads
    }

    fn read(reader: &mut impl Read) -> Result<Config> {
        let mut buf = [0u8; 4 * 7];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ModelError::TruncatedCheckpoint { expected: 28 }
            } else {
                ModelError::Io(e)
            }
        })?;

        let read_i32 = |offset: usize| -> i32 {
            i32::from_le_bytes([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ])
        };

        let dim = read_i32(0);
        let hidden_dim = read_i32(4);
        let n_layers = read_i32(8);
        let n_heads = read_i32(12);
        let n_kv_heads = read_i32(16);
        let vocab_size = read_i32(20);
        let seq_len = read_i32(24);

        let non_negative = |name: &str, v: i32| -> Result<usize> {
            if v <= 0 {
                Err(ModelError::InvalidConfig(format!("{} must be positive, got {}", name, v)))
            } else {
                Ok(v as usize)
            }
        };

        let cfg = Config {
            dim: non_negative("dim", dim)?,
            hidden_dim: non_negative("hidden_dim", hidden_dim)?,
            n_layers: non_negative("n_layers", n_layers)?,
            n_heads: non_negative("n_heads", n_heads)?,
            n_kv_heads: non_negative("n_kv_heads", n_kv_heads)?,
            vocab_size: non_negative("vocab_size", vocab_size)?,
            seq_len: non_negative("seq_len", seq_len)?,
        };

        if cfg.dim % cfg.n_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "dim {} is not divisible by n_heads {}",
                cfg.dim, cfg.n_heads
            )));
        }
        if cfg.n_heads % cfg.n_kv_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "n_heads {} is not divisible by n_kv_heads {}",
                cfg.n_heads, cfg.n_kv_heads
            )));
        }

        Ok(cfg)
    }
}

/// A named weight tensor: its logical shape plus the range of the shared
/// arena it occupies.
#[derive(Clone)]
struct WeightTensor {
    shape: Shape,
    range: ArenaRange,
}

/// Weight tensors for a single transformer layer. Flat, row-major f32,
/// each a view into the arena owned by the enclosing [`Weights`].
pub struct Layer {
    attn_norm: WeightTensor,
    wq: WeightTensor,
    wk: WeightTensor,
    wv: WeightTensor,
    wo: WeightTensor,
    ffn_norm: WeightTensor,
    ffn_gate: WeightTensor,
    ffn_down: WeightTensor,
    ffn_up: WeightTensor,
}

/// Borrowed view of one layer's weight slices, resolved against the arena.
pub struct LayerWeights<'a> {
    pub attn_norm: &'a [f32],
    pub wq: &'a [f32],
    pub wk: &'a [f32],
    pub wv: &'a [f32],
    pub wo: &'a [f32],
    pub ffn_norm: &'a [f32],
    pub ffn_gate: &'a [f32],
    pub ffn_down: &'a [f32],
    pub ffn_up: &'a [f32],
}

/// All weight tensors for the model, including a possibly-tied classifier,
/// carved out of one shared arena as typed views into a single contiguous
/// weight blob.
pub struct Weights {
    arena: Arena,
    token_embedding: WeightTensor,
    layers: Vec<Layer>,
    final_norm: WeightTensor,
    /// The LM head. Aliases `token_embedding`'s range when the checkpoint
    /// file ends before an untied classifier block.
    classifier: WeightTensor,
}

impl Weights {
    fn resolve(&self, t: &WeightTensor) -> &[f32] {
        self.arena
            .slice(t.range.clone())
            .expect("arena range is internally consistent")
    }

    pub fn token_embedding(&self) -> &[f32] {
        self.resolve(&self.token_embedding)
    }

    pub fn final_norm(&self) -> &[f32] {
        self.resolve(&self.final_norm)
    }

    pub fn classifier(&self) -> &[f32] {
        self.resolve(&self.classifier)
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: usize) -> LayerWeights<'_> {
        let l = &self.layers[index];
        LayerWeights {
            attn_norm: self.resolve(&l.attn_norm),
            wq: self.resolve(&l.wq),
            wk: self.resolve(&l.wk),
            wv: self.resolve(&l.wv),
            wo: self.resolve(&l.wo),
            ffn_norm: self.resolve(&l.ffn_norm),
            ffn_gate: self.resolve(&l.ffn_gate),
            ffn_down: self.resolve(&l.ffn_down),
            ffn_up: self.resolve(&l.ffn_up),
        }
    }
}

/// Reads `n` elements straight into a fresh arena allocation, translating a
/// short read into the checkpoint-specific truncation error.
fn read_into_arena(arena: &mut Arena, reader: &mut impl Read, n: usize) -> Result<ArenaRange> {
    arena.push_from_reader(n, reader).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ModelError::TruncatedCheckpoint { expected: n * 4 }
        } else {
            ModelError::Io(e)
        }
    })
}

/// Element counts of the nine per-layer tensors, in checkpoint file order.
fn layer_tensor_sizes(cfg: &Config) -> [usize; 9] {
    let head_size = cfg.head_size();
    [
        cfg.dim,                               // attn_norm
        cfg.dim * (cfg.n_heads * head_size),   // wq
        cfg.dim * (cfg.n_kv_heads * head_size), // wk
        cfg.dim * (cfg.n_kv_heads * head_size), // wv
        (cfg.n_heads * head_size) * cfg.dim,   // wo
        cfg.dim,                               // ffn_norm
        cfg.hidden_dim * cfg.dim,              // ffn_gate
        cfg.dim * cfg.hidden_dim,              // ffn_down
        cfg.hidden_dim * cfg.dim,              // ffn_up
    ]
}

/// Loads a checkpoint from any `Read` source, following the tensor order
/// fixed in the external file format: embedding table, per-layer attention
/// norm / Q / K / V / O, per-layer FFN norm / gate / down / up, final norm,
/// and an optional untied classifier.
pub fn load(reader: &mut impl Read) -> Result<(Config, Weights)> {
    let mut reader = BufReader::new(reader);
    let config = Config::read(&mut reader)?;
    tracing::info!(
        target: "memo_model.checkpoint",
        dim = config.dim,
        n_layers = config.n_layers,
        vocab_size = config.vocab_size,
        "checkpoint header parsed"
    );

    let dim = config.dim;

    let sizes = layer_tensor_sizes(&config);
    let layer_total: usize = sizes.iter().sum();
    // One allocation per tensor, each padded up to 8-byte alignment; a
    // couple of slack elements per allocation comfortably covers that.
    let n_allocations = 2 + config.n_layers * sizes.len() + 1;
    let capacity =
        config.vocab_size * dim * 2 + config.n_layers * layer_total + dim + n_allocations * 2;
    let mut arena = Arena::new(capacity);

    let embed_shape = Shape::new(vec![config.vocab_size, dim]);
    let token_embedding = WeightTensor {
        shape: embed_shape.clone(),
        range: read_into_arena(&mut arena, &mut reader, config.vocab_size * dim)?,
    };

    let layer_shapes: [Shape; 9] = [
        Shape::new(vec![dim]),
        Shape::new(vec![config.n_heads * config.head_size(), dim]),
        Shape::new(vec![config.n_kv_heads * config.head_size(), dim]),
        Shape::new(vec![config.n_kv_heads * config.head_size(), dim]),
        Shape::new(vec![dim, config.n_heads * config.head_size()]),
        Shape::new(vec![dim]),
        Shape::new(vec![config.hidden_dim, dim]),
        Shape::new(vec![dim, config.hidden_dim]),
        Shape::new(vec![config.hidden_dim, dim]),
    ];

    let mut layers = Vec::with_capacity(config.n_layers);
    for _ in 0..config.n_layers {
        let mut t = sizes
            .iter()
            .zip(layer_shapes.iter())
            .map(|(&n, shape)| -> Result<WeightTensor> {
                Ok(WeightTensor {
                    shape: shape.clone(),
                    range: read_into_arena(&mut arena, &mut reader, n)?,
                })
            });
        layers.push(Layer {
            attn_norm: t.next().unwrap()?,
            wq: t.next().unwrap()?,
            wk: t.next().unwrap()?,
            wv: t.next().unwrap()?,
            wo: t.next().unwrap()?,
            ffn_norm: t.next().unwrap()?,
            ffn_gate: t.next().unwrap()?,
            ffn_down: t.next().unwrap()?,
            ffn_up: t.next().unwrap()?,
        });
    }

    let final_norm = WeightTensor {
        shape: Shape::new(vec![dim]),
        range: read_into_arena(&mut arena, &mut reader, dim)?,
    };

    // Tied-classifier fallback: if the file ends here, the classifier
    // aliases the token embedding table's own range rather than being read.
    let (classifier, tied_classifier) =
        match read_into_arena(&mut arena, &mut reader, config.vocab_size * dim) {
            Ok(range) => (
                WeightTensor {
                    shape: embed_shape,
                    range,
                },
                false,
            ),
            Err(ModelError::TruncatedCheckpoint { .. }) => (token_embedding.clone(), true),
            Err(e) => return Err(e),
        };

    tracing::info!(
        target: "memo_model.checkpoint",
        tied_classifier,
        "checkpoint weights loaded"
    );

    Ok((
        config,
        Weights {
            arena,
            token_embedding,
            layers,
            final_norm,
            classifier,
        },
    ))
}

/// Test-only checkpoint byte writer, shared with `llama` and `embedding`
/// tests that need a loadable `Weights` without hand-building arena ranges.
#[cfg(test)]
pub(crate) mod test_support {
    use super::Config;

    fn write_i32(buf: &mut Vec<u8>, v: i32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f32s(buf: &mut Vec<u8>, n: usize, value: f32) {
        for _ in 0..n {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Serializes a checkpoint matching `cfg`, filling every tensor with a
    /// small constant. `tied` controls whether the untied classifier block
    /// is written.
    pub(crate) fn write_checkpoint_bytes(cfg: &Config, tied: bool) -> Vec<u8> {
        let dim = cfg.dim;
        let hidden_dim = cfg.hidden_dim;
        let head_size = cfg.head_size();

        let mut buf = Vec::new();
        write_i32(&mut buf, dim as i32);
        write_i32(&mut buf, hidden_dim as i32);
        write_i32(&mut buf, cfg.n_layers as i32);
        write_i32(&mut buf, cfg.n_heads as i32);
        write_i32(&mut buf, cfg.n_kv_heads as i32);
        write_i32(&mut buf, cfg.vocab_size as i32);
        write_i32(&mut buf, cfg.seq_len as i32);

        write_f32s(&mut buf, cfg.vocab_size * dim, 0.1); // token_embedding
        for _ in 0..cfg.n_layers {
            write_f32s(&mut buf, dim, 0.2); // attn_norm
            write_f32s(&mut buf, dim * (cfg.n_heads * head_size), 0.3); // wq
            write_f32s(&mut buf, dim * (cfg.n_kv_heads * head_size), 0.3); // wk
            write_f32s(&mut buf, dim * (cfg.n_kv_heads * head_size), 0.3); // wv
            write_f32s(&mut buf, (cfg.n_heads * head_size) * dim, 0.3); // wo
            write_f32s(&mut buf, dim, 0.2); // ffn_norm
            write_f32s(&mut buf, hidden_dim * dim, 0.4); // ffn_gate
            write_f32s(&mut buf, dim * hidden_dim, 0.4); // ffn_down
            write_f32s(&mut buf, hidden_dim * dim, 0.4); // ffn_up
        }
        write_f32s(&mut buf, dim, 0.5); // final_norm

        if !tied {
            write_f32s(&mut buf, cfg.vocab_size * dim, 0.6); // classifier
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tiny_checkpoint_bytes(tied: bool) -> Vec<u8> {
        // dim=4, hidden_dim=8, n_layers=1, n_heads=2, n_kv_heads=1, vocab=3, seq_len=8
        let cfg = Config {
            dim: 4,
            hidden_dim: 8,
            n_layers: 1,
            n_heads: 2,
            n_kv_heads: 1,
            vocab_size: 3,
            seq_len: 8,
        };
        test_support::write_checkpoint_bytes(&cfg, tied)
    }

    #[test]
    fn loads_tied_checkpoint_and_aliases_classifier() {
        let bytes = tiny_checkpoint_bytes(true);
        let mut cursor = Cursor::new(bytes);
        let (config, weights) = load(&mut cursor).unwrap();
        assert_eq!(config.dim, 4);
        assert_eq!(config.n_layers, 1);
        assert_eq!(weights.classifier(), weights.token_embedding());
    }

    #[test]
    fn loads_untied_checkpoint() {
        let bytes = tiny_checkpoint_bytes(false);
        let mut cursor = Cursor::new(bytes);
        let (_config, weights) = load(&mut cursor).unwrap();
        assert_ne!(weights.classifier(), weights.token_embedding());
    }

    #[test]
    fn rejects_truncated_header() {
        let mut cursor = Cursor::new(vec![0u8; 10]);
        assert!(load(&mut cursor).is_err());
    }

    #[test]
    fn rejects_non_divisible_heads() {
        let mut buf = Vec::new();
        for v in [4i32, 8, 1, 3 /* n_heads = 3, dim=4 not divisible */, 1, 3, 8] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        let mut cursor = Cursor::new(buf);
        assert!(load(&mut cursor).is_err());
    }
}
