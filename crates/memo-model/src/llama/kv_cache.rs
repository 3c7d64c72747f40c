use memo_tensor::{Arena, ArenaRange};

/// Key-Value cache for transformer attention layers.
///
/// Stores previously computed key and value projections so they do not need
/// to be recomputed for each new token during autoregressive generation.
///
/// Layout for each layer:
///   k[layer]: flat array of shape [max_seq_len, n_kv_heads * head_dim]
///   v[layer]: flat array of shape [max_seq_len, n_kv_heads * head_dim]
///
/// Every layer's key and value region is carved out of one arena.
pub struct KvCache {
    arena: Arena,
    /// Key cache range for each layer, n_kv_heads * max_seq_len * head_dim long.
    k: Vec<ArenaRange>,
    /// Value cache range for each layer, n_kv_heads * max_seq_len * head_dim long.
    v: Vec<ArenaRange>,
    /// Number of key/value attention heads.
    pub n_kv_heads: usize,
    /// Dimension of each attention head.
    pub head_dim: usize,
    /// Maximum sequence length the cache can hold.
    pub max_seq_len: usize,
    /// Current number of tokens stored in the cache.
    pub len: usize,
}

impl KvCache {
    /// Create a new KV cache with all values initialized to zero.
    pub fn new(n_layers: usize, n_kv_heads: usize, head_dim: usize, max_seq_len: usize) -> Self {
        let cache_size = n_kv_heads * max_seq_len * head_dim;
        let slack = n_layers * 2 * 2;
        let mut arena = Arena::new(n_layers * cache_size * 2 + slack);

        let k: Vec<ArenaRange> = (0..n_layers).map(|_| arena.push(cache_size)).collect();
        let v: Vec<ArenaRange> = (0..n_layers).map(|_| arena.push(cache_size)).collect();

        KvCache {
            arena,
            k,
            v,
            n_kv_heads,
            head_dim,
            max_seq_len,
            len: 0,
        }
    }

    /// Write key and value vectors for one token at a given position in the cache.
    ///
    /// - `layer`: the transformer layer index
    /// - `k_data`: key vector of length n_kv_heads * head_dim
    /// - `v_data`: value vector of length n_kv_heads * head_dim
    /// - `pos`: the sequence position to write at
    pub fn update(&mut self, layer: usize, k_data: &[f32], v_data: &[f32], pos: usize) {
        let kv_dim = self.n_kv_heads * self.head_dim;
        let offset = pos * kv_dim;

        let k_range = self.k[layer].clone();
        let k_start = k_range.start + offset;
        self.arena
            .slice_mut(k_start..k_start + kv_dim)
            .expect("kv cache range is internally consistent")
            .copy_from_slice(k_data);

        let v_range = self.v[layer].clone();
        let v_start = v_range.start + offset;
        self.arena
            .slice_mut(v_start..v_start + kv_dim)
            .expect("kv cache range is internally consistent")
            .copy_from_slice(v_data);

        // Update the current length if this position extends it.
        if pos + 1 > self.len {
            self.len = pos + 1;
        }
    }

    /// Get a slice of the key cache for positions 0..seq_len.
    ///
    /// Returns a slice of length seq_len * n_kv_heads * head_dim.
    pub fn get_k(&self, layer: usize, seq_len: usize) -> &[f32] {
        let kv_dim = self.n_kv_heads * self.head_dim;
        let start = self.k[layer].start;
        self.arena
            .slice(start..start + seq_len * kv_dim)
            .expect("kv cache range is internally consistent")
    }

    /// Get a slice of the value cache for positions 0..seq_len.
    ///
    /// Returns a slice of length seq_len * n_kv_heads * head_dim.
    pub fn get_v(&self, layer: usize, seq_len: usize) -> &[f32] {
        let kv_dim = self.n_kv_heads * self.head_dim;
        let start = self.v[layer].start;
        self.arena
            .slice(start..start + seq_len * kv_dim)
            .expect("kv cache range is internally consistent")
    }

    /// Reset the cache, zeroing all data and setting length to 0.
    pub fn reset(&mut self) {
        for range in self.k.clone() {
            self.arena
                .slice_mut(range)
                .expect("kv cache range is internally consistent")
                .fill(0.0);
        }
        for range in self.v.clone() {
            self.arena
                .slice_mut(range)
                .expect("kv cache range is internally consistent")
                .fill(0.0);
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_and_get_round_trip() {
        let mut cache = KvCache::new(2, 1, 4, 8);
        cache.update(0, &[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0], 0);
        assert_eq!(cache.get_k(0, 1), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(cache.get_v(0, 1), &[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(cache.len, 1);
    }

    #[test]
    fn layers_do_not_alias() {
        let mut cache = KvCache::new(2, 1, 2, 4);
        cache.update(0, &[1.0, 1.0], &[1.0, 1.0], 0);
        cache.update(1, &[2.0, 2.0], &[2.0, 2.0], 0);
        assert_eq!(cache.get_k(0, 1), &[1.0, 1.0]);
        assert_eq!(cache.get_k(1, 1), &[2.0, 2.0]);
    }

    #[test]
    fn reset_zeroes_and_clears_len() {
        let mut cache = KvCache::new(1, 1, 2, 4);
        cache.update(0, &[1.0, 1.0], &[1.0, 1.0], 0);
        cache.reset();
        assert_eq!(cache.len, 0);
        assert_eq!(cache.get_k(0, 1), &[0.0, 0.0]);
    }
}
