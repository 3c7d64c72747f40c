use std::io::{Read, Write};

use memo_tensor::{Arena, ArenaRange, ComputeBackend, Metric};

use crate::error::{IndexError, Result};

/// One result row from a [`VectorIndex::search`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub id: u64,
    pub score: f32,
}

fn metric_to_code(metric: Metric) -> i32 {
    match metric {
        Metric::Cosine => 1,
        Metric::Dot => 2,
    }
}

fn metric_from_code(code: i32) -> Result<Metric> {
    match code {
        1 => Ok(Metric::Cosine),
        2 => Ok(Metric::Dot),
        0 => Err(IndexError::Other(
            "L2 metric is reserved in the file format but not implemented".to_string(),
        )),
        other => Err(IndexError::Other(format!("unknown metric code {}", other))),
    }
}

/// A flat, append-only store of `(id, vector)` pairs with GPU-dispatched
/// top-k similarity search.
///
/// Row `i`'s id is `ids[i]`; its vector occupies
/// `vectors[i*dim .. (i+1)*dim]`. Rows are never removed; `set` overwrites
/// a row in place without changing `count`.
pub struct VectorIndex {
    dim: usize,
    metric: Metric,
    capacity: usize,
    count: usize,
    ids: Vec<u64>,
    arena: Arena,
    vectors: ArenaRange,
}

impl VectorIndex {
    pub fn create(dim: usize, metric: Metric, capacity: usize) -> Self {
        let mut arena = Arena::new(capacity * dim + 2);
        let vectors = arena.push(capacity * dim);
        VectorIndex {
            dim,
            metric,
            capacity,
            count: 0,
            ids: vec![0; capacity],
            arena,
            vectors,
        }
    }

    fn vectors(&self) -> &[f32] {
        self.arena
            .slice(self.vectors.clone())
            .expect("arena range is internally consistent")
    }

    fn vectors_mut(&mut self) -> &mut [f32] {
        self.arena
            .slice_mut(self.vectors.clone())
            .expect("arena range is internally consistent")
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids[..self.count]
    }

    /// Appends a new row. Fails if the index is at capacity.
    pub fn add(&mut self, id: u64, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        if self.count == self.capacity {
            return Err(IndexError::Full {
                capacity: self.capacity,
            });
        }
        let row = self.count;
        self.ids[row] = id;
        let dim = self.dim;
        self.vectors_mut()[row * dim..(row + 1) * dim].copy_from_slice(vector);
        self.count += 1;
        Ok(row)
    }

    /// Overwrites an existing row's vector, keeping its id and `count`.
    pub fn set(&mut self, row: usize, vector: &[f32]) -> Result<()> {
        if row >= self.count {
            return Err(IndexError::UnknownRow(row));
        }
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        let dim = self.dim;
        self.vectors_mut()[row * dim..(row + 1) * dim].copy_from_slice(vector);
        Ok(())
    }

    /// Searches for the `k` nearest rows to `query`, restricted to rows
    /// where `mask[row]` is true (or all rows, if `mask` is `None`).
    ///
    /// Results are sorted descending by score, tie-broken by lower id, and
    /// padded with `{id: 0, score: -1.0}` if fewer than `k` rows matched.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        mask: Option<&[bool]>,
        backend: &dyn ComputeBackend,
    ) -> Result<Vec<SearchResult>> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }

        let (search_ids, search_vectors): (Vec<u64>, Vec<f32>) = match mask {
            Some(mask) => {
                let mut ids = Vec::new();
                let mut vecs = Vec::new();
                let vectors = self.vectors();
                for row in 0..self.count {
                    if mask.get(row).copied().unwrap_or(false) {
                        ids.push(self.ids[row]);
                        vecs.extend_from_slice(&vectors[row * self.dim..(row + 1) * self.dim]);
                    }
                }
                (ids, vecs)
            }
            None => (
                self.ids[..self.count].to_vec(),
                self.vectors()[..self.count * self.dim].to_vec(),
            ),
        };

        let n_search = search_ids.len();
        let scores = backend
            .similarity(&search_vectors, query, n_search, self.dim, self.metric)
            .map_err(IndexError::TensorError)?;

        let mut results: Vec<SearchResult> = search_ids
            .into_iter()
            .zip(scores)
            .map(|(id, score)| SearchResult { id, score })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });

        results.truncate(k);
        while results.len() < k {
            results.push(SearchResult { id: 0, score: -1.0 });
        }

        Ok(results)
    }

    /// Writes `int32 dim, int32 count, int32 metric`, then `count` ids as
    /// `uint64`, then `count*dim` vector floats as `float32`, all
    /// little-endian.
    pub fn save(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&(self.dim as i32).to_le_bytes())?;
        writer.write_all(&(self.count as i32).to_le_bytes())?;
        writer.write_all(&metric_to_code(self.metric).to_le_bytes())?;
        for &id in &self.ids[..self.count] {
            writer.write_all(&id.to_le_bytes())?;
        }
        for &v in &self.vectors()[..self.count * self.dim] {
            writer.write_all(&v.to_le_bytes())?;
        }
        tracing::info!(target: "memo_index.index", count = self.count, dim = self.dim, "index saved");
        Ok(())
    }

    pub fn load(reader: &mut impl Read) -> Result<Self> {
        let mut header = [0u8; 12];
        reader.read_exact(&mut header)?;
        let dim = i32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let count = i32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let metric_code = i32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let metric = metric_from_code(metric_code)?;

        let mut ids = vec![0u64; count];
        for id in ids.iter_mut() {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            *id = u64::from_le_bytes(buf);
        }

        let capacity = count.max(1);
        ids.resize(capacity, 0);

        let mut arena = Arena::new(capacity * dim + 2);
        let vectors_range = arena.push(capacity * dim);
        {
            let dst = arena
                .slice_mut(vectors_range.start..vectors_range.start + count * dim)
                .expect("arena range is internally consistent");
            for v in dst.iter_mut() {
                let mut buf = [0u8; 4];
                reader.read_exact(&mut buf)?;
                *v = f32::from_le_bytes(buf);
            }
        }

        tracing::info!(target: "memo_index.index", count, dim, "index loaded");

        Ok(VectorIndex {
            dim,
            metric,
            capacity,
            count,
            ids,
            arena,
            vectors: vectors_range,
        })
    }
}
