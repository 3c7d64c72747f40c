use crate::error::{Result, TensorError};
use std::io::Read;
use std::ops::Range;

/// 8-byte alignment in f32 units (2 elements).
const ALIGN_ELEMS: usize = 2;

/// A contiguous, append-only region of `f32` storage.
///
/// Every long-lived float buffer in this crate (weight tensors, run-state
/// scratch, the KV cache) is carved out of one `Arena` via [`Arena::push`].
/// There is no per-allocation free; [`Arena::mark`] and [`Arena::reset_to`]
/// bound the lifetime of scratch sub-regions instead.
#[derive(Debug)]
pub struct Arena {
    data: Vec<f32>,
    capacity: usize,
    used: usize,
}

/// A half-open range of element offsets into an [`Arena`].
pub type ArenaRange = Range<usize>;

impl Arena {
    /// Reserves `capacity` elements of storage, zero-filled.
    pub fn new(capacity: usize) -> Self {
        Arena {
            data: vec![0.0; capacity],
            capacity,
            used: 0,
        }
    }

    /// Allocates `n` elements, 8-byte aligned, and returns their offset range.
    ///
    /// Fatal: aborts the process if the arena is exhausted. Arena exhaustion
    /// is a configuration error (undersized arena for the requested model),
    /// not a recoverable one.
    pub fn push(&mut self, n: usize) -> ArenaRange {
        let aligned_start = (self.used + (ALIGN_ELEMS - 1)) / ALIGN_ELEMS * ALIGN_ELEMS;
        let end = aligned_start
            .checked_add(n)
            .expect("arena allocation size overflow");
        if end > self.capacity {
            panic!(
                "arena exhausted: requested {} elements at offset {}, capacity is {}",
                n, aligned_start, self.capacity
            );
        }
        self.used = end;
        aligned_start..end
    }

    /// Copies `data` into a fresh allocation and returns its offset range.
    pub fn push_slice(&mut self, data: &[f32]) -> ArenaRange {
        let range = self.push(data.len());
        self.data[range.clone()].copy_from_slice(data);
        range
    }

    /// Allocates `n` elements and fills them by reading `n * 4` little-endian
    /// bytes directly from `reader`, without an intermediate `Vec<f32>` the
    /// size of the allocation itself.
    ///
    /// Used to load weight tensors straight off disk into their final arena
    /// home. A short read leaves the allocation's high-water mark advanced
    /// but its contents unspecified; callers that hit this treat the whole
    /// load as failed and never read through the returned range.
    pub fn push_from_reader(&mut self, n: usize, reader: &mut impl Read) -> std::io::Result<ArenaRange> {
        let range = self.push(n);
        let mut bytes = vec![0u8; n * 4];
        reader.read_exact(&mut bytes)?;
        for (dst, chunk) in self.data[range.clone()].iter_mut().zip(bytes.chunks_exact(4)) {
            *dst = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(range)
    }

    /// Current high-water mark, for use with [`Arena::reset_to`].
    pub fn mark(&self) -> usize {
        self.used
    }

    /// Rewinds the high-water mark to a previously captured [`Arena::mark`].
    ///
    /// Any range obtained from `push` after `mark` was taken is no longer
    /// valid to read through this arena once reset.
    pub fn reset_to(&mut self, mark: usize) {
        debug_assert!(mark <= self.used, "reset_to mark is ahead of current use");
        self.used = mark;
    }

    /// Number of elements allocated so far.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Total element capacity of the region.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrows the elements in `range`.
    pub fn slice(&self, range: ArenaRange) -> Result<&[f32]> {
        self.data.get(range.clone()).ok_or_else(|| {
            TensorError::Other(format!("arena range {:?} out of bounds", range))
        })
    }

    /// Mutably borrows the elements in `range`.
    pub fn slice_mut(&mut self, range: ArenaRange) -> Result<&mut [f32]> {
        let len = self.data.len();
        if range.end > len {
            return Err(TensorError::Other(format!(
                "arena range {:?} out of bounds",
                range
            )));
        }
        Ok(&mut self.data[range])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_advances_used_and_aligns() {
        let mut a = Arena::new(64);
        let r1 = a.push(3);
        assert_eq!(r1, 0..3);
        // next push must start 8-byte (2-element) aligned
        let r2 = a.push(1);
        assert_eq!(r2.start, 4);
    }

    #[test]
    fn mark_and_reset_round_trip() {
        let mut a = Arena::new(64);
        a.push(10);
        let m = a.mark();
        a.push(20);
        assert_eq!(a.used(), 30);
        a.reset_to(m);
        assert_eq!(a.used(), m);
    }

    #[test]
    fn push_slice_copies_data() {
        let mut a = Arena::new(16);
        let r = a.push_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(a.slice(r).unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    #[should_panic(expected = "arena exhausted")]
    fn exhaustion_is_fatal() {
        let mut a = Arena::new(4);
        a.push(8);
    }

    #[test]
    fn slice_out_of_bounds_is_error() {
        let a = Arena::new(4);
        assert!(a.slice(0..10).is_err());
    }

    #[test]
    fn push_from_reader_decodes_little_endian_floats() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-2.25f32).to_le_bytes());
        let mut cursor = std::io::Cursor::new(bytes);

        let mut a = Arena::new(8);
        let range = a.push_from_reader(2, &mut cursor).unwrap();
        assert_eq!(a.slice(range).unwrap(), &[1.5, -2.25]);
    }

    #[test]
    fn push_from_reader_on_truncated_input_is_an_io_error() {
        let mut cursor = std::io::Cursor::new(vec![0u8; 2]);
        let mut a = Arena::new(8);
        assert!(a.push_from_reader(4, &mut cursor).is_err());
    }
}
