//! `memo-tensor` - Arena allocator, tensor shapes, and pluggable compute
//! backends for the memo semantic-memory engine.
//!
//! This crate provides:
//! - An `Arena` bump allocator backing every long-lived float buffer
//! - A `Tensor` type backed by CPU storage
//! - A `ComputeBackend` trait for pluggable compute (CPU reference, GPU driver)
//! - A reference `CpuBackend` implementation
//! - Shape utilities

pub mod arena;
pub mod backend;
pub mod cpu;
pub mod dtype;
pub mod error;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use arena::{Arena, ArenaRange};
pub use backend::{ComputeBackend, Metric};
pub use cpu::CpuBackend;
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use storage::CpuStorage;
pub use tensor::Tensor;
