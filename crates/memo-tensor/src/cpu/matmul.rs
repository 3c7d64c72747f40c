// Matmul helper module.
//
// The core matmul implementation lives in CpuBackend::matmul (cpu/mod.rs).
// This module is reserved for future optimizations such as tiled/blocked
// matmul, SIMD kernels, or cache-friendly access patterns.
