/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemoStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorModelLoad = 2,
    ErrorStore = 3,
    ErrorOutOfMemory = 4,
    ErrorInternal = 5,
}

/// Compute backend type selector. Only `Cpu` is implemented; a real GPU
/// driver is injected by the host application, not by this crate.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub enum MemoBackendType {
    Cpu = 0,
    Gpu = 1,
}

/// One row of a `memo_recall` result set.
#[repr(C)]
pub struct MemoSearchResult {
    pub id: u64,
    pub score: f32,
    /// Owned C string; freed by `memo_free_results`.
    pub text: *mut std::os::raw::c_char,
}
