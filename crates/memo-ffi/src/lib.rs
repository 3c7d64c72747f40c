mod context;
mod error;
mod types;

pub use context::*;
pub use error::*;
pub use types::*;

use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::BufReader;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

use memo_index::{resolve, MetaStore, TextStore, VectorIndex};
use memo_model::{embed, ModelArchitecture};
use memo_tensor::Metric;

/// Execute a closure that returns a `MemoStatus`, catching any panics and
/// converting them into `MemoStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> MemoStatus + std::panic::UnwindSafe>(f: F) -> MemoStatus {
    match std::panic::catch_unwind(f) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            MemoStatus::ErrorInternal
        }
    }
}

fn c_str_arg<'a>(ptr: *const c_char) -> Result<&'a str, MemoStatus> {
    if ptr.is_null() {
        set_last_error("null argument".to_string());
        return Err(MemoStatus::ErrorInvalidArgument);
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().map_err(|e| {
        set_last_error(format!("invalid utf-8 argument: {}", e));
        MemoStatus::ErrorInvalidArgument
    })
}

/// Create a new context. The caller must later call `memo_context_destroy`.
#[no_mangle]
pub extern "C" fn memo_context_create(
    _backend: MemoBackendType,
    ctx_out: *mut *mut MemoContext,
) -> MemoStatus {
    catch_panic(|| {
        if ctx_out.is_null() {
            set_last_error("ctx_out is null".to_string());
            return MemoStatus::ErrorInvalidArgument;
        }
        let ctx = Box::new(MemoContext::new());
        unsafe {
            *ctx_out = Box::into_raw(ctx);
        }
        MemoStatus::Ok
    })
}

/// Destroy a context previously created by `memo_context_create`.
#[no_mangle]
pub unsafe extern "C" fn memo_context_destroy(ctx: *mut MemoContext) -> MemoStatus {
    if ctx.is_null() {
        return MemoStatus::Ok;
    }
    drop(Box::from_raw(ctx));
    MemoStatus::Ok
}

/// Load a checkpoint and tokenizer from disk into the context.
#[no_mangle]
pub unsafe extern "C" fn memo_model_load(
    ctx: *mut MemoContext,
    checkpoint_path: *const c_char,
    tokenizer_path: *const c_char,
) -> MemoStatus {
    catch_panic(|| {
        if ctx.is_null() {
            set_last_error("null argument".to_string());
            return MemoStatus::ErrorInvalidArgument;
        }
        let ctx = unsafe { &mut *ctx };
        let checkpoint_path = match c_str_arg(checkpoint_path) {
            Ok(s) => s,
            Err(status) => return status,
        };
        let tokenizer_path = match c_str_arg(tokenizer_path) {
            Ok(s) => s,
            Err(status) => return status,
        };

        let checkpoint_file = match File::open(Path::new(checkpoint_path)) {
            Ok(f) => f,
            Err(e) => {
                set_last_error(format!("failed to open checkpoint: {}", e));
                return MemoStatus::ErrorModelLoad;
            }
        };
        let (config, weights) = match memo_model::checkpoint::load(&mut BufReader::new(checkpoint_file)) {
            Ok(cw) => cw,
            Err(e) => {
                set_last_error(format!("failed to load checkpoint: {}", e));
                return MemoStatus::ErrorModelLoad;
            }
        };

        let tokenizer_file = match File::open(Path::new(tokenizer_path)) {
            Ok(f) => f,
            Err(e) => {
                set_last_error(format!("failed to open tokenizer: {}", e));
                return MemoStatus::ErrorModelLoad;
            }
        };
        let tokenizer = match memo_model::Tokenizer::load(&mut BufReader::new(tokenizer_file)) {
            Ok(t) => t,
            Err(e) => {
                set_last_error(format!("failed to load tokenizer: {}", e));
                return MemoStatus::ErrorModelLoad;
            }
        };

        ctx.model = Some(memo_model::Model::new(config, weights));
        ctx.tokenizer = Some(tokenizer);
        MemoStatus::Ok
    })
}

/// Open (or create) the vector index, text store, and metadata store for
/// `base`, per the `db/<base>.{memo,txt,meta}` layout.
#[no_mangle]
pub unsafe extern "C" fn memo_store_open(
    ctx: *mut MemoContext,
    base: *const c_char,
    capacity: usize,
) -> MemoStatus {
    catch_panic(|| {
        if ctx.is_null() {
            set_last_error("null argument".to_string());
            return MemoStatus::ErrorInvalidArgument;
        }
        let ctx = unsafe { &mut *ctx };
        let base = match c_str_arg(base) {
            Ok(s) => s,
            Err(status) => return status,
        };
        let dim = match ctx.model.as_ref() {
            Some(m) => m.hidden_size(),
            None => {
                set_last_error("model not loaded".to_string());
                return MemoStatus::ErrorStore;
            }
        };

        let paths = resolve(base);

        let index = match File::open(&paths.index) {
            Ok(mut f) => match VectorIndex::load(&mut f) {
                Ok(idx) => idx,
                Err(e) => {
                    set_last_error(format!("failed to load index: {}", e));
                    return MemoStatus::ErrorStore;
                }
            },
            Err(_) => VectorIndex::create(dim, Metric::Cosine, capacity),
        };
        let text = match File::open(&paths.text) {
            Ok(mut f) => match TextStore::load(&mut f) {
                Ok(t) => t,
                Err(e) => {
                    set_last_error(format!("failed to load text store: {}", e));
                    return MemoStatus::ErrorStore;
                }
            },
            Err(_) => TextStore::new(),
        };
        let meta = match File::open(&paths.meta) {
            Ok(mut f) => match MetaStore::load(&mut f) {
                Ok(m) => m,
                Err(e) => {
                    set_last_error(format!("failed to load metadata store: {}", e));
                    return MemoStatus::ErrorStore;
                }
            },
            Err(_) => MetaStore::new(),
        };

        ctx.index = Some(index);
        ctx.text = Some(text);
        ctx.meta = Some(meta);
        ctx.base = Some(base.to_string());
        MemoStatus::Ok
    })
}

fn as_io_error(e: memo_index::IndexError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

/// Writes `content` to a temp file next to `dest` and returns the temp
/// path, without touching `dest` itself. The caller renames all staged
/// temp files into place only once every write has succeeded.
fn stage(dest: &Path, write: impl FnOnce(&mut File) -> std::io::Result<()>) -> std::io::Result<PathBuf> {
    let temp_path = dest.with_extension(
        dest.extension()
            .map(|ext| format!("{}.tmp", ext.to_string_lossy()))
            .unwrap_or_else(|| "tmp".to_string()),
    );
    let mut f = File::create(&temp_path)?;
    write(&mut f)?;
    f.sync_all()?;
    Ok(temp_path)
}

/// Persists the index/text/meta sidecar files all-or-nothing: each is
/// written to a temp file first, and only once every write has succeeded
/// are all three renamed into place. A failure at any stage leaves the
/// previously persisted files untouched and removes its own temp files.
fn persist(ctx: &MemoContext) -> std::io::Result<()> {
    let base = ctx.base.as_deref().unwrap_or("default");
    let paths = resolve(base);
    if let Some(parent) = paths.index.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut staged: Vec<(PathBuf, &Path)> = Vec::new();
    let stage_result = (|| -> std::io::Result<()> {
        if let Some(index) = ctx.index.as_ref() {
            let temp = stage(&paths.index, |f| index.save(f).map_err(as_io_error))?;
            staged.push((temp, paths.index.as_path()));
        }
        if let Some(text) = ctx.text.as_ref() {
            let temp = stage(&paths.text, |f| text.save(f).map_err(as_io_error))?;
            staged.push((temp, paths.text.as_path()));
        }
        if let Some(meta) = ctx.meta.as_ref() {
            let temp = stage(&paths.meta, |f| meta.save(f).map_err(as_io_error))?;
            staged.push((temp, paths.meta.as_path()));
        }
        Ok(())
    })();

    if let Err(e) = stage_result {
        for (temp, _) in &staged {
            let _ = std::fs::remove_file(temp);
        }
        return Err(e);
    }

    let mut renamed = 0;
    let rename_result = (|| -> std::io::Result<()> {
        for (temp, dest) in &staged {
            std::fs::rename(temp, dest)?;
            renamed += 1;
        }
        Ok(())
    })();

    if let Err(e) = rename_result {
        // Files before `renamed` are already in place; clean up the temp
        // files for the rest so they don't linger on disk.
        for (temp, _) in &staged[renamed..] {
            let _ = std::fs::remove_file(temp);
        }
        return Err(e);
    }

    Ok(())
}

/// Embeds `note` and appends it (or overwrites row `id`, when `id >= 0`)
/// to the index/text/metadata stores in lockstep, then persists all three.
#[no_mangle]
pub unsafe extern "C" fn memo_save(
    ctx: *mut MemoContext,
    id: i64,
    note: *const c_char,
    meta_flow: *const c_char,
) -> MemoStatus {
    catch_panic(|| {
        if ctx.is_null() {
            set_last_error("null argument".to_string());
            return MemoStatus::ErrorInvalidArgument;
        }
        let ctx = unsafe { &mut *ctx };
        let note = match c_str_arg(note) {
            Ok(s) => s,
            Err(status) => return status,
        };
        let meta_flow: Option<&str> = if meta_flow.is_null() {
            None
        } else {
            match c_str_arg(meta_flow) {
                Ok(s) => Some(s),
                Err(status) => return status,
            }
        };

        let backend = ctx.backend.clone();
        let (model, tokenizer) = match (ctx.model.as_mut(), ctx.tokenizer.as_ref()) {
            (Some(m), Some(t)) => (m, t),
            _ => {
                set_last_error("model not loaded".to_string());
                return MemoStatus::ErrorStore;
            }
        };

        let vector = match embed(note, tokenizer, model, backend.as_ref()) {
            Ok(v) => v,
            Err(e) => {
                set_last_error(format!("embedding failed: {}", e));
                return MemoStatus::ErrorStore;
            }
        };

        let (index, text, meta) = match (ctx.index.as_mut(), ctx.text.as_mut(), ctx.meta.as_mut()) {
            (Some(i), Some(t), Some(m)) => (i, t, m),
            _ => {
                set_last_error("store not open".to_string());
                return MemoStatus::ErrorStore;
            }
        };

        let result = if id >= 0 {
            let row = id as usize;
            index
                .set(row, &vector)
                .and_then(|_| text.set(row, note))
                .and_then(|_| meta.set(row, meta_flow))
        } else {
            index.add(text.len() as u64, &vector).map(|_| ()).and_then(|_| {
                text.add(note);
                meta.add(meta_flow);
                Ok(())
            })
        };

        if let Err(e) = result {
            set_last_error(format!("save failed: {}", e));
            return MemoStatus::ErrorStore;
        }

        if let Err(e) = persist(ctx) {
            set_last_error(format!("failed to persist store: {}", e));
            return MemoStatus::ErrorStore;
        }

        MemoStatus::Ok
    })
}

/// Embeds `query`, optionally filters by metadata, and searches for the
/// `k` nearest rows. Writes a heap array into `*results_out`/`*len_out`,
/// freed with `memo_free_results`.
#[no_mangle]
pub unsafe extern "C" fn memo_recall(
    ctx: *mut MemoContext,
    query: *const c_char,
    k: u32,
    filter: *const c_char,
    results_out: *mut *mut MemoSearchResult,
    len_out: *mut usize,
) -> MemoStatus {
    catch_panic(|| {
        if ctx.is_null() || results_out.is_null() || len_out.is_null() {
            set_last_error("null argument".to_string());
            return MemoStatus::ErrorInvalidArgument;
        }
        let ctx = unsafe { &mut *ctx };
        let query = match c_str_arg(query) {
            Ok(s) => s,
            Err(status) => return status,
        };
        let filter_expr: Option<&str> = if filter.is_null() {
            None
        } else {
            match c_str_arg(filter) {
                Ok(s) => Some(s),
                Err(status) => return status,
            }
        };

        let k = (k.max(1) as usize).min(100);

        let backend = ctx.backend.clone();
        let (model, tokenizer) = match (ctx.model.as_mut(), ctx.tokenizer.as_ref()) {
            (Some(m), Some(t)) => (m, t),
            _ => {
                set_last_error("model not loaded".to_string());
                return MemoStatus::ErrorStore;
            }
        };
        let vector = match embed(query, tokenizer, model, backend.as_ref()) {
            Ok(v) => v,
            Err(e) => {
                set_last_error(format!("embedding failed: {}", e));
                return MemoStatus::ErrorStore;
            }
        };

        let (index, text, meta) = match (ctx.index.as_ref(), ctx.text.as_ref(), ctx.meta.as_ref()) {
            (Some(i), Some(t), Some(m)) => (i, t, m),
            _ => {
                set_last_error("store not open".to_string());
                return MemoStatus::ErrorStore;
            }
        };

        let mask: Option<Vec<bool>> = match filter_expr {
            Some(expr) => match meta.filter(expr) {
                Ok(m) => Some(m),
                Err(e) => {
                    set_last_error(format!("filter failed: {}", e));
                    return MemoStatus::ErrorStore;
                }
            },
            None => None,
        };

        let hits = match index.search(&vector, k, mask.as_deref(), backend.as_ref()) {
            Ok(h) => h,
            Err(e) => {
                set_last_error(format!("search failed: {}", e));
                return MemoStatus::ErrorStore;
            }
        };

        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let line = if hit.score > -1.0 {
                text.get(hit.id as usize).unwrap_or("")
            } else {
                ""
            };
            let c_text = CString::new(line).unwrap_or_default();
            out.push(MemoSearchResult {
                id: hit.id,
                score: hit.score,
                text: c_text.into_raw(),
            });
        }

        let mut boxed = out.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        let len = boxed.len();
        std::mem::forget(boxed);
        unsafe {
            *results_out = ptr;
            *len_out = len;
        }
        MemoStatus::Ok
    })
}

/// Frees a result array previously returned by `memo_recall`.
#[no_mangle]
pub unsafe extern "C" fn memo_free_results(results: *mut MemoSearchResult, len: usize) {
    if results.is_null() {
        return;
    }
    let slice = std::slice::from_raw_parts_mut(results, len);
    for item in slice.iter_mut() {
        if !item.text.is_null() {
            drop(CString::from_raw(item.text));
        }
    }
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(results, len)));
}

/// Deletes the index, text, and metadata files for `base`. Missing files
/// are not an error.
#[no_mangle]
pub unsafe extern "C" fn memo_clear(base: *const c_char) -> MemoStatus {
    catch_panic(|| {
        let base = match c_str_arg(base) {
            Ok(s) => s,
            Err(status) => return status,
        };
        let paths = resolve(base);
        for path in [&paths.index, &paths.text, &paths.meta] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    set_last_error(format!("failed to remove {}: {}", path.display(), e));
                    return MemoStatus::ErrorStore;
                }
            }
        }
        MemoStatus::Ok
    })
}

/// Reset the model's KV cache.
#[no_mangle]
pub unsafe extern "C" fn memo_reset_cache(ctx: *mut MemoContext) -> MemoStatus {
    if ctx.is_null() {
        return MemoStatus::ErrorInvalidArgument;
    }
    let ctx = &mut *ctx;
    if let Some(model) = ctx.model.as_mut() {
        model.reset_cache();
    }
    MemoStatus::Ok
}

/// Retrieve the last error message, or null if none occurred. The caller
/// must free the returned string with `memo_free_string`.
#[no_mangle]
pub extern "C" fn memo_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `memo_last_error`.
#[no_mangle]
pub unsafe extern "C" fn memo_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
