//! Tracing/logging setup shared by gatehouse binaries.

/// Initialize process-wide logging, filtered by `RUST_LOG` (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(None);
}

/// Like [`init`], but falls back to `level` when `RUST_LOG` is unset.
pub fn init_with(level: &str) {
    tracing::init(Some(level));
}

/// Tracing configuration (filters, layers).
pub mod tracing;
