//! Error taxonomy for the sparse network coding engine.
//!
//! Mirrors the teacher crate's approach of one `thiserror`-derived enum with
//! a message per variant. `MalformedPacket` from spec.md §7 is intentionally
//! absent here: it is a non-fatal, silently-dropped condition tracked by a
//! counter on the decoder rather than surfaced as an `Error`.

use thiserror::Error;

/// Errors produced by context/decoder/recoder creation and by persistence.
#[derive(Debug, Error)]
pub enum Error {
    /// Code parameters violate an invariant (e.g. `size_g < size_b`,
    /// `gfpower` outside `[1, 8]`, `datasize == 0`, unknown code type).
    #[error("invalid code parameters: {0}")]
    InvalidParameters(&'static str),

    /// The requested decoder algorithm cannot be used with the given code
    /// type, or is a reserved/unimplemented mode (`PP_DECODER`).
    #[error("unsupported decoder for this configuration: {0}")]
    UnsupportedDecoder(&'static str),

    /// Underlying allocation failed (surfaced for parity with spec.md §7;
    /// in practice this crate relies on `Vec`'s own abort-on-OOM behavior
    /// and only raises this for checked capacity computations that would
    /// overflow).
    #[error("allocation failure")]
    AllocationFailure,

    /// `recover_data`/`recover` was called before `finished()` returned
    /// `true`.
    #[error("decoder has not accumulated enough degrees of freedom yet")]
    NotFinished,

    /// I/O failure while loading source data or saving/restoring a decoder
    /// context, or a fatal format mismatch (bad magic, version mismatch) on
    /// restore.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
