//! The error taxonomy (spec §7): flat, and deliberately small.

/// Errors this core can report. Throttled compiles and cache misses are not
/// errors (spec §7): they are represented as `Ok(None)` / a fresh compile,
/// never as a variant here.
#[derive(thiserror::Error, Debug)]
pub enum JitError {
    /// Argument-index violation or arity mismatch during `CompileDag`
    /// construction.
    #[error("invalid compile DAG: {detail}")]
    InvalidCompileDag { detail: String },

    /// `prepare` was called on a function whose compiled backing was never
    /// installed.
    #[error("compiled function `{name}` used before its backing was installed")]
    UninitializedCompiledFunction { name: String },

    /// A compiled function was dispatched with a result type that cannot be
    /// represented natively — indicates upstream corruption.
    #[error("unexpected result type `{type_name}` for compiled function `{function}`")]
    UnexpectedResultType { function: String, type_name: String },

    /// The cache factory's `init` was called a second time with a different
    /// capacity than the first call.
    #[error("compiled-function cache was already initialised with a different capacity")]
    AlreadyInitialised,

    /// Propagated from the codegen backend: symbol-not-found, compile
    /// error, link error.
    #[error("codegen backend failure compiling `{name}`: {detail}")]
    BackendFailure { name: String, detail: String },
}
