//! Dynamic invocation of type-erased cleanup callables
//!
//! A [`Handler`] packages a typed closure together with the [`Signature`]
//! describing its parameters. [`invoke`] takes an opaque `&dyn Any` target
//! plus a list of JSON argument values, validates arity and per-position
//! type compatibility against the signature, and only then performs the
//! call. Validation failures come back as [`InvokeError`] values; the
//! invoker itself never retries and never logs.

mod call;
mod handler;

pub use call::invoke;
pub use handler::{ArgType, Handler, IntoHandler, IntoVariadicHandler, ParamSpec, ParamType, Signature};

/// Errors produced while validating or performing a dynamic call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    /// The target value does not hold a callable handler
    #[error("target is not callable")]
    NotCallable,

    /// The argument list length does not fit the callable's parameters
    #[error("wrong number of arguments: got {got}, want {}{want}", if *.variadic { "at least " } else { "" })]
    ArityMismatch {
        /// Number of arguments supplied
        got: usize,
        /// Number of fixed parameters the callable declares
        want: usize,
        /// Whether the callable accepts a variable-length tail
        variadic: bool,
    },

    /// An argument value cannot be bound to its parameter
    #[error("argument {position} has type {actual}, want {expected}")]
    TypeMismatch {
        /// Zero-based argument position
        position: usize,
        /// JSON kind of the supplied value
        actual: &'static str,
        /// Expected parameter kind
        expected: ParamType,
    },
}
