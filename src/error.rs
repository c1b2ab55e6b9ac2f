//! Error types for the specialization engine

use thiserror::Error;

use crate::native::NativeError;
use crate::types::{Placeholder, TypeArg};

/// Result type for declaration, binding and dispatch operations
pub type TurboResult<T> = Result<T, TurboError>;

/// Specialization errors
///
/// Everything except `Io` and `Native` is a programmer error in declaring or
/// invoking a kernel, raised at the point of violation and never retried.
#[derive(Debug, Error)]
pub enum TurboError {
    #[error("No such variable: {name}")]
    NoSuchVariable { name: String },

    #[error("No such placeholder: {placeholder}")]
    NoSuchPlaceholder { placeholder: Placeholder },

    #[error("Placeholder {placeholder} already bound to {current}, given {given}")]
    AlreadyBound {
        placeholder: Placeholder,
        current: TypeArg,
        given: TypeArg,
    },

    #[error("Not dynamic: {function}")]
    NotDynamic { function: String },

    #[error("Bad argument: {arg} has no type name")]
    BadArg { arg: TypeArg },

    #[error("Bad type spec for {name}: {message}")]
    BadSpec { name: String, message: String },

    #[error("Variant still has unbound placeholders: {unbound}")]
    Incomplete { unbound: String },

    #[error("Variable has no declared type: {name}")]
    Untyped { name: String },

    #[error("Cannot infer {placeholder} for {function}: {reason}")]
    Uninferable {
        placeholder: Placeholder,
        function: String,
        reason: String,
    },

    #[error("Deferred {function} invoked before {module} was compiled")]
    DeferredNotReady { module: String, function: String },

    #[error("Module {module} has no function {function}")]
    MissingFunction { module: String, function: String },

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Config error: {message}")]
    ConfigError { message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Native(#[from] NativeError),
}

impl TurboError {
    pub fn parse_error(line: usize, msg: impl Into<String>) -> Self {
        TurboError::ParseError { line, message: msg.into() }
    }

    pub fn no_such_variable(name: impl Into<String>) -> Self {
        TurboError::NoSuchVariable { name: name.into() }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        TurboError::Untyped { name: name.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        TurboError::ConfigError { message: msg.into() }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        TurboError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
