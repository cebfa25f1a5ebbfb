//! Error Types for the Bridge
//!
//! Every failure the bridge can surface is a [`BridgeError`]. Nothing in this
//! crate terminates the host process; callers decide what is fatal.
//!
//! ## Error Categories
//!
//! - Startup: interpreter not initialized, module import failed, bad config
//! - Lookup: requested function missing from the module
//! - Invocation: Python exception raised by the target function
//! - Result capture: null object, `repr()` failure, JSON decoding failure
//! - Locking: timeout or re-entrant acquisition of the invocation lock

use pyo3::prelude::*;
use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Embedded interpreter did not report itself as initialized
    #[error("Python interpreter not initialized")]
    InterpreterNotInitialized,

    /// Importing the target module failed
    #[error("failed to import Python module '{module}': {reason}")]
    ModuleImport {
        /// Module name as requested
        module: String,
        /// Interpreter-side reason
        reason: String,
    },

    /// Function attribute missing from the module
    #[error("could not getattr({module}, '{function}')")]
    FunctionNotFound {
        /// Name of the function
        function: String,
        /// Name of the module
        module: String,
    },

    /// Python exception was raised
    #[error("Python exception: {exception_type}: {message}")]
    PythonException {
        /// Python exception type (e.g., "TypeError", "ValueError")
        exception_type: String,
        /// Exception message
        message: String,
        /// Formatted traceback, when one was attached
        traceback: Option<String>,
    },

    /// Null object reference
    #[error("null Python object: {context}")]
    NullObject {
        /// Where the null was encountered
        context: String,
    },

    /// `repr()` of the object raised
    #[error("failed to call repr on object: {reason}")]
    ReprFailed {
        /// Interpreter-side reason
        reason: String,
    },

    /// Result text was not JSON rows of numbers
    #[error("failed to decode result {text:?}: {reason}")]
    Decode {
        /// Text that was being decoded
        text: String,
        /// Decoder message
        reason: String,
    },

    /// Building an argument object failed
    #[error("failed to marshal arguments: {reason}")]
    Marshal {
        /// Interpreter-side reason
        reason: String,
    },

    /// Invocation lock not acquired in time
    #[error("timed out after {waited_ms}ms waiting for the invocation lock")]
    LockTimeout {
        /// How long we waited
        waited_ms: u64,
    },

    /// Bridge entered again from the thread that already holds the lock
    #[error("re-entrant bridge call to '{function}' from a thread holding the invocation lock")]
    ReentrantCall {
        /// Function that was being called
        function: String,
    },

    /// Invalid configuration
    #[error("invalid bridge configuration: {reason}")]
    Config {
        /// What is wrong
        reason: String,
    },
}

impl BridgeError {
    /// Create a module import error
    pub fn module_import(module: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::ModuleImport {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a function not found error
    pub fn function_not_found(function: impl Into<String>, module: impl Into<String>) -> Self {
        BridgeError::FunctionNotFound {
            function: function.into(),
            module: module.into(),
        }
    }

    /// Create a Python exception error
    pub fn exception(
        exception_type: impl Into<String>,
        message: impl Into<String>,
        traceback: Option<String>,
    ) -> Self {
        BridgeError::PythonException {
            exception_type: exception_type.into(),
            message: message.into(),
            traceback,
        }
    }

    /// Create a null object error
    pub fn null_object(context: impl Into<String>) -> Self {
        BridgeError::NullObject {
            context: context.into(),
        }
    }

    /// Create a repr failure error
    pub fn repr_failed(reason: impl Into<String>) -> Self {
        BridgeError::ReprFailed {
            reason: reason.into(),
        }
    }

    /// Create a decoding error
    pub fn decode(text: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Decode {
            text: text.into(),
            reason: reason.into(),
        }
    }

    /// Create a marshaling error
    pub fn marshal(reason: impl Into<String>) -> Self {
        BridgeError::Marshal {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        BridgeError::Config {
            reason: reason.into(),
        }
    }

    /// Convert an interpreter exception.
    ///
    /// The exception has already been fetched by pyo3, so the interpreter's
    /// error indicator is clear by the time this runs.
    pub fn from_pyerr(py: Python<'_>, err: &PyErr) -> Self {
        let exception_type = err
            .get_type(py)
            .name()
            .map(|name| name.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let message = err.value(py).to_string();
        let traceback = err.traceback(py).and_then(|tb| tb.format().ok());

        BridgeError::PythonException {
            exception_type,
            message,
            traceback,
        }
    }

    /// Errors that can only come out of [`crate::Bridge::init`]
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            BridgeError::InterpreterNotInitialized
                | BridgeError::ModuleImport { .. }
                | BridgeError::Config { .. }
        )
    }

    /// Check if this is a Python exception
    pub fn is_python_exception(&self) -> bool {
        matches!(self, BridgeError::PythonException { .. })
    }

    /// Check if the result could not be turned into a matrix
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            BridgeError::Decode { .. } | BridgeError::ReprFailed { .. } | BridgeError::NullObject { .. }
        )
    }
}
