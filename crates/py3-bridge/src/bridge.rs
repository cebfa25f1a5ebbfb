//! The Bridge service.
//!
//! A [`Bridge`] owns the handle to one imported module and is the only way
//! to call into it. Construct it once at startup with [`Bridge::init`] and
//! pass it by reference; it is `Send + Sync`.
//!
//! Every entry point follows the same sequence:
//!
//! 1. Take the [`InvocationGuard`] (process-wide, shared by all bridges)
//! 2. Attach to the interpreter
//! 3. Look up the function, marshal arguments, invoke
//! 4. Capture the result while still holding the guard

use std::fmt;
use std::path::PathBuf;

use pyo3::exceptions::PyAttributeError;
use pyo3::prelude::*;
use pyo3::types::PyString;
use tracing::{debug, error, info};

use crate::config::{BridgeConfig, DecodeMode};
use crate::conversion::{
    extract_matrix, index_kwargs, params_to_kwargs, rows_to_args, values_to_args, Matrix, Params,
};
use crate::error::{BridgeError, BridgeResult};
use crate::gil::{ensure_interpreter, InvocationGuard};
use crate::repr::{capture_repr, decode_matrix};

pub struct Bridge {
    module: Py<PyModule>,
    config: BridgeConfig,
}

impl Bridge {
    /// Start the interpreter (once per process) and import `config.module`.
    ///
    /// Failure here means the bridge cannot be used at all; callers are
    /// expected to treat it as a startup precondition.
    pub fn init(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        ensure_interpreter()?;

        let _guard = InvocationGuard::acquire("<init>")?;
        let module = Python::attach(|py| -> BridgeResult<Py<PyModule>> {
            prepend_search_paths(py, &config.search_paths)?;

            let module = py.import(config.module.as_str()).map_err(|e| {
                let cause = BridgeError::from_pyerr(py, &e);
                BridgeError::module_import(&config.module, cause.to_string())
            })?;
            Ok(module.unbind())
        })
        .inspect_err(|e| error!(error = %e, "bridge initialization failed"))?;

        info!(module = %config.module, "imported Python module");
        Ok(Self { module, config })
    }

    pub fn module_name(&self) -> &str {
        &self.config.module
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Call `function(*rows, **params)` and decode its result as a matrix.
    ///
    /// Every failure is returned; nothing here aborts the process. No partial
    /// result is ever returned alongside an error.
    pub fn call<R>(&self, function: &str, rows: &[R], params: &Params) -> BridgeResult<Matrix>
    where
        R: AsRef<[f64]>,
    {
        debug!(function, "call");
        let _guard = InvocationGuard::acquire_with(function, self.config.lock_timeout())?;

        Python::attach(|py| {
            let callable = self.lookup(py, function)?;
            let args = rows_to_args(py, rows)?;
            let kwargs = params_to_kwargs(py, params)?;
            if self.config.log_results {
                info!(function, args = %args, kwargs = %kwargs, "invoking");
            }

            let out = callable
                .call(args, Some(&kwargs))
                .map_err(|e| BridgeError::from_pyerr(py, &e))?;
            self.decode_result(function, &out)
        })
        .inspect_err(|e| error!(function, error = %e, "call failed"))
    }

    /// Call `function(*values)` for its side effects and log the repr of
    /// whatever it returns.
    ///
    /// With `mirror_positional_kwargs` enabled the values are also passed as
    /// keywords `"0"`, `"1"`, ...
    pub fn call_diagnostic(&self, function: &str, values: &[f64]) -> BridgeResult<()> {
        debug!(function, "diagnostic call");
        let _guard = InvocationGuard::acquire_with(function, self.config.lock_timeout())?;

        Python::attach(|py| {
            let callable = self.lookup(py, function)?;
            let args = values_to_args(py, values)?;
            let kwargs = if self.config.mirror_positional_kwargs {
                Some(index_kwargs(py, values)?)
            } else {
                None
            };
            if self.config.log_results {
                let kwargs = kwargs.as_ref().map(|k| k.to_string());
                info!(function, args = %args, kwargs = ?kwargs, "invoking");
            }

            let out = callable
                .call(args, kwargs.as_ref())
                .map_err(|e| BridgeError::from_pyerr(py, &e))?;
            let text = capture_repr(Some(&out))?;
            if self.config.log_results {
                info!(function, repr = %text, "diagnostic call returned");
            } else {
                debug!(function, "diagnostic call returned");
            }
            Ok(())
        })
        .inspect_err(|e| error!(function, error = %e, "diagnostic call failed"))
    }

    /// Whether the module has a callable attribute named `function`.
    pub fn has_function(&self, function: &str) -> BridgeResult<bool> {
        let _guard = InvocationGuard::acquire_with(function, self.config.lock_timeout())?;

        Python::attach(|py| match self.lookup(py, function) {
            Ok(attr) => Ok(attr.is_callable()),
            Err(BridgeError::FunctionNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        })
    }

    /// Run `f` against the module under the invocation lock.
    ///
    /// For interop the numeric calling conventions don't cover.
    pub fn with_module<F, T>(&self, f: F) -> BridgeResult<T>
    where
        F: for<'py> FnOnce(Python<'py>, &Bound<'py, PyModule>) -> PyResult<T>,
    {
        let _guard = InvocationGuard::acquire_with("<with_module>", self.config.lock_timeout())?;

        Python::attach(|py| {
            let module = self.module.bind(py);
            f(py, module).map_err(|e| BridgeError::from_pyerr(py, &e))
        })
    }

    fn lookup<'py>(&self, py: Python<'py>, function: &str) -> BridgeResult<Bound<'py, PyAny>> {
        match self.module.bind(py).getattr(function) {
            Ok(attr) => Ok(attr),
            Err(e) if e.is_instance_of::<PyAttributeError>(py) => {
                Err(BridgeError::function_not_found(function, self.module_name()))
            }
            Err(e) => Err(BridgeError::from_pyerr(py, &e)),
        }
    }

    fn decode_result(&self, function: &str, out: &Bound<'_, PyAny>) -> BridgeResult<Matrix> {
        let matrix = match self.config.decode {
            DecodeMode::Direct if out.is_instance_of::<PyString>() => {
                let py_err = |e: PyErr| BridgeError::from_pyerr(out.py(), &e);
                let text = out.str().map_err(py_err)?;
                let text = text.to_cow().map_err(py_err)?.into_owned();
                self.log_text(function, &text);
                decode_matrix(&text)?
            }
            DecodeMode::Direct => match extract_matrix(out) {
                Some(matrix) => matrix,
                None => {
                    let text = capture_repr(Some(out))?;
                    self.log_text(function, &text);
                    decode_matrix(&text)?
                }
            },
            DecodeMode::Repr => {
                let text = capture_repr(Some(out))?;
                self.log_text(function, &text);
                decode_matrix(&text)?
            }
        };

        debug!(function, rows = matrix.len(), "decoded result");
        Ok(matrix)
    }

    fn log_text(&self, function: &str, text: &str) {
        if self.config.log_results {
            info!(function, text, "captured result");
        }
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("module", &self.config.module)
            .field("decode", &self.config.decode)
            .finish()
    }
}

/// Prepend `paths` to `sys.path`, in order, skipping entries already present.
fn prepend_search_paths(py: Python<'_>, paths: &[PathBuf]) -> BridgeResult<()> {
    if paths.is_empty() {
        return Ok(());
    }

    let py_err = |e: PyErr| BridgeError::from_pyerr(py, &e);
    let sys_path = py
        .import("sys")
        .and_then(|sys| sys.getattr("path"))
        .map_err(py_err)?;

    for path in paths.iter().rev() {
        let entry = path.to_string_lossy();
        if sys_path.contains(&*entry).map_err(py_err)? {
            continue;
        }
        sys_path
            .call_method1("insert", (0, &*entry))
            .map_err(py_err)?;
        debug!(path = %entry, "added to sys.path");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Collects formatted log output for the current thread
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn run<T>(&self, f: impl FnOnce() -> T) -> T {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::INFO)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();
            tracing::subscriber::with_default(subscriber, f)
        }

        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_bridge_is_send_sync() {
        assert_send_sync::<Bridge>();
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let err = Bridge::init(BridgeConfig::new("")).unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }

    #[test]
    fn test_init_missing_module() {
        let err = Bridge::init(BridgeConfig::new("py3_bridge_no_such_module")).unwrap_err();
        match err {
            BridgeError::ModuleImport { module, reason } => {
                assert_eq!(module, "py3_bridge_no_such_module");
                assert!(reason.contains("ModuleNotFoundError"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_stdlib_module() {
        let bridge = Bridge::init(BridgeConfig::new("json")).unwrap();
        assert_eq!(bridge.module_name(), "json");
        assert!(bridge.has_function("dumps").unwrap());
        assert!(!bridge.has_function("no_such_function").unwrap());

        // `json.dumps(row)` is a flat list, which is not a matrix
        let err = bridge
            .call("dumps", &[vec![1.0, 2.0, 3.0]], &Params::new())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Decode { ref text, .. } if text == "[1.0, 2.0, 3.0]"));

        let missing = bridge.call("no_such_function", &[[1.0]], &Params::new());
        assert!(matches!(missing, Err(BridgeError::FunctionNotFound { .. })));
    }

    #[test]
    fn test_diagnostic_logging_follows_log_results() {
        let quiet = Bridge::init(BridgeConfig::new("json").with_log_results(false)).unwrap();
        let captured = Captured::default();
        captured.run(|| quiet.call_diagnostic("dumps", &[1.5])).unwrap();
        let text = captured.text();
        assert!(!text.contains("invoking"), "{text}");
        assert!(!text.contains("'1.5'"), "{text}");

        let loud = Bridge::init(BridgeConfig::new("json")).unwrap();
        let captured = Captured::default();
        captured.run(|| loud.call_diagnostic("dumps", &[1.5])).unwrap();
        let text = captured.text();
        assert!(text.contains("invoking"), "{text}");
        assert!(text.contains("diagnostic call returned"), "{text}");
        assert!(text.contains("'1.5'"), "{text}");
    }
}
