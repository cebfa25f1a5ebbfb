//! Argument Marshaling and Result Conversion
//!
//! Builds the interpreter's native argument objects from Rust numbers, and
//! converts matrix-shaped return objects straight back without a text
//! round-trip.
//!
//! ## Shapes
//!
//! | Call | Positional                        | Keywords                    |
//! |------|-----------------------------------|-----------------------------|
//! | V2   | `tuple` of one `list[float]` per row | `dict[str, int]`         |
//! | V1   | `tuple[float, ...]`               | optional `{"0": v0, ...}`   |
//!
//! Every object built here is an owned [`Bound`] handle; its reference is
//! released when the handle is dropped at the end of the call.

use indexmap::IndexMap;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyString, PyTuple};

use crate::error::{BridgeError, BridgeResult};

/// Rows of floats, the result shape of every V2 call
pub type Matrix = Vec<Vec<f64>>;

/// Keyword parameters for V2 calls, passed in insertion order
pub type Params = IndexMap<String, i32>;

// ============================================================================
// V2 Arguments
// ============================================================================

/// Pack rows into a tuple of lists, one list per row.
///
/// The target function sees each row as a separate positional argument.
pub fn rows_to_args<'py, R>(py: Python<'py>, rows: &[R]) -> BridgeResult<Bound<'py, PyTuple>>
where
    R: AsRef<[f64]>,
{
    let mut lists = Vec::with_capacity(rows.len());
    for row in rows {
        let list = PyList::new(py, row.as_ref()).map_err(|e| marshal_error(py, &e))?;
        lists.push(list);
    }
    PyTuple::new(py, lists).map_err(|e| marshal_error(py, &e))
}

/// Pack keyword parameters into a dict of `str -> int`.
pub fn params_to_kwargs<'py>(py: Python<'py>, params: &Params) -> BridgeResult<Bound<'py, PyDict>> {
    let kwargs = PyDict::new(py);
    for (key, value) in params {
        kwargs
            .set_item(key, *value)
            .map_err(|e| marshal_error(py, &e))?;
    }
    Ok(kwargs)
}

// ============================================================================
// V1 Arguments
// ============================================================================

/// Pack values into a flat tuple of floats.
pub fn values_to_args<'py>(py: Python<'py>, values: &[f64]) -> BridgeResult<Bound<'py, PyTuple>> {
    PyTuple::new(py, values).map_err(|e| marshal_error(py, &e))
}

/// Mirror positional values as keywords keyed by their index: `{"0": v0, "1": v1}`.
pub fn index_kwargs<'py>(py: Python<'py>, values: &[f64]) -> BridgeResult<Bound<'py, PyDict>> {
    let kwargs = PyDict::new(py);
    for (index, value) in values.iter().enumerate() {
        kwargs
            .set_item(index.to_string(), *value)
            .map_err(|e| marshal_error(py, &e))?;
    }
    Ok(kwargs)
}

fn marshal_error(py: Python<'_>, err: &PyErr) -> BridgeError {
    BridgeError::marshal(BridgeError::from_pyerr(py, err).to_string())
}

// ============================================================================
// Direct Result Conversion
// ============================================================================

/// Convert a sequence of numeric sequences straight into a [`Matrix`].
///
/// Returns `None` for anything that is not matrix-shaped, including strings
/// (a `str` is a sequence, but its characters are not rows).
pub fn extract_matrix(obj: &Bound<'_, PyAny>) -> Option<Matrix> {
    if obj.is_instance_of::<PyString>() {
        return None;
    }
    obj.extract::<Matrix>().ok()
}
