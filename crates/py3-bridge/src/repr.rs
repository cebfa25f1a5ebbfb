//! Representation Capture and Text Decoding
//!
//! The textual channel back from the interpreter: `repr()` an object, strip
//! the single quotes a `str` repr carries, and parse the rest as JSON rows.

use pyo3::prelude::*;

use crate::conversion::Matrix;
use crate::error::{BridgeError, BridgeResult};

/// Capture the `repr()` of an object.
///
/// `None` stands in for a null reference and fails without touching the
/// interpreter. If `repr()` itself raises, the exception is fetched (which
/// clears the interpreter's error indicator) and reported as
/// [`BridgeError::ReprFailed`].
pub fn capture_repr(obj: Option<&Bound<'_, PyAny>>) -> BridgeResult<String> {
    let obj = obj.ok_or_else(|| BridgeError::null_object("object is nil"))?;
    let py = obj.py();

    let repr = obj
        .repr()
        .map_err(|e| BridgeError::repr_failed(BridgeError::from_pyerr(py, &e).to_string()))?;

    let text = repr
        .to_cow()
        .map_err(|e| BridgeError::repr_failed(BridgeError::from_pyerr(py, &e).to_string()))?;
    Ok(text.into_owned())
}

/// Capture the `repr()` of a raw borrowed object pointer.
///
/// A null `ptr` is rejected before any dereference.
///
/// # Safety
///
/// A non-null `ptr` must point to a live Python object, and the caller must
/// be attached to the interpreter (guaranteed by holding `py`).
pub unsafe fn capture_repr_raw(py: Python<'_>, ptr: *mut pyo3::ffi::PyObject) -> BridgeResult<String> {
    // SAFETY: upheld by the caller; null is mapped to None.
    let obj = unsafe { Bound::from_borrowed_ptr_or_opt(py, ptr) };
    capture_repr(obj.as_ref())
}

/// Trim every leading and trailing `'`.
pub fn strip_quotes(text: &str) -> &str {
    text.trim_matches('\'')
}

/// Decode result text as JSON rows of numbers.
///
/// Quotes from a `str` repr are stripped first, so `'[[1,2]]'` and
/// `[[1,2]]` decode to the same matrix.
pub fn decode_matrix(text: &str) -> BridgeResult<Matrix> {
    let body = strip_quotes(text);
    serde_json::from_str::<Matrix>(body).map_err(|e| BridgeError::decode(body, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pyo3::types::{PyDict, PyList};
    use std::ffi::CString;

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("'[[1,2]]'"), "[[1,2]]");
        assert_eq!(strip_quotes("[[1,2]]"), "[[1,2]]");
        assert_eq!(strip_quotes("''"), "");
    }

    #[test]
    fn test_decode_quoted_and_bare_agree() {
        let quoted = decode_matrix("'[[1,2]]'").unwrap();
        let bare = decode_matrix("[[1,2]]").unwrap();
        assert_eq!(quoted, vec![vec![1.0, 2.0]]);
        assert_eq!(quoted, bare);
    }

    #[test]
    fn test_decode_ragged_and_empty() {
        assert_eq!(
            decode_matrix("[[0.5], [1e3, -2]]").unwrap(),
            vec![vec![0.5], vec![1000.0, -2.0]]
        );
        assert_eq!(decode_matrix("[]").unwrap(), Matrix::new());
    }

    /// splitmix64, so the sweep is the same on every run
    fn next_bits(state: &mut u64) -> u64 {
        *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = *state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    #[test]
    fn test_decode_is_bit_exact() {
        // Shortest round-trip text, as Python's float repr prints it
        for v in [1.0715660391465826e-75, 923.8829120510785, 5e-324, f64::MAX, -0.1] {
            let decoded = decode_matrix(&format!("[[{v:?}]]")).unwrap();
            assert_eq!(decoded[0][0].to_bits(), v.to_bits(), "{v:?}");
        }

        let mut state = 0x5EED;
        let mut checked = 0;
        while checked < 200_000 {
            let v = f64::from_bits(next_bits(&mut state));
            if !v.is_finite() {
                continue;
            }
            let decoded = decode_matrix(&format!("[[{v:?}]]")).unwrap();
            assert_eq!(decoded[0][0].to_bits(), v.to_bits(), "{v:?}");
            checked += 1;
        }
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let err = decode_matrix("not-json").unwrap_err();
        assert!(matches!(err, BridgeError::Decode { ref text, .. } if text == "not-json"));

        // Python float repr for NaN is not JSON
        assert!(decode_matrix("[[nan]]").is_err());
        // Flat list is not a matrix
        assert!(decode_matrix("[1, 2]").is_err());
    }

    #[test]
    fn test_capture_repr_null() {
        let err = capture_repr(None).unwrap_err();
        assert!(matches!(err, BridgeError::NullObject { .. }));

        Python::initialize();
        Python::attach(|py| {
            let err = unsafe { capture_repr_raw(py, std::ptr::null_mut()) }.unwrap_err();
            assert!(matches!(err, BridgeError::NullObject { .. }));
        });
    }

    #[test]
    fn test_capture_repr_of_values() {
        Python::initialize();
        Python::attach(|py| {
            let list = PyList::new(py, [1.0, 2.0]).unwrap();
            assert_eq!(capture_repr(Some(list.as_any())).unwrap(), "[1.0, 2.0]");

            let text = "[[1, 2]]".into_pyobject(py).unwrap();
            assert_eq!(capture_repr(Some(text.as_any())).unwrap(), "'[[1, 2]]'");

            let raw = unsafe { capture_repr_raw(py, list.as_ptr()) }.unwrap();
            assert_eq!(raw, "[1.0, 2.0]");
        });
    }

    #[test]
    fn test_capture_repr_failure_clears_error() {
        Python::initialize();
        Python::attach(|py| {
            let code = CString::new(
                "class Broken:\n    def __repr__(self):\n        raise RuntimeError('no repr')\nbroken = Broken()\n",
            )
            .unwrap();
            let locals = PyDict::new(py);
            py.run(&code, None, Some(&locals)).unwrap();
            let broken = locals.get_item("broken").unwrap().unwrap();

            let err = capture_repr(Some(&broken)).unwrap_err();
            match err {
                BridgeError::ReprFailed { reason } => assert!(reason.contains("no repr")),
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(PyErr::take(py).is_none());
        });
    }
}
