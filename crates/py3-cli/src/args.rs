//! Argument value parsers for the `py3` command line.

use py3_bridge::{decode_matrix, Matrix, Params};

/// Parse a `key=value` keyword parameter.
pub fn parse_param(text: &str) -> Result<(String, i32), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{text}'"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{text}'"));
    }

    let value = value
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("parameter '{key}': {e}"))?;
    Ok((key.to_string(), value))
}

/// Rows of a `call`, each passed as one positional argument
#[derive(Debug, Clone, PartialEq)]
pub struct Rows(pub Matrix);

/// Parse rows given as JSON, e.g. `[[1, 2], [3.5]]`.
pub fn parse_rows(text: &str) -> Result<Rows, String> {
    decode_matrix(text).map(Rows).map_err(|e| e.to_string())
}

/// Render a result matrix as JSON.
///
/// JSON has no NaN or infinity, so a matrix holding one is an error rather
/// than being printed with `null` in its place.
pub fn matrix_to_json(matrix: &Matrix) -> anyhow::Result<String> {
    for (row, values) in matrix.iter().enumerate() {
        if let Some(col) = values.iter().position(|v| !v.is_finite()) {
            anyhow::bail!(
                "result[{row}][{col}] is {}, which JSON cannot represent",
                values[col]
            );
        }
    }
    Ok(serde_json::to_string(matrix)?)
}

/// Collect parameters, later duplicates replacing earlier ones in place.
pub fn collect_params(pairs: Vec<(String, i32)>) -> Params {
    pairs.into_iter().collect()
}
