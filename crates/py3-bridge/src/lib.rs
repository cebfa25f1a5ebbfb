//! # py3 Bridge
//!
//! Embeds a CPython interpreter and calls named functions of one imported
//! module with numeric arguments, returning numeric matrices.
//!
//! ## Overview
//!
//! - [`Bridge::init`] starts the interpreter once per process and imports the
//!   target module
//! - [`Bridge::call`] passes rows of floats positionally and `str -> int`
//!   parameters as keywords, then decodes the result into a [`Matrix`]
//! - [`Bridge::call_diagnostic`] passes flat floats and only logs the result
//! - Every call into the interpreter is serialized by one process-wide
//!   [`InvocationGuard`]
//!
//! ## Example
//!
//! ```no_run
//! use py3_bridge::{Bridge, BridgeConfig, Params};
//!
//! let bridge = Bridge::init(BridgeConfig::new("pyscripts").with_search_path("./pyscripts"))?;
//!
//! let mut params = Params::new();
//! params.insert("start".to_string(), 2);
//! params.insert("step".to_string(), 2);
//! params.insert("end".to_string(), 8);
//!
//! let rows = vec![vec![1.9, 3.9, 8.9], vec![1.88, 3.69, 8.45]];
//! let matrix = bridge.call("condd", &rows, &params)?;
//! assert_eq!(matrix.len(), 4);
//! # Ok::<(), py3_bridge::BridgeError>(())
//! ```
//!
//! ## Module Structure
//!
//! - [`bridge`]: the `Bridge` service
//! - [`config`]: TOML and environment configuration
//! - [`conversion`]: argument marshaling and direct result conversion
//! - [`repr`]: `repr()` capture and JSON decoding
//! - [`gil`]: interpreter startup and the invocation lock
//! - [`error`]: error types

pub mod bridge;
pub mod config;
pub mod conversion;
pub mod error;
pub mod gil;
pub mod repr;

// Re-export main types for convenience
pub use bridge::Bridge;
pub use config::{BridgeConfig, DecodeMode};
pub use conversion::{Matrix, Params};
pub use error::{BridgeError, BridgeResult};
pub use gil::{invocation_stats, InvocationGuard, InvocationStats};
pub use repr::{capture_repr, decode_matrix, strip_quotes};
