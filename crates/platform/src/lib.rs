//! # Tether Platform
//!
//! Shared types for the Tether SSH bootstrap engine.
//!
//! This crate provides the unified error taxonomy (`TetherError`,
//! `DispatchError`, `TetherResult`) used by every layer of the protocol crate.
//!
//! # Examples
//!
//! ```
//! use tether_platform::{TetherError, TetherResult};
//!
//! fn example_function() -> TetherResult<String> {
//!     Ok("Hello, Tether!".to_string())
//! }
//!
//! # fn main() -> TetherResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, Tether!");
//!
//! let err = TetherError::Proxy("SOCKS4: Connection rejected.".to_string());
//! assert_eq!(err.to_string(), "SOCKS4: Connection rejected.");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{DispatchError, TetherError, TetherResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
