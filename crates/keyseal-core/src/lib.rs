pub mod config;
pub mod error;
pub mod types;

pub use error::{SecurityError, SecurityResult};
pub use types::{CipherSize, Encoding};
