pub mod assemble;
pub mod codec;
pub mod config;
pub mod electrum;
pub mod error;
pub mod heights;
pub mod merkle;
pub mod swap;
#[cfg(test)]
pub(crate) mod test_util;
pub mod types;

pub use assemble::ProofAssembler;
pub use error::{ConnectionError, CoreError};
pub use types::ProofBundle;
