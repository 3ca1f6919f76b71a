pub mod compressor;
pub(crate) mod json;
pub mod ssh_client;

pub use json::*;
