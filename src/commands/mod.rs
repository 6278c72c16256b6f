pub mod archive;
pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod prepend;
