//! Infrastructure layer for Parley.
//!
//! Resolves the data directory and loads `config.toml` into the types
//! defined in `parley-types`.

pub mod config;
