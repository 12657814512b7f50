//! Infrastructure concerns: configuration loading.

pub mod config;
