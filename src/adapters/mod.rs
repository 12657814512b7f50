//! Adapters implementing domain ports against concrete infrastructure.

pub mod sqlite;
