//! Bike tracker server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod assets;
pub mod config;
pub mod db;
pub mod error;
pub mod positions;
pub mod routes;
pub mod state;
pub mod ws;
