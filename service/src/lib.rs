//! Listings catalog service.
//!
//! Wires the reconciler workers to Redpanda and `PostgreSQL`. The binary in
//! `main.rs` reads a [`config::Config`] from the environment and runs until
//! interrupted.

pub mod config;
