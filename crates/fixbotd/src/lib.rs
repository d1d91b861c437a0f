//! Fixbot daemon: webhook server driving the maintenance-ticket wizard.
//!
//! One inbound webhook call is one request: read session, mutate, render,
//! edit the tracked chat message. No background threads, no session cache;
//! the SQLite store is the only authority on conversation state.

pub mod config;
pub mod masters;
pub mod materializer;
pub mod navigator;
pub mod orchestrator;
pub mod routes;
pub mod server;
pub mod store;
pub mod transport;
