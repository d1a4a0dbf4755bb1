//! services/api/src/lib.rs
//!
//! The résumé review HTTP service: adapters for the core ports, the
//! background ingestion pipeline, status notifications, chat, and the axum
//! web layer. The `api` binary wires these together.

pub mod adapters;
pub mod config;
pub mod conversation;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod token;
pub mod web;
