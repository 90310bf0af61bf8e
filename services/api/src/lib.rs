//! services/api/src/lib.rs
//!
//! Library root for the `api` service: configuration, error types, the
//! concrete port adapters, and the Axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
