//! services/api/src/lib.rs
//!
//! The MindSpark API service: configuration, adapters for the core ports and
//! the HTTP surface.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
