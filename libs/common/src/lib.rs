//! Common library for the civicgrid services
//!
//! This crate provides shared functionality used across the civicgrid
//! services: PostgreSQL connectivity and the database error taxonomy
//! both services map their dependency failures onto.

pub mod database;
pub mod error;
