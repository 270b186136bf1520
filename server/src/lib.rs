//! SafeSchool library
//!
//! This library exposes the server's storage, services and routes for the
//! binary and for integration tests.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod routes;
pub mod services;
