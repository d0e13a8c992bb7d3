//! Quarry Core
//!
//! Core library for resource providers that translate configuration records
//! into remote management API calls

pub mod hashcode;
pub mod provider;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod timeouts;
