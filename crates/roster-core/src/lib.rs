//! Core types and trait definitions for the roster personnel service.
//!
//! This crate has no networking or database dependencies.
//! The wire codec, the storage backend, the server and the client all depend
//! on it.

pub mod error;
pub mod message;
pub mod record;
pub mod store;

pub use error::{Error, Result};
