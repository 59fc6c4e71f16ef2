//! # Top Tracks Common Library
//!
//! Shared code for the Top Tracks client crates:
//! - Backend API request/response types
//! - Configuration loading and resolution
//! - Common error type

pub mod api;
pub mod config;
pub mod error;

pub use error::{Error, Result};
