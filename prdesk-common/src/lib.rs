//! # prdesk common library
//!
//! Shared code for the prdesk services:
//! - Error and result types
//! - Bootstrap configuration loading and root folder resolution
//! - SQLite schema initialization

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
