//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the PhotoSync core:
//! - Logging and tracing infrastructure
//! - Configuration management with fail-fast bridge validation
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the sync engine and the
//! service façade depend on. It establishes the logging conventions and the
//! event broadcasting mechanism used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
