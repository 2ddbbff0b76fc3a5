//! Workspace facade crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (currently `core-service` and its desktop adapters).
//! Host applications can depend on `photosync-workspace` and enable the
//! documented features without needing to wire each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
