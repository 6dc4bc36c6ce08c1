//! Flipper Common Library
//!
//! Shared types for the flipper driver board that do not touch hardware.
//!
//! # Module Structure
//!
//! - [`registers`] - Register ids of the driver board bus
//! - [`bits`] - Control line layout and single-bit helpers
//! - [`descriptors`] - Validated switch, lamp and solenoid records
//! - [`config`] - TOML configuration loading and validation
//! - [`error`] - Error taxonomy shared by all drivers
//! - [`consts`] - System constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust,no_run
//! use flipper_common::config::{ConfigLoader, FlipperConfig};
//! use std::path::Path;
//!
//! let config = FlipperConfig::load(Path::new("config/flipper.toml")).unwrap();
//! let machine = config.validate().unwrap();
//! println!("{} switches configured", machine.table.switches.len());
//! ```

pub mod bits;
pub mod config;
pub mod consts;
pub mod descriptors;
pub mod error;
pub mod prelude;
pub mod registers;
