//! jusim - automatic per-project runtime images
//!
//! Keeps a precompiled system image per project, rebuilds it in the
//! background when the project's packages, toolchain or usage change, and
//! tells the launcher which image to load.

pub mod build;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod housekeeping;
pub mod journal;
pub mod launch;
pub mod prefs;
pub mod project;
pub mod resolver;
pub mod session;
pub mod ui;

pub use error::{JusimError, JusimResult};
