//! sbefi library exports.
//!
//! Builds Secure Boot signed unified kernel images for every kernel in the
//! boot directory: resolve companions, assemble with objcopy, sign with
//! sbsign, deploy where the boot loader looks.

pub mod assemble;
pub mod bootloader;
pub mod clean;
pub mod commands;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod kernel;
pub mod manifest;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod sign;
pub mod timing;

pub use error::{Error, Result};
pub use process::RunMode;
