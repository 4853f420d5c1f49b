//! pkgbuild library exports.
//!
//! Builds a Debian source package inside a throwaway overlay of a target
//! root filesystem, installs the resulting binary packages into that root
//! and leaves nothing else behind.
//!
//! The CLI in `main.rs` is a thin layer over [`build::Orchestrator`].

pub mod action;
pub mod build;
pub mod config;
pub mod error;
pub mod overlay;
pub mod preflight;
pub mod process;
pub mod timing;
