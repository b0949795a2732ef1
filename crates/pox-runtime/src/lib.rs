//! Create and run flows for pox.
//!
//! [`engine::Engine`] ties the resolver, staging, packaging, and mounting
//! steps from `pox-image` to the chrooted execution in this crate.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod exec;
pub mod operation;
pub mod process;
