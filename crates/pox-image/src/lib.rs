//! # pox-image
//!
//! Everything between a list of input files and a usable archive tree.
//!
//! Handles:
//! - **Resolver**: shared-library discovery through the dynamic-linker inspector.
//! - **Staging**: laying files out in a private tree at their archive paths.
//! - **Packager**: encoding a staging tree as a squashfs image or zip archive.
//! - **Mounter**: loop-mounting or extracting an archive at a session root.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod mounter;
pub mod packager;
pub mod resolver;
pub mod staging;
