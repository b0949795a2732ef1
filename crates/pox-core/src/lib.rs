//! # pox-core
//!
//! Low-level Linux primitives for the pox engine.
//!
//! This crate provides narrow, substitutable interfaces over:
//! - **Commands**: running external tools (`ldd`, `mksquashfs`, `zip`, `unzip`).
//! - **Mounts**: the chroot support-mount table and `mount(2)` / `umount2(2)`.
//! - **Loop devices**: attaching image archives to `/dev/loopN`.
//! - **Sessions**: reverse-order teardown of everything a run acquired.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation. Linux only.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod command;
pub mod filesystem;
pub mod session;
