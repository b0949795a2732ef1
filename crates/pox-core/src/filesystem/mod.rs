//! Filesystem management for the chroot tree.
//!
//! Provides the support-mount table, the mount backend, and loop-device
//! management for image archives.

pub mod loopdev;
pub mod mount;
