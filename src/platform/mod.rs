//! Platform back ends.
//!
//! `mock` builds everywhere and backs the tests. `macos` is the real shell:
//! CVDisplayLink, window server capture and the AppKit window.

pub mod mock;

/// Implémentation macOS
/// macOS implementation
#[cfg(target_os = "macos")]
pub mod macos;
