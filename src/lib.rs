//! =============================================================================
//! Pixie - Loupe d'écran flottante
//! Pixie - Floating screen magnifier
//! =============================================================================
//!
//! Une fenêtre qui capture en continu la zone autour du curseur, l'agrandit,
//! et superpose une grille, un hot spot et des valeurs lues (coordonnées,
//! couleur).
//! A window that continuously captures the region around the cursor,
//! enlarges it, and overlays a grid, a hot spot and readouts (coordinates,
//! color).
//!
//! # Architecture
//! - `frame_clock`: ticks synchronized with the display refresh
//! - `coords`: point / pixel / flipped coordinate conversions
//! - `capture`: region capture that leaves the magnifier window out
//! - `surface`: bitmap placement, hot spot and grid layout
//! - `controller`: user actions, preferences, visibility
//! - `platform`: macOS shell and an in-memory mock

// =============================================================================
// MODULES
// =============================================================================

/// Configuration partagée (constantes)
/// Shared configuration (constants)
pub mod config;

pub mod error;
pub mod geometry;
pub mod coords;
pub mod frame_clock;
pub mod capture;
pub mod surface;
pub mod readout;
pub mod color_profile;
pub mod preferences;
pub mod controller;

/// Implémentations par plateforme
/// Platform implementations
pub mod platform;

pub use capture::{CaptureResult, ScreenBackend, ScreenCapturer};
pub use controller::MagnifierController;
pub use coords::DisplayDescriptor;
pub use error::{CaptureFailure, FrameClockError, PreferencesError};
pub use frame_clock::{FrameClock, FrameSubscriber, FrameTimestamps};
pub use geometry::{Point, Rect, Size};
pub use surface::{MagnifierSurface, OverlayState};
