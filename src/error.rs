// =============================================================================
// error.rs - Types d'erreurs / Error types
// =============================================================================

use thiserror::Error;

/// Erreur fatale de création de la source de rafraîchissement
/// Fatal error while creating the display refresh source
#[derive(Debug, Error)]
pub enum FrameClockError {
    /// The platform refused to create the refresh source (status code attached)
    #[error("display refresh source unavailable (status {0})")]
    SourceUnavailable(i32),
}

/// Erreur de lecture/écriture des préférences
/// Error while reading or writing preferences
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("preferences I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("preferences file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no configuration directory on this system")]
    NoConfigDir,
}

/// Raison pour laquelle une capture n'a produit aucune image
/// Why a capture produced no bitmap
///
/// Carried as data inside a `CaptureResult`; never returned as an `Err`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFailure {
    /// Screen recording is not authorized
    #[error("screen recording permission denied")]
    PermissionDenied,

    /// The sample point lies outside every known display
    #[error("no display contains the sample point")]
    NoDisplayAtPoint,

    /// The platform returned nothing for an otherwise valid region
    #[error("capture returned no image")]
    Transient,
}
