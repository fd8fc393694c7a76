//! Configuration constants shared across the crate
//!
//! These values control the behavior of the magnifier and its overlay.

/// Smallest magnification factor (one captured pixel per display pixel)
/// Plus petit facteur d'agrandissement
pub const MAGNIFICATION_MIN: f64 = 1.0;

/// Largest magnification factor
/// Plus grand facteur d'agrandissement
pub const MAGNIFICATION_MAX: f64 = 128.0;

/// Magnification used when no preference has been stored yet
/// Agrandissement utilisé tant qu'aucune préférence n'est enregistrée
pub const DEFAULT_MAGNIFICATION: f64 = 16.0;

/// Below this factor grid lines would be too dense to read
/// En dessous de ce facteur la grille serait illisible
pub const GRID_MIN_MAGNIFICATION: f64 = 8.0;

/// Smallest side of the hot-spot marker (in view points)
/// The marker never collapses below this, whatever the magnification
pub const HOT_SPOT_MIN_SIZE: f64 = 4.0;

/// Gap between the hot-spot cell and its outer border (in view points)
pub const HOT_SPOT_BORDER_GAP: f64 = 1.5;

/// Extra pixels captured beyond the visible area on each side
/// Pixels capturés en plus de la zone visible de chaque côté
pub const CAPTURE_MARGIN_PIXELS: f64 = 1.0;

/// Fraction of a pixel the capture rectangle is pulled inward by,
/// so that platform rounding never adds a column or row
pub const CAPTURE_EDGE_EPSILON: f64 = 1.0e-4;

/// Tolerance (in pixels) between the requested and returned bitmap width
/// before the bitmap is considered captured at another density
pub const CAPTURE_ROUNDING_TOLERANCE: f64 = 1.0;

/// Fraction of a pixel added before flooring a sample position, so that
/// `29 / 3 * 3` lands on pixel 29 and not 28
pub const SAMPLE_SNAP_TOLERANCE: f64 = 1.0e-6;

/// Default magnifier window size (in points)
/// Taille par défaut de la fenêtre de la loupe (en points)
pub const WINDOW_DEFAULT_SIZE: f64 = 300.0;

/// Minimum magnifier window size (in points)
pub const WINDOW_MIN_SIZE: f64 = 300.0;

/// Title of the magnifier window
pub const WINDOW_TITLE: &str = "Pixie";

/// Interval of the custom event loop when no event is pending (~60fps)
/// Intervalle de la boucle d'événements personnalisée (~60fps)
pub const EVENT_LOOP_TIMEOUT_SECS: f64 = 0.016;

/// Directory name under the user configuration directory
/// Nom du dossier dans le dossier de configuration utilisateur
pub const CONFIG_DIR_NAME: &str = "pixie";

/// File holding the persisted preferences
/// Fichier contenant les préférences enregistrées
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Font size of the readout labels (in points)
pub const READOUT_FONT_SIZE: f64 = 12.0;

/// Padding around the readout labels (in points)
pub const READOUT_PADDING: f64 = 6.0;
