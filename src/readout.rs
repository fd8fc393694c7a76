//! =============================================================================
//! READOUT.RS - Affichage des coordonnées et de la couleur
//! READOUT.RS - Coordinate and color readouts
//! =============================================================================
//!
//! Ce module formate les valeurs transmises par la surface après chaque
//! capture: position de la souris et couleur du pixel central.
//! This module formats the values the surface reports after each capture:
//! mouse position and color of the center pixel.

use std::fmt;
use std::rc::Rc;

use bigcolor::color_space::{rgb_to_cmyk, rgb_to_hsv};
use bigcolor::BigColor;
use image::Rgba;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::color_profile::{ColorProfiles, ColorSpaceProvider, DeviceColorSpaces};
use crate::coords::{self, DisplayDescriptor};
use crate::geometry::Point;
use crate::surface::SurfaceObserver;

// =============================================================================
// MODÈLE DE COULEUR
// COLOR MODEL
// =============================================================================

/// Modèle utilisé pour décrire la couleur échantillonnée
/// Model used to describe the sampled color
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorModel {
    Grayscale,
    #[default]
    Rgb,
    Cmyk,
    Hsb,
}

impl ColorModel {
    /// Modèle suivant dans l'ordre du menu
    /// Next model in menu order
    pub fn next(self) -> Self {
        match self {
            ColorModel::Grayscale => ColorModel::Rgb,
            ColorModel::Rgb => ColorModel::Cmyk,
            ColorModel::Cmyk => ColorModel::Hsb,
            ColorModel::Hsb => ColorModel::Grayscale,
        }
    }
}

// =============================================================================
// COORDONNÉES
// COORDINATES
// =============================================================================

/// Options d'affichage des coordonnées
/// Coordinate display options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinateOptions {
    /// Local to the display under the mouse instead of global
    pub per_screen: bool,
    /// Physical pixels instead of points (per-screen only)
    pub in_pixels: bool,
    /// Top-left origin instead of bottom-left
    pub flipped: bool,
}

impl Default for CoordinateOptions {
    fn default() -> Self {
        Self {
            per_screen: false,
            in_pixels: false,
            flipped: true,
        }
    }
}

/// Formate une valeur en points: entière si possible, sinon une décimale
/// Formats a point value: integral when possible, otherwise one decimal
fn format_points(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{:.1}", rounded)
    }
}

/// Formate la position de la souris selon les options
/// Formats the mouse position according to the options
///
/// `flipped` is `location` flipped against the primary display. Per-screen
/// output falls back to global coordinates when no display is known.
pub fn format_coordinate(
    location: Point,
    flipped: Point,
    display: Option<&DisplayDescriptor>,
    options: CoordinateOptions,
) -> String {
    match display {
        Some(display) if options.per_screen => {
            let local = coords::to_display_local(location, display, options.flipped);
            if options.in_pixels {
                let scale = display.backing_scale_factor;
                format!(
                    "{}, {}",
                    (local.x * scale).floor() as i64,
                    (local.y * scale).floor() as i64
                )
            } else {
                format!("{}, {}", format_points(local.x), format_points(local.y))
            }
        }
        _ => {
            let point = if options.flipped { flipped } else { location };
            format!("{}, {}", format_points(point.x), format_points(point.y))
        }
    }
}

// =============================================================================
// COULEUR
// COLOR
// =============================================================================

/// Formate une couleur RGB en chaîne hexadécimale
/// Formats an RGB color as a hex string
#[inline]
pub fn format_hex_color(r: u8, g: u8, b: u8) -> String {
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

/// Texte sombre si le noir contraste mieux que le blanc sur cette couleur
/// Dark text when black contrasts better than white on this color
pub fn should_use_dark_text(r: u8, g: u8, b: u8) -> bool {
    let background = BigColor::from_rgb(r, g, b, 1.0);
    let black = BigColor::from_rgb(0, 0, 0, 1.0);
    let white = BigColor::from_rgb(255, 255, 255, 1.0);
    background.get_contrast_ratio(&black) >= background.get_contrast_ratio(&white)
}

/// Composantes d'une couleur dans un modèle, chacune dans [0, 1]
/// Components of a color in one model, each in [0, 1]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorComponents {
    /// 0 is black
    Grayscale { white: f64 },
    Rgb { red: f64, green: f64, blue: f64 },
    Cmyk { cyan: f64, magenta: f64, yellow: f64, black: f64 },
    Hsb { hue: f64, saturation: f64, brightness: f64 },
}

impl ColorComponents {
    /// Composantes d'une couleur 8 bits sans gestion de couleur
    /// Components of an 8-bit color without color management
    pub fn from_device(color: Rgba<u8>, model: ColorModel) -> Self {
        let [r, g, b, _] = color.0;
        match model {
            ColorModel::Rgb => ColorComponents::Rgb {
                red: unit(r),
                green: unit(g),
                blue: unit(b),
            },
            ColorModel::Hsb => {
                let hsv = rgb_to_hsv(r, g, b);
                ColorComponents::Hsb {
                    hue: hsv.h as f64,
                    saturation: hsv.s as f64,
                    brightness: hsv.v as f64,
                }
            }
            ColorModel::Cmyk => {
                let cmyk = rgb_to_cmyk(r, g, b, 1.0);
                ColorComponents::Cmyk {
                    cyan: cmyk.c as f64 / 100.0,
                    magenta: cmyk.m as f64 / 100.0,
                    yellow: cmyk.y as f64 / 100.0,
                    black: cmyk.k as f64 / 100.0,
                }
            }
            ColorModel::Grayscale => {
                let mut gray = BigColor::from_rgb(r, g, b, 1.0);
                gray.greyscale();
                ColorComponents::Grayscale {
                    white: unit(gray.to_rgb().r),
                }
            }
        }
    }
}

fn unit(channel: u8) -> f64 {
    channel as f64 / 255.0
}

/// Two decimals per component; gray is shown as ink coverage (`1 - white`)
impl fmt::Display for ColorComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ColorComponents::Rgb { red, green, blue } => write!(f, "RGB({:.2}, {:.2}, {:.2})", red, green, blue),
            ColorComponents::Hsb { hue, saturation, brightness } => {
                write!(f, "HSB({:.2}, {:.2}, {:.2})", hue, saturation, brightness)
            }
            ColorComponents::Cmyk { cyan, magenta, yellow, black } => {
                write!(f, "CMYK({:.2}, {:.2}, {:.2}, {:.2})", cyan, magenta, yellow, black)
            }
            ColorComponents::Grayscale { white } => write!(f, "GS({:.2})", (1.0 - white).clamp(0.0, 1.0)),
        }
    }
}

/// Valeurs prêtes à afficher pour la couleur échantillonnée
/// Display-ready values for the sampled color
#[derive(Clone, Debug, PartialEq)]
pub struct ColorReadout {
    pub description: String,
    pub hex: String,
    /// Draw the label in black on a swatch of this color
    pub dark_text: bool,
    pub rgba: Rgba<u8>,
}

impl ColorReadout {
    /// Device components in `model`
    pub fn new(color: Rgba<u8>, model: ColorModel) -> Self {
        Self::with_components(color, ColorComponents::from_device(color, model))
    }

    /// `components` describe `color` in the selected profile
    pub fn with_components(color: Rgba<u8>, components: ColorComponents) -> Self {
        let [r, g, b, _] = color.0;
        Self {
            description: components.to_string(),
            hex: format_hex_color(r, g, b),
            dark_text: should_use_dark_text(r, g, b),
            rgba: color,
        }
    }
}

// =============================================================================
// PANNEAU
// PANEL
// =============================================================================

/// Dernières valeurs reçues de la surface et options d'affichage
/// Last values received from the surface, plus display options
#[derive(Clone)]
pub struct ReadoutPanel {
    pub show_coordinate: bool,
    pub show_color: bool,
    pub coordinate_options: CoordinateOptions,
    pub color_model: ColorModel,
    pub color_profiles: ColorProfiles,
    color_spaces: Rc<dyn ColorSpaceProvider>,
    location: Option<(Point, Point, Option<DisplayDescriptor>)>,
    color: Option<Rgba<u8>>,
}

impl Default for ReadoutPanel {
    fn default() -> Self {
        Self {
            show_coordinate: false,
            show_color: false,
            coordinate_options: CoordinateOptions::default(),
            color_model: ColorModel::default(),
            color_profiles: ColorProfiles::new(),
            color_spaces: Rc::new(DeviceColorSpaces),
            location: None,
            color: None,
        }
    }
}

impl ReadoutPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Espaces colorimétriques utilisés pour convertir la couleur lue
    /// Color spaces the sampled color is converted with
    pub fn set_color_spaces(&mut self, color_spaces: Rc<dyn ColorSpaceProvider>) {
        self.color_spaces = color_spaces;
    }

    pub fn color_spaces(&self) -> &Rc<dyn ColorSpaceProvider> {
        &self.color_spaces
    }

    /// Profil choisi pour le modèle courant
    /// Profile selected for the current color model
    pub fn color_profile(&self) -> &str {
        self.color_profiles.selected(self.color_model)
    }

    /// Texte des coordonnées
    /// `None` when hidden or before the first capture
    pub fn coordinate_text(&self) -> Option<String> {
        if !self.show_coordinate {
            return None;
        }
        let (location, flipped, display) = self.location.as_ref()?;
        Some(format_coordinate(*location, *flipped, display.as_ref(), self.coordinate_options))
    }

    /// Valeur de couleur, convertie dans le profil choisi
    /// `None` when hidden or before the first sampled color
    pub fn color_readout(&self) -> Option<ColorReadout> {
        if !self.show_color {
            return None;
        }
        let color = self.color?;
        let components = self
            .color_spaces
            .convert(color, self.color_model, self.color_profile())
            .unwrap_or_else(|| {
                trace!("Profile {:?} unavailable, showing device values", self.color_profile());
                ColorComponents::from_device(color, self.color_model)
            });
        Some(ColorReadout::with_components(color, components))
    }
}

impl SurfaceObserver for ReadoutPanel {
    fn mouse_location_updated(&mut self, location: Point, flipped: Point, display: Option<&DisplayDescriptor>) {
        self.location = Some((location, flipped, display.copied()));
    }

    fn color_sampled(&mut self, color: Rgba<u8>) {
        self.color = Some(color);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn secondary() -> DisplayDescriptor {
        DisplayDescriptor::new(2, Rect::new(1440.0, 0.0, 1920.0, 1080.0), 2.0)
    }

    #[test]
    fn test_format_points() {
        assert_eq!(format_points(500.0), "500");
        assert_eq!(format_points(500.25), "500.3");
        assert_eq!(format_points(-0.04), "0");
        assert_eq!(format_points(12.5), "12.5");
    }

    #[test]
    fn test_global_coordinates() {
        let location = Point::new(500.0, 500.0);
        let flipped = Point::new(500.0, 700.0);
        let mut options = CoordinateOptions::default();
        assert_eq!(format_coordinate(location, flipped, None, options), "500, 700");
        options.flipped = false;
        assert_eq!(format_coordinate(location, flipped, None, options), "500, 500");
    }

    #[test]
    fn test_per_screen_coordinates() {
        let display = secondary();
        let location = Point::new(1500.5, 80.0);
        let flipped = Point::new(1500.5, 820.0);
        let options = CoordinateOptions {
            per_screen: true,
            in_pixels: false,
            flipped: true,
        };
        assert_eq!(format_coordinate(location, flipped, Some(&display), options), "60.5, 1000");

        let pixels = CoordinateOptions { in_pixels: true, ..options };
        assert_eq!(format_coordinate(location, flipped, Some(&display), pixels), "121, 2000");

        let native = CoordinateOptions { flipped: false, ..pixels };
        assert_eq!(format_coordinate(location, flipped, Some(&display), native), "121, 160");
    }

    fn describe(color: Rgba<u8>, model: ColorModel) -> String {
        ColorReadout::new(color, model).description
    }

    #[test]
    fn test_color_descriptions() {
        let orange = Rgba([255, 128, 0, 255]);
        assert_eq!(describe(orange, ColorModel::Rgb), "RGB(1.00, 0.50, 0.00)");
        assert_eq!(describe(orange, ColorModel::Cmyk), "CMYK(0.00, 0.50, 1.00, 0.00)");
        assert_eq!(describe(orange, ColorModel::Hsb), "HSB(0.08, 1.00, 1.00)");

        let black = Rgba([0, 0, 0, 255]);
        assert_eq!(describe(black, ColorModel::Grayscale), "GS(1.00)");
        assert_eq!(describe(black, ColorModel::Cmyk), "CMYK(0.00, 0.00, 0.00, 1.00)");
        let white = Rgba([255, 255, 255, 255]);
        assert_eq!(describe(white, ColorModel::Grayscale), "GS(0.00)");
        let gray = Rgba([128, 128, 128, 255]);
        assert_eq!(describe(gray, ColorModel::Grayscale), "GS(0.50)");
    }

    #[test]
    fn test_device_components_come_from_bigcolor() {
        let teal = Rgba([0, 128, 128, 255]);
        let hsv = bigcolor::color_space::rgb_to_hsv(0, 128, 128);
        match ColorComponents::from_device(teal, ColorModel::Hsb) {
            ColorComponents::Hsb { hue, saturation, brightness } => {
                assert_eq!(hue, hsv.h as f64);
                assert_eq!(saturation, 1.0);
                assert!((brightness - 128.0 / 255.0).abs() < 1.0e-6);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(describe(teal, ColorModel::Hsb), "HSB(0.50, 1.00, 0.50)");
        assert_eq!(describe(teal, ColorModel::Cmyk), "CMYK(1.00, 0.00, 0.00, 0.50)");
    }

    /// Pretends every RGB profile but the device one maps colors to pure red
    struct RedShift;

    impl ColorSpaceProvider for RedShift {
        fn profiles(&self, _model: ColorModel) -> Vec<String> {
            vec!["Device RGB".to_string(), "Red Shift".to_string()]
        }

        fn convert(&self, color: Rgba<u8>, model: ColorModel, profile: &str) -> Option<ColorComponents> {
            match profile {
                "Red Shift" => Some(ColorComponents::Rgb { red: 1.0, green: 0.0, blue: 0.0 }),
                "Device RGB" => Some(ColorComponents::from_device(color, model)),
                _ => None,
            }
        }
    }

    #[test]
    fn test_panel_converts_to_selected_profile() {
        let mut panel = ReadoutPanel::new();
        panel.show_color = true;
        panel.set_color_spaces(Rc::new(RedShift));
        panel.color_sampled(Rgba([10, 20, 30, 255]));
        assert_eq!(panel.color_profile(), "Device RGB");
        assert_eq!(panel.color_readout().unwrap().description, "RGB(0.04, 0.08, 0.12)");

        panel.color_profiles.select(ColorModel::Rgb, "Red Shift");
        let readout = panel.color_readout().unwrap();
        assert_eq!(readout.description, "RGB(1.00, 0.00, 0.00)");
        // Hex and swatch keep the captured pixel
        assert_eq!(readout.hex, "#0A141E");

        // Unknown profile falls back to device values
        panel.color_profiles.select(ColorModel::Rgb, "Gone");
        assert_eq!(panel.color_readout().unwrap().description, "RGB(0.04, 0.08, 0.12)");
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex_color(255, 0, 128), "#FF0080");
        assert_eq!(format_hex_color(0, 0, 0), "#000000");
    }

    #[test]
    fn test_dark_text() {
        // Fond blanc -> texte noir / White background -> black text
        assert!(should_use_dark_text(255, 255, 255));
        // Fond noir -> texte blanc / Black background -> white text
        assert!(!should_use_dark_text(0, 0, 0));
    }

    #[test]
    fn test_panel_respects_visibility() {
        let mut panel = ReadoutPanel::new();
        panel.mouse_location_updated(Point::new(1.0, 2.0), Point::new(1.0, 3.0), None);
        panel.color_sampled(Rgba([10, 20, 30, 255]));
        assert!(panel.coordinate_text().is_none());
        assert!(panel.color_readout().is_none());

        panel.show_coordinate = true;
        panel.show_color = true;
        assert_eq!(panel.coordinate_text().as_deref(), Some("1, 3"));
        assert_eq!(panel.color_readout().map(|c| c.hex), Some("#0A141E".to_string()));
    }

    #[test]
    fn test_color_model_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ColorModel::Grayscale).unwrap(), "\"grayscale\"");
        assert_eq!(serde_json::from_str::<ColorModel>("\"hsb\"").unwrap(), ColorModel::Hsb);
        assert_eq!(ColorModel::Hsb.next(), ColorModel::Grayscale);
    }
}
