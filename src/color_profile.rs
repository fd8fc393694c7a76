//! =============================================================================
//! COLOR_PROFILE.RS - Profils colorimétriques par modèle
//! COLOR_PROFILE.RS - Per-model color profiles
//! =============================================================================
//!
//! Chaque modèle de couleur a son profil sélectionné, mémorisé par nom dans
//! les préférences. La conversion elle-même appartient à la plateforme.
//! Each color model has its selected profile, remembered by name in the
//! preferences. The conversion itself belongs to the platform.

use std::collections::BTreeMap;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::readout::{ColorComponents, ColorModel};

/// Profils "Device" utilisés tant que rien d'autre n'est choisi
/// "Device" profiles used until something else is chosen
pub const DEVICE_RGB: &str = "Device RGB";
pub const DEVICE_GRAY: &str = "Device Gray";
pub const DEVICE_CMYK: &str = "Device CMYK";

/// Profil par défaut du modèle
/// Default profile of the model; HSB is read from an RGB profile
pub fn default_profile(model: ColorModel) -> &'static str {
    match model {
        ColorModel::Rgb | ColorModel::Hsb => DEVICE_RGB,
        ColorModel::Grayscale => DEVICE_GRAY,
        ColorModel::Cmyk => DEVICE_CMYK,
    }
}

// =============================================================================
// SÉLECTION
// SELECTION
// =============================================================================

/// Nom du profil choisi pour chaque modèle
/// Name of the profile chosen for each model
///
/// Models without an entry use [`default_profile`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorProfiles(BTreeMap<ColorModel, String>);

impl ColorProfiles {
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn selected(&self, model: ColorModel) -> &str {
        self.0
            .get(&model)
            .map(String::as_str)
            .unwrap_or_else(|| default_profile(model))
    }

    pub fn select(&mut self, model: ColorModel, name: impl Into<String>) {
        self.0.insert(model, name.into());
    }
}

/// Profil suivant dans la liste, en boucle
/// Next profile in the list, wrapping around
///
/// An unknown `current` restarts at the first entry; `None` on an empty list.
pub fn next_profile(available: &[String], current: &str) -> Option<String> {
    let next = match available.iter().position(|name| name == current) {
        Some(index) => (index + 1) % available.len(),
        None => 0,
    };
    available.get(next).cloned()
}

// =============================================================================
// CONVERSION
// =============================================================================

/// Espaces colorimétriques offerts par la plateforme
/// Color spaces offered by the platform
pub trait ColorSpaceProvider {
    /// Profile names usable with `model`, in system order
    fn profiles(&self, model: ColorModel) -> Vec<String>;

    /// `color` (device RGB) expressed in `profile`; `None` when the profile is
    /// unknown or the conversion fails
    fn convert(&self, color: Rgba<u8>, model: ColorModel, profile: &str) -> Option<ColorComponents>;
}

/// Profils "Device" seulement, sans gestion de couleur
/// Device profiles only, converted without color management
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceColorSpaces;

impl ColorSpaceProvider for DeviceColorSpaces {
    fn profiles(&self, model: ColorModel) -> Vec<String> {
        vec![default_profile(model).to_owned()]
    }

    fn convert(&self, color: Rgba<u8>, model: ColorModel, profile: &str) -> Option<ColorComponents> {
        (profile == default_profile(model)).then(|| ColorComponents::from_device(color, model))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_model() {
        let profiles = ColorProfiles::new();
        assert_eq!(profiles.selected(ColorModel::Rgb), "Device RGB");
        assert_eq!(profiles.selected(ColorModel::Hsb), "Device RGB");
        assert_eq!(profiles.selected(ColorModel::Grayscale), "Device Gray");
        assert_eq!(profiles.selected(ColorModel::Cmyk), "Device CMYK");
    }

    #[test]
    fn test_selection_is_per_model() {
        let mut profiles = ColorProfiles::new();
        profiles.select(ColorModel::Rgb, "sRGB IEC61966-2.1");
        assert_eq!(profiles.selected(ColorModel::Rgb), "sRGB IEC61966-2.1");
        assert_eq!(profiles.selected(ColorModel::Hsb), "Device RGB");
    }

    #[test]
    fn test_profiles_serialize_by_model_name() {
        let mut profiles = ColorProfiles::new();
        profiles.select(ColorModel::Cmyk, "Generic CMYK Profile");
        let json = serde_json::to_string(&profiles).unwrap();
        assert_eq!(json, r#"{"cmyk":"Generic CMYK Profile"}"#);
        assert_eq!(serde_json::from_str::<ColorProfiles>(&json).unwrap(), profiles);
    }

    #[test]
    fn test_next_profile_wraps() {
        let available = vec!["Device RGB".to_string(), "sRGB".to_string(), "Display P3".to_string()];
        assert_eq!(next_profile(&available, "Device RGB").as_deref(), Some("sRGB"));
        assert_eq!(next_profile(&available, "Display P3").as_deref(), Some("Device RGB"));
        assert_eq!(next_profile(&available, "Gone").as_deref(), Some("Device RGB"));
        assert_eq!(next_profile(&[], "Device RGB"), None);
    }

    #[test]
    fn test_device_spaces_only_know_device_profiles() {
        let orange = Rgba([255, 128, 0, 255]);
        let spaces = DeviceColorSpaces;
        assert_eq!(spaces.profiles(ColorModel::Grayscale), vec!["Device Gray".to_string()]);
        assert_eq!(
            spaces.convert(orange, ColorModel::Rgb, "Device RGB"),
            Some(ColorComponents::from_device(orange, ColorModel::Rgb))
        );
        assert_eq!(spaces.convert(orange, ColorModel::Rgb, "Display P3"), None);
    }
}
