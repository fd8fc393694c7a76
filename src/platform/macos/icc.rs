//! =============================================================================
//! ICC.RS - Profils colorimétriques du système
//! ICC.RS - System color profiles
//! =============================================================================
//!
//! Liste les profils via NSColorSpace.availableColorSpaces et convertit la
//! couleur lue dans le profil choisi pour le modèle courant.
//! Lists profiles through NSColorSpace.availableColorSpaces and converts the
//! sampled color into the profile chosen for the current model.

use std::ptr::NonNull;

use image::Rgba;
use objc2::rc::Retained;
use objc2_app_kit::{NSColor, NSColorSpace, NSColorSpaceModel};
use objc2_foundation::NSArray;

use crate::color_profile::{default_profile, ColorSpaceProvider};
use crate::readout::{ColorComponents, ColorModel};

/// Modèle NSColorSpace correspondant; HSB se lit dans un espace RGB
/// Matching NSColorSpace model; HSB is read from an RGB space
fn space_model(model: ColorModel) -> NSColorSpaceModel {
    match model {
        ColorModel::Grayscale => NSColorSpaceModel::Gray,
        ColorModel::Rgb | ColorModel::Hsb => NSColorSpaceModel::RGB,
        ColorModel::Cmyk => NSColorSpaceModel::CMYK,
    }
}

/// Espace "Device" du modèle, sans gestion de couleur
/// Device space of the model, without color management
fn device_space(model: ColorModel) -> Retained<NSColorSpace> {
    match model {
        ColorModel::Grayscale => NSColorSpace::deviceGrayColorSpace(),
        ColorModel::Rgb | ColorModel::Hsb => NSColorSpace::deviceRGBColorSpace(),
        ColorModel::Cmyk => NSColorSpace::deviceCMYKColorSpace(),
    }
}

fn available_spaces(model: ColorModel) -> Retained<NSArray<NSColorSpace>> {
    NSColorSpace::availableColorSpacesWithModel(space_model(model))
}

/// Cherche un espace par nom localisé
/// Finds a space by localized name
fn space_named(model: ColorModel, name: &str) -> Option<Retained<NSColorSpace>> {
    if name == default_profile(model) {
        return Some(device_space(model));
    }
    let spaces = available_spaces(model);
    (0..spaces.count())
        .map(|i| spaces.objectAtIndex(i))
        .find(|space| space.localizedName().is_some_and(|localized| localized.to_string() == name))
}

/// Espaces colorimétriques installés sur le système
/// Color spaces installed on the system
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemColorSpaces;

impl ColorSpaceProvider for SystemColorSpaces {
    /// The device profile first, then ColorSync profiles in system order
    fn profiles(&self, model: ColorModel) -> Vec<String> {
        let mut names = vec![default_profile(model).to_owned()];
        let spaces = available_spaces(model);
        for i in 0..spaces.count() {
            if let Some(localized) = spaces.objectAtIndex(i).localizedName() {
                let name = localized.to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn convert(&self, color: Rgba<u8>, model: ColorModel, profile: &str) -> Option<ColorComponents> {
        let target = space_named(model, profile)?;
        let source_space = NSColorSpace::deviceRGBColorSpace();

        let [r, g, b, _] = color.0;
        let components: [f64; 4] = [r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0, 1.0];
        let components_ptr = NonNull::new(components.as_ptr() as *mut f64)?;

        // SAFETY: `components` outlives the call and holds the 4 values the
        // RGB source space expects; the component getters match the model of
        // `target`.
        unsafe {
            let source = NSColor::colorWithColorSpace_components_count(&source_space, components_ptr, 4);
            let converted = source.colorUsingColorSpace(&target)?;

            Some(match model {
                ColorModel::Rgb => ColorComponents::Rgb {
                    red: converted.redComponent(),
                    green: converted.greenComponent(),
                    blue: converted.blueComponent(),
                },
                ColorModel::Hsb => ColorComponents::Hsb {
                    hue: converted.hueComponent(),
                    saturation: converted.saturationComponent(),
                    brightness: converted.brightnessComponent(),
                },
                ColorModel::Cmyk => ColorComponents::Cmyk {
                    cyan: converted.cyanComponent(),
                    magenta: converted.magentaComponent(),
                    yellow: converted.yellowComponent(),
                    black: converted.blackComponent(),
                },
                ColorModel::Grayscale => ColorComponents::Grayscale {
                    white: converted.whiteComponent(),
                },
            })
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
