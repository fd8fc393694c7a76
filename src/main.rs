//! =============================================================================
//! Pixie - Application principale
//! Pixie - Main application
//! =============================================================================
//!
//! # Contrôles / Controls
//! - `+` / `=`: Agrandir / Zoom in (Shift: next power of two)
//! - `-`: Réduire / Zoom out (Shift: previous power of two)
//! - Molette / Scroll wheel: Zoom
//! - `g`: Grille / Grid
//! - `h`: Hot spot
//! - `x` / `y` / `b`: Verrouiller l'axe X, Y, les deux / Lock X, Y, both
//! - `f`: Figer / Freeze
//! - `m`: Coordonnées de la souris / Mouse coordinate readout
//! - `p`: Points ou pixels / Points or pixels
//! - `v`: Coordonnées inversées / Flipped coordinates
//! - `s`: Coordonnées par écran / Per-screen coordinates
//! - `c`: Couleur / Color readout
//! - `k`: Modèle de couleur / Color model
//! - `i`: Profil colorimétrique / Color profile
//! - `w`: Fenêtre flottante / Floating window
//! - ESC: Quitter / Quit

use log::error;

// =============================================================================
// POINT D'ENTRÉE
// ENTRY POINT
// =============================================================================

#[cfg(target_os = "macos")]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = pixie_lib::platform::macos::run() {
        error!("Pixie cannot start: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(target_os = "macos"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    error!("Pixie only runs on macOS");
    std::process::exit(1);
}
