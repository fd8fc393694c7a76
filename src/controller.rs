//! =============================================================================
//! CONTROLLER.RS - Contrôleur de la loupe
//! CONTROLLER.RS - Magnifier controller
//! =============================================================================
//!
//! Relie l'horloge, la surface, le panneau de lecture et les préférences.
//! Les actions utilisateur passent par les préférences; la surface suit via
//! les notifications de changement.
//! Wires the clock, the surface, the readout panel and the preferences.
//! User actions go through the preferences; the surface follows through
//! change notifications.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::debug;

use crate::capture::{ScreenBackend, ScreenCapturer};
use crate::color_profile::{self, ColorSpaceProvider};
use crate::config::{MAGNIFICATION_MAX, MAGNIFICATION_MIN};
use crate::frame_clock::{FrameClock, FrameSubscriber};
use crate::geometry::Rect;
use crate::preferences::{self, Preference, PreferencesStore, PreferencesSubscriber};
use crate::readout::{CoordinateOptions, ReadoutPanel};
use crate::surface::{clamp_magnification, MagnifierSurface, OverlayState};

// =============================================================================
// RÈGLES DE GROSSISSEMENT
// MAGNIFICATION STEPS
// =============================================================================

/// `floor(m) + 1`
pub fn increased_magnification(current: f64) -> f64 {
    clamp_magnification(current.floor() + 1.0)
}

/// `floor(m) - 1`
pub fn decreased_magnification(current: f64) -> f64 {
    clamp_magnification(current.floor() - 1.0)
}

/// Puissance de deux strictement supérieure
/// Next power of two strictly above `current`
pub fn fast_increased_magnification(current: f64) -> f64 {
    let mut factor = 1.0;
    while current >= factor && factor < MAGNIFICATION_MAX * 2.0 {
        factor *= 2.0;
    }
    clamp_magnification(factor)
}

/// Puissance de deux immédiatement inférieure
/// Power of two just below `current`
pub fn fast_decreased_magnification(current: f64) -> f64 {
    let mut factor = 1.0;
    while current > factor * 2.0 && factor < MAGNIFICATION_MAX {
        factor *= 2.0;
    }
    clamp_magnification(factor)
}

// =============================================================================
// APPLICATION DES PRÉFÉRENCES
// PREFERENCE FORWARDING
// =============================================================================

/// Applique les préférences modifiées à la surface et au panneau
/// Applies changed preferences to the surface and the readout panel
struct SettingsSink {
    surface: Weak<RefCell<MagnifierSurface>>,
    readout: Weak<RefCell<ReadoutPanel>>,
}

impl PreferencesSubscriber for SettingsSink {
    fn preference_changed(&mut self, store: &PreferencesStore, key: &str) {
        if let Some(surface) = self.surface.upgrade() {
            let mut surface = surface.borrow_mut();
            if key == preferences::MAGNIFICATION_FACTOR.key {
                surface.set_magnification(store.get(&preferences::MAGNIFICATION_FACTOR));
            } else if key == preferences::SHOW_GRID.key {
                surface.set_show_grid(store.get(&preferences::SHOW_GRID));
            } else if key == preferences::SHOW_HOT_SPOT.key {
                surface.set_show_hot_spot(store.get(&preferences::SHOW_HOT_SPOT));
            }
        }

        if let Some(readout) = self.readout.upgrade() {
            apply_readout_preferences(&mut readout.borrow_mut(), store);
        }
    }
}

fn apply_readout_preferences(panel: &mut ReadoutPanel, store: &PreferencesStore) {
    panel.show_coordinate = store.get(&preferences::SHOW_MOUSE_COORDINATE);
    panel.show_color = store.get(&preferences::SHOW_COLOR_VALUE);
    panel.color_model = store.get(&preferences::COLOR_MODEL);
    panel.color_profiles = store.get(&preferences::COLOR_PROFILES);
    panel.coordinate_options = CoordinateOptions {
        per_screen: store.get(&preferences::SCREENS_HAS_SEPARATE_COORDINATE),
        in_pixels: store.get(&preferences::MOUSE_COORDINATE_IN_PIXEL),
        flipped: store.get(&preferences::IS_MOUSE_COORDINATE_FLIPPED),
    };
}

// =============================================================================
// CONTRÔLEUR
// CONTROLLER
// =============================================================================

pub struct MagnifierController {
    clock: Rc<FrameClock>,
    surface: Rc<RefCell<MagnifierSurface>>,
    subscriber: Rc<RefCell<dyn FrameSubscriber>>,
    readout: Rc<RefCell<ReadoutPanel>>,
    preferences: Rc<PreferencesStore>,
    _settings: Rc<RefCell<dyn PreferencesSubscriber>>,
    visible: bool,
}

impl MagnifierController {
    /// `bounds` / `view_scale` describe the magnifier view at creation time
    pub fn new(
        clock: Rc<FrameClock>,
        backend: Rc<dyn ScreenBackend>,
        preferences: Rc<PreferencesStore>,
        bounds: Rect,
        view_scale: f64,
    ) -> Self {
        let mut state = OverlayState::default();
        state.set_magnification(preferences.get(&preferences::MAGNIFICATION_FACTOR));
        state.show_grid = preferences.get(&preferences::SHOW_GRID);
        state.show_hot_spot = preferences.get(&preferences::SHOW_HOT_SPOT);

        let surface = Rc::new(RefCell::new(MagnifierSurface::new(
            ScreenCapturer::new(backend),
            state,
            bounds,
            view_scale,
        )));

        let mut panel = ReadoutPanel::new();
        apply_readout_preferences(&mut panel, &preferences);
        let readout = Rc::new(RefCell::new(panel));
        surface.borrow_mut().set_observer(readout.clone());

        let settings: Rc<RefCell<dyn PreferencesSubscriber>> = Rc::new(RefCell::new(SettingsSink {
            surface: Rc::downgrade(&surface),
            readout: Rc::downgrade(&readout),
        }));
        preferences.add_subscriber(&settings);

        let subscriber: Rc<RefCell<dyn FrameSubscriber>> = surface.clone();

        Self {
            clock,
            surface,
            subscriber,
            readout,
            preferences,
            _settings: settings,
            visible: false,
        }
    }

    pub fn surface(&self) -> &Rc<RefCell<MagnifierSurface>> {
        &self.surface
    }

    pub fn readout(&self) -> &Rc<RefCell<ReadoutPanel>> {
        &self.readout
    }

    pub fn preferences(&self) -> &Rc<PreferencesStore> {
        &self.preferences
    }

    pub fn clock(&self) -> &Rc<FrameClock> {
        &self.clock
    }

    /// Livre le tick en attente, appelé par la boucle d'événements
    /// Delivers the pending frame tick, if any; called by the event loop
    pub fn tick(&self) -> bool {
        self.clock.deliver_pending()
    }

    // -------------------------------------------------------------------------
    // Visibilité / Visibility
    // -------------------------------------------------------------------------

    /// Abonne la surface à l'horloge tant que la fenêtre est visible
    /// Subscribes the surface to the clock while the window is visible
    pub fn set_visible(&mut self, visible: bool) {
        if visible == self.visible {
            return;
        }
        self.visible = visible;
        debug!("Magnifier window {}", if visible { "visible" } else { "occluded" });

        if visible {
            self.clock.subscribe(&self.subscriber);
        } else {
            self.clock.unsubscribe(&self.subscriber);
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_excluded_window(&self, window: Option<u32>) {
        self.surface.borrow_mut().set_excluded_window(window);
    }

    pub fn set_bounds(&self, bounds: Rect, view_scale: f64) {
        self.surface.borrow_mut().set_bounds(bounds, view_scale);
    }

    /// Espaces colorimétriques de la plateforme pour la valeur de couleur
    /// Platform color spaces used for the color readout
    pub fn set_color_spaces(&self, color_spaces: Rc<dyn ColorSpaceProvider>) {
        self.readout.borrow_mut().set_color_spaces(color_spaces);
    }

    // -------------------------------------------------------------------------
    // Grossissement / Magnification
    // -------------------------------------------------------------------------

    pub fn magnification(&self) -> f64 {
        self.surface.borrow().state().magnification()
    }

    /// Stores `clamp(factor, 1, 128)`
    pub fn set_magnification(&self, factor: f64) {
        self.preferences
            .set(&preferences::MAGNIFICATION_FACTOR, clamp_magnification(factor));
    }

    pub fn increase_magnification(&self) {
        self.set_magnification(increased_magnification(self.magnification()));
    }

    pub fn decrease_magnification(&self) {
        self.set_magnification(decreased_magnification(self.magnification()));
    }

    pub fn fast_increase_magnification(&self) {
        self.set_magnification(fast_increased_magnification(self.magnification()));
    }

    pub fn fast_decrease_magnification(&self) {
        self.set_magnification(fast_decreased_magnification(self.magnification()));
    }

    /// Molette vers le haut: agrandir
    /// Scrolling up (negative delta) zooms in
    pub fn scroll_wheel(&self, delta_y: f64) {
        self.set_magnification(self.magnification() - delta_y);
    }

    pub fn can_increase_magnification(&self) -> bool {
        self.magnification() < MAGNIFICATION_MAX
    }

    pub fn can_decrease_magnification(&self) -> bool {
        self.magnification() > MAGNIFICATION_MIN
    }

    pub fn can_toggle_grid(&self) -> bool {
        self.surface.borrow().state().can_show_grid()
    }

    // -------------------------------------------------------------------------
    // Bascules / Toggles
    // -------------------------------------------------------------------------

    fn toggle(&self, preference: &Preference<bool>) -> bool {
        let value = !self.preferences.get(preference);
        self.preferences.set(preference, value);
        value
    }

    /// Ignored while the grid cannot be shown
    pub fn toggle_grid(&self) {
        if !self.can_toggle_grid() {
            debug!("Grid unavailable below the minimum magnification");
            return;
        }
        self.toggle(&preferences::SHOW_GRID);
    }

    pub fn toggle_hot_spot(&self) {
        self.toggle(&preferences::SHOW_HOT_SPOT);
    }

    pub fn toggle_mouse_coordinate(&self) {
        self.toggle(&preferences::SHOW_MOUSE_COORDINATE);
    }

    pub fn toggle_coordinate_in_pixel(&self) {
        self.toggle(&preferences::MOUSE_COORDINATE_IN_PIXEL);
    }

    pub fn toggle_flipped_coordinate(&self) {
        self.toggle(&preferences::IS_MOUSE_COORDINATE_FLIPPED);
    }

    pub fn toggle_separate_screen_coordinate(&self) {
        self.toggle(&preferences::SCREENS_HAS_SEPARATE_COORDINATE);
    }

    pub fn toggle_color_value(&self) {
        self.toggle(&preferences::SHOW_COLOR_VALUE);
    }

    pub fn cycle_color_model(&self) {
        let next = self.preferences.get(&preferences::COLOR_MODEL).next();
        self.preferences.set(&preferences::COLOR_MODEL, next);
    }

    /// Passe au profil suivant pour le modèle de couleur courant
    /// Moves to the next profile of the current color model
    pub fn cycle_color_profile(&self) {
        let model = self.preferences.get(&preferences::COLOR_MODEL);
        let mut profiles = self.preferences.get(&preferences::COLOR_PROFILES);
        let available = self.readout.borrow().color_spaces().profiles(model);

        let Some(next) = color_profile::next_profile(&available, profiles.selected(model)) else {
            debug!("No color profile available for {:?}", model);
            return;
        };
        debug!("Color profile for {:?}: {}", model, next);
        profiles.select(model, next);
        self.preferences.set(&preferences::COLOR_PROFILES, profiles);
    }

    /// Bascule la fenêtre flottante
    /// Returns the new value; the window level is the shell's business
    pub fn toggle_floating_window(&self) -> bool {
        self.toggle(&preferences::FLOATING_MAGNIFIER_WINDOW)
    }

    // -------------------------------------------------------------------------
    // Verrous et gel / Locks and freeze (session only)
    // -------------------------------------------------------------------------

    pub fn toggle_lock_x(&self) {
        let mut surface = self.surface.borrow_mut();
        let locked = !surface.state().lock_x;
        surface.set_lock_x(locked);
    }

    pub fn toggle_lock_y(&self) {
        let mut surface = self.surface.borrow_mut();
        let locked = !surface.state().lock_y;
        surface.set_lock_y(locked);
    }

    /// Both locked: unlock both. Otherwise lock both.
    pub fn toggle_lock_both(&self) {
        let mut surface = self.surface.borrow_mut();
        let lock = !(surface.state().lock_x && surface.state().lock_y);
        surface.set_lock_x(lock);
        surface.set_lock_y(lock);
    }

    pub fn toggle_freeze(&self) {
        let mut surface = self.surface.borrow_mut();
        let frozen = !surface.state().frozen;
        surface.set_frozen(frozen);
    }
}

impl Drop for MagnifierController {
    fn drop(&mut self) {
        if self.visible {
            self.clock.unsubscribe(&self.subscriber);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::platform::mock::{mock_frame_clock, MockRefreshSource, MockScreen};
    use crate::readout::{ColorComponents, ColorModel};
    use image::Rgba;

    struct Fixture {
        controller: MagnifierController,
        screen: Rc<MockScreen>,
        source: MockRefreshSource,
    }

    fn fixture() -> Fixture {
        let (clock, source) = mock_frame_clock().unwrap();
        let screen = Rc::new(MockScreen::single_display(Rect::new(0.0, 0.0, 2000.0, 1200.0), 2.0));
        let controller = MagnifierController::new(
            Rc::new(clock),
            screen.clone(),
            Rc::new(PreferencesStore::in_memory()),
            Rect::new(0.0, 0.0, 300.0, 300.0),
            2.0,
        );
        Fixture {
            controller,
            screen,
            source,
        }
    }

    #[test]
    fn test_magnification_steps() {
        assert_eq!(increased_magnification(16.5), 17.0);
        assert_eq!(increased_magnification(128.0), 128.0);
        assert_eq!(decreased_magnification(1.5), 1.0);
        assert_eq!(decreased_magnification(1.0), 1.0);

        assert_eq!(fast_increased_magnification(16.0), 32.0);
        assert_eq!(fast_increased_magnification(17.0), 32.0);
        assert_eq!(fast_increased_magnification(1.0), 2.0);
        assert_eq!(fast_increased_magnification(128.0), 128.0);

        assert_eq!(fast_decreased_magnification(16.0), 8.0);
        assert_eq!(fast_decreased_magnification(17.0), 16.0);
        assert_eq!(fast_decreased_magnification(2.0), 1.0);
        assert_eq!(fast_decreased_magnification(1.0), 1.0);
    }

    #[test]
    fn test_set_magnification_clamps_and_persists() {
        let f = fixture();
        f.controller.set_magnification(200.0);
        assert_eq!(f.controller.magnification(), 128.0);
        assert_eq!(f.controller.preferences().get(&preferences::MAGNIFICATION_FACTOR), 128.0);
        assert!(!f.controller.can_increase_magnification());

        f.controller.set_magnification(-5.0);
        assert_eq!(f.controller.magnification(), 1.0);
        assert!(!f.controller.can_decrease_magnification());
    }

    #[test]
    fn test_scroll_wheel() {
        let f = fixture();
        f.controller.scroll_wheel(-3.0);
        assert_eq!(f.controller.magnification(), 19.0);
        f.controller.scroll_wheel(2.5);
        assert_eq!(f.controller.magnification(), 16.5);
    }

    #[test]
    fn test_visibility_drives_clock() {
        let mut f = fixture();
        f.screen.set_mouse_location(Point::new(400.0, 300.0));
        assert!(!f.controller.clock().is_running());

        f.controller.set_visible(true);
        assert!(f.controller.clock().is_running());

        f.source.fire();
        assert!(f.controller.tick());
        assert_eq!(f.screen.composite_calls(), 1);

        f.controller.set_visible(false);
        assert!(!f.controller.clock().is_running());
        f.source.fire();
        assert!(!f.controller.tick());
        assert_eq!(f.screen.composite_calls(), 1);
    }

    #[test]
    fn test_grid_toggle_requires_readable_magnification() {
        let f = fixture();
        f.controller.set_magnification(4.0);
        f.controller.toggle_grid();
        assert!(!f.controller.surface().borrow().state().show_grid);

        f.controller.set_magnification(8.0);
        f.controller.toggle_grid();
        assert!(f.controller.surface().borrow().state().show_grid);
    }

    #[test]
    fn test_lock_both() {
        let f = fixture();
        f.screen.set_mouse_location(Point::new(10.0, 20.0));
        f.controller.toggle_lock_x();
        f.controller.toggle_lock_both();
        {
            let surface = f.controller.surface().borrow();
            assert!(surface.state().lock_x && surface.state().lock_y);
        }
        f.controller.toggle_lock_both();
        let surface = f.controller.surface().borrow();
        assert!(!surface.state().lock_x && !surface.state().lock_y);
    }

    struct TwoRgbProfiles;

    impl ColorSpaceProvider for TwoRgbProfiles {
        fn profiles(&self, model: ColorModel) -> Vec<String> {
            match model {
                ColorModel::Rgb | ColorModel::Hsb => vec!["Device RGB".to_string(), "sRGB".to_string()],
                _ => Vec::new(),
            }
        }

        fn convert(&self, _color: Rgba<u8>, _model: ColorModel, _profile: &str) -> Option<ColorComponents> {
            None
        }
    }

    #[test]
    fn test_cycle_color_profile_persists_per_model() {
        let f = fixture();
        f.controller.set_color_spaces(Rc::new(TwoRgbProfiles));

        f.controller.cycle_color_profile();
        let profiles = f.controller.preferences().get(&preferences::COLOR_PROFILES);
        assert_eq!(profiles.selected(ColorModel::Rgb), "sRGB");
        assert_eq!(profiles.selected(ColorModel::Hsb), "Device RGB");
        assert_eq!(f.controller.readout().borrow().color_profile(), "sRGB");

        f.controller.cycle_color_profile();
        assert_eq!(f.controller.readout().borrow().color_profile(), "Device RGB");

        // Nothing to cycle through for grayscale here
        f.controller.cycle_color_model();
        f.controller.cycle_color_model();
        f.controller.cycle_color_model();
        assert_eq!(f.controller.readout().borrow().color_model, ColorModel::Grayscale);
        f.controller.cycle_color_profile();
        assert_eq!(f.controller.readout().borrow().color_profile(), "Device Gray");
    }

    #[test]
    fn test_readout_follows_preferences() {
        let f = fixture();
        f.controller.toggle_color_value();
        f.controller.cycle_color_model();
        let panel = f.controller.readout().borrow();
        assert!(panel.show_color);
        assert_eq!(panel.color_model, ColorModel::Cmyk);
    }
}
