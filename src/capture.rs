//! =============================================================================
//! CAPTURE.RS - Capture de la zone autour du curseur
//! CAPTURE.RS - Capture of the region around the cursor
//! =============================================================================
//!
//! Le capteur interroge le serveur de fenêtres via `ScreenBackend`, exclut la
//! fenêtre de la loupe, et retourne un `CaptureResult` dont le bitmap est
//! optionnel. Aucune erreur n'est propagée: l'échec est une donnée.
//! The capturer queries the window server through `ScreenBackend`, leaves
//! the magnifier window out, and returns a `CaptureResult` whose bitmap is
//! optional. Nothing is propagated as an error: failure is data.

use std::rc::Rc;

use image::{Rgba, RgbaImage};
use log::{trace, warn};

use crate::config::{CAPTURE_EDGE_EPSILON, CAPTURE_ROUNDING_TOLERANCE, SAMPLE_SNAP_TOLERANCE};
use crate::coords::{self, DisplayDescriptor};
use crate::error::CaptureFailure;
use crate::geometry::{Point, Rect, Size};

/// Couche de la barre des menus
/// Window layer of the menu bar (kCGMainMenuWindowLevel)
pub const MAIN_MENU_WINDOW_LAYER: i32 = 24;

// =============================================================================
// FRONTIÈRE AVEC LA PLATEFORME
// PLATFORM BOUNDARY
// =============================================================================

/// Entrée de la liste des fenêtres à l'écran
/// Entry of the on-screen window list
#[derive(Clone, Debug, PartialEq)]
pub struct WindowInfo {
    /// Window number (CGWindowID)
    pub id: u32,
    /// Window layer, higher layers are drawn above lower ones
    pub layer: i32,
    /// Window title; the window server hides it without screen recording permission
    pub name: Option<String>,
}

impl WindowInfo {
    pub fn new(id: u32, layer: i32, name: Option<&str>) -> Self {
        Self {
            id,
            layer,
            name: name.map(str::to_owned),
        }
    }
}

/// Accès en lecture seule à l'état de l'écran
/// Read-only access to screen state
///
/// Everything is fetched fresh on each call; implementations never cache.
pub trait ScreenBackend {
    /// Écrans branchés, en points globaux (origine en bas à gauche)
    /// Displays currently attached, in global point space (bottom-left origin)
    fn displays(&self) -> Vec<DisplayDescriptor>;

    /// Fenêtres à l'écran, de l'avant vers l'arrière
    /// On-screen windows, front to back, as the window server lists them
    fn on_screen_windows(&self) -> Vec<WindowInfo>;

    /// Composites `windows` (back to front) inside `rect`, given in
    /// top-left-origin global points. The bitmap's first pixel is the
    /// physical pixel at the rect's top-left corner.
    fn composite(&self, rect: Rect, windows: &[u32]) -> Option<RgbaImage>;

    /// Position courante de la souris en points globaux
    /// Current mouse location in global point space
    fn mouse_location(&self) -> Point;

    /// Autorisation rapportée par le système, s'il l'expose
    /// Screen recording access as reported by the OS, when it exposes it
    ///
    /// `None` leaves the decision to [`authorization_status`].
    fn screen_capture_access(&self) -> Option<bool> {
        None
    }
}

// =============================================================================
// AUTORISATION
// AUTHORIZATION
// =============================================================================

/// Statut d'autorisation d'enregistrement de l'écran
/// Screen recording authorization status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
}

/// Infers authorization from window titles: without screen recording
/// permission, the window server strips the titles of other applications'
/// windows. Desktop elements, the menu bar and `own_window` do not count.
///
/// This is a heuristic. A titled foreign window proves permission; the
/// absence of one may also mean that no titled window is on screen.
pub fn authorization_status(windows: &[WindowInfo], own_window: Option<u32>) -> AuthorizationStatus {
    let titled = windows.iter().any(|window| {
        window.layer >= 0
            && window.layer != MAIN_MENU_WINDOW_LAYER
            && Some(window.id) != own_window
            && window.name.is_some()
    });

    if titled {
        AuthorizationStatus::Authorized
    } else {
        AuthorizationStatus::Denied
    }
}

/// Ordre de composition, de l'arrière vers l'avant, sans la fenêtre exclue
/// Compositing order, back to front, without the excluded window
///
/// `windows` is front to back. Within a layer the window server's order is
/// kept; across layers lower layers come first.
pub fn compositing_order(windows: &[WindowInfo], excluding: Option<u32>) -> Vec<u32> {
    let mut ordered: Vec<&WindowInfo> = windows
        .iter()
        .rev()
        .filter(|window| Some(window.id) != excluding)
        .collect();
    ordered.sort_by_key(|window| window.layer);
    ordered.into_iter().map(|window| window.id).collect()
}

// =============================================================================
// RÉSULTAT
// RESULT
// =============================================================================

/// Résultat d'une capture, consommé immédiatement par la surface
/// Result of one capture, consumed right away by the surface
#[derive(Clone, Debug)]
pub struct CaptureResult {
    /// Captured pixels, `None` when the capture failed
    pub bitmap: Option<RgbaImage>,
    /// Why `bitmap` is `None`
    pub failure: Option<CaptureFailure>,
    /// Sample center, global points, bottom-left origin
    pub location: Point,
    /// Sample center, global points, top-left origin
    pub flipped_location: Point,
    /// Display containing the sample center
    pub display: Option<DisplayDescriptor>,
    /// Backing scale factor of `display` (0 when there is none)
    pub backing_scale_factor: f64,
    /// `bitmap width / region width`, 0 without a bitmap
    pub image_scale_factor: f64,
    /// Requested region, global points, top-left origin
    pub region: Rect,
    /// Top-left corner of the bitmap's first pixel, global points, top-left origin
    pub bitmap_origin: Point,
    /// Position of the sample center inside its pixel, in [0, 1)
    pub sub_pixel_offset: (f64, f64),
}

impl CaptureResult {
    fn without_bitmap(location: Point, flipped_location: Point, failure: CaptureFailure) -> Self {
        Self {
            bitmap: None,
            failure: Some(failure),
            location,
            flipped_location,
            display: None,
            backing_scale_factor: 0.0,
            image_scale_factor: 0.0,
            region: Rect::default(),
            bitmap_origin: flipped_location,
            sub_pixel_offset: (0.0, 0.0),
        }
    }

    /// Pixels per point actually present in the bitmap
    ///
    /// The backing scale factor, unless the platform returned a bitmap whose
    /// width is off by more than the rounding tolerance.
    pub fn pixel_density(&self) -> f64 {
        let Some(bitmap) = &self.bitmap else {
            return self.backing_scale_factor;
        };
        let expected = self.region.width() * self.backing_scale_factor;
        if (bitmap.width() as f64 - expected).abs() <= CAPTURE_ROUNDING_TOLERANCE {
            self.backing_scale_factor
        } else {
            self.image_scale_factor
        }
    }

    /// Position of the sample center inside the bitmap, in bitmap pixels
    /// from its top-left corner
    pub fn sample_position(&self) -> Point {
        let density = self.pixel_density();
        Point::new(
            (self.flipped_location.x - self.bitmap_origin.x) * density,
            (self.flipped_location.y - self.bitmap_origin.y) * density,
        )
    }

    /// Couleur du pixel sous le curseur
    /// Color of the pixel under the cursor
    pub fn hot_pixel(&self) -> Option<Rgba<u8>> {
        let bitmap = self.bitmap.as_ref()?;
        if bitmap.width() == 0 || bitmap.height() == 0 {
            return None;
        }
        let sample = self.sample_position();
        let index = |position: f64| (position + SAMPLE_SNAP_TOLERANCE).floor().max(0.0) as u32;
        let x = index(sample.x).min(bitmap.width() - 1);
        let y = index(sample.y).min(bitmap.height() - 1);
        Some(*bitmap.get_pixel(x, y))
    }
}

// =============================================================================
// CAPTEUR
// CAPTURER
// =============================================================================

/// Capteur d'écran, sans état hormis son backend
/// Screen capturer, stateless apart from its backend
#[derive(Clone)]
pub struct ScreenCapturer {
    backend: Rc<dyn ScreenBackend>,
}

impl ScreenCapturer {
    pub fn new(backend: Rc<dyn ScreenBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Rc<dyn ScreenBackend> {
        &self.backend
    }

    /// Statut d'enregistrement de l'écran
    /// Screen recording status
    ///
    /// The OS answer wins; the window-title heuristic is only the fallback.
    pub fn authorization_status(&self, own_window: Option<u32>) -> AuthorizationStatus {
        self.resolve_authorization(&self.backend.on_screen_windows(), own_window)
    }

    fn resolve_authorization(&self, windows: &[WindowInfo], own_window: Option<u32>) -> AuthorizationStatus {
        match self.backend.screen_capture_access() {
            Some(true) => AuthorizationStatus::Authorized,
            Some(false) => AuthorizationStatus::Denied,
            None => authorization_status(windows, own_window),
        }
    }

    /// Capture autour de `center`
    /// Capture around `center`
    ///
    /// `radius_x` / `radius_y` are whole pixels of the display containing
    /// `center`, taken on each side of the pixel under `center`. The bitmap
    /// therefore spans `2 * radius + 1` pixels per axis, with the sample
    /// pixel at index `radius`.
    pub fn capture(
        &self,
        center: Point,
        radius_x: f64,
        radius_y: f64,
        excluding: Option<u32>,
    ) -> CaptureResult {
        let displays = self.backend.displays();
        self.capture_on(&displays, center, |_| (radius_x, radius_y), excluding)
    }

    /// Capture de quoi remplir une vue de `view_size` points
    /// Capture filling a view of `view_size` points at `magnification`
    ///
    /// The radius comes from the scale of the display found in the same
    /// enumeration the capture uses, so a display change between frames
    /// cannot mix two scales.
    pub fn capture_view(
        &self,
        center: Point,
        view_size: Size,
        magnification: f64,
        excluding: Option<u32>,
    ) -> CaptureResult {
        let displays = self.backend.displays();
        self.capture_on(
            &displays,
            center,
            |display| coords::capture_radius(view_size, magnification, display.backing_scale_factor),
            excluding,
        )
    }

    fn capture_on(
        &self,
        displays: &[DisplayDescriptor],
        center: Point,
        radius: impl FnOnce(&DisplayDescriptor) -> (f64, f64),
        excluding: Option<u32>,
    ) -> CaptureResult {
        let flipped_location = match coords::primary_display(displays) {
            Some(primary) => coords::flip(center, &primary.frame),
            None => center,
        };

        let Some(display) = coords::display_containing(center, displays).copied() else {
            trace!("No display at ({:.1}, {:.1}), frame skipped", center.x, center.y);
            return CaptureResult::without_bitmap(center, flipped_location, CaptureFailure::NoDisplayAtPoint);
        };

        let windows = self.backend.on_screen_windows();
        if self.resolve_authorization(&windows, excluding) == AuthorizationStatus::Denied {
            return CaptureResult {
                display: Some(display),
                backing_scale_factor: display.backing_scale_factor,
                ..CaptureResult::without_bitmap(center, flipped_location, CaptureFailure::PermissionDenied)
            };
        }

        let (radius_x, radius_y) = radius(&display);
        let scale = display.backing_scale_factor;
        let pixel = coords::pixel_width(&display);
        let aligned = coords::align_to_grid(flipped_location, &display);
        let bitmap_origin = Point::new(aligned.x - radius_x * pixel, aligned.y - radius_y * pixel);
        let region = Rect {
            origin: bitmap_origin,
            size: Size::new((2.0 * radius_x + 1.0) * pixel, (2.0 * radius_y + 1.0) * pixel),
        };

        // Pulled inward so platform rounding never adds a row or column
        let epsilon = CAPTURE_EDGE_EPSILON * pixel;
        let request = region.inset(epsilon, epsilon);

        let order = compositing_order(&windows, excluding);
        let bitmap = if request.is_empty() {
            None
        } else {
            self.backend.composite(request, &order)
        };

        let (failure, image_scale_factor) = match &bitmap {
            Some(image) => (None, image.width() as f64 / region.width()),
            None => {
                trace!("Capture returned no image for {:?}", region);
                (Some(CaptureFailure::Transient), 0.0)
            }
        };

        CaptureResult {
            bitmap,
            failure,
            location: center,
            flipped_location,
            display: Some(display),
            backing_scale_factor: scale,
            image_scale_factor,
            region,
            bitmap_origin,
            sub_pixel_offset: coords::sub_pixel_offset(flipped_location, &display),
        }
    }
}

/// Signale le refus une seule fois par transition
/// Logs the denied status once per transition
pub fn log_authorization_change(previous: Option<AuthorizationStatus>, current: AuthorizationStatus) {
    if previous != Some(current) && current == AuthorizationStatus::Denied {
        warn!("Screen recording permission appears to be denied; captures will be empty");
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockScreen;

    fn titled(id: u32, layer: i32) -> WindowInfo {
        WindowInfo::new(id, layer, Some("Document"))
    }

    #[test]
    fn test_compositing_order_excludes_window() {
        let windows = vec![titled(5, 0), titled(9, 0), titled(3, 25), titled(9, 0), titled(1, -2147483623)];
        let order = compositing_order(&windows, Some(9));
        assert!(!order.contains(&9));
        assert_eq!(order, vec![1, 5, 3]);
    }

    #[test]
    fn test_compositing_order_is_back_to_front() {
        let windows = vec![titled(1, 0), titled(2, 0), titled(3, 0)];
        assert_eq!(compositing_order(&windows, None), vec![3, 2, 1]);
    }

    #[test]
    fn test_authorization_heuristic() {
        let untitled = vec![
            WindowInfo::new(1, 0, None),
            WindowInfo::new(2, MAIN_MENU_WINDOW_LAYER, Some("Menubar")),
            WindowInfo::new(3, 0, Some("Pixie")),
        ];
        assert_eq!(authorization_status(&untitled, Some(3)), AuthorizationStatus::Denied);
        assert_eq!(authorization_status(&untitled, None), AuthorizationStatus::Authorized);
        assert_eq!(authorization_status(&[], None), AuthorizationStatus::Denied);
    }

    #[test]
    fn test_capture_region_and_sample_pixel() {
        let screen = Rc::new(MockScreen::single_display(Rect::new(0.0, 0.0, 2000.0, 1200.0), 2.0));
        let capturer = ScreenCapturer::new(screen.clone());

        let result = capturer.capture(Point::new(500.25, 500.0), 20.0, 20.0, Some(99));
        let bitmap = result.bitmap.as_ref().unwrap();

        assert_eq!(result.flipped_location, Point::new(500.25, 700.0));
        assert_eq!(result.region, Rect::new(490.0, 690.0, 20.5, 20.5));
        assert_eq!((bitmap.width(), bitmap.height()), (41, 41));
        assert_eq!(result.pixel_density(), 2.0);
        assert_eq!(result.sub_pixel_offset, (0.5, 0.0));

        let sample = result.sample_position();
        assert_eq!((sample.x.floor(), sample.y.floor()), (20.0, 20.0));
        assert_eq!(result.hot_pixel(), Some(screen.pixel_at(500.25, 700.0)));
    }

    #[test]
    fn test_hot_pixel_on_integral_point_at_three_times() {
        let screen = Rc::new(MockScreen::single_display(Rect::new(0.0, 0.0, 2000.0, 1200.0), 3.0));
        let capturer = ScreenCapturer::new(screen.clone());

        let result = capturer.capture(Point::new(500.0, 500.0), 29.0, 29.0, None);
        let bitmap = result.bitmap.as_ref().unwrap();
        assert_eq!(result.hot_pixel(), Some(*bitmap.get_pixel(29, 29)));
        assert_eq!(result.hot_pixel(), Some(screen.pixel_at(500.0, 700.0)));
    }

    #[test]
    fn test_capture_outside_every_display() {
        let screen = Rc::new(MockScreen::single_display(Rect::new(0.0, 0.0, 1440.0, 900.0), 1.0));
        let capturer = ScreenCapturer::new(screen);

        let result = capturer.capture(Point::new(-50.0, 100.0), 10.0, 10.0, None);
        assert!(result.bitmap.is_none());
        assert_eq!(result.failure, Some(CaptureFailure::NoDisplayAtPoint));
        assert_eq!(result.flipped_location, Point::new(-50.0, 800.0));
    }

    #[test]
    fn test_capture_never_sends_excluded_window() {
        let screen = Rc::new(MockScreen::single_display(Rect::new(0.0, 0.0, 800.0, 600.0), 1.0));
        screen.set_windows(vec![titled(7, 0), titled(42, 3), titled(8, 0)]);
        let capturer = ScreenCapturer::new(screen.clone());

        capturer.capture(Point::new(100.0, 100.0), 4.0, 4.0, Some(42));
        let sent = screen.last_composited_windows();
        assert_eq!(sent, vec![8, 7]);
    }

    #[test]
    fn test_capture_on_top_row_of_display() {
        let screen = Rc::new(MockScreen::single_display(Rect::new(0.0, 0.0, 2000.0, 1200.0), 2.0));
        let capturer = ScreenCapturer::new(screen.clone());

        // Cocoa y of a cursor pinned to the menu bar
        let result = capturer.capture(Point::new(500.0, 1200.0), 10.0, 10.0, None);
        assert_eq!(result.failure, None);
        assert_eq!(result.flipped_location, Point::new(500.0, 0.0));
        assert_eq!(result.bitmap.as_ref().map(|b| b.dimensions()), Some((21, 21)));
        assert_eq!(result.hot_pixel(), Some(screen.pixel_at(500.0, 0.0)));
    }

    #[test]
    fn test_capture_view_sizes_radius_from_one_enumeration() {
        let screen = Rc::new(MockScreen::single_display(Rect::new(0.0, 0.0, 1000.0, 800.0), 3.0));
        let capturer = ScreenCapturer::new(screen.clone());

        let result = capturer.capture_view(Point::new(200.0, 200.0), Size::new(300.0, 300.0), 16.0, None);
        // 900 px / 16 = 56.25 visible -> 28 + 1 margin on each side
        assert_eq!(result.bitmap.as_ref().map(|b| b.dimensions()), Some((59, 59)));
        assert_eq!(result.backing_scale_factor, 3.0);
        assert_eq!(screen.display_queries(), 1);
    }

    #[test]
    fn test_system_access_overrides_title_heuristic() {
        let screen = Rc::new(MockScreen::single_display(Rect::new(0.0, 0.0, 800.0, 600.0), 1.0));
        screen.set_windows(vec![WindowInfo::new(5, 0, None), WindowInfo::new(6, 0, None)]);
        screen.set_screen_capture_access(Some(true));
        let capturer = ScreenCapturer::new(screen.clone());

        // Only untitled windows, but the OS says access is granted
        assert_eq!(capturer.authorization_status(None), AuthorizationStatus::Authorized);
        let result = capturer.capture(Point::new(100.0, 100.0), 4.0, 4.0, None);
        assert!(result.bitmap.is_some());

        screen.set_windows(vec![titled(5, 0)]);
        screen.set_screen_capture_access(Some(false));
        let calls = screen.composite_calls();
        let result = capturer.capture(Point::new(100.0, 100.0), 4.0, 4.0, None);
        assert_eq!(result.failure, Some(CaptureFailure::PermissionDenied));
        assert_eq!(screen.composite_calls(), calls);
    }

    #[test]
    fn test_transient_failure() {
        let screen = Rc::new(MockScreen::single_display(Rect::new(0.0, 0.0, 800.0, 600.0), 1.0));
        screen.set_composite_fails(true);
        let capturer = ScreenCapturer::new(screen);

        let result = capturer.capture(Point::new(100.0, 100.0), 4.0, 4.0, None);
        assert!(result.bitmap.is_none());
        assert_eq!(result.failure, Some(CaptureFailure::Transient));
        assert_eq!(result.backing_scale_factor, 1.0);
    }
}
