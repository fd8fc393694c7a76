//! In-memory screen and refresh source for tests and headless runs.
//!
//! `MockScreen` paints a deterministic pattern where every physical pixel's
//! color is derived from its global pixel coordinates, so a test can tell
//! exactly which pixel landed where.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::capture::{ScreenBackend, WindowInfo};
use crate::coords::{self, DisplayDescriptor};
use crate::error::FrameClockError;
use crate::frame_clock::{FrameClock, FrameTimestamps, RefreshSource, TickSender};
use crate::geometry::{Point, Rect};

// =============================================================================
// ÉCRAN SIMULÉ
// MOCK SCREEN
// =============================================================================

/// Faux serveur de fenêtres: écrans, fenêtres et souris réglables
/// A fake window server with configurable displays, windows and mouse
pub struct MockScreen {
    displays: RefCell<Vec<DisplayDescriptor>>,
    windows: RefCell<Vec<WindowInfo>>,
    mouse: Cell<Point>,
    composite_fails: Cell<bool>,
    last_composited: RefCell<Vec<u32>>,
    composite_calls: Cell<u32>,
    display_queries: Cell<u32>,
    capture_access: Cell<Option<bool>>,
}

impl MockScreen {
    pub fn new(displays: Vec<DisplayDescriptor>) -> Self {
        Self {
            displays: RefCell::new(displays),
            windows: RefCell::new(vec![
                WindowInfo::new(1, 0, Some("Finder")),
                WindowInfo::new(2, -2147483623, None),
            ]),
            mouse: Cell::new(Point::default()),
            composite_fails: Cell::new(false),
            last_composited: RefCell::new(Vec::new()),
            composite_calls: Cell::new(0),
            display_queries: Cell::new(0),
            capture_access: Cell::new(None),
        }
    }

    /// One display with id 1
    pub fn single_display(frame: Rect, scale: f64) -> Self {
        Self::new(vec![DisplayDescriptor::new(1, frame, scale)])
    }

    pub fn set_displays(&self, displays: Vec<DisplayDescriptor>) {
        *self.displays.borrow_mut() = displays;
    }

    /// Front to back, as the window server would list them
    pub fn set_windows(&self, windows: Vec<WindowInfo>) {
        *self.windows.borrow_mut() = windows;
    }

    pub fn set_mouse_location(&self, location: Point) {
        self.mouse.set(location);
    }

    pub fn set_composite_fails(&self, fails: bool) {
        self.composite_fails.set(fails);
    }

    /// Window list received by the last `composite` call
    pub fn last_composited_windows(&self) -> Vec<u32> {
        self.last_composited.borrow().clone()
    }

    pub fn composite_calls(&self) -> u32 {
        self.composite_calls.get()
    }

    /// Number of `displays()` enumerations so far
    pub fn display_queries(&self) -> u32 {
        self.display_queries.get()
    }

    /// OS answer to the access check; `None` means no such API
    pub fn set_screen_capture_access(&self, access: Option<bool>) {
        self.capture_access.set(access);
    }

    /// Couleur du pixel physique sous un point global (origine en haut)
    /// Color of the physical pixel under a top-left-origin global point
    pub fn pixel_at(&self, x: f64, y: f64) -> Rgba<u8> {
        let scale = self.scale_at_flipped(Point::new(x, y)).unwrap_or(1.0);
        pattern((x * scale).floor() as i64, (y * scale).floor() as i64)
    }

    fn scale_at_flipped(&self, point: Point) -> Option<f64> {
        let displays = self.displays.borrow();
        let primary = coords::primary_display(&displays)?;
        let native = coords::flip(point, &primary.frame);
        coords::display_containing(native, &displays).map(|display| display.backing_scale_factor)
    }
}

fn pattern(px: i64, py: i64) -> Rgba<u8> {
    Rgba([
        px.rem_euclid(251) as u8,
        py.rem_euclid(241) as u8,
        (px / 7 + py / 3).rem_euclid(256) as u8,
        255,
    ])
}

impl ScreenBackend for MockScreen {
    fn displays(&self) -> Vec<DisplayDescriptor> {
        self.display_queries.set(self.display_queries.get() + 1);
        self.displays.borrow().clone()
    }

    fn on_screen_windows(&self) -> Vec<WindowInfo> {
        self.windows.borrow().clone()
    }

    fn composite(&self, rect: Rect, windows: &[u32]) -> Option<RgbaImage> {
        self.composite_calls.set(self.composite_calls.get() + 1);
        *self.last_composited.borrow_mut() = windows.to_vec();

        if self.composite_fails.get() || rect.is_empty() {
            return None;
        }
        let scale = self.scale_at_flipped(rect.mid())?;

        // Outward rounding to whole pixels, like the window server
        let x0 = (rect.min_x() * scale).floor() as i64;
        let y0 = (rect.min_y() * scale).floor() as i64;
        let x1 = (rect.max_x() * scale).ceil() as i64;
        let y1 = (rect.max_y() * scale).ceil() as i64;
        let width = u32::try_from(x1 - x0).ok()?;
        let height = u32::try_from(y1 - y0).ok()?;

        Some(ImageBuffer::from_fn(width, height, |i, j| {
            pattern(x0 + i as i64, y0 + j as i64)
        }))
    }

    fn mouse_location(&self) -> Point {
        self.mouse.get()
    }

    fn screen_capture_access(&self) -> Option<bool> {
        self.capture_access.get()
    }
}

// =============================================================================
// SOURCE DE RAFRAÎCHISSEMENT SIMULÉE
// MOCK REFRESH SOURCE
// =============================================================================

/// Source de rafraîchissement pilotée à la main
/// Refresh source driven by hand; clones share state
#[derive(Clone)]
pub struct MockRefreshSource {
    sender: TickSender,
    running: Rc<Cell<bool>>,
    starts: Rc<Cell<u32>>,
    stops: Rc<Cell<u32>>,
    time: Rc<Cell<f64>>,
}

impl MockRefreshSource {
    pub fn new(sender: TickSender) -> Self {
        Self {
            sender,
            running: Rc::new(Cell::new(false)),
            starts: Rc::new(Cell::new(0)),
            stops: Rc::new(Cell::new(0)),
            time: Rc::new(Cell::new(0.0)),
        }
    }

    /// Emits one refresh at 60Hz host time; ignored while stopped, like the
    /// hardware link
    pub fn fire(&self) {
        if !self.running.get() {
            return;
        }
        let now = self.time.get() + 1.0 / 60.0;
        self.time.set(now);
        self.sender.send(FrameTimestamps {
            now,
            output: now + 1.0 / 60.0,
        });
    }

    pub fn starts(&self) -> u32 {
        self.starts.get()
    }

    pub fn stops(&self) -> u32 {
        self.stops.get()
    }
}

impl RefreshSource for MockRefreshSource {
    fn start(&mut self) {
        self.running.set(true);
        self.starts.set(self.starts.get() + 1);
    }

    fn stop(&mut self) {
        self.running.set(false);
        self.stops.set(self.stops.get() + 1);
    }

    fn is_running(&self) -> bool {
        self.running.get()
    }
}

/// Horloge sur une `MockRefreshSource`, avec la poignée pour la déclencher
/// Clock backed by a `MockRefreshSource`, plus a handle to fire it
pub fn mock_frame_clock() -> Result<(FrameClock, MockRefreshSource), FrameClockError> {
    let mut handle = None;
    let clock = FrameClock::new(|sender| {
        let source = MockRefreshSource::new(sender);
        handle = Some(source.clone());
        Ok(source)
    })?;
    handle
        .map(|source| (clock, source))
        .ok_or(FrameClockError::SourceUnavailable(-1))
}

// =============================================================================
// TESTS
// =============================================================================
