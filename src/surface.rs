//! =============================================================================
//! SURFACE.RS - Surface de la loupe (composition + overlay)
//! SURFACE.RS - Magnifier surface (compositing + overlay)
//! =============================================================================
//!
//! À chaque tick: capture autour de la souris, placement du bitmap sous le
//! hot spot, puis calcul de la grille. La surface ne dessine rien elle-même;
//! elle produit un `MagnifierLayout` que la vue de la plateforme dessine.
//! On each tick: capture around the mouse, place the bitmap under the hot
//! spot, then lay out the grid. The surface draws nothing itself; it produces
//! a `MagnifierLayout` the platform view renders.
//!
//! View coordinates are points with a bottom-left origin, y growing upward.

use std::cell::RefCell;
use std::rc::Rc;

use image::{Rgba, RgbaImage};
use log::{debug, trace};

use crate::capture::{self, AuthorizationStatus, ScreenCapturer};
use crate::config::{
    DEFAULT_MAGNIFICATION, GRID_MIN_MAGNIFICATION, HOT_SPOT_BORDER_GAP, HOT_SPOT_MIN_SIZE,
    MAGNIFICATION_MAX, MAGNIFICATION_MIN,
};
use crate::coords::{self, DisplayDescriptor};
use crate::error::CaptureFailure;
use crate::frame_clock::{FrameSubscriber, FrameTimestamps};
use crate::geometry::{Point, Rect, Size};

/// Ramène un facteur d'agrandissement dans [1, 128]
/// Brings a magnification factor into [1, 128]
pub fn clamp_magnification(factor: f64) -> f64 {
    if factor.is_nan() {
        return MAGNIFICATION_MIN;
    }
    factor.clamp(MAGNIFICATION_MIN, MAGNIFICATION_MAX)
}

// =============================================================================
// ÉTAT DE L'OVERLAY
// OVERLAY STATE
// =============================================================================

/// Réglages modifiables de la surface
/// Mutable settings of the surface
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayState {
    magnification: f64,
    pub show_grid: bool,
    pub show_hot_spot: bool,
    pub lock_x: bool,
    pub lock_y: bool,
    /// No capture and no readout update while set
    pub frozen: bool,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            magnification: DEFAULT_MAGNIFICATION,
            show_grid: false,
            show_hot_spot: true,
            lock_x: false,
            lock_y: false,
            frozen: false,
        }
    }
}

impl OverlayState {
    pub fn magnification(&self) -> f64 {
        self.magnification
    }

    /// Stores `clamp(factor, 1, 128)` and returns the stored value
    pub fn set_magnification(&mut self, factor: f64) -> f64 {
        self.magnification = clamp_magnification(factor);
        self.magnification
    }

    /// Grille lisible à partir de 8x
    /// Grid lines are readable from 8x upward
    pub fn can_show_grid(&self) -> bool {
        self.magnification >= GRID_MIN_MAGNIFICATION
    }

    pub fn grid_visible(&self) -> bool {
        self.show_grid && self.can_show_grid()
    }
}

// =============================================================================
// OBSERVATEUR
// OBSERVER
// =============================================================================

/// Reçoit les valeurs lues après chaque capture
/// Receives the readouts after each capture
pub trait SurfaceObserver {
    /// Centre de l'échantillon dans les deux conventions
    /// Sample center in both conventions, plus the display it lies on
    fn mouse_location_updated(&mut self, location: Point, flipped: Point, display: Option<&DisplayDescriptor>);

    /// Couleur du pixel sous le hot spot
    /// Color of the pixel under the hot spot
    fn color_sampled(&mut self, color: Rgba<u8>);
}

// =============================================================================
// MISE EN PAGE
// LAYOUT
// =============================================================================

/// Marqueur du pixel central
/// Marker of the center pixel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HotSpot {
    /// Exact magnified pixel cell, aligned to the view's pixel grid
    pub cell: Rect,
    /// Drawn rectangle, never smaller than the minimum marker size
    pub marker: Rect,
    /// Outer border around the marker
    pub border: Rect,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLine {
    pub start: Point,
    pub end: Point,
}

impl GridLine {
    pub fn is_vertical(&self) -> bool {
        self.start.x == self.end.x
    }
}

/// Tout ce que la vue doit dessiner pour une frame
/// Everything the view draws for one frame
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MagnifierLayout {
    pub bounds: Rect,
    /// Side of one captured pixel in view points
    pub cell_size: f64,
    /// Where the last bitmap is drawn, `None` before the first capture
    pub image_rect: Option<Rect>,
    /// `None` when the hot spot is hidden
    pub hot_spot: Option<HotSpot>,
    /// Empty unless the grid is enabled and readable
    pub grid: Vec<GridLine>,
}

/// Dernier bitmap capturé avec de quoi le placer
/// Last captured bitmap and what is needed to place it
#[derive(Clone, Debug)]
pub struct ImageFrame {
    pub bitmap: RgbaImage,
    /// Requested capture region, global points, top-left origin
    pub region: Rect,
    /// Sample center, global points, bottom-left origin
    pub location: Point,
    /// Sample center, global points, top-left origin
    pub flipped_location: Point,
    /// Sample center inside the bitmap, in bitmap pixels from the top-left
    pub sample: Point,
    /// Sample center inside its physical pixel, in [0, 1)
    pub sub_pixel_offset: (f64, f64),
    /// Bitmap pixels per point
    pub density: f64,
}

// =============================================================================
// SURFACE
// =============================================================================

pub struct MagnifierSurface {
    capturer: ScreenCapturer,
    state: OverlayState,
    bounds: Rect,
    view_scale: f64,
    excluded_window: Option<u32>,
    locked_location: Point,
    frame: Option<ImageFrame>,
    layout: MagnifierLayout,
    observer: Option<Rc<RefCell<dyn SurfaceObserver>>>,
    authorization: Option<AuthorizationStatus>,
    generation: u64,
}

impl MagnifierSurface {
    /// `bounds` is the view's frame in its own coordinates, `view_scale` the
    /// backing scale factor of the display the view is on
    pub fn new(capturer: ScreenCapturer, state: OverlayState, bounds: Rect, view_scale: f64) -> Self {
        let mut surface = Self {
            capturer,
            state,
            bounds,
            view_scale,
            excluded_window: None,
            locked_location: Point::default(),
            frame: None,
            layout: MagnifierLayout::default(),
            observer: None,
            authorization: None,
            generation: 0,
        };
        surface.relayout();
        surface
    }

    pub fn set_observer(&mut self, observer: Rc<RefCell<dyn SurfaceObserver>>) {
        self.observer = Some(observer);
    }

    /// Fenêtre exclue de toute capture
    /// Window left out of every capture (the magnifier's own window)
    pub fn set_excluded_window(&mut self, window: Option<u32>) {
        self.excluded_window = window;
    }

    pub fn set_bounds(&mut self, bounds: Rect, view_scale: f64) {
        if bounds == self.bounds && view_scale == self.view_scale {
            return;
        }
        self.bounds = bounds;
        self.view_scale = view_scale;
        self.relayout();
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn layout(&self) -> &MagnifierLayout {
        &self.layout
    }

    pub fn image(&self) -> Option<&ImageFrame> {
        self.frame.as_ref()
    }

    /// Incremented whenever the layout changes
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // -------------------------------------------------------------------------
    // Réglages / Settings
    // -------------------------------------------------------------------------

    pub fn set_magnification(&mut self, factor: f64) -> f64 {
        let stored = self.state.set_magnification(factor);
        self.relayout();
        stored
    }

    pub fn set_show_grid(&mut self, show: bool) {
        self.state.show_grid = show;
        self.relayout();
    }

    pub fn set_show_hot_spot(&mut self, show: bool) {
        self.state.show_hot_spot = show;
        self.relayout();
    }

    /// Locking freezes the x of the sample center at the current mouse x
    pub fn set_lock_x(&mut self, locked: bool) {
        if locked && !self.state.lock_x {
            self.locked_location.x = self.capturer.backend().mouse_location().x;
        }
        self.state.lock_x = locked;
        debug!("Lock x: {}", locked);
    }

    /// Locking freezes the y of the sample center at the current mouse y
    pub fn set_lock_y(&mut self, locked: bool) {
        if locked && !self.state.lock_y {
            self.locked_location.y = self.capturer.backend().mouse_location().y;
        }
        self.state.lock_y = locked;
        debug!("Lock y: {}", locked);
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.state.frozen = frozen;
        debug!("Freeze: {}", frozen);
    }

    /// Position de la souris, axes verrouillés compris
    /// Mouse location with locked axes replaced by their frozen values
    pub fn sample_location(&self) -> Point {
        let live = self.capturer.backend().mouse_location();
        Point::new(
            if self.state.lock_x { self.locked_location.x } else { live.x },
            if self.state.lock_y { self.locked_location.y } else { live.y },
        )
    }

    // -------------------------------------------------------------------------
    // Frame
    // -------------------------------------------------------------------------

    /// Capture une frame et met à jour la mise en page
    /// Captures one frame and refreshes the layout
    pub fn update_frame(&mut self) {
        if self.state.frozen {
            return;
        }

        let location = self.sample_location();
        let mut result = self.capturer.capture_view(
            location,
            self.bounds.size,
            self.state.magnification(),
            self.excluded_window,
        );

        let status = match result.failure {
            Some(CaptureFailure::PermissionDenied) => Some(AuthorizationStatus::Denied),
            None => Some(AuthorizationStatus::Authorized),
            Some(_) => None,
        };
        if let Some(status) = status {
            capture::log_authorization_change(self.authorization, status);
            self.authorization = Some(status);
        }

        let color = result.hot_pixel();
        let density = result.pixel_density();
        let sample = result.sample_position();

        match result.bitmap.take() {
            Some(bitmap) => {
                self.frame = Some(ImageFrame {
                    bitmap,
                    region: result.region,
                    location: result.location,
                    flipped_location: result.flipped_location,
                    sample,
                    sub_pixel_offset: result.sub_pixel_offset,
                    density,
                });
            }
            None => trace!("Keeping previous bitmap ({:?})", result.failure),
        }

        if let Some(observer) = &self.observer {
            if let Ok(mut observer) = observer.try_borrow_mut() {
                observer.mouse_location_updated(
                    result.location,
                    result.flipped_location,
                    result.display.as_ref(),
                );
                if let Some(color) = color {
                    observer.color_sampled(color);
                }
            }
        }

        self.relayout();
    }

    fn relayout(&mut self) {
        self.layout = compute_layout(&self.state, self.bounds, self.view_scale, self.frame.as_ref());
        self.generation = self.generation.wrapping_add(1);
    }
}

impl FrameSubscriber for MagnifierSurface {
    fn frame_tick(&mut self, _timestamps: FrameTimestamps) {
        self.update_frame();
    }
}

// =============================================================================
// CALCUL DE LA MISE EN PAGE
// LAYOUT COMPUTATION
// =============================================================================

/// Mise en page pure pour l'état donné
/// Pure layout: hot spot, bitmap placement and grid for the given state
pub fn compute_layout(
    state: &OverlayState,
    bounds: Rect,
    view_scale: f64,
    frame: Option<&ImageFrame>,
) -> MagnifierLayout {
    let magnification = state.magnification();
    let density = frame.map(|frame| frame.density).unwrap_or(view_scale);
    let cell_size = if density > 0.0 { magnification / density } else { magnification };

    let cell = hot_spot_cell(bounds, cell_size, view_scale);

    let image_rect = frame.map(|frame| {
        let (fx, fy) = frame.sub_pixel_offset;
        let width = frame.bitmap.width() as f64 * cell_size;
        let height = frame.bitmap.height() as f64 * cell_size;
        // Sample center sits at the same fraction of the hot cell as of its pixel
        let anchor_x = cell.min_x() + fx * cell_size;
        let anchor_y = cell.max_y() - fy * cell_size;
        let left = anchor_x - frame.sample.x * cell_size;
        let top = anchor_y + frame.sample.y * cell_size;
        Rect::new(left, top - height, width, height)
    });

    let hot_spot = state.show_hot_spot.then(|| {
        let marker = if cell_size < HOT_SPOT_MIN_SIZE {
            Rect::centered(cell.mid(), Size::new(HOT_SPOT_MIN_SIZE, HOT_SPOT_MIN_SIZE))
        } else {
            cell
        };
        HotSpot {
            cell,
            marker,
            border: marker.inset(-HOT_SPOT_BORDER_GAP, -HOT_SPOT_BORDER_GAP),
        }
    });

    let grid = if state.grid_visible() {
        grid_lines(bounds, cell, cell_size)
    } else {
        Vec::new()
    };

    MagnifierLayout {
        bounds,
        cell_size,
        image_rect,
        hot_spot,
        grid,
    }
}

/// Cell of the hot pixel: centered in `bounds`, origin on the view's pixel grid
fn hot_spot_cell(bounds: Rect, cell_size: f64, view_scale: f64) -> Rect {
    let centered = Rect::centered(bounds.mid(), Size::new(cell_size, cell_size));
    Rect {
        origin: coords::align_to_scale(centered.origin, view_scale.max(1.0)),
        size: centered.size,
    }
}

/// Lignes de la grille, du hot spot vers l'extérieur
/// Grid lines, tiled outward from the hot spot
fn grid_lines(bounds: Rect, cell: Rect, cell_size: f64) -> Vec<GridLine> {
    let mut lines = Vec::new();
    if cell_size <= 0.0 || bounds.is_empty() {
        return lines;
    }

    let mut ring = cell;
    loop {
        for x in [ring.min_x(), ring.max_x()] {
            if x >= bounds.min_x() && x <= bounds.max_x() {
                lines.push(GridLine {
                    start: Point::new(x, bounds.min_y()),
                    end: Point::new(x, bounds.max_y()),
                });
            }
        }
        for y in [ring.min_y(), ring.max_y()] {
            if y >= bounds.min_y() && y <= bounds.max_y() {
                lines.push(GridLine {
                    start: Point::new(bounds.min_x(), y),
                    end: Point::new(bounds.max_x(), y),
                });
            }
        }

        if ring.fully_contains(&bounds) {
            break;
        }
        ring = ring.inset(-cell_size, -cell_size);
    }
    lines
}

// =============================================================================
// TESTS
// =============================================================================
