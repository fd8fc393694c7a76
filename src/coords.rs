// =============================================================================
// coords.rs - Conversions de coordonnées / Coordinate mapping
// =============================================================================
//
// Pure functions converting a mouse location between point space, pixel
// space, per-display local space and flipped (top-left origin) space.
//
// Global point space follows the Cocoa convention: origin at the bottom-left
// corner of the primary display, y growing upward. Every display is
// described by its frame in that space and its backing scale factor.

use crate::config::CAPTURE_MARGIN_PIXELS;
use crate::geometry::{Point, Rect, Size};

/// Relative tolerance under which a scaled coordinate is snapped to the
/// nearest pixel boundary before flooring
const PIXEL_SNAP_TOLERANCE: f64 = 1.0e-9;

// =============================================================================
// DESCRIPTION D'ÉCRAN
// DISPLAY DESCRIPTION
// =============================================================================

/// Écran physique, énuméré à nouveau à chaque capture
/// Physical display, enumerated fresh on every capture
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayDescriptor {
    /// Platform display identifier
    pub id: u32,
    /// Frame in global point space (bottom-left origin)
    pub frame: Rect,
    /// Pixels per point (1.0 standard, 2.0 Retina)
    pub backing_scale_factor: f64,
}

impl DisplayDescriptor {
    pub fn new(id: u32, frame: Rect, backing_scale_factor: f64) -> Self {
        Self {
            id,
            frame,
            backing_scale_factor,
        }
    }
}

// =============================================================================
// FONCTIONS DE CONVERSION
// CONVERSION FUNCTIONS
// =============================================================================

/// Convertit un point (origine en bas à gauche) en coordonnée "flipped"
/// Converts a bottom-left-origin point to a top-left-origin point
///
/// `flip(flip(p, frame), frame) == p`
pub fn flip(point: Point, display_frame: &Rect) -> Point {
    Point::new(point.x, display_frame.max_y() - point.y)
}

/// Écran dont le cadre contient la souris en `point`
/// Display whose frame holds the mouse at `point`, if any
///
/// Uses the mouse hit test, so a cursor on the top row of a display (the
/// menu bar) still resolves to it.
pub fn display_containing(point: Point, displays: &[DisplayDescriptor]) -> Option<&DisplayDescriptor> {
    displays.iter().find(|display| display.frame.contains_mouse(point))
}

/// Écran de référence des coordonnées globales
/// Display global coordinates are anchored to: the one whose origin is
/// (0, 0), or the first one enumerated
pub fn primary_display(displays: &[DisplayDescriptor]) -> Option<&DisplayDescriptor> {
    displays
        .iter()
        .find(|display| display.frame.origin == Point::new(0.0, 0.0))
        .or_else(|| displays.first())
}

/// Largeur d'un pixel physique en points
/// Point-space width of one physical pixel
#[inline]
pub fn pixel_width(display: &DisplayDescriptor) -> f64 {
    1.0 / display.backing_scale_factor
}

/// Index of the pixel boundary at or below `scaled` (a coordinate already
/// multiplied by the scale factor). Values within rounding noise of a
/// boundary snap to it, which keeps alignment idempotent.
fn pixel_floor(scaled: f64) -> f64 {
    let nearest = scaled.round();
    if (scaled - nearest).abs() <= PIXEL_SNAP_TOLERANCE * nearest.abs().max(1.0) {
        nearest
    } else {
        scaled.floor()
    }
}

/// Aligne un point sur la grille des pixels physiques de l'écran
/// Floors each component to a multiple of `pixel_width(display)`
pub fn align_to_grid(point: Point, display: &DisplayDescriptor) -> Point {
    align_to_scale(point, display.backing_scale_factor)
}

/// Same as [`align_to_grid`] for a bare scale factor (used for the
/// magnifier's own view, which may sit on another display)
pub fn align_to_scale(point: Point, scale: f64) -> Point {
    Point::new(
        pixel_floor(point.x * scale) / scale,
        pixel_floor(point.y * scale) / scale,
    )
}

/// Reste fractionnaire après alignement, en unités de pixel, dans [0, 1)
/// Fractional remainder after alignment, in pixel units, within [0, 1)
pub fn sub_pixel_offset(point: Point, display: &DisplayDescriptor) -> (f64, f64) {
    let scale = display.backing_scale_factor;
    let remainder = |value: f64| {
        let scaled = value * scale;
        (scaled - pixel_floor(scaled)).clamp(0.0, 1.0 - f64::EPSILON)
    };
    (remainder(point.x), remainder(point.y))
}

/// Converts a global point into the local space of `display`
///
/// With `flipped` the origin is the display's top-left corner, otherwise its
/// bottom-left corner.
pub fn to_display_local(point: Point, display: &DisplayDescriptor, flipped: bool) -> Point {
    let frame = &display.frame;
    if flipped {
        Point::new(point.x - frame.min_x(), frame.max_y() - point.y)
    } else {
        Point::new(point.x - frame.min_x(), point.y - frame.min_y())
    }
}

/// Nombre de pixels capturés de chaque côté du pixel central
/// Pixels to capture on each side of the hot pixel, per axis
///
/// `view_size` is in points. One captured pixel is drawn `magnification`
/// display pixels wide, so the view shows `view * scale / magnification`
/// pixels across; one extra pixel per side covers partial cells.
pub fn capture_radius(view_size: Size, magnification: f64, scale: f64) -> (f64, f64) {
    let radius = |extent: f64| {
        let visible = extent * scale / magnification;
        (((visible - 1.0) / 2.0).ceil() + CAPTURE_MARGIN_PIXELS).max(1.0)
    };
    (radius(view_size.width), radius(view_size.height))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn display(scale: f64) -> DisplayDescriptor {
        DisplayDescriptor::new(1, Rect::new(0.0, 0.0, 2000.0, 1200.0), scale)
    }

    fn is_multiple_of_pixel(value: f64, scale: f64) -> bool {
        let scaled = value * scale;
        (scaled - scaled.round()).abs() < 1.0e-9 * scaled.abs().max(1.0)
    }

    #[test]
    fn test_flip_example() {
        let frame = Rect::new(0.0, 0.0, 2000.0, 1200.0);
        assert_eq!(flip(Point::new(500.0, 500.0), &frame), Point::new(500.0, 700.0));
    }

    #[test]
    fn test_flip_is_self_inverse() {
        let frames = [
            Rect::new(0.0, 0.0, 1440.0, 900.0),
            Rect::new(-1920.0, 120.0, 1920.0, 1080.0),
            Rect::new(1440.0, -300.0, 1024.0, 768.0),
        ];
        let points = [
            Point::new(0.0, 0.0),
            Point::new(12.5, 300.25),
            Point::new(-1000.75, 640.5),
            Point::new(1800.0, -150.125),
        ];
        for frame in &frames {
            for point in &points {
                assert_eq!(flip(flip(*point, frame), frame), *point);
            }
        }
    }

    #[test]
    fn test_display_containing() {
        let displays = [
            DisplayDescriptor::new(1, Rect::new(0.0, 0.0, 1440.0, 900.0), 2.0),
            DisplayDescriptor::new(2, Rect::new(1440.0, 0.0, 1920.0, 1080.0), 1.0),
        ];
        assert_eq!(display_containing(Point::new(10.0, 10.0), &displays).map(|d| d.id), Some(1));
        assert_eq!(display_containing(Point::new(1440.0, 10.0), &displays).map(|d| d.id), Some(2));
        assert_eq!(display_containing(Point::new(1439.5, 899.5), &displays).map(|d| d.id), Some(1));
        assert!(display_containing(Point::new(-1.0, 10.0), &displays).is_none());
        assert!(display_containing(Point::new(100.0, 1000.0), &displays).is_none());
    }

    #[test]
    fn test_display_containing_top_row() {
        let displays = [
            DisplayDescriptor::new(1, Rect::new(0.0, 0.0, 1440.0, 900.0), 2.0),
            DisplayDescriptor::new(2, Rect::new(0.0, 900.0, 1440.0, 900.0), 1.0),
        ];
        // Cursor pinned to the menu bar of the upper display
        assert_eq!(display_containing(Point::new(700.0, 1800.0), &displays).map(|d| d.id), Some(2));
        // Shared edge goes to the lower display, whose top row it is
        assert_eq!(display_containing(Point::new(700.0, 900.0), &displays).map(|d| d.id), Some(1));
        assert!(display_containing(Point::new(700.0, 0.0), &displays).is_none());
    }

    #[test]
    fn test_primary_display_prefers_origin() {
        let displays = [
            DisplayDescriptor::new(7, Rect::new(-1920.0, 0.0, 1920.0, 1080.0), 1.0),
            DisplayDescriptor::new(3, Rect::new(0.0, 0.0, 1440.0, 900.0), 2.0),
        ];
        assert_eq!(primary_display(&displays).map(|d| d.id), Some(3));
        assert!(primary_display(&[]).is_none());
    }

    #[test]
    fn test_pixel_width() {
        assert_eq!(pixel_width(&display(1.0)), 1.0);
        assert_eq!(pixel_width(&display(2.0)), 0.5);
    }

    #[test]
    fn test_align_to_grid_is_multiple_and_idempotent() {
        let samples = [0.0, 0.1, 0.3333, 0.5, 0.75, 1.0, 17.2, 499.99, 500.0, 1234.5678, -3.7, -0.01];
        for scale in [1.0, 2.0, 3.0] {
            let d = display(scale);
            for &x in &samples {
                for &y in &samples {
                    let aligned = align_to_grid(Point::new(x, y), &d);
                    assert!(is_multiple_of_pixel(aligned.x, scale), "x={} scale={}", x, scale);
                    assert!(is_multiple_of_pixel(aligned.y, scale), "y={} scale={}", y, scale);
                    assert!(aligned.x <= x + 1.0e-9 && aligned.y <= y + 1.0e-9);
                    assert_eq!(align_to_grid(aligned, &d), aligned);
                }
            }
        }
    }

    #[test]
    fn test_align_to_grid_values() {
        assert_eq!(align_to_grid(Point::new(10.7, 3.2), &display(1.0)), Point::new(10.0, 3.0));
        assert_eq!(align_to_grid(Point::new(10.7, 3.2), &display(2.0)), Point::new(10.5, 3.0));
        assert_eq!(align_to_grid(Point::new(-0.2, 0.0), &display(2.0)), Point::new(-0.5, 0.0));
    }

    #[test]
    fn test_sub_pixel_offset_range() {
        for scale in [1.0, 2.0, 3.0] {
            let d = display(scale);
            for &x in &[0.0, 0.1, 0.26, 0.5, 0.9, 12.34, 999.999] {
                let (dx, dy) = sub_pixel_offset(Point::new(x, x), &d);
                assert!((0.0..1.0).contains(&dx));
                assert!((0.0..1.0).contains(&dy));
            }
        }
    }

    #[test]
    fn test_sub_pixel_offset_values() {
        let (dx, dy) = sub_pixel_offset(Point::new(10.25, 3.0), &display(2.0));
        assert!((dx - 0.5).abs() < 1.0e-12);
        assert_eq!(dy, 0.0);
        let (dx, _) = sub_pixel_offset(Point::new(10.75, 0.0), &display(1.0));
        assert!((dx - 0.75).abs() < 1.0e-12);
    }

    #[test]
    fn test_alignment_is_continuous_across_display_edge() {
        let left = DisplayDescriptor::new(1, Rect::new(0.0, 0.0, 1440.0, 900.0), 2.0);
        let right = DisplayDescriptor::new(2, Rect::new(1440.0, 0.0, 1920.0, 1080.0), 2.0);
        let just_left = align_to_grid(Point::new(1439.9, 10.0), &left);
        let edge = align_to_grid(Point::new(1440.0, 10.0), &right);
        assert_eq!(just_left.x, 1439.5);
        assert_eq!(edge.x, 1440.0);
    }

    #[test]
    fn test_to_display_local() {
        let d = DisplayDescriptor::new(2, Rect::new(1440.0, 100.0, 1920.0, 1080.0), 1.0);
        let point = Point::new(1500.0, 200.0);
        assert_eq!(to_display_local(point, &d, false), Point::new(60.0, 100.0));
        assert_eq!(to_display_local(point, &d, true), Point::new(60.0, 980.0));
    }

    #[test]
    fn test_capture_radius() {
        // 300pt view, 16x, Retina: 37.5 pixels visible -> 19 + 1 margin
        assert_eq!(capture_radius(Size::new(300.0, 300.0), 16.0, 2.0), (20.0, 20.0));
        // 300pt view, 1x on a standard display: 300 pixels visible
        assert_eq!(capture_radius(Size::new(300.0, 200.0), 1.0, 1.0), (151.0, 101.0));
        // Never below one pixel
        assert_eq!(capture_radius(Size::new(1.0, 1.0), 128.0, 1.0), (1.0, 1.0));
    }
}
