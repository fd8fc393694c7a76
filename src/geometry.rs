// =============================================================================
// geometry.rs - Types géométriques / Geometry value types
// =============================================================================
//
// Platform-neutral mirrors of NSPoint / NSSize / NSRect so that the core
// can be exercised without AppKit. The y axis direction is whatever the
// caller's coordinate space says; `Rect` only knows min and max.

/// Point 2D (x, y)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Taille 2D (width, height)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Rectangle (origin + size)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// Rectangle de taille donnée centré sur `center`
    /// Rectangle of the given size centered on `center`
    pub fn centered(center: Point, size: Size) -> Self {
        Self::new(
            center.x - size.width / 2.0,
            center.y - size.height / 2.0,
            size.width,
            size.height,
        )
    }

    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    pub fn width(&self) -> f64 {
        self.size.width
    }

    pub fn height(&self) -> f64 {
        self.size.height
    }

    pub fn mid(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    /// Retrait sur chaque bord
    /// Same semantics as CGRectInset: positive values shrink, negative grow
    pub fn inset(&self, dx: f64, dy: f64) -> Self {
        Self::new(
            self.origin.x + dx,
            self.origin.y + dy,
            self.size.width - 2.0 * dx,
            self.size.height - 2.0 * dy,
        )
    }

    /// Test de la souris, comme `NSMouseInRect` sur une vue non inversée
    /// Mouse hit test, like `NSMouseInRect` on a non-flipped view
    ///
    /// x is half-open `[min, max)`; y is `(min, max]`, so the top row of a
    /// bottom-left-origin rect belongs to it and its bottom edge does not.
    pub fn contains_mouse(&self, point: Point) -> bool {
        point.x >= self.min_x()
            && point.x < self.max_x()
            && point.y > self.min_y()
            && point.y <= self.max_y()
    }

    /// True when `other` lies entirely inside `self` (edges included)
    pub fn fully_contains(&self, other: &Rect) -> bool {
        self.min_x() <= other.min_x()
            && self.max_x() >= other.max_x()
            && self.min_y() <= other.min_y()
            && self.max_y() >= other.max_y()
    }

    pub fn is_empty(&self) -> bool {
        self.size.width <= 0.0 || self.size.height <= 0.0
    }
}

// =============================================================================
// TESTS
// =============================================================================
