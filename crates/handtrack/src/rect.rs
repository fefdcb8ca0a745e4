//! Axis-aligned and rotated rectangles, in pixel coordinates.
//!
//! Y points down, so a positive rotation turns a rectangle clockwise on screen.

/// An axis-aligned rectangle, stored as its center and size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    x_center: f32,
    y_center: f32,
    width: f32,
    height: f32,
}

impl Rect {
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            x_center,
            y_center,
            width,
            height,
        }
    }

    /// Computes the smallest rectangle containing all `points`.
    ///
    /// Returns [`None`] if `points` is empty.
    pub fn bounding(points: impl IntoIterator<Item = (f32, f32)>) -> Option<Self> {
        let mut points = points.into_iter();
        let (x, y) = points.next()?;
        let (x0, y0, x1, y1) = points.fold((x, y, x, y), |(x0, y0, x1, y1), (x, y)| {
            (x0.min(x), y0.min(y), x1.max(x), y1.max(y))
        });
        Some(Self::from_center(
            (x0 + x1) / 2.0,
            (y0 + y1) / 2.0,
            x1 - x0,
            y1 - y0,
        ))
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x_center, self.y_center)
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn left(&self) -> f32 {
        self.x_center - self.width / 2.0
    }

    pub fn top(&self) -> f32 {
        self.y_center - self.height / 2.0
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Scales width and height by `factor`, keeping the center in place.
    #[must_use]
    pub fn scale(&self, factor: f32) -> Self {
        Self::from_center(
            self.x_center,
            self.y_center,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Extends the shorter side so that the rectangle becomes a square.
    #[must_use]
    pub fn to_square(&self) -> Self {
        let side = self.width.max(self.height);
        Self::from_center(self.x_center, self.y_center, side, side)
    }

    #[must_use]
    pub fn move_by(&self, dx: f32, dy: f32) -> Self {
        Self::from_center(self.x_center + dx, self.y_center + dy, self.width, self.height)
    }

    fn intersection_area(&self, other: &Rect) -> f32 {
        let w = (self.left() + self.width).min(other.left() + other.width)
            - self.left().max(other.left());
        let h = (self.top() + self.height).min(other.top() + other.height)
            - self.top().max(other.top());
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Computes the Intersection over Union (IoU) of `self` and `other`.
    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A [`Rect`] rotated clockwise around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    rect: Rect,
    radians: f32,
}

impl RotatedRect {
    #[inline]
    pub fn new(rect: Rect, radians: f32) -> Self {
        Self { rect, radians }
    }

    /// Computes the rectangle rotated by `radians` that encloses `points`.
    ///
    /// Returns [`None`] if `points` is empty.
    pub fn bounding(
        radians: f32,
        points: impl IntoIterator<Item = (f32, f32)>,
    ) -> Option<Self> {
        // Undo the rotation, take the axis-aligned bounds there, and rotate the center back.
        let inner = Rect::bounding(points.into_iter().map(|p| rotate(p, -radians)))?;
        let (cx, cy) = rotate(inner.center(), radians);
        Some(Self::new(
            Rect::from_center(cx, cy, inner.width(), inner.height()),
            radians,
        ))
    }

    #[inline]
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.radians
    }

    /// Applies `f` to the underlying non-rotated [`Rect`].
    #[must_use]
    pub fn map(self, f: impl FnOnce(Rect) -> Rect) -> Self {
        Self::new(f(self.rect), self.radians)
    }

    /// Moves the center by `(dx, dy)`, measured along the rectangle's own (rotated) axes.
    #[must_use]
    pub fn shift_local(&self, dx: f32, dy: f32) -> Self {
        let (dx, dy) = rotate((dx, dy), self.radians);
        self.map(|rect| rect.move_by(dx, dy))
    }

    /// Maps a point from the rectangle's own coordinate system (origin at its top left corner)
    /// into the parent coordinate system.
    pub fn transform_out(&self, (x, y): (f32, f32)) -> (f32, f32) {
        let (w, h) = (self.rect.width(), self.rect.height());
        let (rx, ry) = rotate((x - w / 2.0, y - h / 2.0), self.radians);
        let (cx, cy) = self.rect.center();
        (rx + cx, ry + cy)
    }

    /// Maps a point from the parent coordinate system into the rectangle's own system.
    pub fn transform_in(&self, (x, y): (f32, f32)) -> (f32, f32) {
        let (cx, cy) = self.rect.center();
        let (rx, ry) = rotate((x - cx, y - cy), -self.radians);
        (rx + self.rect.width() / 2.0, ry + self.rect.height() / 2.0)
    }
}

impl From<Rect> for RotatedRect {
    fn from(rect: Rect) -> Self {
        Self::new(rect, 0.0)
    }
}

/// Rotates `(x, y)` clockwise (on screen) around the origin.
fn rotate((x, y): (f32, f32), radians: f32) -> (f32, f32) {
    let (sin, cos) = radians.sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

/// Computes the clockwise angle between "straight up" and the direction from `from` to `to`.
pub fn upright_angle(from: (f32, f32), to: (f32, f32)) -> f32 {
    (to.0 - from.0).atan2(from.1 - to.1)
}
