//! Landmark visualization helpers.
//!
//! Like the other drawing functions in this crate, [`connectors`] and [`landmarks`] return guards
//! that can be used to customize the style and that draw when they are dropped:
//!
//! ```
//! # use handtrack::{canvas::{Color, ImageCanvas}, draw, landmark::{LandmarkSet, HAND_CONNECTIONS}};
//! # let mut canvas = ImageCanvas::new();
//! # let hand = LandmarkSet::new(Vec::new());
//! draw::connectors(&mut canvas, &hand, HAND_CONNECTIONS)
//!     .color(Color::GREEN)
//!     .line_width(2);
//! ```

use crate::{
    canvas::{Canvas, Color},
    landmark::{Connection, LandmarkSet},
};

/// Default radius of landmark markers, in pixels.
pub const DEFAULT_RADIUS: f32 = 6.0;

/// Guard returned by [`connectors`]; draws the connector lines when dropped.
pub struct DrawConnectors<'a, C: Canvas + ?Sized> {
    canvas: &'a mut C,
    landmarks: &'a LandmarkSet,
    connections: &'a [Connection],
    color: Color,
    line_width: u32,
}

impl<C: Canvas + ?Sized> DrawConnectors<'_, C> {
    /// Sets the line color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the line width in pixels.
    ///
    /// By default, a line width of 4 is used.
    pub fn line_width(&mut self, width: u32) -> &mut Self {
        self.line_width = width;
        self
    }
}

impl<C: Canvas + ?Sized> Drop for DrawConnectors<'_, C> {
    fn drop(&mut self) {
        let size = self.canvas.size();
        for &(a, b) in self.connections {
            // Connections referring to landmarks the set doesn't have are skipped.
            let (Some(from), Some(to)) = (self.landmarks.get(a), self.landmarks.get(b)) else {
                continue;
            };
            self.canvas.stroke_line(
                from.to_pixel(size.width(), size.height()),
                to.to_pixel(size.width(), size.height()),
                self.color,
                self.line_width,
            );
        }
    }
}

/// Guard returned by [`landmarks`]; draws the landmark markers when dropped.
pub struct DrawLandmarks<'a, C: Canvas + ?Sized> {
    canvas: &'a mut C,
    landmarks: &'a LandmarkSet,
    color: Color,
    fill_color: Option<Color>,
    line_width: u32,
    radius: f32,
}

impl<C: Canvas + ?Sized> DrawLandmarks<'_, C> {
    /// Sets the outline color. Unless [`DrawLandmarks::fill_color`] is called, this is also used
    /// to fill the markers.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the color the markers are filled with.
    pub fn fill_color(&mut self, color: Color) -> &mut Self {
        self.fill_color = Some(color);
        self
    }

    /// Sets the outline width in pixels.
    ///
    /// By default, a line width of 4 is used.
    pub fn line_width(&mut self, width: u32) -> &mut Self {
        self.line_width = width;
        self
    }

    /// Sets the marker radius in pixels. Defaults to [`DEFAULT_RADIUS`].
    pub fn radius(&mut self, radius: f32) -> &mut Self {
        self.radius = radius;
        self
    }
}

impl<C: Canvas + ?Sized> Drop for DrawLandmarks<'_, C> {
    fn drop(&mut self) {
        let size = self.canvas.size();
        let fill = self.fill_color.unwrap_or(self.color);
        for landmark in self.landmarks {
            self.canvas.draw_circle(
                landmark.to_pixel(size.width(), size.height()),
                self.radius,
                self.color,
                Some(fill),
                self.line_width,
            );
        }
    }
}

/// Draws lines between the landmark pairs listed in `connections`.
///
/// Landmark coordinates are normalized, so they are scaled by the current canvas size.
pub fn connectors<'a, C: Canvas + ?Sized>(
    canvas: &'a mut C,
    landmarks: &'a LandmarkSet,
    connections: &'a [Connection],
) -> DrawConnectors<'a, C> {
    DrawConnectors {
        canvas,
        landmarks,
        connections,
        color: Color::WHITE,
        line_width: 4,
    }
}

/// Draws a circular marker at every landmark.
pub fn landmarks<'a, C: Canvas + ?Sized>(
    canvas: &'a mut C,
    landmarks: &'a LandmarkSet,
) -> DrawLandmarks<'a, C> {
    DrawLandmarks {
        canvas,
        landmarks,
        color: Color::WHITE,
        fill_color: None,
        line_width: 4,
        radius: DEFAULT_RADIUS,
    }
}
