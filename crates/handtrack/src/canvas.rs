//! Drawing surfaces.
//!
//! [`Canvas`] is the small set of 2D drawing operations the renderer needs. [`ImageCanvas`]
//! implements it on top of an in-memory RGBA image, rasterizing shapes with `embedded-graphics`.

use std::{convert::Infallible, fmt, str::FromStr};

use embedded_graphics::{
    mono_font::{ascii, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyleBuilder, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use image::{imageops, Rgba, RgbaImage};

use crate::resolution::Resolution;

/// An 8-bit sRGB color with alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NONE: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

/// Parses CSS-style hex colors: `#rgb`, `#rrggbb` or `#rrggbbaa`.
impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let Some(hex) = s.strip_prefix('#') else {
            anyhow::bail!("color '{s}' does not start with '#'");
        };
        if !hex.is_ascii() {
            anyhow::bail!("invalid color '{s}'");
        }
        let channel = |i: usize, len: usize| -> anyhow::Result<u8> {
            let digits = &hex[i * len..(i + 1) * len];
            let value = u8::from_str_radix(digits, 16)?;
            Ok(if len == 1 { value * 17 } else { value })
        };
        match hex.len() {
            3 => Ok(Self([channel(0, 1)?, channel(1, 1)?, channel(2, 1)?, 255])),
            6 => Ok(Self::from_rgb8(channel(0, 2)?, channel(1, 2)?, channel(2, 2)?)),
            8 => Ok(Self([
                channel(0, 2)?,
                channel(1, 2)?,
                channel(2, 2)?,
                channel(3, 2)?,
            ])),
            _ => anyhow::bail!("invalid color '{s}'"),
        }
    }
}

impl From<Color> for Rgb888 {
    fn from(c: Color) -> Self {
        Rgb888::new(c.r(), c.g(), c.b())
    }
}

/// A point on a canvas, in pixels.
pub type Point2 = (f32, f32);

/// A 2D drawing surface.
///
/// Mirrors the subset of an HTML canvas context used by the renderer. Coordinates are in pixels
/// with the origin in the top left corner.
pub trait Canvas {
    /// Resizes the surface. The content of a resized surface is unspecified until cleared.
    fn set_size(&mut self, size: Resolution);

    fn size(&self) -> Resolution;

    /// Marks the start of a frame.
    fn save(&mut self) {}

    /// Marks the end of a frame started with [`Canvas::save`].
    fn restore(&mut self) {}

    /// Clears the whole surface to transparent black.
    fn clear(&mut self);

    /// Draws `image` scaled to the rectangle at `x`,`y` with size `width`x`height`.
    fn draw_image(&mut self, image: &RgbaImage, x: i32, y: i32, width: u32, height: u32);

    fn stroke_line(&mut self, from: Point2, to: Point2, color: Color, line_width: u32);

    /// Draws a circle outline of `line_width` around `center`, optionally filling it.
    fn draw_circle(
        &mut self,
        center: Point2,
        radius: f32,
        color: Color,
        fill: Option<Color>,
        line_width: u32,
    );

    /// Draws a line of text centered on `center`.
    fn fill_text(&mut self, text: &str, center: Point2, color: Color);

    /// Hands the finished frame to whoever displays the surface.
    fn present(&mut self) {}
}

/// A [`Canvas`] that renders into an RGBA image.
pub struct ImageCanvas {
    buf: RgbaImage,
}

impl Default for ImageCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCanvas {
    /// Creates an empty 0x0 canvas.
    pub fn new() -> Self {
        Self {
            buf: RgbaImage::new(0, 0),
        }
    }

    /// Returns the rendered image.
    pub fn image(&self) -> &RgbaImage {
        &self.buf
    }

    pub fn into_image(self) -> RgbaImage {
        self.buf
    }

    fn target(&mut self) -> Target<'_> {
        Target(&mut self.buf)
    }
}

fn to_point((x, y): Point2) -> Point {
    Point::new(x.round() as i32, y.round() as i32)
}

impl Canvas for ImageCanvas {
    fn set_size(&mut self, size: Resolution) {
        if self.buf.dimensions() != (size.width(), size.height()) {
            log::trace!(
                "resizing canvas from {}x{} to {}",
                self.buf.width(),
                self.buf.height(),
                size
            );
            self.buf = RgbaImage::new(size.width(), size.height());
        }
    }

    fn size(&self) -> Resolution {
        Resolution::new(self.buf.width(), self.buf.height())
    }

    fn clear(&mut self) {
        for pixel in self.buf.pixels_mut() {
            *pixel = Rgba(Color::NONE.0);
        }
    }

    fn draw_image(&mut self, image: &RgbaImage, x: i32, y: i32, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if image.dimensions() == (width, height) {
            imageops::replace(&mut self.buf, image, i64::from(x), i64::from(y));
        } else {
            let scaled = imageops::resize(image, width, height, imageops::FilterType::Triangle);
            imageops::replace(&mut self.buf, &scaled, i64::from(x), i64::from(y));
        }
    }

    fn stroke_line(&mut self, from: Point2, to: Point2, color: Color, line_width: u32) {
        let style = PrimitiveStyleBuilder::new()
            .stroke_color(color.into())
            .stroke_width(line_width)
            .build();
        match Line::new(to_point(from), to_point(to))
            .into_styled(style)
            .draw(&mut self.target())
        {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }

    fn draw_circle(
        &mut self,
        center: Point2,
        radius: f32,
        color: Color,
        fill: Option<Color>,
        line_width: u32,
    ) {
        let diameter = (radius * 2.0).round().max(1.0) as u32;
        let mut style = PrimitiveStyleBuilder::new()
            .stroke_color(color.into())
            .stroke_width(line_width);
        if let Some(fill) = fill {
            style = style.fill_color(fill.into());
        }
        match Circle::with_center(to_point(center), diameter)
            .into_styled(style.build())
            .draw(&mut self.target())
        {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }

    fn fill_text(&mut self, text: &str, center: Point2, color: Color) {
        let character_style = MonoTextStyle::new(&ascii::FONT_6X10, color.into());
        let text_style = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Middle)
            .build();
        match Text::with_text_style(text, to_point(center), character_style, text_style)
            .draw(&mut self.target())
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

struct Target<'a>(&'a mut RgbaImage);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = self.0.dimensions();

        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && (point.x as u32) < width
                && point.y >= 0
                && (point.y as u32) < height
            {
                self.0.put_pixel(
                    point.x as u32,
                    point.y as u32,
                    Rgba([color.r(), color.g(), color.b(), 255]),
                );
            }
        }

        Ok(())
    }
}
