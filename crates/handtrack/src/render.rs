//! Paints frame results onto a [`Canvas`].

use std::sync::Arc;

use crate::{
    canvas::{Canvas, Color},
    draw,
    hands::FrameResult,
    landmark::HAND_CONNECTIONS,
    resolution::Resolution,
    timer::Timer,
};

/// Colors and line widths of the hand overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub connector_color: Color,
    pub connector_width: u32,
    pub landmark_color: Color,
    pub landmark_width: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            connector_color: Color::from_rgb8(0x00, 0xFF, 0x00),
            connector_width: 2,
            landmark_color: Color::from_rgb8(0x00, 0xFF, 0xD0),
            landmark_width: 1,
        }
    }
}

/// Owns the drawing surface and draws every [`FrameResult`] it is given.
pub struct Renderer<C> {
    canvas: C,
    style: OverlayStyle,
    t_draw: Arc<Timer>,
}

impl<C: Canvas> Renderer<C> {
    pub fn new(canvas: C) -> Self {
        Self {
            canvas,
            style: OverlayStyle::default(),
            t_draw: Arc::new(Timer::new("draw")),
        }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    /// Returns a handle to the timer measuring [`Renderer::on_results`].
    pub fn timer(&self) -> Arc<Timer> {
        self.t_draw.clone()
    }

    /// Draws `result`: the frame image first, then one skeleton per detected hand, in order.
    ///
    /// The canvas is resized to `video`, the current size of the video frames. If that is not
    /// known yet, the size of the result's image is used instead.
    pub fn on_results(&mut self, video: Resolution, result: &FrameResult) {
        let _guard = self.t_draw.start();

        let size = if video.is_empty() {
            Resolution::new(result.image.width(), result.image.height())
        } else {
            video
        };
        let canvas = &mut self.canvas;
        canvas.set_size(size);

        canvas.save();
        canvas.clear();
        canvas.draw_image(&result.image, 0, 0, size.width(), size.height());
        for landmarks in &result.multi_hand_landmarks {
            draw::connectors(canvas, landmarks, HAND_CONNECTIONS)
                .color(self.style.connector_color)
                .line_width(self.style.connector_width);
            draw::landmarks(canvas, landmarks)
                .color(self.style.landmark_color)
                .line_width(self.style.landmark_width);
        }
        canvas.restore();
        canvas.present();
    }

    /// Replaces the canvas content with `message` on a black background.
    ///
    /// An empty canvas is first resized to the default video size.
    pub fn show_error(&mut self, message: &str) {
        let canvas = &mut self.canvas;
        if canvas.size().is_empty() {
            canvas.set_size(Resolution::PORTRAIT_360P);
        }
        let size = canvas.size();

        canvas.save();
        canvas.clear();
        canvas.fill_text(
            message,
            (size.width() as f32 / 2.0, size.height() as f32 / 2.0),
            Color::WHITE,
        );
        canvas.restore();
        canvas.present();
    }
}
