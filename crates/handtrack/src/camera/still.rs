//! A camera that replays a single image.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use image::RgbaImage;

use crate::resolution::Resolution;

use super::{CameraDevice, CameraError, FacingMode, MediaStream, MediaTrack, VideoConstraints};

const DEFAULT_FPS: u32 = 30;

/// A [`CameraDevice`] that streams the same image over and over, paced like a real camera.
///
/// Useful for trying out the screen on machines without a suitable camera.
pub struct StillCamera {
    path: PathBuf,
    facing: Option<FacingMode>,
    frame_interval: Duration,
    image: Option<Arc<RgbaImage>>,
}

impl StillCamera {
    /// Creates a still camera for the image at `path`.
    ///
    /// The camera reports itself as facing the environment. The image is loaded lazily, when the
    /// camera is opened.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            facing: Some(FacingMode::Environment),
            frame_interval: Duration::from_secs(1) / DEFAULT_FPS,
            image: None,
        }
    }

    /// Creates a still camera from an in-memory image.
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            image: Some(Arc::new(image)),
            ..Self::new("<memory>")
        }
    }

    /// Sets the facing mode the camera reports. `None` means unknown.
    pub fn facing(self, facing: Option<FacingMode>) -> Self {
        Self { facing, ..self }
    }

    /// Sets the frame rate to replay the image at. A rate of 0 disables pacing.
    pub fn fps(self, fps: u32) -> Self {
        let frame_interval = match fps {
            0 => Duration::ZERO,
            fps => Duration::from_secs(1) / fps,
        };
        Self {
            frame_interval,
            ..self
        }
    }

    fn load(path: &Path) -> anyhow::Result<RgbaImage> {
        let image = image::open(path)
            .with_context(|| format!("failed to load image '{}'", path.display()))?;
        Ok(image.to_rgba8())
    }
}

impl CameraDevice for StillCamera {
    fn open(&mut self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>, CameraError> {
        if !constraints.facing.accepts(self.facing) {
            return Err(CameraError::NotFound(constraints.facing));
        }

        let image = match &self.image {
            Some(image) => image.clone(),
            None => {
                let image = Arc::new(Self::load(&self.path)?);
                self.image = Some(image.clone());
                image
            }
        };
        log::info!(
            "replaying '{}' ({}x{})",
            self.path.display(),
            image.width(),
            image.height()
        );

        Ok(Box::new(StillStream {
            tracks: [MediaTrack::new(self.path.display().to_string())],
            image,
            frame_interval: self.frame_interval,
            next_frame: None,
        }))
    }
}

struct StillStream {
    tracks: [MediaTrack; 1],
    image: Arc<RgbaImage>,
    frame_interval: Duration,
    next_frame: Option<Instant>,
}

impl MediaStream for StillStream {
    fn read_frame(&mut self) -> Result<RgbaImage, CameraError> {
        if !self.is_live() {
            return Err(CameraError::Stopped);
        }

        let now = Instant::now();
        if let Some(next) = self.next_frame {
            if next > now {
                thread::sleep(next - now);
            }
        }
        self.next_frame = Some(Instant::now() + self.frame_interval);

        Ok((*self.image).clone())
    }

    fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }

    fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    fn stop_tracks(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
    }
}
