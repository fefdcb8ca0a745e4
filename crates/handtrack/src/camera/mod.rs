//! The capture surface: camera devices, media streams and the video element.
//!
//! A [`CameraDevice`] turns [`VideoConstraints`] into a live [`MediaStream`]. The stream is then
//! attached to a [`VideoElement`], which is what the rest of the screen reads frames and frame
//! dimensions from. Clearing the element's source stops every track of the stream, releasing the
//! camera hardware.

pub mod still;
pub mod webcam;

use std::{fmt, sync::Arc};

use image::RgbaImage;
use thiserror::Error;

use crate::{resolution::Resolution, timer::Timer};

/// A captured camera frame.
///
/// Frames are shared between the capture loop, the inference worker and the renderer, so they are
/// reference counted.
pub type Frame = Arc<RgbaImage>;

/// The direction a camera is facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacingMode {
    /// Faces the user (selfie camera).
    User,
    /// Faces away from the user (rear camera).
    Environment,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        })
    }
}

/// How strictly a [`FacingMode`] is required when opening a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingConstraint {
    /// Only devices facing this way are acceptable. Opening fails if there is none.
    Exact(FacingMode),
    /// Devices facing this way are preferred, but any device is acceptable.
    Ideal(FacingMode),
}

impl FacingConstraint {
    /// Returns the requested facing mode.
    pub fn mode(&self) -> FacingMode {
        match *self {
            FacingConstraint::Exact(mode) | FacingConstraint::Ideal(mode) => mode,
        }
    }

    /// Returns whether a device with the given (possibly unknown) facing mode satisfies `self`.
    pub fn accepts(&self, facing: Option<FacingMode>) -> bool {
        match *self {
            FacingConstraint::Exact(mode) => facing == Some(mode),
            FacingConstraint::Ideal(_) => true,
        }
    }
}

impl fmt::Display for FacingConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingConstraint::Exact(mode) => write!(f, "exactly {mode}-facing"),
            FacingConstraint::Ideal(mode) => write!(f, "ideally {mode}-facing"),
        }
    }
}

/// Constraints for acquiring a camera stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    /// Nominal resolution. Devices may deliver a different one.
    pub resolution: Resolution,
    pub facing: FacingConstraint,
}

impl Default for VideoConstraints {
    /// A 360x640 stream from a camera that must face away from the user.
    fn default() -> Self {
        Self {
            resolution: Resolution::PORTRAIT_360P,
            facing: FacingConstraint::Exact(FacingMode::Environment),
        }
    }
}

/// Errors raised while acquiring or reading a camera stream.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No device satisfies the requested constraints.
    #[error("no {0} camera found")]
    NotFound(FacingConstraint),

    /// Access to the camera was denied.
    #[error("permission to access camera '{0}' denied")]
    PermissionDenied(String),

    /// The stream has been stopped, or the video element has no live source.
    #[error("camera stream is not running")]
    Stopped,

    /// Any other device failure.
    #[error(transparent)]
    Device(#[from] anyhow::Error),
}

/// A source of camera streams.
pub trait CameraDevice {
    /// Acquires a stream satisfying `constraints`.
    ///
    /// This can block for a significant amount of time while the device initializes.
    fn open(&mut self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>, CameraError>;
}

/// One track of a [`MediaStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    label: String,
    live: bool,
}

impl MediaTrack {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            live: true,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `true` until the track is stopped.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Permanently stops the track.
    pub fn stop(&mut self) {
        if self.live {
            log::debug!("stopping track '{}'", self.label);
            self.live = false;
        }
    }
}

/// A live camera stream.
pub trait MediaStream: Send {
    /// Blocks until the next frame is available and returns it.
    ///
    /// Returns [`CameraError::Stopped`] once the stream's tracks have been stopped.
    fn read_frame(&mut self) -> Result<RgbaImage, CameraError>;

    /// Returns the resolution the stream was negotiated at.
    fn resolution(&self) -> Resolution;

    fn tracks(&self) -> &[MediaTrack];

    /// Stops every track and releases the underlying device. Must be idempotent.
    fn stop_tracks(&mut self);

    /// Returns `true` if any track is still live.
    fn is_live(&self) -> bool {
        self.tracks().iter().any(MediaTrack::is_live)
    }

    /// Returns the stream's profiling timers, if it keeps any.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

/// The capture surface: presents the frames of a [`MediaStream`].
///
/// Tracks the dimensions of the most recently read frame, which is what the renderer sizes its
/// canvas to.
pub struct VideoElement {
    source: Option<Box<dyn MediaStream>>,
    paused: bool,
    video_resolution: Resolution,
}

impl Default for VideoElement {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoElement {
    pub fn new() -> Self {
        Self {
            source: None,
            paused: true,
            video_resolution: Resolution::ZERO,
        }
    }

    /// Attaches `stream` and starts playing it.
    ///
    /// A previously attached stream is stopped first.
    pub fn set_source(&mut self, stream: Box<dyn MediaStream>) {
        self.clear_source();
        self.video_resolution = stream.resolution();
        self.source = Some(stream);
        self.paused = false;
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&dyn MediaStream> {
        self.source.as_deref()
    }

    pub fn play(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns the dimensions of the current video frame.
    pub fn video_resolution(&self) -> Resolution {
        self.video_resolution
    }

    /// Returns the profiling timers of the attached stream.
    pub fn timers(&self) -> Vec<&Timer> {
        self.source.as_ref().map_or_else(Vec::new, |stream| stream.timers())
    }

    /// Reads the next frame from the attached stream.
    ///
    /// Fails with [`CameraError::Stopped`] when paused or without a source.
    pub fn read_frame(&mut self) -> Result<Frame, CameraError> {
        if self.paused {
            return Err(CameraError::Stopped);
        }
        let stream = self.source.as_mut().ok_or(CameraError::Stopped)?;
        let image = stream.read_frame()?;
        self.video_resolution = Resolution::new(image.width(), image.height());
        Ok(Arc::new(image))
    }

    /// Stops all tracks of the attached stream and detaches it.
    pub fn clear_source(&mut self) {
        if let Some(mut stream) = self.source.take() {
            stream.stop_tracks();
            log::debug!("video source cleared");
        }
    }
}

impl Drop for VideoElement {
    fn drop(&mut self) {
        self.clear_source();
    }
}

/// Classifies a device by its name, for devices without a configured facing mode.
pub(crate) fn facing_from_device_name(name: &str) -> Option<FacingMode> {
    let name = name.to_ascii_lowercase();
    const ENVIRONMENT: &[&str] = &["back", "rear", "environment", "world"];
    const USER: &[&str] = &["front", "user", "integrated", "facetime", "selfie"];
    if ENVIRONMENT.iter().any(|word| name.contains(word)) {
        Some(FacingMode::Environment)
    } else if USER.iter().any(|word| name.contains(word)) {
        Some(FacingMode::User)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::test::FakeStream;

    use super::*;

    #[test]
    fn facing_constraints() {
        let exact = FacingConstraint::Exact(FacingMode::Environment);
        assert!(exact.accepts(Some(FacingMode::Environment)));
        assert!(!exact.accepts(Some(FacingMode::User)));
        assert!(!exact.accepts(None));

        let ideal = FacingConstraint::Ideal(FacingMode::Environment);
        assert!(ideal.accepts(None));
        assert!(ideal.accepts(Some(FacingMode::User)));
        assert_eq!(ideal.mode(), FacingMode::Environment);
    }

    #[test]
    fn device_names() {
        assert_eq!(
            facing_from_device_name("Rear Camera (ov5640)"),
            Some(FacingMode::Environment)
        );
        assert_eq!(
            facing_from_device_name("Integrated_Webcam_HD"),
            Some(FacingMode::User)
        );
        assert_eq!(facing_from_device_name("UVC Camera"), None);
    }

    #[test]
    fn video_element_tracks_frame_size() {
        let stream = FakeStream::new(Resolution::new(360, 640));
        let tracks = stream.track_state();
        let mut video = VideoElement::new();
        assert!(video.read_frame().is_err());

        video.set_source(Box::new(stream));
        assert!(!video.is_paused());
        assert_eq!(video.video_resolution(), Resolution::new(360, 640));

        tracks.lock().unwrap().next_resolution = Some(Resolution::new(480, 640));
        let frame = video.read_frame().unwrap();
        let timers = video.timers();
        assert_eq!(timers.len(), 1);
        assert!(timers[0].to_string().starts_with("fake read: 1x"));
        assert_eq!((frame.width(), frame.height()), (480, 640));
        assert_eq!(video.video_resolution(), Resolution::new(480, 640));

        video.pause();
        assert!(matches!(video.read_frame(), Err(CameraError::Stopped)));

        video.clear_source();
        assert!(!video.has_source());
        assert!(video.timers().is_empty());
        assert!(tracks.lock().unwrap().stopped);
    }

    #[test]
    fn dropping_video_stops_tracks() {
        let stream = FakeStream::new(Resolution::PORTRAIT_360P);
        let tracks = stream.track_state();
        let mut video = VideoElement::new();
        video.set_source(Box::new(stream));
        drop(video);
        assert!(tracks.lock().unwrap().stopped);
    }
}
