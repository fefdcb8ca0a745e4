//! Live camera screen with hand landmark overlays.
//!
//! This crate wires three pieces together:
//!
//! * a capture surface ([`camera`]) that streams frames from a rear-facing camera,
//! * an inference adapter ([`hands`]) that hands each frame to a pre-trained hand landmark model,
//! * a renderer ([`render`]) that paints the frame and the hand skeleton onto a [`canvas`].
//!
//! [`view::HandTrackView`] owns all of them and implements the screen's lifecycle, including the
//! "back to home" action that releases the camera and navigates away.
//!
//! # Coordinates
//!
//! Landmarks are reported in normalized image coordinates: X points to the right and Y points
//! *down*, both in range 0.0 to 1.0 for points inside the image. Z is a relative depth with the
//! same scale as X, smaller values being closer to the camera.
//!
//! # Environment Variables
//!
//! Most of the configuration is read from environment variables, see [`config::Config`]:
//!
//! * `HANDTRACK_WEBCAM_NAME`: Forces the V4L2 device to use. A forced device is assumed to face the
//!   requested direction.
//! * `HANDTRACK_ENVIRONMENT_CAMERAS` and `HANDTRACK_USER_CAMERAS`: Comma-separated lists of device
//!   names with a known facing mode.
//! * `HANDTRACK_FACING`: `exact` (the default) requires a rear-facing camera, `ideal` accepts any.
//! * `HANDTRACK_ASSETS`: Directory to load model files from. Defaults to `assets`.
//! * `HANDTRACK_IMAGE`: Replays a still image instead of opening a webcam.

use log::LevelFilter;

pub mod camera;
pub mod canvas;
pub mod config;
pub mod draw;
pub mod gui;
pub mod hands;
pub mod landmark;
pub mod navigation;
pub mod nn;
pub mod rect;
pub mod render;
pub mod resolution;
pub mod termination;
pub mod timer;
pub mod view;


pub use gui::run;
pub use handtrack_macros::main;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and `handtrack` will log at *trace*
/// level. Otherwise, they will log at *debug* level. `RUST_LOG` overrides both.
///
/// `wgpu` will always log at *warn* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
