//! Environment-based configuration.

use std::{env, path::PathBuf};

use crate::camera::{FacingConstraint, FacingMode, VideoConstraints};

pub const ENV_VAR_WEBCAM_NAME: &str = "HANDTRACK_WEBCAM_NAME";
pub const ENV_VAR_ENVIRONMENT_CAMERAS: &str = "HANDTRACK_ENVIRONMENT_CAMERAS";
pub const ENV_VAR_USER_CAMERAS: &str = "HANDTRACK_USER_CAMERAS";
pub const ENV_VAR_FACING: &str = "HANDTRACK_FACING";
pub const ENV_VAR_ASSETS: &str = "HANDTRACK_ASSETS";
pub const ENV_VAR_IMAGE: &str = "HANDTRACK_IMAGE";

const DEFAULT_ASSET_DIR: &str = "assets";

/// Runtime configuration of the hand tracking screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Forces a specific V4L2 device (matched against its card name).
    pub webcam_name: Option<String>,
    /// Device names known to face away from the user.
    pub environment_cameras: Vec<String>,
    /// Device names known to face the user.
    pub user_cameras: Vec<String>,
    /// Whether the rear-facing camera is a hard requirement.
    pub strict_facing: bool,
    pub asset_dir: PathBuf,
    /// Replays this image file instead of opening a webcam.
    pub still_image: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webcam_name: None,
            environment_cameras: Vec::new(),
            user_cameras: Vec::new(),
            strict_facing: true,
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            still_image: None,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Config::default();

        if let Some(name) = lookup(ENV_VAR_WEBCAM_NAME) {
            log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
            config.webcam_name = Some(name);
        }
        if let Some(list) = lookup(ENV_VAR_ENVIRONMENT_CAMERAS) {
            config.environment_cameras = split_list(&list);
        }
        if let Some(list) = lookup(ENV_VAR_USER_CAMERAS) {
            config.user_cameras = split_list(&list);
        }
        if let Some(facing) = lookup(ENV_VAR_FACING) {
            config.strict_facing = match facing.trim() {
                "exact" => true,
                "ideal" => false,
                other => anyhow::bail!(
                    "invalid value '{other}' for `{ENV_VAR_FACING}` (expected `exact` or `ideal`)"
                ),
            };
        }
        if let Some(dir) = lookup(ENV_VAR_ASSETS) {
            config.asset_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_VAR_IMAGE) {
            config.still_image = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Returns the camera constraints of the hand tracking screen: a 360x640 rear camera.
    pub fn video_constraints(&self) -> VideoConstraints {
        let facing = if self.strict_facing {
            FacingConstraint::Exact(FacingMode::Environment)
        } else {
            FacingConstraint::Ideal(FacingMode::Environment)
        };
        VideoConstraints {
            facing,
            ..VideoConstraints::default()
        }
    }

    /// Looks up the configured facing mode of a camera device.
    pub fn configured_facing(&self, device_name: &str) -> Option<FacingMode> {
        if self.environment_cameras.iter().any(|n| n == device_name) {
            Some(FacingMode::Environment)
        } else if self.user_cameras.iter().any(|n| n == device_name) {
            Some(FacingMode::User)
        } else {
            None
        }
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
