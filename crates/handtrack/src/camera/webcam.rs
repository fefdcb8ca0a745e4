//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::io;

use anyhow::{bail, Context};
use image::RgbaImage;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{config::Config, resolution::Resolution, timer::Timer};

use super::{
    facing_from_device_name, CameraDevice, CameraError, FacingMode, MediaStream, MediaTrack,
    VideoConstraints,
};

/// Opens V4L2 webcams matching a set of [`VideoConstraints`].
pub struct WebcamDevice {
    config: Config,
}

impl WebcamDevice {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Determines which way the device called `name` is facing.
    ///
    /// A device forced via `HANDTRACK_WEBCAM_NAME` is taken to face whichever way was asked for.
    fn facing_of(&self, name: &str, wanted: FacingMode) -> Option<FacingMode> {
        if self.config.webcam_name.as_deref() == Some(name) {
            return Some(wanted);
        }
        self.config
            .configured_facing(name)
            .or_else(|| facing_from_device_name(name))
    }

    fn open_impl(
        &self,
        dev: Device,
        constraints: &VideoConstraints,
    ) -> anyhow::Result<Option<(Webcam, Option<FacingMode>)>> {
        let caps = dev.capabilities()?;
        let card = caps.card().to_string();
        if let Some(name) = &self.config.webcam_name {
            if card != *name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            card,
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let facing = self.facing_of(&card, constraints.facing.mode());
        if !constraints.facing.accepts(facing) {
            log::debug!(
                "skipping {card}: facing mode {facing:?} does not satisfy '{}'",
                constraints.facing
            );
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev, constraints.resolution)?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            card,
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream()?;
        let webcam = Webcam {
            stream: Some(stream),
            resolution,
            tracks: [MediaTrack::new(card)],
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        };
        Ok(Some((webcam, facing)))
    }
}

impl CameraDevice for WebcamDevice {
    fn open(&mut self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>, CameraError> {
        let mut denied = None;
        let mut fallback = None;
        let devices = linuxvideo::list().context("failed to enumerate video devices")?;
        for res in devices {
            let result = res
                .map_err(anyhow::Error::from)
                .and_then(|dev| self.open_impl(dev, constraints));
            match result {
                Ok(Some((webcam, facing))) => {
                    if facing == Some(constraints.facing.mode()) {
                        return Ok(Box::new(webcam));
                    }
                    // Only reachable for non-exact constraints: keep looking for a better match.
                    if fallback.is_none() {
                        fallback = Some(webcam);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    if is_permission_denied(&e) {
                        log::warn!("{e:#}");
                        denied = Some(format!("{e:#}"));
                    } else {
                        log::debug!("{e:#}");
                    }
                }
            }
        }

        if let Some(webcam) = fallback {
            log::info!(
                "no {} camera found, using '{}'",
                constraints.facing.mode(),
                webcam.tracks[0].label()
            );
            return Ok(Box::new(webcam));
        }

        match denied {
            Some(device) => Err(CameraError::PermissionDenied(device)),
            None => Err(CameraError::NotFound(constraints.facing)),
        }
    }
}

fn is_permission_denied(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|io| io.kind() == io::ErrorKind::PermissionDenied)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

fn negotiate_format(device: &Device, target: Resolution) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    let Some(fmt) = pick_format(&formats, target) else {
        bail!("failed to negotiate a webcam format");
    };
    log::debug!(
        "negotiated {} for requested resolution {}",
        fmt.resolution,
        target
    );
    Ok((
        PixFormat::new(
            fmt.resolution.width(),
            fmt.resolution.height(),
            pixel_format,
        ),
        fmt.frame_interval,
    ))
}

/// Picks the format whose resolution is closest to `target`, then the one with the highest frame
/// rate.
///
/// Webcams typically only offer landscape resolutions, so a portrait `target` is also compared in
/// its transposed orientation.
fn pick_format(formats: &[FrameFormat], target: Resolution) -> Option<FrameFormat> {
    let transposed = Resolution::new(target.height(), target.width());
    formats
        .iter()
        .min_by_key(|fmt| {
            let distance = fmt
                .resolution
                .distance(target)
                .min(fmt.resolution.distance(transposed));
            (distance, fmt.frame_interval)
        })
        .copied()
}

/// A V4L2 webcam stream.
pub struct Webcam {
    stream: Option<ReadStream>,
    resolution: Resolution,
    tracks: [MediaTrack; 1],
    t_dequeue: Timer,
    t_decode: Timer,
}

impl MediaStream for Webcam {
    fn read_frame(&mut self) -> Result<RgbaImage, CameraError> {
        let Some(stream) = &mut self.stream else {
            return Err(CameraError::Stopped);
        };
        let (width, height) = (self.resolution.width(), self.resolution.height());
        let t_decode = &self.t_decode;
        let dequeue_guard = self.t_dequeue.start();
        let image = stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let decoded = t_decode.time(|| {
                    image::load_from_memory_with_format(&buf, image::ImageFormat::Jpeg)
                });
                let image = match decoded {
                    Ok(image) => image.to_rgba8(),
                    Err(e) => {
                        // Webcams occasionally produce corrupted MJPG frames. Hand back a blank
                        // frame instead of skipping it to keep the frame pacing intact.
                        log::error!("webcam decode error: {}", e);
                        RgbaImage::new(width, height)
                    }
                };
                Ok(image)
            })
            .map_err(anyhow::Error::from)?;
        Ok(image)
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    fn stop_tracks(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
        // Dropping the stream releases the device.
        self.stream = None;
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    #[test]
    fn picks_closest_resolution() {
        let formats = [fmt(1920, 1080, 30), fmt(640, 360, 30), fmt(640, 480, 30)];
        let picked = pick_format(&formats, Resolution::PORTRAIT_360P).unwrap();
        assert_eq!(picked.resolution, Resolution::new(640, 360));
    }

    #[test]
    fn prefers_higher_frame_rate() {
        let formats = [fmt(640, 360, 30), fmt(640, 360, 60), fmt(640, 360, 15)];
        let picked = pick_format(&formats, Resolution::PORTRAIT_360P).unwrap();
        assert_eq!(picked.frame_interval, Fract::new(1, 60));
    }

    #[test]
    fn no_formats() {
        assert_eq!(pick_format(&[], Resolution::PORTRAIT_360P), None);
    }
}
