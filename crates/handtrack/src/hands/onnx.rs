//! MediaPipe hand tracking networks, run on the CPU with `tract`.
//!
//! Two networks are involved: the palm detector finds new hands in the whole frame, and the hand
//! landmark network computes the 21 landmarks inside a rotated region around each hand. See
//! [`palm`](super::palm) for the former.

use std::path::Path;

use image::RgbaImage;

use crate::{
    landmark::{Handedness, LandmarkSet},
    nn::{image_to_tensor, NeuralNetwork},
    rect::RotatedRect,
    resolution::Resolution,
};

use super::{
    palm::{self, PalmDetection, PalmDetector},
    tracking::{HandEstimate, HandStages, HandTracker},
    AssetLocator, DetectedHand, HandLandmarker, HandsOptions,
};

/// File name of the hand landmark network.
pub const LANDMARK_MODEL: &str = "hand_landmark_full.onnx";
/// File name of the palm detection network.
pub const PALM_MODEL: &str = palm::MODEL;

const NUM_COORDS: usize = LandmarkSet::NUM_LANDMARKS * 3;

/// The hand landmark network.
struct LandmarkNetwork {
    network: NeuralNetwork,
    input: Resolution,
}

impl LandmarkNetwork {
    fn load(path: &Path) -> anyhow::Result<Self> {
        log::debug!("loading hand landmark model from '{}'", path.display());
        let network = NeuralNetwork::from_path(path)?;
        if network.num_inputs() != 1 {
            anyhow::bail!(
                "hand landmark network must take exactly 1 input, this one takes {}",
                network.num_inputs()
            );
        }
        let input = match network.input_shape(0)?.as_slice() {
            &[1, 3, h, w] => Resolution::new(u32::try_from(w)?, u32::try_from(h)?),
            shape => anyhow::bail!("unexpected hand landmark input shape {shape:?}"),
        };
        Ok(Self { network, input })
    }

    fn estimate(&self, image: &RgbaImage, roi: &RotatedRect) -> anyhow::Result<HandEstimate> {
        let outputs = self.network.estimate(image_to_tensor(image, roi, self.input))?;
        let screen_landmarks = outputs.f32_slice(0, NUM_COORDS)?;
        let presence = outputs.f32_slice(1, 1)?[0];
        let raw_handedness = outputs.f32_slice(2, 1)?[0];

        let handedness = if raw_handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        };
        Ok(HandEstimate {
            landmarks: decode_landmarks(screen_landmarks, roi, self.input),
            presence,
            handedness,
        })
    }
}

/// Converts the network's screen landmark output (`x, y, z` triples in input pixels) to frame
/// pixel coordinates.
fn decode_landmarks(coords: &[f32], roi: &RotatedRect, input: Resolution) -> Vec<(f32, f32, f32)> {
    let scale_x = roi.rect().width() / input.width() as f32;
    let scale_y = roi.rect().height() / input.height() as f32;
    coords
        .chunks_exact(3)
        .map(|xyz| {
            let (x, y) = roi.transform_out((xyz[0] * scale_x, xyz[1] * scale_y));
            // Depth uses the same scale as X.
            (x, y, xyz[2] * scale_x)
        })
        .collect()
}

struct Networks {
    palm: PalmDetector,
    landmarks: LandmarkNetwork,
}

impl HandStages for Networks {
    fn detect_palms(
        &mut self,
        image: &RgbaImage,
        threshold: f32,
    ) -> anyhow::Result<Vec<PalmDetection>> {
        self.palm.detect(image, threshold)
    }

    fn estimate_hand(
        &mut self,
        image: &RgbaImage,
        roi: &RotatedRect,
    ) -> anyhow::Result<HandEstimate> {
        self.landmarks.estimate(image, roi)
    }
}

/// A [`HandLandmarker`] backed by the MediaPipe palm detection and hand landmark networks in
/// ONNX format.
///
/// Palms are accepted when their detection score reaches `min_detection_confidence`. A hand is
/// tracked from frame to frame for as long as the landmark network's presence score stays at or
/// above `min_tracking_confidence`. The palm detector only runs while fewer than
/// `max_num_hands` hands are tracked.
pub struct OnnxLandmarker {
    networks: Option<Networks>,
    tracker: HandTracker,
}

impl Default for OnnxLandmarker {
    fn default() -> Self {
        Self {
            networks: None,
            tracker: HandTracker::new(HandsOptions::default()),
        }
    }
}

impl OnnxLandmarker {
    /// Returns whether at least one hand is currently being tracked.
    pub fn is_tracking(&self) -> bool {
        self.tracker.tracked() > 0
    }
}

impl HandLandmarker for OnnxLandmarker {
    fn initialize(&mut self, options: &HandsOptions, assets: &AssetLocator) -> anyhow::Result<()> {
        let palm = PalmDetector::load(&assets.locate(PALM_MODEL))?;
        let landmarks = LandmarkNetwork::load(&assets.locate(LANDMARK_MODEL))?;
        self.networks = Some(Networks { palm, landmarks });
        self.tracker = HandTracker::new(*options);
        Ok(())
    }

    fn process(&mut self, image: &RgbaImage) -> anyhow::Result<Vec<DetectedHand>> {
        let Some(networks) = &mut self.networks else {
            anyhow::bail!("hand tracking models are not loaded");
        };
        self.tracker.track(networks, image)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_relative_eq;

    use crate::rect::Rect;

    use super::*;

    const INPUT: Resolution = Resolution::new(224, 224);

    #[test]
    fn decodes_into_upright_region() {
        let roi: RotatedRect = Rect::from_center(320.0, 240.0, 448.0, 448.0).into();
        let coords = [112.0, 112.0, 0.0, 0.0, 0.0, 22.4];
        let landmarks = decode_landmarks(&coords, &roi, INPUT);
        assert_eq!(landmarks.len(), 2);
        assert_eq!(landmarks[0], (320.0, 240.0, 0.0));
        assert_eq!(landmarks[1], (96.0, 16.0, 44.8));
    }

    #[test]
    fn decodes_into_rotated_region() {
        let roi = RotatedRect::new(Rect::from_center(100.0, 100.0, 224.0, 224.0), FRAC_PI_2);
        // The top center of the network input is on the right of the rotated region.
        let landmarks = decode_landmarks(&[112.0, 0.0, 0.0], &roi, INPUT);
        let (x, y, _) = landmarks[0];
        assert_relative_eq!(x, 212.0, epsilon = 1e-4);
        assert_relative_eq!(y, 100.0, epsilon = 1e-4);
    }

    #[test]
    fn missing_models() {
        let mut landmarker = OnnxLandmarker::default();
        let assets = AssetLocator::dir("/nonexistent/handtrack-assets");
        assert!(landmarker
            .initialize(&HandsOptions::default(), &assets)
            .is_err());
        assert!(landmarker.process(&RgbaImage::new(2, 2)).is_err());
        assert!(!landmarker.is_tracking());
    }
}
