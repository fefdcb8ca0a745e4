//! Hand tracking across frames.
//!
//! New hands are found by the palm detector, whose detection is turned into a rotated region
//! containing the whole hand. The landmark network then runs on that region, and its landmarks
//! define the region for the next frame. The palm detector only runs while fewer than
//! `max_num_hands` hands are tracked.

use image::RgbaImage;

use crate::{
    landmark::{Handedness, LandmarkIdx, LandmarkSet, NormalizedLandmark},
    rect::{upright_angle, Rect, RotatedRect},
    resolution::Resolution,
};

use super::{palm::PalmDetection, DetectedHand, HandsOptions};

/// Growth factor from the landmarks' bounding box to the next frame's region.
const ROI_GROW: f32 = 1.5;
/// Smallest region size, in pixels.
const MIN_ROI_SIZE: f32 = 32.0;
/// Regions overlapping at least this much are considered to contain the same hand.
const IOU_THRESH: f32 = 0.3;

/// Output of the landmark network for one region.
#[derive(Debug, Clone)]
pub(crate) struct HandEstimate {
    /// `x, y, z` per landmark, in pixel coordinates of the camera frame.
    pub landmarks: Vec<(f32, f32, f32)>,
    /// Confidence that the region contains a hand.
    pub presence: f32,
    pub handedness: Handedness,
}

/// The two networks the tracker drives.
pub(crate) trait HandStages {
    /// Detects palms scoring at least `threshold`, best first.
    fn detect_palms(
        &mut self,
        image: &RgbaImage,
        threshold: f32,
    ) -> anyhow::Result<Vec<PalmDetection>>;

    /// Runs the landmark network on the region `roi` of `image`.
    fn estimate_hand(&mut self, image: &RgbaImage, roi: &RotatedRect)
        -> anyhow::Result<HandEstimate>;
}

pub(crate) struct HandTracker {
    options: HandsOptions,
    rois: Vec<RotatedRect>,
}

impl HandTracker {
    pub fn new(options: HandsOptions) -> Self {
        Self {
            options,
            rois: Vec::new(),
        }
    }

    /// Returns the number of hands currently being tracked.
    pub fn tracked(&self) -> usize {
        self.rois.len()
    }

    /// Finds the hands in `image`, continuing to track the hands of the previous frame.
    ///
    /// Tracked hands are reported first, in the order they were found, followed by newly
    /// detected ones.
    pub fn track(
        &mut self,
        stages: &mut dyn HandStages,
        image: &RgbaImage,
    ) -> anyhow::Result<Vec<DetectedHand>> {
        let frame = Resolution::new(image.width(), image.height());
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let mut hands = Vec::new();
        let mut rois = Vec::new();
        for roi in std::mem::take(&mut self.rois) {
            match self.estimate(stages, image, &roi, frame)? {
                Some((hand, next)) if !overlaps(&rois, &next) => {
                    hands.push(hand);
                    rois.push(next);
                }
                Some(_) => log::trace!("dropping hand that merged with another one"),
                None => log::trace!("hand lost"),
            }
        }

        if rois.len() < self.options.max_num_hands {
            let palms = stages.detect_palms(image, self.options.min_detection_confidence)?;
            for palm in palms {
                if rois.len() >= self.options.max_num_hands {
                    break;
                }
                let roi = palm.hand_roi();
                if overlaps(&rois, &roi) {
                    continue;
                }
                if let Some((hand, next)) = self.estimate(stages, image, &roi, frame)? {
                    if !overlaps(&rois, &next) {
                        log::trace!("new hand (palm score {:.2})", palm.score);
                        hands.push(hand);
                        rois.push(next);
                    }
                }
            }
        }

        self.rois = rois;
        Ok(hands)
    }

    /// Runs the landmark network on `roi` and computes the region for the next frame.
    ///
    /// Returns [`None`] if the network is not confident enough that the region shows a hand.
    fn estimate(
        &self,
        stages: &mut dyn HandStages,
        image: &RgbaImage,
        roi: &RotatedRect,
        frame: Resolution,
    ) -> anyhow::Result<Option<(DetectedHand, RotatedRect)>> {
        let estimate = stages.estimate_hand(image, roi)?;
        if estimate.presence < self.options.min_tracking_confidence {
            return Ok(None);
        }

        let points = || estimate.landmarks.iter().map(|&(x, y, _)| (x, y));
        let angle = match (
            estimate.landmarks.get(LandmarkIdx::Wrist as usize),
            estimate.landmarks.get(LandmarkIdx::MiddleFingerMcp as usize),
        ) {
            (Some(&(x0, y0, _)), Some(&(x1, y1, _))) => upright_angle((x0, y0), (x1, y1)),
            _ => roi.rotation_radians(),
        };
        let Some(next) = RotatedRect::bounding(angle, points()) else {
            return Ok(None);
        };
        let next = next.map(|rect| {
            let rect = rect.to_square().scale(ROI_GROW);
            if rect.width() < MIN_ROI_SIZE {
                let (x, y) = rect.center();
                Rect::from_center(x, y, MIN_ROI_SIZE, MIN_ROI_SIZE)
            } else {
                rect
            }
        });

        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let landmarks = estimate
            .landmarks
            .iter()
            .map(|&(x, y, z)| NormalizedLandmark::new(x / w, y / h, z / w))
            .collect();
        let hand = DetectedHand {
            landmarks: LandmarkSet::new(landmarks),
            handedness: estimate.handedness,
            score: estimate.presence,
        };
        Ok(Some((hand, next)))
    }
}

fn overlaps(rois: &[RotatedRect], roi: &RotatedRect) -> bool {
    rois.iter()
        .any(|other| other.rect().iou(roi.rect()) >= IOU_THRESH)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_relative_eq;

    use super::*;

    /// Palm detections of upright palms, always the same.
    ///
    /// Every region passed to the landmark stage yields a hand that is upright in the region.
    struct FakeStages {
        palms: Vec<PalmDetection>,
        presence: f32,
        detections: Vec<f32>,
        estimates: Vec<RotatedRect>,
    }

    impl FakeStages {
        fn new(palms: Vec<PalmDetection>) -> Self {
            Self {
                palms,
                presence: 0.9,
                detections: Vec::new(),
                estimates: Vec::new(),
            }
        }
    }

    impl HandStages for FakeStages {
        fn detect_palms(
            &mut self,
            _: &RgbaImage,
            threshold: f32,
        ) -> anyhow::Result<Vec<PalmDetection>> {
            self.detections.push(threshold);
            Ok(self.palms.clone())
        }

        fn estimate_hand(
            &mut self,
            _: &RgbaImage,
            roi: &RotatedRect,
        ) -> anyhow::Result<HandEstimate> {
            self.estimates.push(*roi);
            let s = roi.rect().width();
            let landmarks = (0..LandmarkSet::NUM_LANDMARKS)
                .map(|i| {
                    // Spans 2/3 of the region, so that the next region is the same.
                    let (dx, dy) = match i {
                        0 => (0.0, 1.0),
                        9 => (0.0, 0.0),
                        i if i % 2 == 0 => (-0.5, -1.0),
                        _ => (0.5, -1.0),
                    };
                    let local = (s / 2.0 + dx * s / 3.0, s / 2.0 + dy * s / 3.0);
                    let (x, y) = roi.transform_out(local);
                    (x, y, 0.0)
                })
                .collect();
            Ok(HandEstimate {
                landmarks,
                presence: self.presence,
                handedness: Handedness::Left,
            })
        }
    }

    fn palm_at(x: f32, y: f32) -> PalmDetection {
        let mut keypoints = [(x, y); 7];
        keypoints[0] = (x, y + 10.0);
        keypoints[2] = (x, y - 10.0);
        PalmDetection {
            score: 0.9,
            rect: Rect::from_center(x, y, 40.0, 40.0),
            keypoints,
        }
    }

    fn image() -> RgbaImage {
        RgbaImage::new(640, 480)
    }

    fn options(max_num_hands: usize) -> HandsOptions {
        HandsOptions {
            max_num_hands,
            min_detection_confidence: 0.75,
            min_tracking_confidence: 0.5,
        }
    }

    #[test]
    fn detection_seeds_tracking() {
        let mut stages = FakeStages::new(vec![palm_at(320.0, 240.0)]);
        let mut tracker = HandTracker::new(options(1));

        let hands = tracker.track(&mut stages, &image()).unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].handedness, Handedness::Left);
        assert_eq!(stages.detections, [0.75]);
        assert_eq!(stages.estimates.len(), 1);
        assert_eq!(stages.estimates[0], palm_at(320.0, 240.0).hand_roi());
        assert_eq!(tracker.tracked(), 1);

        // Tracking the hand doesn't run the detector again.
        let hands = tracker.track(&mut stages, &image()).unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(stages.detections.len(), 1);
        assert_eq!(stages.estimates.len(), 2);
        let (x, _) = stages.estimates[1].rect().center();
        assert_relative_eq!(x, 320.0, epsilon = 1e-3);

        let wrist = hands[0].landmarks[0];
        assert_relative_eq!(wrist.x, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn lost_hand_is_detected_again() {
        let mut stages = FakeStages::new(vec![palm_at(320.0, 240.0)]);
        let mut tracker = HandTracker::new(options(1));
        tracker.track(&mut stages, &image()).unwrap();

        stages.presence = 0.4;
        assert!(tracker.track(&mut stages, &image()).unwrap().is_empty());
        assert_eq!(tracker.tracked(), 0);

        // Below the tracking threshold, so the new detection is not accepted either.
        assert_eq!(stages.detections.len(), 2);

        stages.presence = 0.6;
        assert_eq!(tracker.track(&mut stages, &image()).unwrap().len(), 1);
        assert_eq!(stages.detections.len(), 3);
    }

    #[test]
    fn respects_max_num_hands() {
        let palms = vec![
            palm_at(100.0, 100.0),
            palm_at(500.0, 100.0),
            palm_at(300.0, 380.0),
        ];
        let mut stages = FakeStages::new(palms.clone());
        let mut tracker = HandTracker::new(options(2));
        assert_eq!(tracker.track(&mut stages, &image()).unwrap().len(), 2);

        let mut stages = FakeStages::new(palms);
        let mut tracker = HandTracker::new(options(3));
        assert_eq!(tracker.track(&mut stages, &image()).unwrap().len(), 3);
        tracker.track(&mut stages, &image()).unwrap();
        assert_eq!(stages.detections.len(), 1);
    }

    #[test]
    fn tracked_hands_are_not_detected_twice() {
        let mut stages = FakeStages::new(vec![palm_at(320.0, 240.0)]);
        let mut tracker = HandTracker::new(options(2));
        assert_eq!(tracker.track(&mut stages, &image()).unwrap().len(), 1);

        // The detector runs again since another hand could appear, but it finds the same palm.
        assert_eq!(tracker.track(&mut stages, &image()).unwrap().len(), 1);
        assert_eq!(stages.detections.len(), 2);
        assert_eq!(tracker.tracked(), 1);
    }

    #[test]
    fn region_follows_hand_rotation() {
        let mut palm = palm_at(320.0, 240.0);
        // Fingers pointing right.
        palm.keypoints[0] = (310.0, 240.0);
        palm.keypoints[2] = (330.0, 240.0);
        let mut stages = FakeStages::new(vec![palm]);
        let mut tracker = HandTracker::new(options(1));
        tracker.track(&mut stages, &image()).unwrap();
        tracker.track(&mut stages, &image()).unwrap();

        assert_relative_eq!(stages.estimates[0].rotation_radians(), FRAC_PI_2);
        assert_relative_eq!(stages.estimates[1].rotation_radians(), FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn empty_frame() {
        let mut stages = FakeStages::new(vec![palm_at(0.0, 0.0)]);
        let mut tracker = HandTracker::new(options(1));
        assert!(tracker
            .track(&mut stages, &RgbaImage::new(0, 0))
            .unwrap()
            .is_empty());
        assert!(stages.detections.is_empty());
    }
}
