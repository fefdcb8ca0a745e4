//! Palm detection.
//!
//! The palm detector is a Single Shot MultiBox Detector (SSD): for every anchor it outputs a
//! score and a box with 7 keypoints, relative to the anchor's position. Overlapping detections of
//! the same palm are merged by confidence-weighted averaging.

use std::path::Path;

use image::RgbaImage;

use crate::{
    nn::{image_to_tensor, NeuralNetwork},
    rect::{upright_angle, Rect, RotatedRect},
    resolution::Resolution,
};

/// File name of the palm detection network.
pub const MODEL: &str = "palm_detection_full.onnx";

/// Detections overlapping at least this much are considered to be the same palm.
const NMS_IOU_THRESH: f32 = 0.3;

/// Palm rectangle to hand region: distance to move towards the fingers, relative to the palm
/// height.
const PALM_SHIFT_Y: f32 = -0.5;
/// Palm rectangle to hand region: scale factor applied after squaring the rectangle.
const PALM_TO_HAND: f32 = 2.6;

/// Number of values per anchor in the box output: box center and size, then 7 keypoints.
const BOX_PARAMS: usize = 18;

/// A palm keypoint, indexing [`PalmDetection::keypoints`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

const NUM_KEYPOINTS: usize = 7;

/// A detected palm, in pixel coordinates of the camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PalmDetection {
    pub score: f32,
    pub rect: Rect,
    pub keypoints: [(f32, f32); NUM_KEYPOINTS],
}

impl PalmDetection {
    fn keypoint(&self, kp: Keypoint) -> (f32, f32) {
        self.keypoints[kp as usize]
    }

    /// Clockwise rotation of the hand. 0 means the fingers point up.
    pub fn angle(&self) -> f32 {
        upright_angle(
            self.keypoint(Keypoint::Wrist),
            self.keypoint(Keypoint::MiddleFingerMcp),
        )
    }

    /// Computes the region that is expected to contain the whole hand, upright in its own
    /// coordinate system.
    pub fn hand_roi(&self) -> RotatedRect {
        RotatedRect::new(self.rect, self.angle())
            .shift_local(0.0, PALM_SHIFT_Y * self.rect.height())
            .map(|rect| rect.to_square().scale(PALM_TO_HAND))
    }

    fn map(&mut self, f: impl Fn((f32, f32)) -> (f32, f32)) {
        let (x, y) = f(self.rect.center());
        let (x1, y1) = f((
            self.rect.left() + self.rect.width(),
            self.rect.top() + self.rect.height(),
        ));
        let (x0, y0) = f((self.rect.left(), self.rect.top()));
        self.rect = Rect::from_center(x, y, x1 - x0, y1 - y0);
        for kp in &mut self.keypoints {
            *kp = f(*kp);
        }
    }
}

/// Computes the anchor centers, in range 0.0 to 1.0, for a network with the given input size.
///
/// The network has 2 output layers: one at 1/8 of the input resolution with 2 anchors per cell,
/// and one at 1/16 with 6 anchors per cell. All anchors of a cell share the cell's center.
fn anchors(input: Resolution) -> Vec<(f32, f32)> {
    let mut anchors = Vec::new();
    for (stride, per_cell) in [(8, 2), (16, 6)] {
        let (w, h) = (input.width() / stride, input.height() / stride);
        for y in 0..h {
            for x in 0..w {
                let center = ((x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32);
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }
    anchors
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Decodes all anchors scoring at least `threshold`, in network input pixel coordinates.
fn decode(
    boxes: &[f32],
    scores: &[f32],
    anchors: &[(f32, f32)],
    input: Resolution,
    threshold: f32,
) -> Vec<PalmDetection> {
    let (w, h) = (input.width() as f32, input.height() as f32);
    scores
        .iter()
        .zip(boxes.chunks_exact(BOX_PARAMS))
        .zip(anchors)
        .filter_map(|((&raw_score, params), &(ax, ay))| {
            let score = sigmoid(raw_score);
            if score < threshold {
                return None;
            }
            let at = |i: usize| (params[i] + ax * w, params[i + 1] + ay * h);
            let (xc, yc) = at(0);
            let mut keypoints = [(0.0, 0.0); NUM_KEYPOINTS];
            for (i, kp) in keypoints.iter_mut().enumerate() {
                *kp = at(4 + i * 2);
            }
            Some(PalmDetection {
                score,
                rect: Rect::from_center(xc, yc, params[2], params[3]),
                keypoints,
            })
        })
        .collect()
}

/// Merges overlapping detections into their confidence-weighted average.
///
/// The merged detection keeps the score of the best detection in its group. The result is
/// ordered by descending score.
fn non_max_average(mut detections: Vec<PalmDetection>) -> Vec<PalmDetection> {
    // Ascending, so that the best detection is at the back.
    detections.sort_unstable_by(|a, b| a.score.total_cmp(&b.score));

    let mut merged = Vec::new();
    while let Some(seed) = detections.pop() {
        let mut group = vec![seed.clone()];
        detections.retain(|other| {
            if seed.rect.iou(&other.rect) >= NMS_IOU_THRESH {
                group.push(other.clone());
                false
            } else {
                true
            }
        });

        let total: f32 = group.iter().map(|det| det.score).sum();
        let mut rect = [0.0; 4];
        let mut keypoints = [(0.0, 0.0); NUM_KEYPOINTS];
        for det in &group {
            let weight = det.score / total;
            let (x, y) = det.rect.center();
            for (acc, v) in rect
                .iter_mut()
                .zip([x, y, det.rect.width(), det.rect.height()])
            {
                *acc += v * weight;
            }
            for (acc, kp) in keypoints.iter_mut().zip(det.keypoints) {
                acc.0 += kp.0 * weight;
                acc.1 += kp.1 * weight;
            }
        }
        merged.push(PalmDetection {
            score: seed.score,
            rect: Rect::from_center(rect[0], rect[1], rect[2], rect[3]),
            keypoints,
        });
    }
    merged
}

/// The palm detection network.
pub struct PalmDetector {
    network: NeuralNetwork,
    input: Resolution,
    anchors: Vec<(f32, f32)>,
}

impl PalmDetector {
    /// Loads the palm detection network from `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        log::debug!("loading palm detection model from '{}'", path.display());
        let network = NeuralNetwork::from_path(path)?;
        let input = match network.input_shape(0)?.as_slice() {
            &[1, 3, h, w] if h == w => Resolution::new(u32::try_from(w)?, u32::try_from(h)?),
            shape => anyhow::bail!("unexpected palm detection input shape {shape:?}"),
        };
        Ok(Self {
            network,
            input,
            anchors: anchors(input),
        })
    }

    /// Detects palms in `image` that score at least `threshold`, best first.
    pub fn detect(&self, image: &RgbaImage, threshold: f32) -> anyhow::Result<Vec<PalmDetection>> {
        // Letterbox the frame into the square network input.
        let (w, h) = (image.width() as f32, image.height() as f32);
        let view = Rect::from_center(w / 2.0, h / 2.0, w, h).to_square();
        let outputs = self
            .network
            .estimate(image_to_tensor(image, &RotatedRect::from(view), self.input))?;

        let count = self.anchors.len();
        let boxes = outputs.f32_slice(0, count * BOX_PARAMS)?;
        let scores = outputs.f32_slice(1, count)?;
        let detections = decode(boxes, scores, &self.anchors, self.input, threshold);

        let scale = view.width() / self.input.width() as f32;
        let mut palms = non_max_average(detections);
        for palm in &mut palms {
            palm.map(|(x, y)| (x * scale + view.left(), y * scale + view.top()));
        }
        log::trace!("{} palm(s) detected", palms.len());
        Ok(palms)
    }
}
