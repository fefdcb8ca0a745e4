//! Hand landmark sets and the hand skeleton topology.

use std::ops::Index;

/// A landmark in normalized image coordinates.
///
/// `x` and `y` are in range 0.0 to 1.0 for points inside the image (Y points down). `z` is the
/// depth relative to the wrist, using roughly the same scale as `x`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Maps the landmark to pixel coordinates on a surface of the given size.
    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// The landmarks of one detected hand, indexed by [`LandmarkIdx`].
///
/// Landmark sets are produced by the inference backend and are read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    landmarks: Vec<NormalizedLandmark>,
}

impl LandmarkSet {
    /// Number of landmarks the hand landmark model outputs.
    pub const NUM_LANDMARKS: usize = 21;

    /// Creates a landmark set from the landmarks in model order.
    pub fn new(landmarks: Vec<NormalizedLandmark>) -> Self {
        Self { landmarks }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NormalizedLandmark> {
        self.landmarks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedLandmark> {
        self.landmarks.iter()
    }

    /// Returns the landmark named `idx`, if the set has it.
    pub fn landmark(&self, idx: LandmarkIdx) -> Option<&NormalizedLandmark> {
        self.get(idx as usize)
    }
}

impl Index<usize> for LandmarkSet {
    type Output = NormalizedLandmark;

    fn index(&self, index: usize) -> &NormalizedLandmark {
        &self.landmarks[index]
    }
}

impl<'a> IntoIterator for &'a LandmarkSet {
    type Item = &'a NormalizedLandmark;
    type IntoIter = std::slice::Iter<'a, NormalizedLandmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Which hand a landmark set belongs to, as seen in the input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// Names for the hand landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// A connection between two landmarks, by index.
pub type Connection = (usize, usize);

/// The hand skeleton: pairs of landmark indices to connect with lines.
pub const HAND_CONNECTIONS: &[Connection] = {
    use LandmarkIdx::*;
    &[
        // Thumb:
        (Wrist as usize, ThumbCmc as usize),
        (ThumbCmc as usize, ThumbMcp as usize),
        (ThumbMcp as usize, ThumbIp as usize),
        (ThumbIp as usize, ThumbTip as usize),
        // Index:
        (Wrist as usize, IndexFingerMcp as usize),
        (IndexFingerMcp as usize, IndexFingerPip as usize),
        (IndexFingerPip as usize, IndexFingerDip as usize),
        (IndexFingerDip as usize, IndexFingerTip as usize),
        // Middle:
        (IndexFingerMcp as usize, MiddleFingerMcp as usize),
        (MiddleFingerMcp as usize, MiddleFingerPip as usize),
        (MiddleFingerPip as usize, MiddleFingerDip as usize),
        (MiddleFingerDip as usize, MiddleFingerTip as usize),
        // Ring:
        (MiddleFingerMcp as usize, RingFingerMcp as usize),
        (RingFingerMcp as usize, RingFingerPip as usize),
        (RingFingerPip as usize, RingFingerDip as usize),
        (RingFingerDip as usize, RingFingerTip as usize),
        // Pinky:
        (RingFingerMcp as usize, PinkyMcp as usize),
        (Wrist as usize, PinkyMcp as usize),
        (PinkyMcp as usize, PinkyPip as usize),
        (PinkyPip as usize, PinkyDip as usize),
        (PinkyDip as usize, PinkyTip as usize),
    ]
};

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn skeleton_is_connected() {
        assert_eq!(HAND_CONNECTIONS.len(), 21);

        let mut seen = HashSet::from([LandmarkIdx::Wrist as usize]);
        // Every edge is listed after one of its endpoints was reached.
        for &(a, b) in HAND_CONNECTIONS {
            assert!(a < LandmarkSet::NUM_LANDMARKS && b < LandmarkSet::NUM_LANDMARKS);
            assert!(seen.contains(&a), "edge {a}-{b} is disconnected");
            seen.insert(b);
        }
        assert_eq!(seen.len(), LandmarkSet::NUM_LANDMARKS);
    }

    #[test]
    fn named_landmarks() {
        let set = LandmarkSet::new(vec![
            NormalizedLandmark::new(0.5, 0.2, 0.0),
            NormalizedLandmark::new(0.1, 0.9, 0.0),
        ]);
        assert_eq!(set.landmark(LandmarkIdx::ThumbCmc), Some(&set[1]));
        assert_eq!(set.landmark(LandmarkIdx::PinkyTip), None);
    }

    #[test]
    fn to_pixel() {
        let lm = NormalizedLandmark::new(0.5, 0.25, -0.1);
        assert_eq!(lm.to_pixel(360, 640), (180.0, 160.0));
    }
}
