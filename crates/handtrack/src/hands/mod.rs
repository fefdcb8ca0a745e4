//! The inference adapter.
//!
//! [`Hands`] feeds camera frames to a [`HandLandmarker`] (the pre-trained model, treated as a
//! black box) running on its own worker thread, and reports each processed frame to a single
//! result callback as a [`FrameResult`].

pub mod onnx;
pub mod palm;
mod tracking;

use std::{
    any::Any,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    path::PathBuf,
    sync::Arc,
};

use image::RgbaImage;
use pawawwewism::{promise, Promise, Worker};
use thiserror::Error;

use crate::{
    camera::Frame,
    landmark::{Handedness, LandmarkSet},
    timer::Timer,
};

/// Tracking parameters, fixed for the lifetime of a [`Hands`] instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandsOptions {
    /// Maximum number of hands reported per frame. Must be at least 1.
    pub max_num_hands: usize,
    /// Minimum confidence (0.0 to 1.0) required to start tracking a newly detected hand.
    pub min_detection_confidence: f32,
    /// Minimum confidence (0.0 to 1.0) required to keep tracking a hand across frames.
    pub min_tracking_confidence: f32,
}

impl Default for HandsOptions {
    fn default() -> Self {
        Self {
            max_num_hands: 1,
            min_detection_confidence: 0.75,
            min_tracking_confidence: 0.7,
        }
    }
}

impl HandsOptions {
    pub fn validate(&self) -> Result<(), HandsError> {
        if self.max_num_hands == 0 {
            return Err(HandsError::InvalidOptions(
                "`max_num_hands` must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HandsError::InvalidOptions(format!(
                    "`{name}` must be in range 0.0 to 1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Errors raised by the inference adapter.
#[derive(Debug, Error)]
pub enum HandsError {
    #[error("invalid hand tracking options: {0}")]
    InvalidOptions(String),

    /// The model or its assets could not be loaded.
    #[error("failed to initialize hand landmark model: {0:#}")]
    Initialization(anyhow::Error),

    /// [`Hands::close`] was called.
    #[error("hand tracking has been shut down")]
    Closed,

    /// The model panicked while processing a frame. The adapter is closed afterwards.
    #[error("hand landmark model crashed: {0}")]
    Crashed(String),

    /// The worker thread dropped the frame without answering.
    #[error("hand landmark worker exited unexpectedly")]
    WorkerGone,
}

/// Maps model asset file names to their location.
#[derive(Clone)]
pub struct AssetLocator {
    locate: Arc<dyn Fn(&str) -> PathBuf + Send + Sync>,
}

impl AssetLocator {
    /// Looks up assets in `dir`.
    pub fn dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self::from_fn(move |file| dir.join(file))
    }

    pub fn from_fn<F>(locate: F) -> Self
    where
        F: Fn(&str) -> PathBuf + Send + Sync + 'static,
    {
        Self {
            locate: Arc::new(locate),
        }
    }

    pub fn locate(&self, file: &str) -> PathBuf {
        (self.locate)(file)
    }
}

impl fmt::Debug for AssetLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetLocator")
            .field("example", &self.locate("<file>"))
            .finish()
    }
}

/// One hand found by a [`HandLandmarker`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedHand {
    pub landmarks: LandmarkSet,
    pub handedness: Handedness,
    /// Model confidence that a hand is present, 0.0 to 1.0.
    pub score: f32,
}

/// A pre-trained hand landmark model.
pub trait HandLandmarker: Send + 'static {
    /// Loads the model and prepares it for `options`. Called once, before any frame.
    fn initialize(&mut self, options: &HandsOptions, assets: &AssetLocator) -> anyhow::Result<()>;

    /// Finds the hands in `image`.
    ///
    /// Implementations may keep state between frames to track hands.
    fn process(&mut self, image: &RgbaImage) -> anyhow::Result<Vec<DetectedHand>>;
}

/// The outcome of processing one frame.
#[derive(Debug, Clone)]
pub struct FrameResult {
    /// The frame the landmarks were computed for.
    pub image: Frame,
    /// Landmarks of each hand, in the order reported by the model. May be empty.
    pub multi_hand_landmarks: Vec<LandmarkSet>,
    /// Handedness of each hand, parallel to `multi_hand_landmarks`.
    pub multi_handedness: Vec<Handedness>,
}

impl FrameResult {
    /// A result for `image` that contains no hands.
    pub fn empty(image: Frame) -> Self {
        Self {
            image,
            multi_hand_landmarks: Vec::new(),
            multi_handedness: Vec::new(),
        }
    }

    fn from_detections(image: Frame, hands: Vec<DetectedHand>) -> Self {
        let (multi_hand_landmarks, multi_handedness) = hands
            .into_iter()
            .map(|hand| (hand.landmarks, hand.handedness))
            .unzip();
        Self {
            image,
            multi_hand_landmarks,
            multi_handedness,
        }
    }
}

type ResultCallback = Box<dyn FnMut(FrameResult) + Send>;

/// The worker's answer for one frame. `Err` holds the message of a model panic.
type Outcome = Result<anyhow::Result<Vec<DetectedHand>>, String>;

struct Job {
    image: Frame,
    result: Promise<Outcome>,
}

/// The inference adapter: submits frames to a [`HandLandmarker`] and reports the results.
///
/// Frames are processed strictly one at a time: [`Hands::send`] waits for the previous frame's
/// result before returning, so no additional flow control is needed.
pub struct Hands {
    worker: Option<Worker<Job>>,
    callback: Option<ResultCallback>,
    t_inference: Arc<Timer>,
}

impl Hands {
    /// Validates `options`, initializes `landmarker` and moves it to a worker thread.
    pub fn new(
        mut landmarker: Box<dyn HandLandmarker>,
        options: HandsOptions,
        assets: &AssetLocator,
    ) -> Result<Self, HandsError> {
        options.validate()?;
        landmarker
            .initialize(&options, assets)
            .map_err(HandsError::Initialization)?;

        let t_inference = Arc::new(Timer::new("inference"));
        let timer = t_inference.clone();
        let max_num_hands = options.max_num_hands;
        let worker = Worker::builder()
            .name("hand landmarker")
            .spawn(move |Job { image, result }| {
                let hands = catch_unwind(AssertUnwindSafe(|| {
                    timer.time(|| landmarker.process(&image))
                }));
                result.fulfill(match hands {
                    Ok(hands) => Ok(hands.map(|mut hands| {
                        hands.truncate(max_num_hands);
                        hands
                    })),
                    Err(payload) => Err(panic_message(&*payload)),
                });
            })
            .map_err(|e| HandsError::Initialization(e.into()))?;

        log::debug!("hand tracking started with {:?}", options);
        Ok(Self {
            worker: Some(worker),
            callback: None,
            t_inference,
        })
    }

    /// Registers the callback that receives every [`FrameResult`], replacing any previous one.
    pub fn on_results<F>(&mut self, callback: F)
    where
        F: FnMut(FrameResult) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Processes `image` and invokes the result callback once the model has finished.
    ///
    /// If the model fails on this frame, the error is logged and no result is reported. If it
    /// panics, the adapter closes itself and returns [`HandsError::Crashed`].
    pub fn send(&mut self, image: Frame) -> Result<(), HandsError> {
        let worker = self.worker.as_mut().ok_or(HandsError::Closed)?;
        let (promise, handle) = promise();
        worker.send(Job {
            image: image.clone(),
            result: promise,
        });
        let outcome = handle.block().map_err(|_| HandsError::WorkerGone);
        let hands = match outcome {
            Ok(Ok(hands)) => hands,
            Ok(Err(msg)) => {
                self.close();
                return Err(HandsError::Crashed(msg));
            }
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        match hands {
            Ok(hands) => {
                let result = FrameResult::from_detections(image, hands);
                if let Some(callback) = &mut self.callback {
                    callback(result);
                }
            }
            Err(e) => log::error!("hand landmark inference failed: {e:#}"),
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.worker.is_none()
    }

    /// Shuts down the worker thread and drops the result callback.
    ///
    /// Blocks until the worker has exited. Calling this more than once is harmless.
    pub fn close(&mut self) {
        self.callback = None;
        if let Some(worker) = self.worker.take() {
            // Joining re-raises a panic of the worker thread.
            match catch_unwind(AssertUnwindSafe(|| drop(worker))) {
                Ok(()) => log::debug!("hand tracking closed"),
                Err(payload) => log::error!(
                    "hand landmark worker panicked: {}",
                    panic_message(&*payload)
                ),
            }
        }
    }

    /// Returns the profiling timer for model inference.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        std::iter::once(&*self.t_inference)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<unknown panic payload>".into()
    }
}

impl Drop for Hands {
    fn drop(&mut self) {
        self.close();
    }
}
