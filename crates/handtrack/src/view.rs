//! The hand tracking screen.
//!
//! [`HandTrackView`] owns the capture surface, the inference adapter and the renderer for as long
//! as the screen is shown:
//!
//! ```text
//! Inactive --mount--> Active --camera started--> Streaming --back/unmount--> Inactive
//!                       |
//!                       +--camera unavailable--> Error --back/unmount--> Inactive
//! ```
//!
//! Every exit path releases the camera and shuts the inference worker down. Results that arrive
//! after that are dropped without touching the canvas.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::Duration,
};

use thiserror::Error;

use crate::{
    camera::{CameraDevice, CameraError, VideoConstraints, VideoElement},
    canvas::Canvas,
    hands::{AssetLocator, FrameResult, HandLandmarker, Hands, HandsError, HandsOptions},
    navigation::{Navigator, ROOT},
    render::Renderer,
    timer::{FpsCounter, Timer},
};

/// Time to wait between command polls while an error is shown.
const ERROR_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors that end streaming, shown to the user instead of the camera feed.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("camera unavailable: {0}")]
    Camera(#[from] CameraError),

    #[error("hand tracking unavailable: {0}")]
    Inference(#[from] HandsError),
}

#[derive(Debug)]
pub enum ViewState {
    /// Not mounted, or torn down. No resources are held.
    Inactive,
    /// Mounted, waiting for the camera.
    Active,
    /// Frames are flowing. Without `overlays`, the raw camera feed is shown.
    Streaming { overlays: bool },
    /// An error message is shown. Resources have been released.
    Error(ViewError),
}

/// User commands that leave the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCommand {
    /// "Back to home": release the camera and navigate to the root route.
    Back,
    /// The screen is going away for some other reason (eg. the window was closed).
    Close,
}

type LandmarkerFactory = Box<dyn FnMut() -> Box<dyn HandLandmarker>>;

/// The hand tracking screen, generic over the surface it draws on.
pub struct HandTrackView<C: Canvas + Send + 'static> {
    camera: Box<dyn CameraDevice>,
    landmarker: LandmarkerFactory,
    options: HandsOptions,
    assets: AssetLocator,
    constraints: VideoConstraints,
    navigator: Box<dyn Navigator>,

    video: Arc<Mutex<VideoElement>>,
    renderer: Arc<Mutex<Renderer<C>>>,
    hands: Option<Hands>,
    /// Cleared (with the renderer locked) before anything is released.
    active: Arc<AtomicBool>,
    state: ViewState,

    fps: FpsCounter,
    t_draw: Arc<Timer>,
}

impl<C: Canvas + Send + 'static> HandTrackView<C> {
    /// Creates an unmounted view.
    ///
    /// `landmarker` is called on every [`HandTrackView::mount`] to create a fresh model instance.
    pub fn new<D, F, N>(camera: D, landmarker: F, navigator: N, canvas: C) -> Self
    where
        D: CameraDevice + 'static,
        F: FnMut() -> Box<dyn HandLandmarker> + 'static,
        N: Navigator + 'static,
    {
        let renderer = Renderer::new(canvas);
        let t_draw = renderer.timer();
        Self {
            camera: Box::new(camera),
            landmarker: Box::new(landmarker),
            options: HandsOptions::default(),
            assets: AssetLocator::dir("assets"),
            constraints: VideoConstraints::default(),
            navigator: Box::new(navigator),
            video: Arc::new(Mutex::new(VideoElement::new())),
            renderer: Arc::new(Mutex::new(renderer)),
            hands: None,
            active: Arc::new(AtomicBool::new(false)),
            state: ViewState::Inactive,
            fps: FpsCounter::new("hand tracking"),
            t_draw,
        }
    }

    pub fn options(mut self, options: HandsOptions) -> Self {
        self.options = options;
        self
    }

    pub fn assets(mut self, assets: AssetLocator) -> Self {
        self.assets = assets;
        self
    }

    pub fn constraints(mut self, constraints: VideoConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Returns whether results are currently allowed to reach the canvas.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn video(&self) -> MutexGuard<'_, VideoElement> {
        lock(&self.video)
    }

    pub fn renderer(&self) -> MutexGuard<'_, Renderer<C>> {
        lock(&self.renderer)
    }

    /// Starts the camera and the inference adapter.
    ///
    /// This never fails: if the camera can't be opened, the view shows the error and enters
    /// [`ViewState::Error`]. If the model can't be loaded, the raw camera feed is shown.
    pub fn mount(&mut self) {
        if !matches!(self.state, ViewState::Inactive) {
            log::warn!("view is already mounted ({:?})", self.state);
            return;
        }
        self.active.store(true, Ordering::SeqCst);
        self.state = ViewState::Active;
        log::debug!("mounting hand tracking view ({:?})", self.constraints);

        let stream = match self.camera.open(&self.constraints) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("failed to open camera: {e}");
                self.fail(ViewError::Camera(e));
                return;
            }
        };
        self.video().set_source(stream);

        let overlays = match Hands::new((self.landmarker)(), self.options, &self.assets) {
            Ok(mut hands) => {
                hands.on_results(self.result_callback());
                self.hands = Some(hands);
                true
            }
            Err(e) => {
                log::warn!("{}; showing camera feed without overlays", ViewError::Inference(e));
                false
            }
        };
        self.state = ViewState::Streaming { overlays };
        log::info!(
            "streaming at {} (overlays: {overlays})",
            self.video().video_resolution()
        );
    }

    /// Reads one frame from the camera and gets it drawn.
    ///
    /// Returns `false` if the view is not streaming (anymore).
    pub fn tick(&mut self) -> bool {
        if !matches!(self.state, ViewState::Streaming { .. }) {
            return false;
        }

        let read = self.video().read_frame();
        let frame = match read {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("failed to read camera frame: {e}");
                self.fail(ViewError::Camera(e));
                return false;
            }
        };

        match self.hands.as_mut().map(|hands| hands.send(frame.clone())) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                log::error!("{}; continuing without overlays", ViewError::Inference(e));
                if let Some(mut hands) = self.hands.take() {
                    hands.close();
                }
                self.state = ViewState::Streaming { overlays: false };
            }
            None => (self.result_callback())(FrameResult::empty(frame)),
        }

        let video = lock(&self.video);
        self.fps.tick_with(
            video
                .timers()
                .into_iter()
                .chain(self.hands.iter().flat_map(|hands| hands.timers()))
                .chain([&*self.t_draw]),
        );
        true
    }

    /// The "back to home" action.
    ///
    /// Pauses the video, releases the camera, shuts down hand tracking and navigates to the root
    /// route. Does nothing if the view is not mounted, so the navigation happens at most once.
    pub fn go_back(&mut self) {
        if matches!(self.state, ViewState::Inactive) {
            return;
        }
        self.unmount();
        self.navigator.push(ROOT);
    }

    /// Releases everything the view holds without navigating.
    pub fn unmount(&mut self) {
        if matches!(self.state, ViewState::Inactive) {
            return;
        }
        self.teardown();
        self.state = ViewState::Inactive;
        log::debug!("hand tracking view unmounted");
    }

    /// Mounts the view and drives it until `poll` returns a command.
    ///
    /// `poll` is called once per frame (or periodically while an error is shown).
    pub fn run(&mut self, mut poll: impl FnMut() -> Option<ViewCommand>) -> ViewCommand {
        self.mount();
        loop {
            match poll() {
                Some(ViewCommand::Back) => {
                    self.go_back();
                    return ViewCommand::Back;
                }
                Some(ViewCommand::Close) => {
                    self.unmount();
                    return ViewCommand::Close;
                }
                None => {}
            }

            match self.state {
                ViewState::Streaming { .. } => {
                    self.tick();
                }
                ViewState::Inactive => return ViewCommand::Close,
                ViewState::Active | ViewState::Error(_) => thread::sleep(ERROR_POLL_INTERVAL),
            }
        }
    }

    /// Creates the function that paints results, gated on the active flag.
    pub(crate) fn result_callback(&self) -> impl FnMut(FrameResult) + Send + 'static {
        let active = self.active.clone();
        let video = self.video.clone();
        let renderer = self.renderer.clone();
        move |result| {
            let mut renderer = lock(&renderer);
            if !active.load(Ordering::SeqCst) {
                log::trace!("dropping result that arrived after teardown");
                return;
            }
            let size = lock(&video).video_resolution();
            renderer.on_results(size, &result);
        }
    }

    fn fail(&mut self, error: ViewError) {
        self.teardown();
        lock(&self.renderer).show_error(&error.to_string());
        self.state = ViewState::Error(error);
    }

    fn teardown(&mut self) {
        {
            // Any callback currently drawing finishes before the flag is cleared.
            let _renderer = lock(&self.renderer);
            self.active.store(false, Ordering::SeqCst);
        }
        {
            let mut video = self.video();
            video.pause();
            video.clear_source();
        }
        if let Some(mut hands) = self.hands.take() {
            hands.close();
        }
    }
}

impl<C: Canvas + Send + 'static> Drop for HandTrackView<C> {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use crate::{
        camera::{FacingConstraint, FacingMode},
        canvas::Color,
        hands::HandsError,
        landmark::{LandmarkSet, HAND_CONNECTIONS},
        resolution::Resolution,
        test::{
            detected, frame, DrawOp, FakeCamera, RecordingCanvas, RecordingNavigator,
            ScriptedLandmarker,
        },
    };

    use super::*;

    fn new_view(
        camera: FakeCamera,
        landmarker: ScriptedLandmarker,
        nav: &RecordingNavigator,
    ) -> HandTrackView<RecordingCanvas> {
        let mut landmarker = Some(landmarker);
        HandTrackView::new(
            camera,
            move || -> Box<dyn HandLandmarker> {
                Box::new(landmarker.take().unwrap_or_else(ScriptedLandmarker::new))
            },
            nav.clone(),
            RecordingCanvas::new(),
        )
    }

    fn count_ops(view: &HandTrackView<RecordingCanvas>, f: impl Fn(&DrawOp) -> bool) -> usize {
        view.renderer().canvas().ops.iter().filter(|op| f(op)).count()
    }

    #[test]
    fn streams_with_overlays() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let landmarker = ScriptedLandmarker::new().then(vec![detected(0.5, 0.5)]);
        let mut view = new_view(camera, landmarker, &nav);

        view.mount();
        assert!(matches!(view.state(), ViewState::Streaming { overlays: true }));
        assert!(view.is_active());
        assert!(!view.video().is_paused());

        assert!(view.tick());
        assert_eq!(view.renderer().canvas().size(), Resolution::PORTRAIT_360P);
        assert_eq!(
            count_ops(&view, |op| matches!(op, DrawOp::Line { .. })),
            HAND_CONNECTIONS.len()
        );
        assert_eq!(
            count_ops(&view, |op| matches!(op, DrawOp::Circle { .. })),
            LandmarkSet::NUM_LANDMARKS
        );
        assert!(nav.routes().is_empty());
    }

    #[test]
    fn canvas_tracks_video_size() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let tracks = camera.track_state();
        let mut view = new_view(camera, ScriptedLandmarker::new(), &nav);
        view.mount();

        view.tick();
        assert_eq!(view.renderer().canvas().size(), Resolution::PORTRAIT_360P);

        let rotated = Resolution::new(640, 360);
        tracks.lock().unwrap().next_resolution = Some(rotated);
        view.tick();
        assert_eq!(view.renderer().canvas().size(), rotated);
        assert_eq!(view.video().video_resolution(), rotated);
    }

    #[test]
    fn back_action_releases_camera_and_navigates_once() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let tracks = camera.track_state();
        let landmarker = ScriptedLandmarker::new();
        let mut view = new_view(camera, landmarker, &nav);
        view.mount();
        view.tick();

        view.go_back();
        assert!(view.video().is_paused());
        assert!(!view.video().has_source());
        assert!(tracks.lock().unwrap().stopped);
        assert!(!view.is_active());
        assert!(matches!(view.state(), ViewState::Inactive));
        assert_eq!(nav.routes(), [ROOT]);

        view.go_back();
        assert!(!view.tick());
        assert_eq!(nav.routes(), [ROOT]);
    }

    #[test]
    fn camera_denial_shows_error() {
        let nav = RecordingNavigator::default();
        let mut view = new_view(FakeCamera::denied(), ScriptedLandmarker::new(), &nav);

        view.mount();
        assert!(matches!(
            view.state(),
            ViewState::Error(ViewError::Camera(CameraError::PermissionDenied(_)))
        ));
        assert!(!view.is_active());
        assert!(!view.tick());

        let renderer = view.renderer();
        let ops = &renderer.canvas().ops;
        assert!(ops.iter().any(|op| matches!(
            op,
            DrawOp::Text { text, color, .. } if text.contains("permission") && *color == Color::WHITE
        )));
        assert_eq!(ops.last(), Some(&DrawOp::Present));
        drop(renderer);

        // Leaving the error screen still works.
        view.go_back();
        assert_eq!(nav.routes(), [ROOT]);
    }

    #[test]
    fn strict_facing_without_rear_camera() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P).facing(FacingMode::User);
        let mut view = new_view(camera, ScriptedLandmarker::new(), &nav);
        view.mount();
        assert!(matches!(
            view.state(),
            ViewState::Error(ViewError::Camera(CameraError::NotFound(_)))
        ));

        let camera = FakeCamera::new(Resolution::PORTRAIT_360P).facing(FacingMode::User);
        let mut view = new_view(camera, ScriptedLandmarker::new(), &nav).constraints(
            VideoConstraints {
                facing: FacingConstraint::Ideal(FacingMode::Environment),
                ..Default::default()
            },
        );
        view.mount();
        assert!(matches!(view.state(), ViewState::Streaming { .. }));
    }

    #[test]
    fn late_results_are_ignored() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let mut view = new_view(camera, ScriptedLandmarker::new(), &nav);
        view.mount();

        // Stands in for a result callback that is still in flight.
        let mut callback = view.result_callback();
        callback(FrameResult::empty(frame(360, 640)));
        let drawn = view.renderer().canvas().ops.len();
        assert!(drawn > 0);

        view.go_back();
        let mut result = FrameResult::empty(frame(360, 640));
        result.multi_hand_landmarks.push(detected(0.5, 0.5).landmarks);
        callback(result);
        assert_eq!(view.renderer().canvas().ops.len(), drawn);
    }

    #[test]
    fn model_failure_degrades_to_raw_feed() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let landmarker = ScriptedLandmarker::new().fail_initialization();
        let processed = landmarker.processed();
        let mut view = new_view(camera, landmarker, &nav);

        view.mount();
        assert!(matches!(view.state(), ViewState::Streaming { overlays: false }));
        assert!(view.tick());
        assert!(view.tick());
        assert_eq!(processed.load(Ordering::SeqCst), 0);
        assert_eq!(count_ops(&view, |op| matches!(op, DrawOp::Image { .. })), 2);
        assert_eq!(count_ops(&view, |op| matches!(op, DrawOp::Line { .. })), 0);
    }

    #[test]
    fn model_crash_degrades_to_raw_feed() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let tracks = camera.track_state();
        let landmarker = ScriptedLandmarker::new()
            .then(vec![detected(0.5, 0.5)])
            .then_panic();
        let mut view = new_view(camera, landmarker, &nav);

        view.mount();
        assert!(view.tick());
        assert!(view.tick());
        assert!(matches!(view.state(), ViewState::Streaming { overlays: false }));
        assert!(view.is_active());

        // The camera feed keeps going without overlays.
        assert!(view.tick());
        assert_eq!(count_ops(&view, |op| matches!(op, DrawOp::Image { .. })), 2);
        assert_eq!(
            count_ops(&view, |op| matches!(op, DrawOp::Line { .. })),
            HAND_CONNECTIONS.len()
        );
        assert_eq!(tracks.lock().unwrap().frames_read, 3);

        view.go_back();
        assert_eq!(nav.routes(), [ROOT]);
        assert!(tracks.lock().unwrap().stopped);
    }

    #[test]
    fn camera_failure_mid_stream_shows_error() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let tracks = camera.track_state();
        let landmarker = ScriptedLandmarker::new();
        let processed = landmarker.processed();
        let mut view = new_view(camera, landmarker, &nav);

        view.mount();
        assert!(view.tick());
        tracks.lock().unwrap().stopped = true;

        assert!(!view.tick());
        assert!(matches!(
            view.state(),
            ViewState::Error(ViewError::Camera(CameraError::Stopped))
        ));
        assert!(!view.is_active());
        assert!(!view.video().has_source());
        assert_eq!(processed.load(Ordering::SeqCst), 1);

        let renderer = view.renderer();
        let ops = &renderer.canvas().ops;
        assert!(ops.iter().any(|op| matches!(
            op,
            DrawOp::Text { text, color, .. } if text.contains("camera unavailable") && *color == Color::WHITE
        )));
        assert_eq!(ops.last(), Some(&DrawOp::Present));
        drop(renderer);

        assert!(!view.tick());
        assert!(nav.routes().is_empty());
    }

    #[test]
    fn invalid_options_degrade_to_raw_feed() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let mut view = new_view(camera, ScriptedLandmarker::new(), &nav).options(HandsOptions {
            max_num_hands: 0,
            ..Default::default()
        });
        view.mount();
        assert!(matches!(view.state(), ViewState::Streaming { overlays: false }));
    }

    #[test]
    fn remount_opens_camera_again() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let opened = camera.opened();
        let mut view = new_view(camera, ScriptedLandmarker::new(), &nav);

        view.mount();
        view.mount();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        view.unmount();
        view.mount();
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert!(view.tick());
        assert!(nav.routes().is_empty());
    }

    #[test]
    fn drop_releases_camera() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let tracks = camera.track_state();
        let mut view = new_view(camera, ScriptedLandmarker::new(), &nav);
        view.mount();
        drop(view);
        assert!(tracks.lock().unwrap().stopped);
        assert!(nav.routes().is_empty());
    }

    #[test]
    fn run_until_back() {
        let nav = RecordingNavigator::default();
        let camera = FakeCamera::new(Resolution::PORTRAIT_360P);
        let landmarker = ScriptedLandmarker::new();
        let processed = landmarker.processed();
        let mut view = new_view(camera, landmarker, &nav);

        let polls = AtomicUsize::new(0);
        let command = view.run(|| {
            (polls.fetch_add(1, Ordering::SeqCst) == 3).then_some(ViewCommand::Back)
        });
        assert_eq!(command, ViewCommand::Back);
        assert_eq!(processed.load(Ordering::SeqCst), 3);
        assert_eq!(nav.routes(), [ROOT]);
    }

    #[test]
    fn close_does_not_navigate() {
        let nav = RecordingNavigator::default();
        let mut view = new_view(FakeCamera::denied(), ScriptedLandmarker::new(), &nav);
        let command = view.run(|| Some(ViewCommand::Close));
        assert_eq!(command, ViewCommand::Close);
        assert!(matches!(view.state(), ViewState::Inactive));
        assert!(nav.routes().is_empty());
    }

    #[test]
    fn inference_error_message() {
        let error = ViewError::Inference(HandsError::Closed);
        assert_eq!(
            error.to_string(),
            "hand tracking unavailable: hand tracking has been shut down"
        );
    }
}
