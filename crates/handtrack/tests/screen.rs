//! Drives the whole screen with a still image, a stand-in model and a rasterizing canvas.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use handtrack::{
    camera::{still::StillCamera, FacingMode},
    canvas::ImageCanvas,
    hands::{AssetLocator, DetectedHand, HandLandmarker, HandsOptions},
    landmark::{Handedness, LandmarkSet, NormalizedLandmark},
    navigation::{History, Navigator, HAND_TRACK, ROOT},
    view::{HandTrackView, ViewCommand, ViewState},
};
use image::{Rgba, RgbaImage};

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 200, 255]);

/// Reports the same hand in every frame: the wrist in the top left quadrant, everything else in
/// the bottom right one.
struct FixedHand;

impl HandLandmarker for FixedHand {
    fn initialize(&mut self, options: &HandsOptions, _: &AssetLocator) -> anyhow::Result<()> {
        assert_eq!(options.max_num_hands, 1);
        Ok(())
    }

    fn process(&mut self, _: &RgbaImage) -> anyhow::Result<Vec<DetectedHand>> {
        let mut landmarks = vec![NormalizedLandmark::new(0.75, 0.75, 0.0); 21];
        landmarks[0] = NormalizedLandmark::new(0.25, 0.25, 0.0);
        Ok(vec![DetectedHand {
            landmarks: LandmarkSet::new(landmarks),
            handedness: Handedness::Left,
            score: 1.0,
        }])
    }
}

fn history() -> Arc<Mutex<History>> {
    let mut history = History::default();
    history.push(HAND_TRACK);
    Arc::new(Mutex::new(history))
}

fn camera() -> StillCamera {
    StillCamera::from_image(RgbaImage::from_pixel(40, 80, BACKGROUND)).fps(0)
}

fn fixed_hand() -> Box<dyn HandLandmarker> {
    Box::new(FixedHand)
}

#[test]
fn draws_hand_over_camera_feed() {
    let history = history();
    let mut view = HandTrackView::new(camera(), fixed_hand, history.clone(), ImageCanvas::new());

    view.mount();
    assert!(matches!(view.state(), ViewState::Streaming { overlays: true }));
    assert!(view.tick());

    {
        let renderer = view.renderer();
        let image = renderer.canvas().image();
        assert_eq!(image.dimensions(), (40, 80));
        assert_eq!(image[(0, 0)], BACKGROUND);
        // Halfway along the wrist connectors.
        assert_eq!(image[(20, 40)], Rgba([0x00, 0xFF, 0x00, 0xFF]));
        // Wrist marker.
        assert_eq!(image[(10, 20)], Rgba([0x00, 0xFF, 0xD0, 0xFF]));
    }

    view.go_back();
    assert!(view.video().is_paused());
    assert!(!view.video().has_source());
    let history = history.lock().unwrap();
    assert_eq!(history.current(), ROOT);
    assert_eq!(history.depth(), 3);
}

#[test]
fn front_camera_only_shows_error() {
    let history = history();
    let camera = camera().facing(Some(FacingMode::User));
    let mut view = HandTrackView::new(camera, fixed_hand, history.clone(), ImageCanvas::new());

    view.mount();
    assert!(matches!(view.state(), ViewState::Error(_)));

    let renderer = view.renderer();
    let image = renderer.canvas().image();
    assert_eq!(image.dimensions(), (360, 640));
    assert!(image.pixels().any(|p| *p == Rgba([0xFF, 0xFF, 0xFF, 0xFF])));
    assert!(image.pixels().all(|p| *p != BACKGROUND));
    drop(renderer);

    assert_eq!(history.lock().unwrap().current(), HAND_TRACK);
}

#[test]
fn run_until_closed() {
    let frames = Arc::new(AtomicUsize::new(0));
    let counter = frames.clone();
    let factory = move || -> Box<dyn HandLandmarker> {
        struct Counting(Arc<AtomicUsize>);
        impl HandLandmarker for Counting {
            fn initialize(&mut self, _: &HandsOptions, _: &AssetLocator) -> anyhow::Result<()> {
                Ok(())
            }
            fn process(&mut self, _: &RgbaImage) -> anyhow::Result<Vec<DetectedHand>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        }
        Box::new(Counting(counter.clone()))
    };

    let history = history();
    let mut view = HandTrackView::new(camera(), factory, history.clone(), ImageCanvas::new());
    let mut polls = 0;
    let command = view.run(|| {
        polls += 1;
        (polls > 5).then_some(ViewCommand::Close)
    });

    assert_eq!(command, ViewCommand::Close);
    assert_eq!(frames.load(Ordering::SeqCst), 5);
    assert!(!view.is_active());
    assert_eq!(history.lock().unwrap().current(), HAND_TRACK);
}
