use std::sync::{Arc, Mutex};

use handtrack::{
    camera::{still::StillCamera, webcam::WebcamDevice, CameraDevice},
    config::Config,
    gui::{self, WindowCanvas},
    hands::{onnx::OnnxLandmarker, AssetLocator, HandLandmarker},
    navigation::{History, Navigator, HAND_TRACK},
    view::HandTrackView,
};

#[handtrack::main]
fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    log::debug!("{config:?}");

    let mut history = History::default();
    history.push(HAND_TRACK);
    let history = Arc::new(Mutex::new(history));

    match &config.still_image {
        Some(path) => run(StillCamera::new(path), &config, history.clone()),
        None => run(WebcamDevice::new(config.clone()), &config, history.clone()),
    }

    if let Ok(history) = history.lock() {
        log::info!("left hand tracking screen, now at {}", history.current());
    }
    Ok(())
}

fn run<D: CameraDevice + 'static>(camera: D, config: &Config, navigator: Arc<Mutex<History>>) {
    let mut view = HandTrackView::new(
        camera,
        || -> Box<dyn HandLandmarker> { Box::new(OnnxLandmarker::default()) },
        navigator,
        WindowCanvas::new("Hand Tracking"),
    )
    .assets(AssetLocator::dir(&config.asset_dir))
    .constraints(config.video_constraints());

    let command = view.run(gui::poll_command);
    log::debug!("view finished with {command:?}");
}
