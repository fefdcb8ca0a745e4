//! A minimal windowing layer that displays canvas frames and reports user commands.
//!
//! The event loop has to own the main thread, so the application runs on a secondary thread (see
//! [`run`]). Frames are sent to the event loop with [`show_image`]; key presses and window close
//! requests come back as [`ViewCommand`]s via [`poll_command`].

mod renderer;

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
};

use image::RgbaImage;
use once_cell::sync::{Lazy, OnceCell};
use winit::{
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowId,
};

use crate::{
    canvas::{Canvas, Color, ImageCanvas, Point2},
    resolution::Resolution,
    termination::Termination,
    view::ViewCommand,
};

use self::renderer::{Gpu, Renderer, Window};

struct Gui {
    gpu: &'static Gpu,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
}

impl Gui {
    fn new(gpu: &'static Gpu) -> Self {
        Self {
            gpu,
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
        }
    }

    fn renderer_mut(&mut self, win: WindowId) -> Option<&mut Renderer> {
        let key = self.win_id_to_key.get(&win)?;
        self.windows.get_mut(key)
    }

    fn show(
        &mut self,
        target: &winit::event_loop::EventLoopWindowTarget<Msg>,
        key: String,
        res: Resolution,
        data: Vec<u8>,
    ) -> anyhow::Result<()> {
        if !self.windows.contains_key(&key) {
            log::debug!("creating window for image '{key}' at {res}");
            let win = Window::open(target, &key, res)?;
            let win_id = win.win.id();
            let renderer = Renderer::new(win, self.gpu)?;
            self.win_id_to_key.insert(win_id, key.clone());
            self.windows.insert(key.clone(), renderer);
        }
        if let Some(renderer) = self.windows.get_mut(&key) {
            renderer.update_texture(res, &data);
            renderer.window().request_redraw();
        }
        Ok(())
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(Msg::Image { key, res, data }) => {
                    if let Err(e) = self.show(target, key, res, data) {
                        log::error!("failed to display image: {e:#}");
                    }
                }
                Event::RedrawRequested(window) => {
                    if let Some(renderer) = self.renderer_mut(window) {
                        renderer.redraw();
                    }
                }
                Event::WindowEvent { event, .. } => {
                    if let Some(command) = command_for(&event) {
                        log::debug!("window event {event:?} -> {command:?}");
                        COMMANDS.send(command);
                    }
                }
                _ => {}
            }
        });
    }
}

/// Maps window input to the screen commands it triggers.
fn command_for(event: &WindowEvent<'_>) -> Option<ViewCommand> {
    match event {
        WindowEvent::CloseRequested => Some(ViewCommand::Close),
        WindowEvent::KeyboardInput {
            input:
                KeyboardInput {
                    state: ElementState::Pressed,
                    virtual_keycode: Some(VirtualKeyCode::Escape | VirtualKeyCode::Back),
                    ..
                },
            ..
        } => Some(ViewCommand::Back),
        _ => None,
    }
}

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

static PROXY: OnceCell<Mutex<EventLoopProxy<Msg>>> = OnceCell::new();

struct CommandQueue {
    sender: Mutex<Sender<ViewCommand>>,
    receiver: Mutex<Receiver<ViewCommand>>,
}

impl CommandQueue {
    fn send(&self, command: ViewCommand) {
        if let Ok(sender) = self.sender.lock() {
            // The receiver lives in the same static, so this can't fail.
            sender.send(command).ok();
        }
    }

    fn try_recv(&self) -> Option<ViewCommand> {
        self.receiver.lock().ok()?.try_recv().ok()
    }
}

static COMMANDS: Lazy<CommandQueue> = Lazy::new(|| {
    let (sender, receiver) = mpsc::channel();
    CommandQueue {
        sender: Mutex::new(sender),
        receiver: Mutex::new(receiver),
    }
});

fn send(msg: Msg) {
    let Some(proxy) = PROXY.get() else {
        log::trace!("GUI not running, dropping {msg:?}");
        return;
    };
    let Ok(proxy) = proxy.lock() else { return };
    if proxy.send_event(msg).is_err() {
        log::debug!("event loop closed, dropping image");
    }
}

/// Runs `cb` on a new thread while the GUI event loop takes over the calling thread.
///
/// The process exits once `cb` returns: with status 0 on success, 1 on failure (after printing
/// the error) and 101 if it panics.
pub fn run<F, R>(cb: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    if PROXY.set(Mutex::new(event_loop.create_proxy())).is_err() {
        log::error!("GUI is already running");
        process::exit(1);
    }

    let gpu = match Gpu::get() {
        Ok(gpu) => gpu,
        Err(e) => {
            log::error!("failed to open GPU: {e:#}");
            process::exit(1);
        }
    };

    // Library is now initialized; spawn another thread to run the application code.
    std::thread::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(cb));
        match result {
            Ok(r) => {
                if r.is_success() {
                    process::exit(0);
                } else {
                    r.report_failure();
                    process::exit(1);
                }
            }
            Err(_payload) => {
                // The panic hook has printed the message already; exit with 101 like libstd.
                process::exit(101);
            }
        }
    });

    Gui::new(gpu).run(event_loop);
}

/// Displays an image in the window titled `key`, creating the window on first use.
///
/// Does nothing if the GUI is not running.
pub fn show_image(key: impl Into<String>, image: &RgbaImage) {
    send(Msg::Image {
        key: key.into(),
        res: Resolution::new(image.width(), image.height()),
        data: image.as_raw().clone(),
    });
}

/// Returns the next command the user issued in any window, if any.
pub fn poll_command() -> Option<ViewCommand> {
    COMMANDS.try_recv()
}

/// A [`Canvas`] whose frames are shown in a window.
pub struct WindowCanvas {
    key: String,
    inner: ImageCanvas,
}

impl WindowCanvas {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            inner: ImageCanvas::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        self.inner.image()
    }
}

impl Canvas for WindowCanvas {
    fn set_size(&mut self, size: Resolution) {
        self.inner.set_size(size);
    }

    fn size(&self) -> Resolution {
        self.inner.size()
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn draw_image(&mut self, image: &RgbaImage, x: i32, y: i32, width: u32, height: u32) {
        self.inner.draw_image(image, x, y, width, height);
    }

    fn stroke_line(&mut self, from: Point2, to: Point2, color: Color, line_width: u32) {
        self.inner.stroke_line(from, to, color, line_width);
    }

    fn draw_circle(
        &mut self,
        center: Point2,
        radius: f32,
        color: Color,
        fill: Option<Color>,
        line_width: u32,
    ) {
        self.inner
            .draw_circle(center, radius, color, fill, line_width);
    }

    fn fill_text(&mut self, text: &str, center: Point2, color: Color) {
        self.inner.fill_text(text, center, color);
    }

    fn present(&mut self) {
        show_image(&*self.key, self.inner.image());
    }
}

#[cfg(test)]
mod tests {
    use winit::event::{DeviceId, ModifiersState, ScanCode};

    use super::*;

    #[allow(deprecated)]
    fn key(code: VirtualKeyCode, state: ElementState) -> WindowEvent<'static> {
        WindowEvent::KeyboardInput {
            // Only used to construct synthetic events.
            device_id: unsafe { DeviceId::dummy() },
            input: KeyboardInput {
                scancode: 0 as ScanCode,
                state,
                virtual_keycode: Some(code),
                modifiers: ModifiersState::empty(),
            },
            is_synthetic: true,
        }
    }

    #[test]
    fn key_bindings() {
        assert_eq!(
            command_for(&key(VirtualKeyCode::Escape, ElementState::Pressed)),
            Some(ViewCommand::Back)
        );
        assert_eq!(
            command_for(&key(VirtualKeyCode::Back, ElementState::Pressed)),
            Some(ViewCommand::Back)
        );
        assert_eq!(
            command_for(&key(VirtualKeyCode::Escape, ElementState::Released)),
            None
        );
        assert_eq!(
            command_for(&key(VirtualKeyCode::Space, ElementState::Pressed)),
            None
        );
        assert_eq!(
            command_for(&WindowEvent::CloseRequested),
            Some(ViewCommand::Close)
        );
    }

    #[test]
    fn headless_canvas() {
        let mut canvas = WindowCanvas::new("test");
        canvas.set_size(Resolution::new(4, 2));
        canvas.clear();
        canvas.present();
        assert_eq!(canvas.image().dimensions(), (4, 2));
        assert_eq!(poll_command(), None);
    }
}
