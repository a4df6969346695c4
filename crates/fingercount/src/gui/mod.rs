//! Windows showing annotated frames.
//!
//! Most windowing systems require windows to be created and serviced on the main thread. [`run`]
//! therefore turns the main thread into the GUI thread and runs the application on a separate
//! thread. Application code talks to the GUI thread through [`Window`] handles.

mod renderer;

use std::{
    collections::{HashMap, HashSet},
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::Mutex,
    time::Duration,
};

use anyhow::{anyhow, Context};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use once_cell::sync::OnceCell;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget},
    window::WindowId,
};

use crate::{
    image::{Image, Resolution},
    pipeline::{Display, Key},
    termination::Termination,
};

use self::renderer::{Gpu, NativeWindow, Renderer};

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
    subscriptions: Subscriptions,
}

impl Gui {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            gpu: Rc::new(pollster::block_on(Gpu::open())?),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
            subscriptions: Subscriptions::default(),
        })
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(msg) => self.handle_msg(msg, target),
                Event::WindowEvent { window_id, event } => {
                    self.handle_window_event(window_id, event)
                }
                Event::RedrawRequested(window) => {
                    let Some(key) = self.win_id_to_key.get(&window) else {
                        return;
                    };
                    if let Some(renderer) = self.windows.get_mut(key) {
                        if let Err(e) = renderer.redraw() {
                            log::error!("failed to redraw window '{key}': {e:#}");
                        }
                    }
                }
                _ => {}
            }
        });
    }

    fn handle_msg(&mut self, msg: Msg, target: &EventLoopWindowTarget<Msg>) {
        match msg {
            Msg::Image { key, res, data } => {
                if self.subscriptions.is_closed(&key) {
                    // Images queued before the window was closed must not reopen it.
                    log::trace!("dropping image for closed window '{key}'");
                    return;
                }
                if !self.windows.contains_key(&key) {
                    log::debug!("creating window for image '{key}' at {res}");
                    match self.open_window(target, &key, res) {
                        Ok(renderer) => {
                            self.win_id_to_key.insert(renderer.window().id(), key.clone());
                            self.windows.insert(key.clone(), renderer);
                        }
                        Err(e) => {
                            log::error!("failed to open window '{key}': {e:#}");
                            self.subscriptions.close(&key);
                            return;
                        }
                    }
                }

                if let Some(renderer) = self.windows.get_mut(&key) {
                    renderer.update_texture(res, &data);
                    renderer.window().request_redraw();
                }
            }
            Msg::Subscribe { key, sender } => self.subscriptions.subscribe(key, sender),
            Msg::Close { key } => {
                self.subscriptions.unsubscribe(&key);
                self.close_window(&key);
            }
        }
    }

    fn handle_window_event(&mut self, window: WindowId, event: WindowEvent<'_>) {
        let Some(key) = self.win_id_to_key.get(&window).cloned() else {
            return;
        };
        match event {
            WindowEvent::ReceivedCharacter(c) => self.subscriptions.notify(&key, Key::Char(c)),
            WindowEvent::CloseRequested => {
                self.subscriptions.close(&key);
                self.close_window(&key);
            }
            _ => {}
        }
    }

    fn open_window(
        &self,
        target: &EventLoopWindowTarget<Msg>,
        title: &str,
        res: Resolution,
    ) -> anyhow::Result<Renderer> {
        let win = NativeWindow::open(target, title, res)?;
        Renderer::new(win, self.gpu.clone())
    }

    fn close_window(&mut self, key: &str) {
        if let Some(renderer) = self.windows.remove(key) {
            log::debug!("closing window '{key}'");
            self.win_id_to_key.remove(&renderer.window().id());
        }
    }
}

/// Keyboard subscribers of each window, and the windows closed by the user.
#[derive(Default)]
struct Subscriptions {
    subscribers: HashMap<String, Vec<Sender<Key>>>,
    closed: HashSet<String>,
}

impl Subscriptions {
    fn subscribe(&mut self, window: String, sender: Sender<Key>) {
        self.closed.remove(&window);
        self.subscribers.entry(window).or_default().push(sender);
    }

    fn unsubscribe(&mut self, window: &str) {
        self.subscribers.remove(window);
        self.closed.remove(window);
    }

    /// Sends `key` to everyone subscribed to the window, dropping disconnected subscribers.
    fn notify(&mut self, window: &str, key: Key) {
        if let Some(subscribers) = self.subscribers.get_mut(window) {
            subscribers.retain(|sub| sub.send(key).is_ok());
        }
    }

    /// Marks `window` as closed and notifies its subscribers.
    ///
    /// The window stays closed until it is subscribed to again.
    fn close(&mut self, window: &str) {
        self.closed.insert(window.to_owned());
        self.notify(window, Key::Closed);
    }

    fn is_closed(&self, window: &str) -> bool {
        self.closed.contains(window)
    }
}

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
    Subscribe {
        key: String,
        sender: Sender<Key>,
    },
    Close {
        key: String,
    },
}

static PROXY: OnceCell<Mutex<EventLoopProxy<Msg>>> = OnceCell::new();

fn send(msg: Msg) -> anyhow::Result<()> {
    let proxy = PROXY
        .get()
        .context("GUI is not running (application must be started with `fingercount::run`)")?;
    proxy
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .send_event(msg)
        .map_err(|_closed| anyhow!("GUI event loop has exited"))
}

pub(crate) fn run<F, R>(cb: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    if PROXY.set(Mutex::new(event_loop.create_proxy())).is_err() {
        panic!("`fingercount::run` must only be called once");
    }

    let gui = match Gui::new() {
        Ok(gui) => gui,
        Err(e) => {
            eprintln!("Error: failed to initialize GUI: {e:?}");
            process::exit(1);
        }
    };

    // The GUI is now initialized; spawn another thread to run the application code.
    std::thread::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(cb));
        match result {
            Ok(r) => {
                if r.is_success() {
                    process::exit(0);
                } else {
                    r.report(); // may print the error message
                    process::exit(1);
                }
            }
            Err(_payload) => {
                // Panic handler has printed the panic message and backtrace already, exit with 101
                // to mimick libstd behavior.
                process::exit(101);
            }
        }
    });

    gui.run(event_loop);
}

/// Handle to a window displaying images.
///
/// The native window is created when the first image is shown, with the size of that image. It is
/// closed when the handle is dropped.
pub struct Window {
    title: String,
    keys: Receiver<Key>,
}

impl Window {
    /// Creates a window handle and subscribes to its keyboard input.
    ///
    /// Fails if the GUI isn't running.
    pub fn open(title: impl Into<String>) -> anyhow::Result<Self> {
        let title = title.into();
        let (sender, keys) = crossbeam_channel::unbounded();
        send(Msg::Subscribe {
            key: title.clone(),
            sender,
        })?;
        Ok(Self { title, keys })
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Display for Window {
    fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        // Image data is RGBA8 internally so that no conversion before GPU upload is needed.
        send(Msg::Image {
            key: self.title.clone(),
            res: image.resolution(),
            data: image.data().to_vec(),
        })
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<Key> {
        match self.keys.recv_timeout(timeout) {
            Ok(key) => Some(key),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Key::Closed),
        }
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        send(Msg::Close {
            key: self.title.clone(),
        })
        .ok();
    }
}
