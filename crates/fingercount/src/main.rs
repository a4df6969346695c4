use anyhow::Context;
use fingercount::config::Settings;
use fingercount::gui;
use fingercount::holistic::Holistic;
use fingercount::pipeline::{FrameLoop, LoopOptions, StopReason, WINDOW_TITLE};
use fingercount::video::webcam::{Webcam, WebcamOptions};

fn main() {
    fingercount::init_logger!();
    fingercount::run(app);
}

fn app() -> anyhow::Result<()> {
    let settings = Settings::get();
    let holistic = Holistic::load(settings).context("failed to load landmark networks")?;
    let window = gui::Window::open(WINDOW_TITLE)?;

    let mut frame_loop = FrameLoop::new(holistic, window, LoopOptions::default());
    let stopped = frame_loop.run(|| Webcam::open(WebcamOptions::from_settings(settings)))?;
    match stopped.reason {
        StopReason::Quit => log::info!("exiting after {} frames", stopped.frames),
        StopReason::WindowClosed => log::info!("window closed, exiting"),
    }
    Ok(())
}
