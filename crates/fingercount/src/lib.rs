//! Webcam finger counter.
//!
//! Frames are read from a webcam, passed through a set of landmark networks (body pose, both
//! hands, face mesh), and the extended fingers of every detected hand are counted. The annotated
//! frame is shown in a window together with the current frame rate.
//!
//! # Coordinates
//!
//! Landmarks handed out by [`holistic::LandmarkProvider`]s are *normalized*: X and Y are in range
//! 0.0 to 1.0 relative to the frame's width and height, with Y pointing *down*. Z is whatever the
//! network outputs and is only meaningful relative to other landmarks of the same set.
//!
//! # Environment Variables
//!
//! * `FINGERCOUNT_MODEL_DIR`: Directory to load the ONNX networks from. Defaults to the
//!   repository's `3rdparty/onnx` directory.
//! * `FINGERCOUNT_NETWORKS`: Selects the network variants to use. Allowed values are `full`
//!   (the default) and `lite`.
//! * `FINGERCOUNT_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s. If unset, the device
//!   with the configured index (`/dev/video0` by default) will be used.
//!
//! [`Webcam`]: video::webcam::Webcam

use log::LevelFilter;
use termination::Termination;

pub mod body;
pub mod config;
pub mod face;
pub mod gui;
pub mod hand;
pub mod holistic;
pub mod image;
pub mod iter;
pub mod landmark;
pub mod nn;
pub mod num;
pub mod overlay;
pub mod pipeline;
pub mod termination;
pub mod timer;
pub mod video;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .filter(Some("tract_core"), LevelFilter::Warn)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this library will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// `wgpu` and `tract` will always log at *warn* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}

/// Runs `app` on a background thread while the GUI event loop takes over the calling thread.
///
/// This has to be called from the main thread, since some windowing systems only allow creating
/// windows from there. The process exits once `app` returns: with status 0 if it returned a
/// success value, 1 if it returned an error (which is printed to *stderr*), and 101 if it
/// panicked.
pub fn run<F, R>(app: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    gui::run(app)
}
