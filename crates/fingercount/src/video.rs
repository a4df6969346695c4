//! Video input.

pub mod webcam;

use crate::image::Image;
use crate::timer::Timer;

/// A source of camera frames.
pub trait FrameSource {
    /// Reads the next frame, blocking until one is available.
    fn read(&mut self) -> anyhow::Result<Image>;

    /// Returns profiling timers of this source, if it has any.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}
