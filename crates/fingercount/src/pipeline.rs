//! The per-frame loop: capture, landmark estimation, finger counting, annotation and display.
//!
//! The loop is a two-state machine. It is *running* from the moment the camera has been opened,
//! and *stopped* once the user asks to quit, closes the window, or a frame can't be read or shown.
//! It never restarts.
//!
//! The camera, the landmark provider and the display are abstracted by [`FrameSource`],
//! [`LandmarkProvider`] and [`Display`], so the loop itself does not depend on any hardware.

use std::{
    error::Error as StdError,
    time::{Duration, Instant},
};

use crate::hand::fingers;
use crate::holistic::LandmarkProvider;
use crate::image::Image;
use crate::overlay::{self, OverlayStyle, TextSpec};
use crate::timer::{FpsCounter, FrameClock};
use crate::video::FrameSource;

/// Title of the window the annotated frames are shown in.
pub const WINDOW_TITLE: &str = "Full Body Mesh with FPS and Finger Count";

/// Keyboard input delivered to the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A character was typed while the window had focus.
    Char(char),
    /// The window was closed.
    Closed,
}

/// A window that annotated frames are shown in.
pub trait Display {
    /// Shows `image`, replacing the previous one.
    fn show(&mut self, image: &Image) -> anyhow::Result<()>;

    /// Waits up to `timeout` for keyboard input.
    fn poll_key(&mut self, timeout: Duration) -> Option<Key>;
}

/// Error that stopped the frame loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open camera")]
    CameraOpen(#[source] Box<dyn StdError + Send + Sync>),
    #[error("failed to grab frame (after {frames} frames)")]
    FrameRead {
        frames: u64,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("failed to display frame (after {frames} frames)")]
    Show {
        frames: u64,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Why the frame loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The quit key was pressed.
    Quit,
    /// The window was closed.
    WindowClosed,
}

/// Summary of a frame loop that was stopped by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped {
    pub reason: StopReason,
    /// Number of frames that were displayed.
    pub frames: u64,
}

/// Per-frame values shown in the text overlays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub fingers: u32,
}

/// Frame loop configuration.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    quit_key: char,
    poll_timeout: Duration,
    style: OverlayStyle,
    fps_text: TextSpec,
    fingers_text: TextSpec,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            quit_key: 'q',
            poll_timeout: Duration::from_millis(1),
            style: OverlayStyle::default(),
            fps_text: TextSpec::FPS,
            fingers_text: TextSpec::FINGERS,
        }
    }
}

impl LoopOptions {
    /// Sets the key that stops the loop. Defaults to `q`.
    pub fn quit_key(self, quit_key: char) -> Self {
        Self { quit_key, ..self }
    }

    /// Sets how long to wait for keyboard input after each frame. Defaults to 1 ms.
    pub fn poll_timeout(self, poll_timeout: Duration) -> Self {
        Self {
            poll_timeout,
            ..self
        }
    }

    pub fn style(self, style: OverlayStyle) -> Self {
        Self { style, ..self }
    }
}

/// The frame loop and all state it carries between frames.
pub struct FrameLoop<P, D> {
    provider: P,
    display: D,
    options: LoopOptions,
    clock: FrameClock,
    fps: FpsCounter,
}

impl<P: LandmarkProvider, D: Display> FrameLoop<P, D> {
    pub fn new(provider: P, display: D, options: LoopOptions) -> Self {
        Self {
            provider,
            display,
            options,
            clock: FrameClock::new(),
            fps: FpsCounter::new("frame loop"),
        }
    }

    /// Opens the camera and processes frames until the loop is stopped.
    ///
    /// If `open_camera` fails, no frame is processed. The camera is dropped when this method
    /// returns, on every path.
    pub fn run<C, F>(&mut self, open_camera: F) -> Result<Stopped, Error>
    where
        C: FrameSource,
        F: FnOnce() -> anyhow::Result<C>,
    {
        let mut camera = open_camera().map_err(|e| Error::CameraOpen(e.into()))?;
        log::info!("camera opened, entering frame loop");

        let mut frames = 0;
        loop {
            let mut frame = camera.read().map_err(|e| Error::FrameRead {
                frames,
                source: e.into(),
            })?;

            let stats = self.process_frame(&mut frame, Instant::now());
            log::trace!("frame {frames}: {stats:?}");

            self.display.show(&frame).map_err(|e| Error::Show {
                frames,
                source: e.into(),
            })?;
            frames += 1;
            self.fps
                .tick_with(camera.timers().into_iter().chain(self.provider.timers()));

            match self.display.poll_key(self.options.poll_timeout) {
                Some(Key::Char(c)) if c == self.options.quit_key => {
                    log::info!("quit key pressed after {frames} frames");
                    return Ok(Stopped {
                        reason: StopReason::Quit,
                        frames,
                    });
                }
                Some(Key::Closed) => {
                    log::info!("window closed after {frames} frames");
                    return Ok(Stopped {
                        reason: StopReason::WindowClosed,
                        frames,
                    });
                }
                Some(Key::Char(_)) | None => {}
            }
        }
    }

    /// Runs landmark estimation on `frame`, counts fingers and draws all overlays onto it.
    ///
    /// `now` is the time at which the frame is considered complete, used for the FPS estimate.
    pub fn process_frame(&mut self, frame: &mut Image, now: Instant) -> FrameStats {
        let result = self.provider.process(frame);
        let fingers = fingers::count_total(result.left_hand.as_ref(), result.right_hand.as_ref());

        overlay::draw_holistic(frame, &result, &self.options.style);

        let fps = self.clock.tick(now);
        overlay::draw_text(frame, &overlay::fps_label(fps), self.options.fps_text);
        overlay::draw_text(
            frame,
            &overlay::fingers_label(fingers),
            self.options.fingers_text,
        );

        FrameStats { fps, fingers }
    }

    /// Consumes the loop, returning the landmark provider and the display.
    pub fn into_parts(self) -> (P, D) {
        (self.provider, self.display)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use anyhow::bail;
    use approx::assert_relative_eq;

    use crate::hand::landmark::{LandmarkIdx, NUM_LANDMARKS};
    use crate::holistic::HolisticResult;
    use crate::image::Color;
    use crate::landmark::Landmarks;

    use super::*;

    struct MockCamera {
        frames: usize,
    }

    impl FrameSource for MockCamera {
        fn read(&mut self) -> anyhow::Result<Image> {
            if self.frames == 0 {
                bail!("device disconnected");
            }
            self.frames -= 1;
            Ok(Image::new(160, 120))
        }
    }

    /// Returns the queued results in order, then empty results.
    #[derive(Default)]
    struct MockProvider {
        results: VecDeque<HolisticResult>,
        calls: usize,
    }

    impl LandmarkProvider for MockProvider {
        fn process(&mut self, _frame: &Image) -> HolisticResult {
            self.calls += 1;
            self.results.pop_front().unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct MockDisplay {
        shown: usize,
        keys: VecDeque<Key>,
        timeouts: Vec<Duration>,
        broken: bool,
    }

    impl Display for MockDisplay {
        fn show(&mut self, _image: &Image) -> anyhow::Result<()> {
            if self.broken {
                bail!("GUI event loop has exited");
            }
            self.shown += 1;
            Ok(())
        }

        fn poll_key(&mut self, timeout: Duration) -> Option<Key> {
            self.timeouts.push(timeout);
            self.keys.pop_front()
        }
    }

    fn frame_loop(keys: impl IntoIterator<Item = Key>) -> FrameLoop<MockProvider, MockDisplay> {
        let display = MockDisplay {
            keys: keys.into_iter().collect(),
            ..MockDisplay::default()
        };
        FrameLoop::new(MockProvider::default(), display, LoopOptions::default())
    }

    fn open_hand() -> Landmarks {
        let mut hand =
            Landmarks::from_positions((0..NUM_LANDMARKS).map(|i| [0.5, 0.1 * i as f32, 0.0]));
        hand.positions_mut()[LandmarkIdx::ThumbTip as usize][0] = 0.1;
        for tip in [8, 12, 16, 20] {
            hand.positions_mut()[tip][1] = 0.0;
        }
        hand
    }

    fn thumb_only() -> Landmarks {
        let mut hand =
            Landmarks::from_positions((0..NUM_LANDMARKS).map(|i| [0.5, 0.1 * i as f32, 0.0]));
        hand.positions_mut()[LandmarkIdx::ThumbTip as usize][0] = 0.1;
        hand
    }

    #[test]
    fn camera_open_failure_skips_loop() {
        let mut frame_loop = frame_loop([]);
        let err = frame_loop
            .run(|| -> anyhow::Result<MockCamera> { bail!("no such device") })
            .unwrap_err();
        assert!(matches!(err, Error::CameraOpen(_)));
        assert_eq!(err.to_string(), "cannot open camera");

        let (provider, display) = frame_loop.into_parts();
        assert_eq!(provider.calls, 0);
        assert_eq!(display.shown, 0);
        assert!(display.timeouts.is_empty());
    }

    #[test]
    fn quits_on_q() {
        let mut frame_loop = frame_loop([Key::Char('x'), Key::Char('Q'), Key::Char('q')]);
        let stopped = frame_loop.run(|| Ok(MockCamera { frames: 10 })).unwrap();
        assert_eq!(
            stopped,
            Stopped {
                reason: StopReason::Quit,
                frames: 3,
            }
        );

        let (provider, display) = frame_loop.into_parts();
        assert_eq!(provider.calls, 3);
        assert_eq!(display.shown, 3);
        assert_eq!(display.timeouts, vec![Duration::from_millis(1); 3]);
    }

    #[test]
    fn stops_when_window_closed() {
        let mut frame_loop = frame_loop([Key::Closed]);
        let stopped = frame_loop.run(|| Ok(MockCamera { frames: 10 })).unwrap();
        assert_eq!(stopped.reason, StopReason::WindowClosed);
        assert_eq!(stopped.frames, 1);
    }

    #[test]
    fn frame_read_failure_stops_loop() {
        let mut frame_loop = frame_loop([]);
        let err = frame_loop.run(|| Ok(MockCamera { frames: 2 })).unwrap_err();
        match &err {
            Error::FrameRead { frames, source } => {
                assert_eq!(*frames, 2);
                assert_eq!(source.to_string(), "device disconnected");
            }
            other => panic!("unexpected error: {other}"),
        }

        let (provider, display) = frame_loop.into_parts();
        assert_eq!(provider.calls, 2);
        assert_eq!(display.shown, 2);
    }

    #[test]
    fn display_failure_stops_loop() {
        let mut frame_loop = frame_loop([]);
        frame_loop.display.broken = true;
        let err = frame_loop.run(|| Ok(MockCamera { frames: 10 })).unwrap_err();
        assert_eq!(err.to_string(), "failed to display frame (after 0 frames)");
        assert!(matches!(err, Error::Show { frames: 0, .. }));

        let (provider, display) = frame_loop.into_parts();
        assert_eq!(provider.calls, 1);
        assert!(display.timeouts.is_empty());
    }

    #[test]
    fn recounts_every_frame() {
        let mut frame_loop = frame_loop([]);
        frame_loop.provider.results = VecDeque::from([
            HolisticResult {
                left_hand: Some(open_hand()),
                right_hand: Some(open_hand()),
                ..HolisticResult::default()
            },
            HolisticResult::default(),
            HolisticResult {
                right_hand: Some(thumb_only()),
                ..HolisticResult::default()
            },
        ]);

        let start = Instant::now();
        let mut image = Image::new(160, 120);
        let counts = (0..3)
            .map(|i| {
                let now = start + Duration::from_millis(500 * i);
                frame_loop.process_frame(&mut image, now).fingers
            })
            .collect::<Vec<_>>();
        assert_eq!(counts, [10, 0, 1]);
    }

    #[test]
    fn fps_from_frame_interval() {
        let mut frame_loop = frame_loop([]);
        let mut image = Image::new(160, 120);
        let start = Instant::now();
        let first = frame_loop.process_frame(&mut image, start);
        assert_eq!(first.fps, 0.0);
        let second = frame_loop.process_frame(&mut image, start + Duration::from_millis(500));
        assert_relative_eq!(second.fps, 2.0);
    }

    #[test]
    fn text_overlays_at_fixed_positions() {
        let mut frame_loop = frame_loop([]);
        let mut image = Image::new(200, 100);
        frame_loop.process_frame(&mut image, Instant::now());

        let rows_with = |color: Color| {
            (0..image.height())
                .filter(|&y| (0..image.width()).any(|x| image.get(x, y) == color))
                .collect::<Vec<_>>()
        };
        let fps_rows = rows_with(Color::CYAN);
        let finger_rows = rows_with(Color::MAGENTA);
        assert!(!fps_rows.is_empty());
        assert!(!finger_rows.is_empty());
        // Glyphs sit on their baseline, descenders aside.
        assert!(fps_rows.iter().all(|&y| (10..=34).contains(&y)), "{fps_rows:?}");
        assert!(finger_rows.iter().all(|&y| (50..=74).contains(&y)), "{finger_rows:?}");

        for y in 0..image.height() {
            for x in 0..10 {
                assert_eq!(image.get(x, y), Color::NULL);
            }
        }
    }
}
