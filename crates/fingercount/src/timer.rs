//! Performance measurement tools.

use std::{
    cell::Cell,
    fmt::{self, Arguments},
    mem,
    sync::Mutex,
    time::{Duration, Instant},
};

/// A timer that can measure and average the time an operation takes.
///
/// Collected timings are averaged and reset when the timer is displayed using `{}`
/// ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Sum of all measurements since the last reset.
    total: Duration,
    /// The number of measurements that contributed to `total`.
    count: u32,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn stop(&self, start: Instant) {
        let duration = start.elapsed();
        // A poisoned lock only means that another thread panicked while recording; the recorded
        // numbers are still usable.
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.total += duration;
        state.count += 1;
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let State { total, count } = mem::take(&mut *state);
        let avg_ms = if count == 0 {
            0.0
        } else {
            total.as_secs_f32() * 1000.0 / count as f32
        };

        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// Cloning a timer resets its collected timings.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Logs frames per second with optional extra data.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS if one second has passed.
    pub fn tick(&mut self) {
        self.tick_impl(format_args!(""));
    }

    /// Advances the frame counter by 1 and logs FPS and `extra` data if one second has passed.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) {
        struct DisplayExtra<D: fmt::Display, I: Iterator<Item = D>>(Cell<Option<I>>);

        impl<D: fmt::Display, I: Iterator<Item = D>> fmt::Display for DisplayExtra<D, I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let Some(mut iter) = self.0.take() else {
                    return Ok(());
                };
                if let Some(item) = iter.next() {
                    write!(f, " ({}", item)?;
                    for item in iter {
                        write!(f, ", {}", item)?;
                    }
                    f.write_str(")")?;
                }
                Ok(())
            }
        }

        self.tick_impl(format_args!(
            "{}",
            DisplayExtra(Cell::new(Some(extra.into_iter())))
        ));
    }

    fn tick_impl(&mut self, args: Arguments<'_>) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            log::debug!("{}: {} FPS{}", self.name, self.frames, args);

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}

/// Instantaneous frame rate estimate, computed from the time between two consecutive frames.
///
/// Unlike [`FpsCounter`], which averages over a second for logging, this reports a new value on
/// every [`FrameClock::tick`], which is what the on-screen FPS display shows.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    prev: Option<Instant>,
    curr: Option<Instant>,
    fps: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a frame was completed at `now` and returns the updated FPS estimate.
    ///
    /// The first tick has no previous frame to compare against and reports 0 FPS. If no time has
    /// passed since the previous tick (or `now` lies before it), the previous estimate is kept.
    pub fn tick(&mut self, now: Instant) -> f32 {
        self.prev = self.curr;
        if let Some(prev) = self.prev {
            if now <= prev {
                return self.fps;
            }
            self.fps = 1.0 / (now - prev).as_secs_f32();
        }
        self.curr = Some(now);
        self.fps
    }

    /// Returns the most recent FPS estimate.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn half_second_is_two_fps() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick(t0), 0.0);
        assert_relative_eq!(clock.tick(t0 + Duration::from_millis(500)), 2.0);
        assert_relative_eq!(clock.tick(t0 + Duration::from_millis(600)), 10.0, epsilon = 1e-3);
    }

    #[test]
    fn frame_clock_never_runs_backwards() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new();
        clock.tick(t0);
        clock.tick(t0 + Duration::from_millis(250));
        assert_relative_eq!(clock.fps(), 4.0);

        // A timestamp that doesn't advance keeps the last estimate instead of dividing by zero.
        assert_relative_eq!(clock.tick(t0 + Duration::from_millis(250)), 4.0);
        assert_relative_eq!(clock.tick(t0 + Duration::from_millis(100)), 4.0);

        // ...and the next valid tick is measured against the last accepted timestamp.
        assert_relative_eq!(clock.tick(t0 + Duration::from_millis(750)), 2.0);
    }

    #[test]
    fn timer_display_resets() {
        let timer = Timer::new("infer");
        timer.time(|| {});
        timer.time(|| {});
        let shown = timer.to_string();
        assert!(shown.starts_with("infer: 2x"), "{shown}");
        assert_eq!(timer.to_string(), "infer: 0x0.0ms");
    }
}
