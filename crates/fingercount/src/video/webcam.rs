//! V4L2 webcam access.
//!
//! Currently, only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are
//! supported.

use std::cmp::Reverse;

use crate::config::Settings;
use crate::image::{Image, Resolution};
use crate::timer::Timer;
use crate::video::FrameSource;
use anyhow::{bail, Context};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

/// Device opened when no webcam name is configured.
const DEFAULT_DEVICE: &str = "/dev/video0";

/// Webcam selection options.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
}

impl WebcamOptions {
    /// Creates options from the process settings.
    ///
    /// If a webcam name is configured, that device is opened instead of the default one.
    pub fn from_settings(settings: &Settings) -> Self {
        let options = Self::default();
        match settings.webcam_name() {
            Some(name) => options.name(name),
            None => options,
        }
    }

    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

fn negotiate_format(device: &Device) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    let Some(fmt) = best_format(&formats) else {
        bail!("webcam reports no frame formats");
    };
    Ok((
        PixFormat::new(
            fmt.resolution.width(),
            fmt.resolution.height(),
            pixel_format,
        ),
        fmt.frame_interval,
    ))
}

/// Picks the format with the highest resolution, and among those the highest frame rate.
fn best_format(formats: &[FrameFormat]) -> Option<FrameFormat> {
    formats
        .iter()
        .max_by_key(|fmt| (fmt.resolution.num_pixels(), Reverse(fmt.frame_interval)))
        .copied()
}

fn decode_frame(buf: &[u8]) -> anyhow::Result<Image> {
    Image::decode_jpeg(buf).context("failed to decode webcam frame")
}

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the webcam described by `options`.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        match &options.name {
            Some(name) => Self::open_by_name(name, &options),
            None => {
                let dev = Device::open(DEFAULT_DEVICE)
                    .with_context(|| format!("failed to open webcam device '{DEFAULT_DEVICE}'"))?;
                match Self::open_impl(dev, &options)? {
                    Some(webcam) => Ok(webcam),
                    None => bail!("'{DEFAULT_DEVICE}' is not a video capture device"),
                }
            }
        }
    }

    fn open_by_name(name: &str, options: &WebcamOptions) -> anyhow::Result<Self> {
        log::debug!("looking for webcam '{}'", name);
        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_impl(dev, options) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => {
                        log::debug!("{}", e);
                    }
                },
                Err(e) => {
                    log::warn!("{}", e);
                }
            }
        }

        bail!("no supported webcam named '{name}' found")
    }

    fn open_impl(dev: Device, options: &WebcamOptions) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = options.name.as_deref() {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev)?;

        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let (width, height) = (format.width(), format.height());
        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {}x{} @ {:.1}Hz",
            caps.card(),
            path.display(),
            width,
            height,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream()?;

        Ok(Some(Self {
            stream,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is. A frame that fails to decode
    /// is returned as an error.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            Ok(self.t_decode.time(|| decode_frame(&buf)))
        })?
    }
}

impl FrameSource for Webcam {
    fn read(&mut self) -> anyhow::Result<Image> {
        Webcam::read(self)
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

#[cfg(test)]
mod tests {
    use std::env::VarError;

    use super::*;

    fn format(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    #[test]
    fn prefers_highest_resolution() {
        let formats = [
            format(640, 480, 30),
            format(640, 480, 60),
            format(1280, 720, 30),
            format(1920, 1080, 15),
        ];
        assert_eq!(best_format(&formats), Some(format(1920, 1080, 15)));
    }

    #[test]
    fn highest_frame_rate_breaks_ties() {
        let formats = [
            format(1280, 720, 10),
            format(1280, 720, 30),
            format(1280, 720, 15),
            format(640, 480, 60),
        ];
        assert_eq!(best_format(&formats), Some(format(1280, 720, 30)));
    }

    #[test]
    fn no_formats() {
        assert_eq!(best_format(&[]), None);
    }

    #[test]
    fn corrupt_frame_is_an_error() {
        let err = decode_frame(b"garbage").unwrap_err();
        assert_eq!(err.to_string(), "failed to decode webcam frame");
    }

    #[test]
    fn options_from_settings() {
        let settings = Settings::from_vars(|_| Err(VarError::NotPresent)).unwrap();
        assert_eq!(WebcamOptions::from_settings(&settings).name, None);

        let settings = Settings::from_vars(|name| match name {
            "FINGERCOUNT_WEBCAM_NAME" => Ok("Integrated Camera".into()),
            _ => Err(VarError::NotPresent),
        })
        .unwrap();
        let opts = WebcamOptions::from_settings(&settings);
        assert_eq!(opts.name.as_deref(), Some("Integrated Camera"));
    }
}
