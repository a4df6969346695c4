//! Image manipulation.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA image. Webcam frames are decoded into this type.
//! - [`ImageView`], a borrowed rectangular view into an [`Image`] that may extend past its edges.
//! - A variety of [`draw`] functions to visualize landmarks and text.
//! - [`Rect`], a floating-point rectangle describing regions of interest.

pub mod draw;
mod jpeg;
mod rect;

#[cfg(test)]
mod tests;

use std::fmt;

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{ImageBuffer, RgbaImage};

pub use rect::Rect;

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    // RGBA8 matches the texture format the GUI uploads, so no conversion is needed for display.
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        jpeg::decode_jpeg(data)
    }

    /// Creates an image from raw RGBA8 pixel data.
    ///
    /// # Panics
    ///
    /// Panics if `buf` does not contain exactly `4 * width * height` bytes.
    pub fn from_rgba8(res: Resolution, buf: &[u8]) -> Self {
        let expected_size = res.num_pixels() as usize * 4;
        assert_eq!(
            expected_size,
            buf.len(),
            "incorrect buffer size {} for {} image (expected {} bytes)",
            buf.len(),
            res,
            expected_size,
        );

        Self {
            buf: ImageBuffer::from_raw(res.width(), res.height(), buf.to_vec())
                .expect("buffer size does not match image resolution"),
        }
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns a [`Rect`] covering the whole image.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    /// Creates a view into a rectangular area of the image.
    ///
    /// The rectangle may extend past the image's edges. Pixels outside of the image read as
    /// [`Color::NULL`].
    pub fn view(&self, rect: Rect) -> ImageView<'_> {
        ImageView { image: self, rect }
    }

    /// Returns the color of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf.get_pixel(x, y).0)
    }

    /// Sets the pixel at `(x, y)` to `color`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf.get_pixel_mut(x, y).0 = color.0;
    }

    /// Fills the whole image with `color`.
    pub fn clear(&mut self, color: Color) {
        for pixel in self.buf.pixels_mut() {
            pixel.0 = color.0;
        }
    }

    /// Returns the raw RGBA8 pixel data, row by row.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image @ {}", self.resolution())
    }
}

/// An immutable view of a rectangular section of an [`Image`].
///
/// Unlike the image itself, a view can extend beyond the image borders, which is used to pad
/// regions of interest near the edge of the camera frame.
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    image: &'a Image,
    rect: Rect,
}

impl<'a> ImageView<'a> {
    /// Returns the area of the underlying image this view covers.
    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Creates another view into the same underlying image.
    ///
    /// `rect` is given in the coordinates of the underlying image, not relative to `self`.
    pub fn view(&self, rect: Rect) -> ImageView<'a> {
        ImageView {
            image: self.image,
            rect,
        }
    }

    /// Samples the view at relative coordinates.
    ///
    /// `u` and `v` range from 0.0 (left/top edge of the view) to 1.0 (right/bottom edge). The
    /// nearest pixel is returned, or [`Color::NULL`] if it lies outside of the underlying image.
    pub fn sample(&self, u: f32, v: f32) -> Color {
        let x = (self.rect.x() + u * self.rect.width()).floor();
        let y = (self.rect.y() + v * self.rect.height()).floor();
        if x < 0.0 || y < 0.0 || x >= self.image.width() as f32 || y >= self.image.height() as f32
        {
            return Color::NULL;
        }
        self.image.get(x as u32, y as u32)
    }

    /// Copies the viewed pixels into a new image of the view's (rounded) size.
    pub fn to_image(&self) -> Image {
        let width = self.rect.width().round().max(0.0) as u32;
        let height = self.rect.height().round().max(0.0) as u32;
        let mut out = Image::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let v = (y as f32 + 0.5) / height as f32;
                out.set(x, y, self.sample(u, v));
            }
        }
        out
    }
}

impl fmt::Debug for ImageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageView {:?} of {:?}", self.rect, self.image)
    }
}

/// An 8-bit sRGB color with alpha channel.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);
    pub const YELLOW: Self = Self([255, 255, 0, 255]);
    pub const CYAN: Self = Self([0, 255, 255, 255]);
    pub const MAGENTA: Self = Self([255, 0, 255, 255]);
    /// Fully transparent black.
    pub const NULL: Self = Self([0, 0, 0, 0]);

    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a()
        )
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

/// Width and height of an image or network input, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns the ratio of width to height, or [`None`] if the height is zero.
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.height == 0 {
            None
        } else {
            Some(self.width as f32 / self.height as f32)
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
