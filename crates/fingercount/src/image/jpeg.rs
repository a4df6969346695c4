use anyhow::{bail, Context};
use image::ImageBuffer;
use jpeg_decoder::PixelFormat;

use super::Image;

pub(super) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    let pixels = decoder.decode()?;
    let info = decoder
        .info()
        .context("JPEG decoder did not produce image metadata")?;

    let rgba: Vec<u8> = match info.pixel_format {
        PixelFormat::RGB24 => pixels
            .chunks_exact(3)
            .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
            .collect(),
        PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l, 255]).collect(),
        other => bail!("unsupported JPEG pixel format {:?}", other),
    };

    let (width, height) = (u32::from(info.width), u32::from(info.height));
    let buf = ImageBuffer::from_raw(width, height, rgba)
        .context("decoded JPEG data does not match its resolution")?;
    Ok(Image { buf })
}

