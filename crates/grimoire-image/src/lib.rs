use std::{io::BufWriter, path::Path};

use fast_image_resize::{images::Image, IntoImageView as _, Resizer};
use image::{
    codecs::webp::WebPEncoder, ExtendedColorType, GenericImageView, ImageEncoder as _, ImageReader,
};

type Result<T> = anyhow::Result<T>;

pub const COVER_WIDTH: u32 = 800;

/// Covers are normalized to a fixed width, whatever the source size -
/// smaller originals are scaled up, matching the behavior users expect
/// from the catalog's cover grid.
fn scaled_dimensions(target_width: u32, actual: (u32, u32)) -> (u32, u32) {
    let scale = target_width as f32 / actual.0 as f32;
    let height = (actual.1 as f32 * scale).round() as u32;
    (target_width, height.max(1))
}

pub fn optimize_cover(path: impl AsRef<Path> + std::fmt::Debug) -> Result<Vec<u8>> {
    scale_to_width(path, COVER_WIDTH)
}

pub fn scale_to_width(path: impl AsRef<Path> + std::fmt::Debug, target_width: u32) -> Result<Vec<u8>> {
    let img = ImageReader::open(&path)?.with_guessed_format()?.decode()?;
    // lossless WebP encoding accepts only 8-bit RGB(A) buffers
    let img = image::DynamicImage::ImageRgba8(img.into_rgba8());
    let (width, height) = scaled_dimensions(target_width, img.dimensions());
    let mut dst_image = Image::new(
        width,
        height,
        img.pixel_type()
            .ok_or_else(|| anyhow::anyhow!("Cannot get pixel type"))?,
    );
    let mut resizer = Resizer::new();
    resizer.resize(&img, &mut dst_image, None)?;

    let data = Vec::with_capacity(1024);
    let mut writer = BufWriter::new(data);
    WebPEncoder::new_lossless(&mut writer).write_image(
        dst_image.buffer(),
        width,
        height,
        ExtendedColorType::Rgba8,
    )?;
    Ok(writer.into_inner()?)
}
