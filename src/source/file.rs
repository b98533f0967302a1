//! Opening raster files through the `image` crate.

use std::path::Path;

use tracing::info;

use crate::error::SourceError;

use super::buffer::PixelBuffer;
use super::raster::RasterSource;

/// Scale applied to the `[0, 1]` float samples produced by `image`, so that
/// file-backed sources share the `[0, 255]` range of 8-bit imagery.
const SAMPLE_SCALE: f32 = 255.0;

/// Decode a PNG, JPEG or TIFF file into a [`RasterSource`].
///
/// Grayscale images become single-band sources; everything else is converted
/// to three RGB bands. Overview levels are derived lazily by the source and at
/// most `level_cache` of them are kept in memory.
pub fn open_image_file(path: &Path, level_cache: usize) -> Result<RasterSource, SourceError> {
    let image = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) => SourceError::Io(io.to_string()),
        other => SourceError::Image(other.to_string()),
    })?;

    let (width, height) = (image.width(), image.height());
    let channels = image.color().channel_count();

    let buffer = if channels < 3 {
        let luma = image.to_luma32f();
        PixelBuffer::new(width, height, 1, scale(luma.into_raw()))
    } else {
        let rgb = image.to_rgb32f();
        PixelBuffer::new(width, height, 3, scale(rgb.into_raw()))
    };

    info!(
        path = %path.display(),
        width,
        height,
        bands = buffer.bands(),
        "Opened image"
    );

    Ok(RasterSource::new(path.display().to_string(), buffer)?.with_level_cache(level_cache))
}

fn scale(mut samples: Vec<f32>) -> Vec<f32> {
    samples.iter_mut().for_each(|v| *v *= SAMPLE_SCALE);
    samples
}
