use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use super::PreviewResult;
use crate::error::BrowseError;

/// Transcoded previews are scaled to fit a square of this edge.
pub const THUMBNAIL_EDGE: u32 = 800;

pub fn mime_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Browser-native formats pass through; TIFF and BMP become PNG.
pub fn preview_image(extension: &str, body: &[u8]) -> Result<PreviewResult, BrowseError> {
    match extension {
        "tif" | "tiff" => to_png(body, ImageFormat::Tiff),
        "bmp" => to_png(body, ImageFormat::Bmp),
        _ => Ok(PreviewResult::Image {
            bytes: body.to_vec(),
            mime: mime_for(extension).to_string(),
        }),
    }
}

fn to_png(body: &[u8], source: ImageFormat) -> Result<PreviewResult, BrowseError> {
    let decoded = image::load_from_memory_with_format(body, source)
        .map_err(|e| BrowseError::Decode(format!("cannot decode {source:?} image: {e}")))?;

    let decoded = if decoded.width() > THUMBNAIL_EDGE || decoded.height() > THUMBNAIL_EDGE {
        decoded.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE)
    } else {
        decoded
    };

    // 8-bit RGBA is always encodable as PNG, whatever the source depth
    let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());
    let mut png = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| BrowseError::Decode(format!("cannot encode PNG preview: {e}")))?;

    Ok(PreviewResult::Image {
        bytes: png,
        mime: "image/png".to_string(),
    })
}
