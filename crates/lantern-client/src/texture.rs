use std::path::Path;

use crate::descriptors::TextureDesc;

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
}

/// Decode an image file into a fixed-size sRGB texture descriptor carrying
/// its pixels.
pub fn load_texture_desc(path: &Path) -> Result<TextureDesc, TextureError> {
    let img = image::open(path).map_err(|source| TextureError::Decode {
        path: path.display().to_string(),
        source,
    })?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    tracing::debug!("Loaded image {:?} ({}x{})", path, width, height);
    Ok(TextureDesc::with_data(
        "rgba8srgb",
        width,
        height,
        width * 4,
        rgba.into_raw(),
    ))
}
