use image::imageops::FilterType;
use ndarray::Array4;

#[derive(Debug, thiserror::Error)]
pub enum ImageDecodeError {
    #[error("image decoding failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero width or height")]
    Empty,
}

/// Decodes an upload into a `[1, height, width, 3]` batch scaled to `[0, 1]`.
///
/// Any format `image` can sniff is accepted; alpha and grayscale inputs are
/// converted to RGB.
pub fn preprocess(bytes: &[u8], (width, height): (u32, u32)) -> Result<Array4<f32>, ImageDecodeError> {
    let decoded = image::load_from_memory(bytes)?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(ImageDecodeError::Empty);
    }
    let rgb = decoded
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8();

    let batch = Array4::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / 255.0,
    );
    Ok(batch)
}
