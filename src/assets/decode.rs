use std::sync::Arc;

use anyhow::Context;

use crate::foundation::error::{ReelError, ReelResult};

/// Decoded still image stored as premultiplied RGBA8.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

const PLACEHOLDER_SIZE: u32 = 64;
const PLACEHOLDER_CELL: u32 = 8;
const PLACEHOLDER_LIGHT: [u8; 4] = [255, 0, 255, 255];
const PLACEHOLDER_DARK: [u8; 4] = [32, 32, 32, 255];

impl PreparedImage {
    /// Wrap an already premultiplied buffer. The length must be `width * height * 4`.
    pub fn from_premul(width: u32, height: u32, rgba8_premul: Vec<u8>) -> ReelResult<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        if width == 0 || height == 0 || rgba8_premul.len() != expected {
            return Err(ReelError::validation(format!(
                "image buffer of {} bytes does not match {width}x{height}",
                rgba8_premul.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(rgba8_premul),
        })
    }

    /// Opaque single-color image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut px = rgba;
        premultiply_rgba8_in_place(&mut px);
        let data = px
            .iter()
            .copied()
            .cycle()
            .take((width.max(1) * height.max(1) * 4) as usize)
            .collect();
        Self {
            width: width.max(1),
            height: height.max(1),
            rgba8_premul: Arc::new(data),
        }
    }

    /// Magenta/dark checkerboard drawn in place of an asset that failed to load, so degraded
    /// output is visible rather than silently blank.
    pub fn placeholder() -> Self {
        let mut data = Vec::with_capacity((PLACEHOLDER_SIZE * PLACEHOLDER_SIZE * 4) as usize);
        for y in 0..PLACEHOLDER_SIZE {
            for x in 0..PLACEHOLDER_SIZE {
                let light = ((x / PLACEHOLDER_CELL) + (y / PLACEHOLDER_CELL)) % 2 == 0;
                data.extend_from_slice(if light {
                    &PLACEHOLDER_LIGHT
                } else {
                    &PLACEHOLDER_DARK
                });
            }
        }
        Self {
            width: PLACEHOLDER_SIZE,
            height: PLACEHOLDER_SIZE,
            rgba8_premul: Arc::new(data),
        }
    }

    /// Premultiplied pixel at integer coordinates, clamped to the image edge.
    pub fn pixel_clamped(&self, x: i64, y: i64) -> [u8; 4] {
        let xi = x.clamp(0, i64::from(self.width) - 1) as usize;
        let yi = y.clamp(0, i64::from(self.height) - 1) as usize;
        let idx = (yi * self.width as usize + xi) * 4;
        let p = &self.rgba8_premul[idx..idx + 4];
        [p[0], p[1], p[2], p[3]]
    }
}

pub fn decode_image(bytes: &[u8]) -> ReelResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Encode a straight-alpha RGBA8 buffer as PNG bytes.
pub fn encode_png(width: u32, height: u32, rgba8: &[u8]) -> ReelResult<Vec<u8>> {
    let img = image::RgbaImage::from_raw(width, height, rgba8.to_vec())
        .ok_or_else(|| ReelError::validation("png buffer size mismatch"))?;
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("encode png")?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_image_png_dimensions_and_premul() {
        let png = encode_png(1, 1, &[100, 50, 200, 128]).unwrap();
        let prepared = decode_image(&png).unwrap();
        assert_eq!(prepared.width, 1);
        assert_eq!(prepared.height, 1);
        assert_eq!(
            prepared.rgba8_premul.as_slice(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode_image(b"definitely not an image").is_err());
    }

    #[test]
    fn placeholder_is_an_opaque_checkerboard() {
        let p = PreparedImage::placeholder();
        assert_eq!(p.pixel_clamped(0, 0), PLACEHOLDER_LIGHT);
        assert_eq!(p.pixel_clamped(8, 0), PLACEHOLDER_DARK);
        assert!(p.rgba8_premul.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn from_premul_checks_length() {
        assert!(PreparedImage::from_premul(2, 2, vec![0; 16]).is_ok());
        assert!(PreparedImage::from_premul(2, 2, vec![0; 15]).is_err());
        assert!(PreparedImage::from_premul(0, 2, vec![]).is_err());
    }
}
