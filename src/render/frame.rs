use crate::assets::decode::encode_png;
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::mul_div255_u16;

/// A rendered frame as RGBA8 pixels.
///
/// Frames are premultiplied alpha unless `premultiplied` says otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Fully transparent premultiplied frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize) * 4],
            premultiplied: true,
        }
    }

    /// Fill every pixel with a straight-alpha color.
    pub fn clear(&mut self, rgba: [u8; 4]) {
        let a = u16::from(rgba[3]);
        let px = [
            mul_div255_u16(u16::from(rgba[0]), a) as u8,
            mul_div255_u16(u16::from(rgba[1]), a) as u8,
            mul_div255_u16(u16::from(rgba[2]), a) as u8,
            rgba[3],
        ];
        for d in self.data.chunks_exact_mut(4) {
            d.copy_from_slice(&px);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * 4
    }

    /// Straight-alpha copy of the pixel data.
    pub fn to_straight_rgba8(&self) -> Vec<u8> {
        if !self.premultiplied {
            return self.data.clone();
        }
        let mut out = self.data.clone();
        for px in out.chunks_exact_mut(4) {
            let a = u32::from(px[3]);
            if a == 0 || a == 255 {
                continue;
            }
            for c in &mut px[..3] {
                *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
        out
    }

    pub fn to_png(&self) -> ReelResult<Vec<u8>> {
        if self.data.len() != self.row_bytes() * self.height as usize {
            return Err(ReelError::render("frame buffer size mismatch"));
        }
        encode_png(self.width, self.height, &self.to_straight_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_premultiplies() {
        let mut f = FrameRGBA::new(2, 2);
        f.clear([200, 100, 0, 128]);
        assert_eq!(f.pixel(1, 1), [100, 50, 0, 128]);
    }

    #[test]
    fn straight_conversion_undoes_premul() {
        let mut f = FrameRGBA::new(1, 1);
        f.data.copy_from_slice(&[64, 32, 0, 128]);
        assert_eq!(f.to_straight_rgba8(), vec![128, 64, 0, 128]);
    }
}
