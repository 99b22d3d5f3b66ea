//! Frame composition primitives shared by the export loop and the effect bank.

use kurbo::{Point, Rect, Size};
use rayon::prelude::*;

use crate::assets::decode::PreparedImage;
use crate::render::frame::FrameRGBA;
use crate::scene::model::SlotId;

/// Destination rect that covers `dst` with `src` at uniform scale, centered. Overflow lies
/// outside `dst` and is cropped when drawn.
pub fn cover_rect(src: Size, dst: Size) -> Rect {
    if src.width <= 0.0 || src.height <= 0.0 {
        return Rect::from_origin_size(Point::ORIGIN, dst);
    }
    let scale = (dst.width / src.width).max(dst.height / src.height);
    let drawn = Size::new(src.width * scale, src.height * scale);
    Rect::from_center_size(Point::new(dst.width / 2.0, dst.height / 2.0), drawn)
}

/// `(drawn_w, drawn_h, off_x, off_y)` of a cover-fitted source in output pixels. This is the
/// `cover` uniform of the effect shader.
pub fn cover_transform(src_w: u32, src_h: u32, out_w: u32, out_h: u32) -> [f32; 4] {
    let r = cover_rect(
        Size::new(f64::from(src_w), f64::from(src_h)),
        Size::new(f64::from(out_w), f64::from(out_h)),
    );
    [r.width() as f32, r.height() as f32, r.x0 as f32, r.y0 as f32]
}

/// Maps output pixel positions onto a source image placed with [`cover_rect`].
#[derive(Clone, Copy, Debug)]
pub struct CoverSampler<'a> {
    img: &'a PreparedImage,
    out_w: f32,
    out_h: f32,
    x0: f32,
    y0: f32,
    drawn_w: f32,
    drawn_h: f32,
}

impl<'a> CoverSampler<'a> {
    pub fn new(img: &'a PreparedImage, out_w: u32, out_h: u32) -> Self {
        let [drawn_w, drawn_h, x0, y0] = cover_transform(img.width, img.height, out_w, out_h);
        Self {
            img,
            out_w: out_w as f32,
            out_h: out_h as f32,
            x0,
            y0,
            drawn_w,
            drawn_h,
        }
    }

    /// Premultiplied color (channels in `0..=255`) at output pixel position `(x, y)`.
    pub fn sample_px(&self, x: f32, y: f32) -> [f32; 4] {
        let sx = (x - self.x0) / self.drawn_w * self.img.width as f32;
        let sy = (y - self.y0) / self.drawn_h * self.img.height as f32;
        bilinear(self.img, sx, sy)
    }

    /// Same as [`Self::sample_px`] with normalized output coordinates.
    pub fn sample_uv(&self, u: f32, v: f32) -> [f32; 4] {
        self.sample_px(u * self.out_w, v * self.out_h)
    }
}

/// Bilinear sample at source pixel position (pixel centers at `i + 0.5`), clamped to edge.
fn bilinear(img: &PreparedImage, sx: f32, sy: f32) -> [f32; 4] {
    let fx = sx - 0.5;
    let fy = sy - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let p00 = img.pixel_clamped(x0, y0);
    let p10 = img.pixel_clamped(x0 + 1, y0);
    let p01 = img.pixel_clamped(x0, y0 + 1);
    let p11 = img.pixel_clamped(x0 + 1, y0 + 1);

    let mut out = [0f32; 4];
    for c in 0..4 {
        let top = f32::from(p00[c]) + (f32::from(p10[c]) - f32::from(p00[c])) * tx;
        let bot = f32::from(p01[c]) + (f32::from(p11[c]) - f32::from(p01[c])) * tx;
        out[c] = top + (bot - top) * ty;
    }
    out
}

/// Draw `img` over `frame` with cover fitting (scale to fill, center-crop overflow).
pub fn draw_cover(frame: &mut FrameRGBA, img: &PreparedImage) {
    let sampler = CoverSampler::new(img, frame.width, frame.height);
    let row_bytes = frame.row_bytes();
    if row_bytes == 0 {
        return;
    }
    frame
        .data
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let py = y as f32 + 0.5;
            for (x, dst) in row.chunks_exact_mut(4).enumerate() {
                let src = sampler.sample_px(x as f32 + 0.5, py);
                let inv = 1.0 - src[3] / 255.0;
                for c in 0..4 {
                    dst[c] = (src[c] + f32::from(dst[c]) * inv).round().clamp(0.0, 255.0) as u8;
                }
            }
        });
}

/// Slot shown at scene-local time `t`: A for the first half of the effective duration, B for
/// the rest. Hard cut, no crossfade.
pub fn select_slot(t_sec: f64, effective_duration: f64) -> SlotId {
    if t_sec < effective_duration / 2.0 {
        SlotId::A
    } else {
        SlotId::B
    }
}

/// Opacity of the black entry overlay at scene-local time `t`: 1 at the scene start, falling
/// linearly to 0 at `transition_sec` and staying there.
pub fn overlay_opacity(t_sec: f64, transition_sec: f64) -> f32 {
    if transition_sec <= 0.0 {
        return 0.0;
    }
    (1.0 - t_sec / transition_sec).clamp(0.0, 1.0) as f32
}

/// Source-over a black layer of the given opacity.
pub fn apply_black_overlay(frame: &mut FrameRGBA, opacity: f32) {
    let a = opacity.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    let keep = 1.0 - a;
    for px in frame.data.chunks_exact_mut(4) {
        for c in &mut px[..3] {
            *c = (f32::from(*c) * keep).round() as u8;
        }
        px[3] = (a * 255.0 + f32::from(px[3]) * keep).round().clamp(0.0, 255.0) as u8;
    }
}
