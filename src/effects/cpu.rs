//! Reference implementation of the effect bank.
//!
//! Every branch here mirrors `effects.wgsl`: same constants, same hash, same order of
//! operations. Colors are premultiplied and normalized to `0..=1` while shading.

use std::f32::consts::PI;

use rayon::prelude::*;

use crate::assets::decode::PreparedImage;
use crate::effects::catalog::EffectParams;
use crate::foundation::math::{hash3, lerp, smoothstep, unit_to_u8, value_noise};
use crate::render::compose::CoverSampler;
use crate::render::frame::FrameRGBA;
use crate::scene::model::EffectTag;

type Color = [f32; 4];

const ZOOM_SAMPLES: u32 = 16;
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

struct Shading<'a> {
    sampler: CoverSampler<'a>,
    t: f32,
    w: f32,
    h: f32,
}

impl Shading<'_> {
    fn tex(&self, u: f32, v: f32) -> Color {
        let c = self.sampler.sample_uv(u, v);
        [c[0] / 255.0, c[1] / 255.0, c[2] / 255.0, c[3] / 255.0]
    }

    fn shade(&self, effect: EffectTag, u: f32, v: f32) -> Color {
        let t = self.t;
        match effect {
            EffectTag::None => self.tex(u, v),
            EffectTag::Vhs => {
                let line = (v * self.h).floor() as i32;
                let jitter = (hash3(0, line, (t * 30.0).floor() as u32) - 0.5) * 0.002;
                let split = (t * 2.0 + v * 10.0).sin() * 0.004 + jitter;
                let base = self.tex(u + jitter, v);
                let r = self.tex(u + split, v)[0];
                let b = self.tex(u - split, v)[2];
                let scan = 0.9 + 0.1 * (v * self.h * PI).sin();
                let flicker = 0.97 + 0.03 * (t * 50.0).sin();
                let k = scan * flicker;
                [r * k, base[1] * k, b * k, base[3]]
            }
            EffectTag::Glitch => {
                let bucket = (t * 8.0).floor() as u32;
                let bx = (u * 8.0).floor() as i32;
                let by = (v * 24.0).floor() as i32;
                let h = hash3(bx, by, bucket);
                let shift = if h > 0.8 {
                    (hash3(by, bx, bucket.wrapping_add(17)) - 0.5) * 0.2
                } else {
                    0.0
                };
                let su = u + shift;
                let split = 0.005 + 0.01 * h;
                let base = self.tex(su, v);
                [
                    self.tex(su + split, v)[0],
                    base[1],
                    self.tex(su - split, v)[2],
                    base[3],
                ]
            }
            EffectTag::ZoomBlur => {
                let strength = 0.1 + 0.05 * (2.0 * t).sin();
                let (dx, dy) = (0.5 - u, 0.5 - v);
                let mut acc = [0f32; 4];
                let mut wsum = 0.0;
                for i in 0..ZOOM_SAMPLES {
                    let s = (i as f32 + 0.5) / ZOOM_SAMPLES as f32;
                    let w = 4.0 * s * (1.0 - s);
                    let c = self.tex(u + dx * s * strength, v + dy * s * strength);
                    for k in 0..4 {
                        acc[k] += c[k] * w;
                    }
                    wsum += w;
                }
                acc.map(|a| a / wsum)
            }
            EffectTag::Pixelate => {
                let cells = 20.0 + 80.0 * (0.5 + 0.5 * t.sin());
                self.tex(
                    ((u * cells).floor() + 0.5) / cells,
                    ((v * cells).floor() + 0.5) / cells,
                )
            }
            EffectTag::RgbShift => {
                let off = 0.01 * (3.0 * t).sin();
                let base = self.tex(u, v);
                [
                    self.tex(u + off, v)[0],
                    base[1],
                    self.tex(u - off, v)[2],
                    base[3],
                ]
            }
            EffectTag::Crt => {
                let (cx, cy) = (u * 2.0 - 1.0, v * 2.0 - 1.0);
                let d = cx * cx + cy * cy;
                let k = 1.0 + 0.15 * d;
                let (bu, bv) = (cx * k * 0.5 + 0.5, cy * k * 0.5 + 0.5);
                if !(0.0..=1.0).contains(&bu) || !(0.0..=1.0).contains(&bv) {
                    return [0.0, 0.0, 0.0, 1.0];
                }
                let c = self.tex(bu, bv);
                let scan = 0.85 + 0.15 * (bv * self.h * PI).sin();
                [c[0] * scan, c[1] * scan, c[2] * scan, c[3]]
            }
            EffectTag::FilmGrain => {
                let c = self.tex(u, v);
                let n = value_noise(u * self.w * 0.5, v * self.h * 0.5, (t * 24.0).floor() as u32);
                [
                    lerp(c[0], n * c[3], 0.12),
                    lerp(c[1], n * c[3], 0.12),
                    lerp(c[2], n * c[3], 0.12),
                    c[3],
                ]
            }
            EffectTag::Shake => {
                let jx = (value_noise(t * 10.0, 0.0, 7) - 0.5) * 0.04;
                let jy = (value_noise(0.0, t * 10.0, 13) - 0.5) * 0.04;
                self.tex(u + jx, v + jy)
            }
            EffectTag::Vignette => {
                let c = self.tex(u, v);
                let d = ((u - 0.5) * (u - 0.5) + (v - 0.5) * (v - 0.5)).sqrt();
                let k = 1.0 - smoothstep(0.25, 0.8 + 0.05 * t.sin(), d);
                [c[0] * k, c[1] * k, c[2] * k, c[3]]
            }
            EffectTag::MemeFusion => {
                let c = self.tex(u, v);
                let luma = c[0] * LUMA[0] + c[1] * LUMA[1] + c[2] * LUMA[2];
                let n = hash3(
                    (u * self.w).floor() as i32,
                    (v * self.h).floor() as i32,
                    (t * 24.0).floor() as u32,
                ) - 0.5;
                let mut out = [0f32; 4];
                for k in 0..3 {
                    let desat = lerp(c[k], luma, 0.3);
                    let sat = luma + (desat - luma) * 3.0;
                    let contrast = (sat - 0.5) * 1.8 + 0.5;
                    out[k] = contrast + n * 0.15;
                }
                out[3] = c[3];
                out
            }
        }
    }
}

/// Render `img` cover-fitted into a `params.width x params.height` frame with the selected
/// effect applied. Output is premultiplied and byte-identical for identical inputs.
pub fn render_effect(img: &PreparedImage, params: &EffectParams) -> FrameRGBA {
    let mut frame = FrameRGBA::new(params.width, params.height);
    let row_bytes = frame.row_bytes();
    if row_bytes == 0 || params.height == 0 {
        return frame;
    }
    let shading = Shading {
        sampler: CoverSampler::new(img, params.width, params.height),
        t: params.time_sec,
        w: params.width as f32,
        h: params.height as f32,
    };
    frame
        .data
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let v = (y as f32 + 0.5) / shading.h;
            for (x, dst) in row.chunks_exact_mut(4).enumerate() {
                let u = (x as f32 + 0.5) / shading.w;
                let c = shading.shade(params.effect, u, v);
                let a = c[3].clamp(0.0, 1.0);
                dst[0] = unit_to_u8(c[0].min(a));
                dst[1] = unit_to_u8(c[1].min(a));
                dst[2] = unit_to_u8(c[2].min(a));
                dst[3] = unit_to_u8(a);
            }
        });
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> PreparedImage {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 255 / w) as u8, (y * 255 / h) as u8, 90, 255]);
            }
        }
        PreparedImage::from_premul(w, h, data).unwrap()
    }

    #[test]
    fn pass_through_of_solid_image_is_exact() {
        let img = PreparedImage::solid(5, 5, [12, 34, 56, 255]);
        let f = render_effect(&img, &EffectParams::new(EffectTag::None, 1.5, 8, 6));
        assert!(f.data.chunks_exact(4).all(|p| p == [12, 34, 56, 255]));
    }

    #[test]
    fn every_effect_is_deterministic() {
        let img = gradient(24, 16);
        for tag in EffectTag::ALL {
            let p = EffectParams::new(tag, 2.37, 32, 18);
            let a = render_effect(&img, &p);
            let b = render_effect(&img, &p);
            assert_eq!(a.data, b.data, "{tag:?} is not deterministic");
        }
    }

    #[test]
    fn crt_corners_are_black() {
        let img = PreparedImage::solid(4, 4, [255, 255, 255, 255]);
        let f = render_effect(&img, &EffectParams::new(EffectTag::Crt, 0.0, 64, 64));
        assert_eq!(f.pixel(0, 0), [0, 0, 0, 255]);
        assert_ne!(f.pixel(32, 32), [0, 0, 0, 255]);
    }

    #[test]
    fn vignette_darkens_edges_only() {
        let img = PreparedImage::solid(4, 4, [200, 200, 200, 255]);
        let f = render_effect(&img, &EffectParams::new(EffectTag::Vignette, 0.0, 64, 64));
        assert_eq!(f.pixel(32, 32), [200, 200, 200, 255]);
        assert!(f.pixel(0, 0)[0] < 60);
    }

    #[test]
    fn effects_vary_with_time() {
        let img = gradient(24, 16);
        let a = render_effect(&img, &EffectParams::new(EffectTag::Glitch, 0.0, 32, 18));
        let b = render_effect(&img, &EffectParams::new(EffectTag::Glitch, 3.3, 32, 18));
        assert_ne!(a.data, b.data);
    }
}
