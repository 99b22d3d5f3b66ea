use scenereel::assets::decode::PreparedImage;
use scenereel::effects::catalog::EffectParams;
use scenereel::{BackendKind, EffectTag, create_backend};

fn checker(w: u32, h: u32) -> PreparedImage {
    let mut data = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            let on = (x / 4 + y / 4) % 2 == 0;
            let v = if on { 230 } else { 40 };
            data.extend_from_slice(&[v, (x * 255 / w) as u8, (y * 255 / h) as u8, 255]);
        }
    }
    PreparedImage::from_premul(w, h, data).unwrap()
}

#[test]
fn cpu_bank_renders_every_effect_reproducibly() {
    let img = checker(40, 24);
    let mut a = create_backend(BackendKind::Cpu).unwrap();
    let mut b = create_backend(BackendKind::Cpu).unwrap();
    let ta = a.upload(&img).unwrap();
    let tb = b.upload(&img).unwrap();

    for tag in EffectTag::ALL {
        for t in [0.0f32, 0.41, 5.9] {
            let p = EffectParams::new(tag, t, 48, 27);
            let fa = a.render(ta, &p).unwrap();
            let fb = b.render(tb, &p).unwrap();
            assert_eq!((fa.width, fa.height), (48, 27));
            assert_eq!(fa.data, fb.data, "{tag:?} at t={t} differs between backends");
        }
    }
}

#[test]
fn output_is_premultiplied() {
    let img = checker(16, 16);
    let mut be = create_backend(BackendKind::Cpu).unwrap();
    let tex = be.upload(&img).unwrap();
    for tag in EffectTag::ALL {
        let f = be
            .render(tex, &EffectParams::new(tag, 1.25, 20, 20))
            .unwrap();
        for px in f.data.chunks_exact(4) {
            assert!(px[0] <= px[3] && px[1] <= px[3] && px[2] <= px[3], "{tag:?}: {px:?}");
        }
    }
}

#[test]
fn swapping_textures_keeps_the_program() {
    let mut be = create_backend(BackendKind::Cpu).unwrap();
    let red = be
        .upload(&PreparedImage::solid(2, 2, [255, 0, 0, 255]))
        .unwrap();
    let blue = be
        .upload(&PreparedImage::solid(2, 2, [0, 0, 255, 255]))
        .unwrap();
    let p = EffectParams::new(EffectTag::None, 0.0, 4, 4);

    assert_eq!(be.render(red, &p).unwrap().pixel(1, 1), [255, 0, 0, 255]);
    assert_eq!(be.render(blue, &p).unwrap().pixel(1, 1), [0, 0, 255, 255]);
    be.release(red);
    assert!(be.render(red, &p).is_err());
    assert_eq!(be.render(blue, &p).unwrap().pixel(2, 2), [0, 0, 255, 255]);
}

#[test]
fn tags_parse_leniently() {
    assert_eq!(EffectTag::parse("Zoom Blur"), EffectTag::ZoomBlur);
    assert_eq!(EffectTag::parse("rgb_shift"), EffectTag::RgbShift);
    assert_eq!(EffectTag::parse("FILM-GRAIN"), EffectTag::FilmGrain);
    assert_eq!(EffectTag::parse("sparkles"), EffectTag::None);
    for tag in EffectTag::ALL {
        assert_eq!(EffectTag::parse(tag.as_str()), tag);
    }
}

#[cfg(feature = "gpu")]
mod gpu_parity {
    use super::*;
    use scenereel::ReelError;

    #[test]
    fn gpu_matches_cpu_within_tolerance() {
        let mut gpu = match create_backend(BackendKind::Gpu) {
            Ok(b) => b,
            Err(ReelError::Gpu(msg)) => {
                eprintln!("skipping: {msg}");
                return;
            }
            Err(e) => panic!("unexpected backend error: {e}"),
        };
        let mut cpu = create_backend(BackendKind::Cpu).unwrap();
        let img = checker(32, 32);
        let tg = gpu.upload(&img).unwrap();
        let tc = cpu.upload(&img).unwrap();

        for tag in [EffectTag::None, EffectTag::Vignette] {
            let p = EffectParams::new(tag, 0.5, 32, 32);
            let fg = gpu.render(tg, &p).unwrap();
            let fc = cpu.render(tc, &p).unwrap();
            let worst = fg
                .data
                .iter()
                .zip(&fc.data)
                .map(|(a, b)| a.abs_diff(*b))
                .max()
                .unwrap_or(0);
            assert!(worst <= 8, "{tag:?} differs by {worst}");
        }
    }
}
