use crate::scene::model::EffectTag;

impl EffectTag {
    /// Integer code selecting the effect branch in the shader. `0` is pass-through.
    pub fn code(self) -> u32 {
        match self {
            EffectTag::None => 0,
            EffectTag::Vhs => 1,
            EffectTag::Glitch => 2,
            EffectTag::ZoomBlur => 3,
            EffectTag::Pixelate => 4,
            EffectTag::RgbShift => 5,
            EffectTag::Crt => 6,
            EffectTag::FilmGrain => 7,
            EffectTag::Shake => 8,
            EffectTag::Vignette => 9,
            EffectTag::MemeFusion => 10,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        EffectTag::ALL.get(code as usize).copied()
    }
}

/// Per-frame effect inputs. Output is a pure function of these plus the source image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParams {
    pub effect: EffectTag,
    pub time_sec: f32,
    pub width: u32,
    pub height: u32,
}

impl EffectParams {
    pub fn new(effect: EffectTag, time_sec: f32, width: u32, height: u32) -> Self {
        Self {
            effect,
            time_sec,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_catalog_order() {
        for (i, tag) in EffectTag::ALL.iter().enumerate() {
            assert_eq!(tag.code(), i as u32);
            assert_eq!(EffectTag::from_code(i as u32), Some(*tag));
        }
        assert_eq!(EffectTag::from_code(11), None);
    }
}
