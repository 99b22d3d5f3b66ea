use crate::foundation::error::{ReelError, ReelResult};

/// Absolute 0-based frame index in export timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> ReelResult<Self> {
        if den == 0 {
            return Err(ReelError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReelError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Nearest frame boundary for `secs`. Scene boundaries are snapped with this so the sum of
    /// per-scene frame counts equals the frame count of the summed durations.
    pub fn secs_to_frames_round(self, secs: f64) -> u64 {
        (secs * self.as_f64()).round().max(0.0) as u64
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

/// Output aspect ratio requested by the caller of an export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Classic4x3,
}

impl AspectRatio {
    pub fn parse(s: &str) -> ReelResult<Self> {
        match s.trim() {
            "16:9" | "landscape" => Ok(Self::Landscape16x9),
            "9:16" | "portrait" => Ok(Self::Portrait9x16),
            "1:1" | "square" => Ok(Self::Square),
            "4:3" => Ok(Self::Classic4x3),
            other => Err(ReelError::validation(format!(
                "unknown aspect ratio '{other}'"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape16x9 => "16:9",
            Self::Portrait9x16 => "9:16",
            Self::Square => "1:1",
            Self::Classic4x3 => "4:3",
        }
    }

    fn ratio(self) -> (u32, u32) {
        match self {
            Self::Landscape16x9 => (16, 9),
            Self::Portrait9x16 => (9, 16),
            Self::Square => (1, 1),
            Self::Classic4x3 => (4, 3),
        }
    }

    /// Canvas whose shorter edge is `short_edge`, with both sides rounded to even numbers
    /// (yuv420p output requires even dimensions).
    pub fn canvas(self, short_edge: u32) -> Canvas {
        let (w, h) = self.ratio();
        let short = short_edge.max(2);
        let (width, height) = if w >= h {
            (scale_even(short, w, h), even(short))
        } else {
            (even(short), scale_even(short, h, w))
        };
        Canvas { width, height }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn even(v: u32) -> u32 {
    v - (v % 2)
}

fn scale_even(short: u32, long_part: u32, short_part: u32) -> u32 {
    let v = (u64::from(short) * u64::from(long_part) + u64::from(short_part) / 2)
        / u64::from(short_part);
    even(v as u32).max(2)
}
