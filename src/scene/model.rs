use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::foundation::error::{ReelError, ReelResult};

/// Identifies one of the two visual slots of a scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    pub const ALL: [SlotId; 2] = [SlotId::A, SlotId::B];

    pub fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

/// Closed catalog of per-scene visual effects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EffectTag {
    #[default]
    None,
    Vhs,
    Glitch,
    ZoomBlur,
    Pixelate,
    RgbShift,
    Crt,
    FilmGrain,
    Shake,
    Vignette,
    MemeFusion,
}

impl EffectTag {
    pub const ALL: [EffectTag; 11] = [
        EffectTag::None,
        EffectTag::Vhs,
        EffectTag::Glitch,
        EffectTag::ZoomBlur,
        EffectTag::Pixelate,
        EffectTag::RgbShift,
        EffectTag::Crt,
        EffectTag::FilmGrain,
        EffectTag::Shake,
        EffectTag::Vignette,
        EffectTag::MemeFusion,
    ];

    /// Parse a tag leniently. Case, `-`, `_` and spaces are ignored; unknown tags map to
    /// [`EffectTag::None`].
    pub fn parse(s: &str) -> Self {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "vhs" => Self::Vhs,
            "glitch" => Self::Glitch,
            "zoomblur" | "zoom" => Self::ZoomBlur,
            "pixelate" | "pixel" => Self::Pixelate,
            "rgbshift" | "rgb" => Self::RgbShift,
            "crt" => Self::Crt,
            "filmgrain" | "grain" => Self::FilmGrain,
            "shake" => Self::Shake,
            "vignette" => Self::Vignette,
            "memefusion" | "deepfry" => Self::MemeFusion,
            "" | "none" => Self::None,
            other => {
                tracing::warn!(tag = other, "unknown visual effect tag, using none");
                Self::None
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Vhs => "vhs",
            Self::Glitch => "glitch",
            Self::ZoomBlur => "zoom_blur",
            Self::Pixelate => "pixelate",
            Self::RgbShift => "rgb_shift",
            Self::Crt => "crt",
            Self::FilmGrain => "film_grain",
            Self::Shake => "shake",
            Self::Vignette => "vignette",
            Self::MemeFusion => "meme_fusion",
        }
    }
}

impl Serialize for EffectTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EffectTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.as_deref().map(EffectTag::parse).unwrap_or_default())
    }
}

/// Entry transition tag. Every tag currently renders as the one-second fade-in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTag {
    #[default]
    Fade,
    Slide,
}

/// One visual slot of a scene: a still image, optionally upgraded to a short video.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualSlot {
    pub prompt: String,
    pub motion_prompt: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    /// Set when the slot is explicitly designated to play its video rather than its still.
    pub prefer_video: bool,
    pub image_status: AssetStatus,
    pub video_status: AssetStatus,
}

impl VisualSlot {
    /// `true` when neither a still nor a video has been assigned.
    pub fn is_empty(&self) -> bool {
        self.image_url.is_none() && self.video_url.is_none()
    }
}

/// A narrative unit: one script line, two visual slots, optional narration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub script: String,
    /// Authored duration in seconds.
    pub duration: f64,
    #[serde(default)]
    pub slots: [VisualSlot; 2],
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub audio_status: AssetStatus,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub visual_effect: EffectTag,
    #[serde(default)]
    pub transition_in: TransitionTag,
}

impl Scene {
    pub fn new(id: impl Into<String>, script: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            script: script.into(),
            duration,
            slots: Default::default(),
            audio_url: None,
            audio_status: AssetStatus::Pending,
            voice_id: None,
            visual_effect: EffectTag::None,
            transition_in: TransitionTag::Fade,
        }
    }

    pub fn slot(&self, id: SlotId) -> &VisualSlot {
        &self.slots[id.index()]
    }

    pub fn slot_mut(&mut self, id: SlotId) -> &mut VisualSlot {
        &mut self.slots[id.index()]
    }

    pub fn with_image(mut self, slot: SlotId, url: impl Into<String>) -> Self {
        let s = self.slot_mut(slot);
        s.image_url = Some(url.into());
        s.image_status = AssetStatus::Success;
        self
    }

    pub fn with_video(mut self, slot: SlotId, url: impl Into<String>) -> Self {
        let s = self.slot_mut(slot);
        s.video_url = Some(url.into());
        s.video_status = AssetStatus::Success;
        s.prefer_video = true;
        self
    }

    pub fn with_audio(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self.audio_status = AssetStatus::Success;
        self
    }

    pub fn with_effect(mut self, effect: EffectTag) -> Self {
        self.visual_effect = effect;
        self
    }

    /// Replace the scene wholesale after a script edit. The id, duration, prompts, effect and
    /// transition survive; every resolved asset is dropped back to pending.
    pub fn replace_script(&self, script: impl Into<String>) -> Self {
        let mut next = Scene::new(self.id.clone(), script, self.duration);
        for id in SlotId::ALL {
            let prev = self.slot(id);
            let slot = next.slot_mut(id);
            slot.prompt = prev.prompt.clone();
            slot.motion_prompt = prev.motion_prompt.clone();
        }
        next.voice_id = self.voice_id.clone();
        next.visual_effect = self.visual_effect;
        next.transition_in = self.transition_in;
        next
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.id.trim().is_empty() {
            return Err(ReelError::validation("scene id must be non-empty"));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ReelError::validation(format!(
                "scene '{}' duration must be finite and > 0",
                self.id
            )));
        }
        Ok(())
    }
}

/// Validate a scene list: every scene valid, ids unique.
pub fn validate_scenes(scenes: &[Scene]) -> ReelResult<()> {
    let mut seen = std::collections::HashSet::new();
    for s in scenes {
        s.validate()?;
        if !seen.insert(s.id.as_str()) {
            return Err(ReelError::validation(format!(
                "duplicate scene id '{}'",
                s.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/scene/model.rs"]
mod tests;
