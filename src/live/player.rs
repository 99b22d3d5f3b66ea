//! Interactive single-scene-at-a-time presentation.
//!
//! [`LivePlayer`] is a plain state machine advanced by [`LivePlayer::tick`]; it never sleeps
//! or spawns. Scheduling lives in [`crate::live::driver`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::decode::PreparedImage;
use crate::assets::loader::MediaLoader;
use crate::effects::backend::{EffectBackend, TextureId};
use crate::effects::catalog::EffectParams;
use crate::export::loaded::{LoadedScene, SlotMedia, load_scene};
use crate::foundation::config::PreviewConfig;
use crate::foundation::error::{ReelError, ReelResult};
use crate::live::surface::{AudioOutput, FrameInfo, PreviewSurface};
use crate::render::compose::{draw_cover, select_slot};
use crate::render::frame::FrameRGBA;
use crate::scene::model::{Scene, SlotId};

/// Texture cache key used for slots without a loadable still.
const PLACEHOLDER_KEY: &str = "scenereel:placeholder";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Idle,
    Playing,
    Paused,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    StateChanged(PlayState),
    SceneChanged { index: usize },
    /// The last scene reached full progress.
    Finished,
}

#[derive(Clone, Copy, Debug)]
pub struct LiveOpts {
    /// Display refresh ticks per second.
    pub tick_rate: u32,
    pub width: u32,
    pub height: u32,
}

impl From<&PreviewConfig> for LiveOpts {
    fn from(cfg: &PreviewConfig) -> Self {
        Self {
            tick_rate: cfg.tick_rate,
            width: cfg.width,
            height: cfg.height,
        }
    }
}

type Listener = Box<dyn FnMut(&PlayerEvent) + Send>;

pub struct LivePlayer {
    scenes: Vec<LoadedScene>,
    opts: LiveOpts,
    backend: Box<dyn EffectBackend>,
    textures: HashMap<String, TextureId>,
    surface: Box<dyn PreviewSurface>,
    audio: Box<dyn AudioOutput>,
    listeners: Vec<Listener>,
    frame: FrameRGBA,
    state: PlayState,
    index: usize,
    ticks: u64,
    /// Whether the current scene's narration was started since the scene was entered.
    narration_started: bool,
}

impl LivePlayer {
    pub fn new(
        scenes: Vec<LoadedScene>,
        opts: LiveOpts,
        backend: Box<dyn EffectBackend>,
        surface: Box<dyn PreviewSurface>,
        audio: Box<dyn AudioOutput>,
    ) -> ReelResult<Self> {
        if scenes.is_empty() {
            return Err(ReelError::validation("live player needs at least one scene"));
        }
        if opts.tick_rate == 0 || opts.width == 0 || opts.height == 0 {
            return Err(ReelError::validation(
                "live player tick rate and surface size must be non-zero",
            ));
        }
        Ok(Self {
            scenes,
            frame: FrameRGBA::new(opts.width, opts.height),
            opts,
            backend,
            textures: HashMap::new(),
            surface,
            audio,
            listeners: Vec::new(),
            state: PlayState::Idle,
            index: 0,
            ticks: 0,
            narration_started: false,
        })
    }

    /// Load every scene's media through `loader`, then build the player.
    pub async fn load(
        loader: &dyn MediaLoader,
        scenes: &[Scene],
        opts: LiveOpts,
        backend: Box<dyn EffectBackend>,
        surface: Box<dyn PreviewSurface>,
        audio: Box<dyn AudioOutput>,
    ) -> ReelResult<Self> {
        let mut loaded = Vec::with_capacity(scenes.len());
        for scene in scenes {
            loaded.push(load_scene(loader, scene, f64::from(opts.tick_rate)).await);
        }
        Self::new(loaded, opts, backend, surface, audio)
    }

    pub fn on_event(&mut self, listener: impl FnMut(&PlayerEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn tick_rate(&self) -> u32 {
        self.opts.tick_rate
    }

    /// Seconds since the current scene was entered.
    pub fn scene_time(&self) -> f64 {
        self.ticks as f64 / f64::from(self.opts.tick_rate)
    }

    /// Current scene's progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let eff = self.scenes[self.index].effective_duration;
        let total = eff * f64::from(self.opts.tick_rate);
        if total <= 0.0 {
            return 1.0;
        }
        (self.ticks as f64 / total).min(1.0)
    }

    /// `true` once the last scene has played to full progress.
    pub fn is_finished(&self) -> bool {
        self.index + 1 == self.scenes.len() && self.progress() >= 1.0
    }

    /// Distinct stills uploaded to the effect backend so far.
    pub fn cached_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn play(&mut self) -> ReelResult<()> {
        match self.state {
            PlayState::Playing => return Ok(()),
            PlayState::Paused if self.is_finished() => {
                self.set_state(PlayState::Playing);
                self.enter_scene(0)?;
                return Ok(());
            }
            PlayState::Paused if self.narration_started => self.audio.resume(),
            // Entered while not playing: the scene's narration has not started yet.
            PlayState::Paused | PlayState::Idle => self.start_narration(),
        }
        self.set_state(PlayState::Playing);
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state == PlayState::Playing {
            self.audio.pause();
            self.set_state(PlayState::Paused);
        }
    }

    pub fn toggle(&mut self) -> ReelResult<()> {
        if self.state == PlayState::Playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Jump to scene `index`, restarting its progress. The play state is kept.
    pub fn seek(&mut self, index: usize) -> ReelResult<()> {
        if index >= self.scenes.len() {
            return Err(ReelError::validation(format!(
                "scene index {index} out of range (0..{})",
                self.scenes.len()
            )));
        }
        self.enter_scene(index)
    }

    pub fn next(&mut self) -> ReelResult<()> {
        if self.index + 1 < self.scenes.len() {
            self.enter_scene(self.index + 1)?;
        }
        Ok(())
    }

    pub fn prev(&mut self) -> ReelResult<()> {
        if self.index > 0 {
            self.enter_scene(self.index - 1)?;
        }
        Ok(())
    }

    /// One display refresh: present the current frame, then advance progress. Does nothing
    /// unless playing.
    pub fn tick(&mut self) -> ReelResult<()> {
        if self.state != PlayState::Playing {
            return Ok(());
        }
        self.present()?;
        self.ticks += 1;

        if self.progress() < 1.0 {
            return Ok(());
        }
        if self.index + 1 < self.scenes.len() {
            return self.enter_scene(self.index + 1);
        }
        self.stop_narration();
        self.set_state(PlayState::Paused);
        self.emit(PlayerEvent::Finished);
        Ok(())
    }

    /// Draw and present the frame for the current scene time.
    pub fn present(&mut self) -> ReelResult<()> {
        let t = self.scene_time();
        let info = FrameInfo {
            scene_index: self.index,
            scene_time: t,
            progress: self.progress(),
        };
        let Self {
            scenes,
            backend,
            textures,
            surface,
            frame,
            index,
            ..
        } = self;
        let scene = &mut scenes[*index];
        let eff = scene.effective_duration;
        let effect = scene.scene.visual_effect;
        let slot = select_slot(t, eff);
        let key = still_key(&scene.scene, slot);

        match scene.media_mut(slot) {
            SlotMedia::Video(video) => {
                // Video-backed scenes bypass the effect bank.
                let img = video.frame_at(t).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "video frame failed, drawing placeholder");
                    Arc::new(PreparedImage::placeholder())
                });
                frame.clear([0, 0, 0, 255]);
                draw_cover(frame, &img);
            }
            media => {
                let (key, img) = match media {
                    SlotMedia::Image(img) => (key, img.clone()),
                    _ => (
                        PLACEHOLDER_KEY.to_owned(),
                        Arc::new(PreparedImage::placeholder()),
                    ),
                };
                let texture = match textures.get(&key) {
                    Some(id) => *id,
                    None => {
                        let id = backend.upload(&img)?;
                        tracing::debug!(key = %key, "texture uploaded");
                        textures.insert(key, id);
                        id
                    }
                };
                let params = EffectParams::new(effect, t as f32, frame.width, frame.height);
                *frame = backend.render(texture, &params)?;
            }
        }
        surface.present(frame, info)
    }

    /// Release every cached texture.
    pub fn dispose(&mut self) {
        self.stop_narration();
        for (_, id) in self.textures.drain() {
            self.backend.release(id);
        }
    }

    fn enter_scene(&mut self, index: usize) -> ReelResult<()> {
        self.stop_narration();
        self.index = index;
        self.ticks = 0;
        self.scenes[index].rewind_videos();
        if self.state == PlayState::Playing {
            self.start_narration();
        }
        self.emit(PlayerEvent::SceneChanged { index });
        self.present()
    }

    fn start_narration(&mut self) {
        if let Some(pcm) = self.scenes[self.index].audio.as_ref() {
            self.audio.start(pcm);
            self.narration_started = true;
        }
    }

    fn stop_narration(&mut self) {
        self.audio.stop();
        self.narration_started = false;
    }

    fn set_state(&mut self, state: PlayState) {
        if self.state != state {
            self.state = state;
            self.emit(PlayerEvent::StateChanged(state));
        }
    }

    fn emit(&mut self, ev: PlayerEvent) {
        tracing::debug!(event = ?ev, "player event");
        for l in &mut self.listeners {
            l(&ev);
        }
    }
}

/// URL of the still a slot shows, following an empty slot B back to slot A.
fn still_key(scene: &Scene, slot: SlotId) -> String {
    let own = scene.slot(slot).image_url.as_deref();
    let url = match (slot, own) {
        (SlotId::B, None) if scene.slot(SlotId::B).is_empty() => {
            scene.slot(SlotId::A).image_url.as_deref()
        }
        _ => own,
    };
    url.unwrap_or(PLACEHOLDER_KEY).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::backend::CpuEffectBackend;
    use crate::live::surface::{AudioEvent, MemorySurface, NullAudio, RecordingAudio};
    use crate::scene::model::EffectTag;
    use std::sync::Mutex;

    fn still(url: &str, rgba: [u8; 4], duration: f64) -> LoadedScene {
        let scene = Scene::new(url, "line", duration).with_image(SlotId::A, url);
        LoadedScene::new(
            scene,
            None,
            [
                SlotMedia::Image(Arc::new(PreparedImage::solid(4, 4, rgba))),
                SlotMedia::SameAsA,
            ],
        )
    }

    fn opts() -> LiveOpts {
        LiveOpts {
            tick_rate: 10,
            width: 8,
            height: 8,
        }
    }

    fn player(scenes: Vec<LoadedScene>, surface: MemorySurface) -> LivePlayer {
        LivePlayer::new(
            scenes,
            opts(),
            Box::new(CpuEffectBackend::new()),
            Box::new(surface),
            Box::new(NullAudio),
        )
        .unwrap()
    }

    #[test]
    fn ticks_do_nothing_until_played() {
        let surface = MemorySurface::new();
        let mut p = player(vec![still("a", [255, 0, 0, 255], 1.0)], surface.clone());
        p.tick().unwrap();
        assert_eq!(p.state(), PlayState::Idle);
        assert_eq!(surface.presented(), 0);
    }

    #[test]
    fn advances_then_pauses_at_end_of_last_scene() {
        let surface = MemorySurface::new();
        let mut p = player(
            vec![
                still("a", [255, 0, 0, 255], 1.0),
                still("b", [0, 0, 255, 255], 0.5),
            ],
            surface.clone(),
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        p.on_event(move |e| sink.lock().unwrap().push(e.clone()));

        p.play().unwrap();
        for _ in 0..10 {
            p.tick().unwrap();
        }
        assert_eq!(p.index(), 1);
        assert_eq!(p.state(), PlayState::Playing);
        for _ in 0..5 {
            p.tick().unwrap();
        }
        assert_eq!(p.state(), PlayState::Paused);
        assert!(p.is_finished());
        assert_eq!(p.progress(), 1.0);

        let events = events.lock().unwrap().clone();
        assert_eq!(events.first(), Some(&PlayerEvent::StateChanged(PlayState::Playing)));
        assert!(events.contains(&PlayerEvent::SceneChanged { index: 1 }));
        assert!(events.contains(&PlayerEvent::Finished));
        assert_eq!(events.last(), Some(&PlayerEvent::Finished));
    }

    #[test]
    fn play_after_finish_restarts_from_first_scene() {
        let mut p = player(vec![still("a", [1, 2, 3, 255], 0.2)], MemorySurface::new());
        p.play().unwrap();
        p.tick().unwrap();
        p.tick().unwrap();
        assert!(p.is_finished());
        p.play().unwrap();
        assert_eq!(p.index(), 0);
        assert_eq!(p.progress(), 0.0);
        assert_eq!(p.state(), PlayState::Playing);
    }

    #[test]
    fn textures_are_cached_per_url() {
        let mut p = player(
            vec![
                still("https://img/a.png", [255, 0, 0, 255], 1.0),
                still("https://img/a.png", [255, 0, 0, 255], 1.0),
                still("https://img/b.png", [0, 255, 0, 255], 1.0),
            ],
            MemorySurface::new(),
        );
        p.play().unwrap();
        for _ in 0..30 {
            p.tick().unwrap();
        }
        assert_eq!(p.cached_textures(), 2);
        p.dispose();
        assert_eq!(p.cached_textures(), 0);
    }

    #[test]
    fn seek_keeps_play_state_and_rejects_out_of_range() {
        let surface = MemorySurface::new();
        let mut p = player(
            vec![
                still("a", [255, 0, 0, 255], 1.0),
                still("b", [0, 0, 255, 255], 1.0),
            ],
            surface.clone(),
        );
        p.seek(1).unwrap();
        assert_eq!(p.state(), PlayState::Idle);
        let (frame, info) = surface.last_frame().unwrap();
        assert_eq!(info.scene_index, 1);
        assert_eq!(frame.pixel(4, 4), [0, 0, 255, 255]);
        assert!(p.seek(2).is_err());
        p.prev().unwrap();
        assert_eq!(p.index(), 0);
        p.prev().unwrap();
        assert_eq!(p.index(), 0);
    }

    #[test]
    fn narration_follows_play_state() {
        let audio = RecordingAudio::new();
        let mut scene = still("a", [9, 9, 9, 255], 1.0);
        scene.audio = Some(crate::assets::media::AudioPcm {
            sample_rate: 10,
            channels: 2,
            interleaved_f32: Arc::new(vec![0.0; 20]),
        });
        let mut p = LivePlayer::new(
            vec![scene],
            opts(),
            Box::new(CpuEffectBackend::new()),
            Box::new(MemorySurface::new()),
            Box::new(audio.clone()),
        )
        .unwrap();
        p.play().unwrap();
        p.pause();
        p.toggle().unwrap();
        assert_eq!(
            audio.events(),
            vec![
                AudioEvent::Start { duration_sec: 1.0 },
                AudioEvent::Pause,
                AudioEvent::Resume,
            ]
        );
    }

    #[test]
    fn effect_is_applied_to_stills() {
        let surface = MemorySurface::new();
        let mut scene = still("a", [200, 200, 200, 255], 1.0);
        scene.scene.visual_effect = EffectTag::Crt;
        let mut p = player(vec![scene], surface.clone());
        p.play().unwrap();
        p.tick().unwrap();
        let (frame, _) = surface.last_frame().unwrap();
        assert_eq!(frame.pixel(0, 0), [0, 0, 0, 255]);
    }
}
