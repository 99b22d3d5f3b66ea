use std::sync::{Arc, Mutex};
use std::time::Duration;

use scenereel::assets::decode::PreparedImage;
use scenereel::assets::media::{AudioPcm, MIX_SAMPLE_RATE};
use scenereel::assets::video::VideoSource;
use scenereel::{
    AspectRatio, EffectTag, ExportOpts, ExportRenderer, FrameIndex, FrameRGBA, FrameSink,
    InMemorySink, MediaBlob, MediaLoader, ReelError, ReelResult, Scene, SinkConfig, SlotId,
    TickSource, VirtualClock,
};

/// Serves `mem:` stills and one 4.2 s narration; everything else fails to load.
struct MemoryLoader;

#[async_trait::async_trait]
impl MediaLoader for MemoryLoader {
    async fn load_image(&self, url: &str) -> ReelResult<PreparedImage> {
        match url {
            "mem:red" => Ok(PreparedImage::solid(8, 8, [255, 0, 0, 255])),
            "mem:blue" => Ok(PreparedImage::solid(8, 8, [0, 0, 255, 255])),
            _ => Err(ReelError::asset(format!("no such image '{url}'"))),
        }
    }

    async fn load_video(&self, url: &str, _fps: f64) -> ReelResult<Box<dyn VideoSource>> {
        Err(ReelError::asset(format!("no such video '{url}'")))
    }

    async fn load_audio(&self, url: &str) -> ReelResult<AudioPcm> {
        if url != "mem:narration" {
            return Err(ReelError::asset(format!("no such audio '{url}'")));
        }
        let frames = (4.2 * f64::from(MIX_SAMPLE_RATE)).round() as usize;
        Ok(AudioPcm {
            sample_rate: MIX_SAMPLE_RATE,
            channels: 2,
            interleaved_f32: Arc::new(vec![0.1; frames * 2]),
        })
    }
}

#[derive(Debug, Default)]
struct SinkLog {
    cfg: Option<SinkConfig>,
    frames: Vec<u64>,
    ended: bool,
}

/// Records what the renderer hands the sink; optionally fails on a given frame.
struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    fail_at: Option<u64>,
}

impl FrameSink for RecordingSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        self.log.lock().unwrap().cfg = Some(cfg);
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, _frame: &FrameRGBA) -> ReelResult<()> {
        if self.fail_at == Some(idx.0) {
            return Err(ReelError::Other(anyhow::anyhow!("encoder pipe closed")));
        }
        self.log.lock().unwrap().frames.push(idx.0);
        Ok(())
    }

    fn end(&mut self) -> ReelResult<MediaBlob> {
        let mut log = self.log.lock().unwrap();
        log.ended = true;
        Ok(MediaBlob {
            bytes: vec![1],
            mime: "video/x-test".to_string(),
            duration_sec: 0.0,
            frame_count: log.frames.len() as u64,
        })
    }
}

fn opts() -> ExportOpts {
    ExportOpts {
        short_edge: 18,
        ..ExportOpts::default()
    }
}

fn two_stills() -> Vec<Scene> {
    vec![
        Scene::new("s1", "first line", 3.0).with_image(SlotId::A, "mem:red"),
        Scene::new("s2", "second line", 3.0).with_image(SlotId::A, "mem:blue"),
    ]
}

#[tokio::test]
async fn two_still_scenes_export_six_seconds() {
    let clock = VirtualClock::new();
    let mut renderer = ExportRenderer::new(Arc::new(MemoryLoader), opts())
        .with_sink(Box::new(InMemorySink::counting()))
        .with_clock(Box::new(clock.clone()));

    let mut progress = Vec::new();
    let blob = renderer
        .render(&two_stills(), AspectRatio::Landscape16x9, |frac, _| {
            progress.push(frac)
        })
        .await
        .unwrap();

    assert!(!blob.is_empty());
    assert_eq!(blob.frame_count, 180);
    let frame = 1.0 / 30.0;
    assert!((blob.duration_sec - 6.0).abs() <= frame);

    assert_eq!(progress.first().copied(), Some(0.0));
    assert_eq!(progress.last().copied(), Some(1.0));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));

    // Asset preparation reports once per settled asset: narration and two slots per scene.
    let preparing: Vec<f64> = progress
        .iter()
        .copied()
        .filter(|p| *p > 0.0 && *p <= 0.5)
        .collect();
    assert_eq!(preparing.len(), 6);
    assert!((preparing[0] - 0.5 / 6.0).abs() < 1e-12);
    assert_eq!(preparing[5], 0.5);

    // Realtime pacing waited one frame interval per frame.
    assert_eq!(clock.now(), Duration::from_secs(6));
}

#[tokio::test]
async fn narration_length_overrides_authored_duration() {
    let log = Arc::new(Mutex::new(SinkLog::default()));
    let scene = Scene::new("s1", "narrated", 7.0)
        .with_image(SlotId::A, "mem:red")
        .with_audio("mem:narration");

    let mut renderer = ExportRenderer::new(Arc::new(MemoryLoader), opts())
        .with_sink(Box::new(RecordingSink {
            log: log.clone(),
            fail_at: None,
        }))
        .with_clock(Box::new(VirtualClock::new()));
    renderer
        .render(&[scene], AspectRatio::Square, |_, _| {})
        .await
        .unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.frames.len(), 126);
    assert_eq!(log.frames.first().copied(), Some(0));
    assert_eq!(log.frames.last().copied(), Some(125));
    let audio = log.cfg.as_ref().and_then(|c| c.audio.clone()).unwrap();
    assert_eq!(audio.channels, 2);
    assert!((audio.duration_sec() - 4.2).abs() < 1e-3);
}

#[tokio::test]
async fn silent_export_has_no_audio_track() {
    let log = Arc::new(Mutex::new(SinkLog::default()));
    let mut renderer = ExportRenderer::new(Arc::new(MemoryLoader), opts())
        .with_sink(Box::new(RecordingSink {
            log: log.clone(),
            fail_at: None,
        }))
        .with_clock(Box::new(VirtualClock::new()));

    // A missing narration falls back to the authored duration without audio.
    let scene = Scene::new("s1", "quiet", 1.0)
        .with_image(SlotId::A, "mem:red")
        .with_audio("mem:gone");
    renderer
        .render(&[scene], AspectRatio::Portrait9x16, |_, _| {})
        .await
        .unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.frames.len(), 30);
    let cfg = log.cfg.as_ref().unwrap();
    assert!(cfg.audio.is_none());
    assert!(cfg.height > cfg.width);
}

#[tokio::test]
async fn missing_stills_render_placeholders() {
    let mut renderer = ExportRenderer::new(Arc::new(MemoryLoader), opts())
        .with_sink(Box::new(InMemorySink::counting()))
        .with_clock(Box::new(VirtualClock::new()));

    let scenes = vec![
        Scene::new("s1", "broken", 1.0).with_image(SlotId::A, "mem:nowhere"),
        Scene::new("s2", "empty", 1.0),
    ];
    let blob = renderer
        .render(&scenes, AspectRatio::Square, |_, _| {})
        .await
        .unwrap();
    assert_eq!(blob.frame_count, 60);
}

/// Pixel `(x, y)` of frame `f` in an in-memory blob of `w x h` frames.
fn blob_pixel(blob: &MediaBlob, w: usize, h: usize, f: usize, x: usize, y: usize) -> [u8; 4] {
    let at = (f * w * h + y * w + x) * 4;
    let px = &blob.bytes[at..at + 4];
    [px[0], px[1], px[2], px[3]]
}

#[tokio::test]
async fn frames_cut_between_slots_and_fade_in() {
    let mut o = opts();
    o.realtime = false;
    let mut renderer =
        ExportRenderer::new(Arc::new(MemoryLoader), o).with_sink(Box::new(InMemorySink::new()));

    let scenes = vec![
        Scene::new("s1", "two stills", 10.0)
            .with_image(SlotId::A, "mem:red")
            .with_image(SlotId::B, "mem:blue"),
        Scene::new("s2", "one still", 2.0).with_image(SlotId::A, "mem:blue"),
    ];
    let blob = renderer
        .render(&scenes, AspectRatio::Square, |_, _| {})
        .await
        .unwrap();
    assert_eq!(blob.frame_count, 360);

    let (w, h) = (18, 18);
    let black = [0, 0, 0, 255];
    let red = [255, 0, 0, 255];
    let blue = [0, 0, 255, 255];
    assert_eq!(blob.bytes.len(), 360 * w * h * 4);

    // Each scene enters from black and is unfaded after one second.
    assert_eq!(blob_pixel(&blob, w, h, 0, 9, 9), black);
    let half_faded = blob_pixel(&blob, w, h, 15, 9, 9);
    assert!(half_faded[0] > 0 && half_faded[0] < 255, "{half_faded:?}");
    assert_eq!(blob_pixel(&blob, w, h, 30, 9, 9), red);
    assert_eq!(blob_pixel(&blob, w, h, 300, 9, 9), black);

    // Slot A holds the first half of the scene, slot B the second.
    assert_eq!(blob_pixel(&blob, w, h, 147, 9, 9), red);
    assert_eq!(blob_pixel(&blob, w, h, 153, 9, 9), blue);
    assert_eq!(blob_pixel(&blob, w, h, 299, 0, 0), blue);

    // An empty slot B keeps showing slot A.
    assert_eq!(blob_pixel(&blob, w, h, 345, 9, 9), blue);
}

#[tokio::test]
async fn effects_run_when_enabled() {
    let mut o = opts();
    o.apply_effects = true;
    o.realtime = false;
    let mut renderer = ExportRenderer::new(Arc::new(MemoryLoader), o)
        .with_sink(Box::new(InMemorySink::new()));

    let scene = Scene::new("s1", "crt", 0.5)
        .with_image(SlotId::A, "mem:red")
        .with_effect(EffectTag::Crt);
    let blob = renderer
        .render(&[scene], AspectRatio::Square, |_, _| {})
        .await
        .unwrap();
    assert_eq!(blob.frame_count, 15);
}

#[tokio::test]
async fn sink_failure_aborts_with_export_error() {
    let log = Arc::new(Mutex::new(SinkLog::default()));
    let mut renderer = ExportRenderer::new(Arc::new(MemoryLoader), opts())
        .with_sink(Box::new(RecordingSink {
            log: log.clone(),
            fail_at: Some(10),
        }))
        .with_clock(Box::new(VirtualClock::new()));

    let mut last = 0.0;
    let err = renderer
        .render(&two_stills(), AspectRatio::Square, |frac, _| last = frac)
        .await
        .unwrap_err();

    assert!(matches!(err, ReelError::Export(_)), "{err:?}");
    assert!(err.is_export_fatal());
    assert!(last < 1.0);
    let log = log.lock().unwrap();
    assert_eq!(log.frames.len(), 10);
    assert!(log.ended);
}

#[tokio::test]
async fn empty_scene_list_is_rejected() {
    let mut renderer = ExportRenderer::new(Arc::new(MemoryLoader), opts())
        .with_sink(Box::new(InMemorySink::counting()));
    let err = renderer
        .render(&[], AspectRatio::Square, |_, _| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ReelError::Validation(_)));
}
