use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};

use tempfile::TempDir;

use crate::audio::mix::write_mix_to_f32le_file;
use crate::encode::sink::{FrameSink, MediaBlob, SinkConfig};
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::mul_div255_u16;
use crate::render::frame::FrameRGBA;

/// Options for [`FfmpegSink`].
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Background color used to flatten alpha (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
}

impl Default for FfmpegSinkOpts {
    fn default() -> Self {
        Self {
            bg_rgba: [0, 0, 0, 255],
        }
    }
}

/// Sink that spawns the system `ffmpeg`, streams raw frames to stdin and muxes the narration
/// bus as AAC. The MP4 is written into a scratch directory and returned as a [`MediaBlob`].
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    workdir: Option<TempDir>,
    out_path: PathBuf,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
    frame_count: u64,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            workdir: None,
            out_path: PathBuf::new(),
            cfg: None,
            last_idx: None,
            frame_count: 0,
        }
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.stderr_drain = None;
        self.workdir = None;
        self.cfg = None;
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.abort();
    }
}

impl FrameSink for FfmpegSink {
    #[tracing::instrument(skip_all, fields(width = cfg.width, height = cfg.height))]
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(ReelError::export("export frame rate must be non-zero"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ReelError::export("export canvas is empty"));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(ReelError::export(
                "mp4 export needs an even canvas for yuv420p, check the short edge",
            ));
        }
        if !is_ffmpeg_on_path() {
            return Err(ReelError::export(
                "cannot export mp4: no ffmpeg binary on PATH",
            ));
        }

        let workdir = tempfile::Builder::new()
            .prefix("scenereel-export-")
            .tempdir()
            .map_err(|e| ReelError::export(format!("failed to create export scratch dir: {e}")))?;
        let out_path = workdir.path().join("out.mp4");

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        // Input: raw RGBA8 frames, flattened over the background in push_frame since
        // ffmpeg does not understand premultiplied alpha.
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
        ]);
        push_input_fps(&mut cmd, cfg.fps);
        cmd.args(["-i", "pipe:0"]);

        if let Some(audio) = cfg.audio.as_ref() {
            if audio.sample_rate == 0 || audio.channels == 0 {
                return Err(ReelError::export(
                    "audio sample_rate/channels must be non-zero when audio is enabled",
                ));
            }
            let audio_path = workdir.path().join("narration.f32le");
            write_mix_to_f32le_file(&audio.samples, &audio_path)?;
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio_path)
            .args([
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-shortest",
                "-movflags",
                "+faststart",
            ]);
        } else {
            cmd.args([
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]);
        }
        cmd.arg(&out_path);

        let mut child = cmd.spawn().map_err(|e| {
            ReelError::export(format!(
                "ffmpeg encoder did not start: {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::export("encoder stdin pipe missing"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::export("encoder stderr pipe missing"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut log = Vec::new();
            stderr.read_to_end(&mut log)?;
            Ok(log)
        });

        self.scratch = vec![0u8; (cfg.width as usize) * (cfg.height as usize) * 4];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.workdir = Some(workdir);
        self.out_path = out_path;
        self.cfg = Some(cfg);
        self.last_idx = None;
        self.frame_count = 0;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelError::export("encoder was never started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(ReelError::export(
                "export frames must arrive in timeline order",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ReelError::validation(format!(
                "composited frame is {}x{} but the encoder was opened at {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }

        if frame.premultiplied {
            flatten_onto_background(
                &mut self.scratch,
                &frame.data,
                self.opts.bg_rgba,
            )?;
        } else {
            flatten_onto_background(
                &mut self.scratch,
                &premultiply(&frame.data),
                self.opts.bg_rgba,
            )?;
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::export("encoder was already finalized"));
        };

        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            ReelError::export(format!("encoder pipe closed mid-export: {e}"))
        })?;
        self.frame_count += 1;
        Ok(())
    }

    fn end(&mut self) -> ReelResult<MediaBlob> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReelError::export("encoder was never started"))?;

        let status = child.wait().map_err(|e| {
            ReelError::export(format!("encoder did not exit cleanly: {e}"))
        })?;
        let encoder_log = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelError::export("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelError::export(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let log = String::from_utf8_lossy(&encoder_log);
            self.abort();
            return Err(ReelError::export(format!(
                "encoder failed ({status}): {}",
                log.trim()
            )));
        }

        let bytes = std::fs::read(&self.out_path).map_err(|e| {
            ReelError::export(format!(
                "failed to read encoded output '{}': {e}",
                self.out_path.display()
            ))
        })?;
        let fps = self
            .cfg
            .take()
            .map(|c| c.fps)
            .ok_or_else(|| ReelError::export("encoder was never started"))?;
        self.workdir = None;

        Ok(MediaBlob {
            bytes,
            mime: "video/mp4".to_owned(),
            duration_sec: fps.frames_to_secs(self.frame_count),
            frame_count: self.frame_count,
        })
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // For rawvideo input `-r` goes before `-i`.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

fn premultiply(straight: &[u8]) -> Vec<u8> {
    let mut out = straight.to_vec();
    crate::assets::decode::premultiply_rgba8_in_place(&mut out);
    out
}

fn flatten_onto_background(
    dst: &mut [u8],
    src_premul: &[u8],
    bg_rgba: [u8; 4],
) -> ReelResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(ReelError::validation(
            "frame and scratch buffers differ in size",
        ));
    }

    let bg = bg_rgba.map(u16::from);
    for (out, px) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        if px[3] == 255 {
            out.copy_from_slice(px);
            continue;
        }
        let cover = 255 - u16::from(px[3]);
        for c in 0..3 {
            out[c] = (u16::from(px[c]) + mul_div255_u16(bg[c], cover)).min(255) as u8;
        }
        out[3] = 255;
    }

    Ok(())
}

/// Whether an `ffmpeg` binary answers `-version`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
