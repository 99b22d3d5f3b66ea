use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::foundation::clock::TickSource;
use crate::foundation::error::{ReelError, ReelResult};
use crate::live::player::{LivePlayer, PlayState};

const COMMAND_QUEUE: usize = 32;

/// Control messages accepted by a mounted preview.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Toggle,
    Seek(usize),
    Next,
    Prev,
}

/// A [`LivePlayer`] mounted on a frame loop task.
///
/// The loop ticks the player once per `1 / tick_rate` seconds of the tick source while
/// playing and waits on commands otherwise. [`PreviewHandle::unmount`] cancels the loop and
/// hands the player back; no frame is presented after it returns.
pub struct PreviewHandle {
    commands: mpsc::Sender<PlayerCommand>,
    cancel: CancellationToken,
    task: JoinHandle<LivePlayer>,
}

impl PreviewHandle {
    pub fn mount(player: LivePlayer, clock: Box<dyn TickSource>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(frame_loop(player, clock, rx, cancel.clone()));
        Self {
            commands: tx,
            cancel,
            task,
        }
    }

    pub async fn send(&self, cmd: PlayerCommand) -> ReelResult<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| ReelError::render("preview loop is no longer running"))
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the frame loop and return the player with its textures released.
    pub async fn unmount(self) -> ReelResult<LivePlayer> {
        self.cancel.cancel();
        let mut player = self
            .task
            .await
            .map_err(|e| ReelError::render(format!("preview loop panicked: {e}")))?;
        player.dispose();
        Ok(player)
    }
}

fn apply(player: &mut LivePlayer, cmd: PlayerCommand) -> ReelResult<()> {
    match cmd {
        PlayerCommand::Play => player.play(),
        PlayerCommand::Pause => {
            player.pause();
            Ok(())
        }
        PlayerCommand::Toggle => player.toggle(),
        PlayerCommand::Seek(i) => player.seek(i),
        PlayerCommand::Next => player.next(),
        PlayerCommand::Prev => player.prev(),
    }
}

#[tracing::instrument(skip_all, fields(scenes = player.scene_count()))]
async fn frame_loop(
    mut player: LivePlayer,
    mut clock: Box<dyn TickSource>,
    mut commands: mpsc::Receiver<PlayerCommand>,
    cancel: CancellationToken,
) -> LivePlayer {
    let period = Duration::from_secs_f64(1.0 / f64::from(player.tick_rate()));
    let mut next_tick = clock.now() + period;

    loop {
        let playing = player.state() == PlayState::Playing;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { break };
                let was_playing = playing;
                if let Err(e) = apply(&mut player, cmd) {
                    tracing::warn!(?cmd, error = %e, "preview command rejected");
                }
                if !was_playing && player.state() == PlayState::Playing {
                    next_tick = clock.now() + period;
                }
            }
            _ = clock.wait_until(next_tick), if playing => {
                if let Err(e) = player.tick() {
                    tracing::warn!(error = %e, "preview frame failed");
                }
                next_tick += period;
            }
        }
    }

    tracing::debug!(index = player.index(), "preview loop stopped");
    player
}
