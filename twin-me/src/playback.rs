//! Lip-sync playback: audio clock, viseme scheduler and blend smoother
//! driven from one tick loop.
//!
//! [`LipSyncPlayer`] owns all animation state and is advanced only by
//! [`LipSyncPlayer::tick`]. Everything else talks to it through a cloneable
//! [`PlayerHandle`]: commands go in over a channel and are applied at the
//! start of the next tick, status comes out over a watch channel.

use crate::error::AvatarError;
use crate::scheduler::VisemeScheduler;
use crate::smoother::BlendSmoother;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use twin_core::AnimationConfig;
use twin_spk::{AudioAsset, BlendShapes, SpeechClip};

/// Audio device the player drives.
///
/// The player asks the output for its position every tick; `None` means
/// nothing is playing (finished, stopped or never started).
pub trait AudioOutput: Send {
    fn start(&mut self, audio: &AudioAsset, duration: Duration) -> Result<(), AvatarError>;
    fn stop(&mut self);
    fn advance(&mut self, dt: Duration) -> Option<Duration>;
}

/// Audio output that plays nothing and reports a clock that runs for the
/// clip's duration.
#[derive(Debug, Default)]
pub struct SimulatedAudio {
    position: Duration,
    duration: Duration,
    playing: bool,
}

impl SimulatedAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl AudioOutput for SimulatedAudio {
    fn start(&mut self, _audio: &AudioAsset, duration: Duration) -> Result<(), AvatarError> {
        self.position = Duration::ZERO;
        self.duration = duration;
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.playing = false;
        self.position = Duration::ZERO;
    }

    fn advance(&mut self, dt: Duration) -> Option<Duration> {
        if !self.playing {
            return None;
        }
        self.position += dt;
        if self.position >= self.duration {
            self.playing = false;
            return None;
        }
        Some(self.position)
    }
}

/// Instruction for the player, applied on its next tick.
#[derive(Debug)]
pub enum PlaybackCommand {
    /// Start a clip for `turn`, replacing whatever is playing.
    Play { clip: SpeechClip, turn: u64 },
    /// Stop playback and ignore any later `Play` for a turn before `turn`.
    Cancel { turn: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing playing and the pose is neutral
    Idle,
    /// A clip is playing
    Speaking,
    /// No clip, pose still decaying to neutral
    Settling,
}

/// Snapshot published after every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Highest turn the player has started, finished or cancelled
    pub turn: u64,
    /// Highest turn whose clip is done with: finished, cancelled, replaced
    /// or rejected. A bare `Cancel` never advances it.
    pub completed_turn: u64,
    pub elapsed: Duration,
    pub pose: BlendShapes,
    pub viseme: Option<String>,
    pub pending: usize,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            turn: 0,
            completed_turn: 0,
            elapsed: Duration::ZERO,
            pose: BlendShapes::NEUTRAL,
            viseme: None,
            pending: 0,
        }
    }
}

/// Output of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub pose: BlendShapes,
    pub elapsed: Duration,
    pub state: PlaybackState,
}

struct ActiveClip {
    turn: u64,
    elapsed: Duration,
    // Dropped with the clip when playback ends or is cancelled
    _audio: AudioAsset,
}

/// Cloneable handle for sending commands to a [`LipSyncPlayer`].
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<PlaybackCommand>,
    status: watch::Receiver<PlaybackStatus>,
}

impl PlayerHandle {
    pub fn play(&self, clip: SpeechClip, turn: u64) -> Result<(), AvatarError> {
        self.send(PlaybackCommand::Play { clip, turn })
    }

    pub fn cancel(&self, turn: u64) -> Result<(), AvatarError> {
        self.send(PlaybackCommand::Cancel { turn })
    }

    fn send(&self, command: PlaybackCommand) -> Result<(), AvatarError> {
        self.commands
            .send(command)
            .map_err(|_| AvatarError::Playback("Player is no longer running".to_string()))
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.clone()
    }

    /// Wait until the clip for `turn` is done and the pose is back to neutral.
    ///
    /// Only call this after `play(_, turn)`: a turn that never sends a clip
    /// is not completed by a cancel alone.
    pub async fn wait_for_idle(&self, turn: u64) -> Result<PlaybackStatus, AvatarError> {
        let mut status = self.status.clone();
        let reached = status
            .wait_for(|s| s.completed_turn >= turn && s.state == PlaybackState::Idle)
            .await
            .map_err(|_| AvatarError::Playback("Player stopped".to_string()))?;
        Ok(reached.clone())
    }
}

/// Drives lip-sync for one avatar.
pub struct LipSyncPlayer {
    commands: mpsc::UnboundedReceiver<PlaybackCommand>,
    status: watch::Sender<PlaybackStatus>,
    audio: Box<dyn AudioOutput>,
    scheduler: VisemeScheduler,
    smoother: BlendSmoother,
    clip: Option<ActiveClip>,
    latest_turn: u64,
    completed_turn: u64,
    min_turn: u64,
    disconnected: bool,
}

impl LipSyncPlayer {
    pub fn new(audio: Box<dyn AudioOutput>, config: &AnimationConfig) -> (Self, PlayerHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(PlaybackStatus::default());

        let player = Self {
            commands: command_rx,
            status: status_tx,
            audio,
            scheduler: VisemeScheduler::new(),
            smoother: BlendSmoother::from_config(config),
            clip: None,
            latest_turn: 0,
            completed_turn: 0,
            min_turn: 0,
            disconnected: false,
        };
        let handle = PlayerHandle {
            commands: command_tx,
            status: status_rx,
        };
        (player, handle)
    }

    /// Advance one frame: apply commands, read the audio clock, pick the
    /// active viseme, smooth once and publish status.
    pub fn tick(&mut self, dt: Duration) -> Frame {
        self.drain_commands();

        let mut target = BlendShapes::NEUTRAL;
        if let Some(clip) = self.clip.as_mut() {
            let playing = match self.audio.advance(dt) {
                Some(position) => {
                    clip.elapsed = clip.elapsed.max(position);
                    true
                }
                None => {
                    clip.elapsed += dt;
                    false
                }
            };

            self.scheduler.advance(clip.elapsed.as_millis() as u64);
            target = self.scheduler.target();

            if self.scheduler.is_finished(playing) {
                let turn = clip.turn;
                info!("Turn {} finished after {:?}", turn, clip.elapsed);
                self.release_clip();
                self.complete(turn);
                target = BlendShapes::NEUTRAL;
            }
        }

        let pose = self.smoother.step(target, dt);
        let state = self.state();
        let elapsed = self
            .clip
            .as_ref()
            .map(|c| c.elapsed)
            .unwrap_or(Duration::ZERO);

        self.status.send_replace(PlaybackStatus {
            state,
            turn: self.latest_turn,
            completed_turn: self.completed_turn,
            elapsed,
            pose,
            viseme: self.scheduler.active().map(|e| e.viseme_type.clone()),
            pending: self.scheduler.pending_len(),
        });

        Frame {
            pose,
            elapsed,
            state,
        }
    }

    /// Tick on a fixed interval until every handle is dropped and the pose
    /// has settled.
    pub async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();

        loop {
            ticker.tick().await;
            let now = Instant::now();
            let frame = self.tick(now - last);
            last = now;

            if self.disconnected && frame.state == PlaybackState::Idle {
                debug!("All player handles dropped, stopping tick loop");
                break;
            }
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.clip.is_some() {
            PlaybackState::Speaking
        } else if self.smoother.is_neutral() {
            PlaybackState::Idle
        } else {
            PlaybackState::Settling
        }
    }

    pub fn pose(&self) -> BlendShapes {
        self.smoother.current()
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.pending_len()
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(PlaybackCommand::Cancel { turn }) => self.cancel(turn),
                Ok(PlaybackCommand::Play { clip, turn }) => self.start(clip, turn),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
    }

    fn cancel(&mut self, turn: u64) {
        self.min_turn = self.min_turn.max(turn);
        self.latest_turn = self.latest_turn.max(turn);
        if let Some(clip) = self.clip.as_ref() {
            info!(
                "Cancelling turn {} at {:?} ({} visemes pending)",
                clip.turn,
                clip.elapsed,
                self.scheduler.pending_len()
            );
            let cancelled = clip.turn;
            self.release_clip();
            self.complete(cancelled);
        }
    }

    fn start(&mut self, clip: SpeechClip, turn: u64) {
        if turn < self.min_turn {
            debug!("Ignoring stale clip for turn {} (current {})", turn, self.min_turn);
            self.complete(turn);
            return;
        }
        if let Some(previous) = self.clip.as_ref().map(|c| c.turn) {
            self.release_clip();
            self.complete(previous);
        }
        self.latest_turn = self.latest_turn.max(turn);

        if let Err(e) = self.audio.start(&clip.audio, clip.duration) {
            warn!("Audio output rejected turn {}: {}", turn, e);
            self.complete(turn);
            return;
        }

        info!(
            "Playing turn {}: {} visemes over {:?}",
            turn,
            clip.events.len(),
            clip.duration
        );
        let SpeechClip { audio, events, .. } = clip;
        self.scheduler.load(events);
        self.clip = Some(ActiveClip {
            turn,
            elapsed: Duration::ZERO,
            _audio: audio,
        });
    }

    fn complete(&mut self, turn: u64) {
        self.completed_turn = self.completed_turn.max(turn);
    }

    fn release_clip(&mut self) {
        self.audio.stop();
        self.scheduler.clear();
        self.clip = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use twin_spk::TimedAnimationEvent;

    const TICK: Duration = Duration::from_millis(10);

    fn config() -> AnimationConfig {
        AnimationConfig {
            smoothing_rate: 12.0,
            tick_interval_ms: 10,
            settle_epsilon: 0.001,
        }
    }

    fn clip(duration_ms: u64) -> SpeechClip {
        let events = vec![
            TimedAnimationEvent::new(0, 300, BlendShapes::new(0.8, 0.0, 0.0)),
            TimedAnimationEvent::new(300, 600, BlendShapes::new(0.0, 0.5, 0.0)),
            TimedAnimationEvent::new(600, 900, BlendShapes::new(0.3, 0.0, 0.0)),
        ];
        SpeechClip::new(
            AudioAsset::new("/audio/test", Bytes::from_static(b"audio")),
            events,
            Duration::from_millis(duration_ms),
        )
    }

    fn player() -> (LipSyncPlayer, PlayerHandle) {
        LipSyncPlayer::new(Box::new(SimulatedAudio::new()), &config())
    }

    #[test]
    fn test_idle_without_clip() {
        let (mut player, handle) = player();
        let frame = player.tick(TICK);
        assert_eq!(frame.state, PlaybackState::Idle);
        assert_eq!(frame.pose, BlendShapes::NEUTRAL);
        assert_eq!(handle.status().state, PlaybackState::Idle);
    }

    #[test]
    fn test_play_moves_toward_active_viseme() {
        let (mut player, handle) = player();
        handle.play(clip(900), 1).unwrap();

        let frame = player.tick(TICK);
        assert_eq!(frame.state, PlaybackState::Speaking);
        assert!(frame.pose.jaw_open > 0.0);

        for _ in 0..20 {
            player.tick(TICK);
        }
        let status = handle.status();
        assert_eq!(status.turn, 1);
        assert_eq!(status.state, PlaybackState::Speaking);
        assert!(status.pose.jaw_open > 0.7);
    }

    #[test]
    fn test_clip_finishes_and_settles() {
        let (mut player, handle) = player();
        handle.play(clip(900), 1).unwrap();

        for _ in 0..92 {
            player.tick(TICK);
        }
        assert_ne!(player.state(), PlaybackState::Speaking);

        for _ in 0..100 {
            player.tick(TICK);
        }
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.pose(), BlendShapes::NEUTRAL);
    }

    #[test]
    fn test_events_outlast_audio() {
        let (mut player, _handle) = player();
        player.tick(TICK);
        // Audio shorter than the viseme track: the clock keeps running
        let short = clip(400);
        player.start(short, 1);
        for _ in 0..60 {
            player.tick(TICK);
        }
        assert_eq!(player.state(), PlaybackState::Speaking);
        for _ in 0..40 {
            player.tick(TICK);
        }
        assert_ne!(player.state(), PlaybackState::Speaking);
    }

    #[test]
    fn test_cancel_clears_and_decays() {
        let (mut player, handle) = player();
        handle.play(clip(900), 1).unwrap();
        for _ in 0..20 {
            player.tick(TICK);
        }
        assert!(player.pose().jaw_open > 0.5);

        handle.cancel(2).unwrap();
        let frame = player.tick(TICK);
        assert_eq!(frame.state, PlaybackState::Settling);
        assert_eq!(player.pending_events(), 0);

        let mut ticks = 1;
        while player.state() != PlaybackState::Idle {
            player.tick(TICK);
            ticks += 1;
            assert!(ticks < 100);
        }
        assert_eq!(player.pose(), BlendShapes::NEUTRAL);
        assert_eq!(handle.status().turn, 2);
    }

    #[test]
    fn test_stale_play_ignored_after_cancel() {
        let (mut player, handle) = player();
        handle.cancel(3).unwrap();
        handle.play(clip(900), 2).unwrap();
        let frame = player.tick(TICK);
        assert_eq!(frame.state, PlaybackState::Idle);

        handle.play(clip(900), 3).unwrap();
        let frame = player.tick(TICK);
        assert_eq!(frame.state, PlaybackState::Speaking);
    }

    #[test]
    fn test_new_play_replaces_current() {
        let (mut player, handle) = player();
        handle.play(clip(900), 1).unwrap();
        for _ in 0..50 {
            player.tick(TICK);
        }
        handle.play(clip(900), 2).unwrap();
        let frame = player.tick(TICK);
        assert_eq!(frame.elapsed, TICK);
        assert_eq!(handle.status().turn, 2);
    }

    #[test]
    fn test_handle_errors_when_player_dropped() {
        let (player, handle) = player();
        drop(player);
        assert!(matches!(handle.cancel(1), Err(AvatarError::Playback(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_idle_blocks_until_clip_done() {
        let (mut player, handle) = player();

        // Turn start: cancel is applied while network stages are in flight
        handle.cancel(1).unwrap();
        player.tick(TICK);
        assert_eq!(handle.status().turn, 1);
        assert_eq!(handle.status().completed_turn, 0);

        handle.play(clip(900), 1).unwrap();
        let early = tokio::time::timeout(Duration::from_millis(50), handle.wait_for_idle(1)).await;
        assert!(early.is_err());
        assert_eq!(player.tick(TICK).state, PlaybackState::Speaking);

        let mut ticks = 0;
        while player.state() != PlaybackState::Idle {
            player.tick(TICK);
            ticks += 1;
            assert!(ticks < 300);
        }
        let status = tokio::time::timeout(Duration::from_millis(50), handle.wait_for_idle(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.completed_turn, 1);
        assert_eq!(status.pose, BlendShapes::NEUTRAL);
    }

    #[test]
    fn test_completed_turn_on_cancel_replace_and_reject() {
        let (mut player, handle) = player();
        handle.play(clip(900), 1).unwrap();
        player.tick(TICK);
        assert_eq!(handle.status().completed_turn, 0);

        handle.play(clip(900), 2).unwrap();
        player.tick(TICK);
        assert_eq!(handle.status().completed_turn, 1);

        handle.cancel(4).unwrap();
        player.tick(TICK);
        assert_eq!(handle.status().completed_turn, 2);

        handle.play(clip(900), 3).unwrap();
        player.tick(TICK);
        assert_eq!(handle.status().completed_turn, 3);
        assert_eq!(handle.status().turn, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_reaches_idle() {
        let (player, handle) = player();
        let task = tokio::spawn(player.run(TICK));

        handle.play(clip(900), 1).unwrap();
        let status = handle.wait_for_idle(1).await.unwrap();
        assert_eq!(status.turn, 1);
        assert_eq!(status.pose, BlendShapes::NEUTRAL);

        drop(handle);
        task.await.unwrap();
    }
}
