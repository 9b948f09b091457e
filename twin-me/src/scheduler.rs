//! Viseme scheduler: aligns a queue of timed events against the audio clock.

use std::collections::VecDeque;
use twin_spk::{BlendShapes, TimedAnimationEvent};

/// Consumes an ordered event sequence as elapsed time advances.
///
/// The most recently started event is active until its end passes. When a
/// later event starts while an earlier one is still running, the later one
/// replaces it; nothing is blended.
#[derive(Debug, Default)]
pub struct VisemeScheduler {
    pending: VecDeque<TimedAnimationEvent>,
    active: Option<TimedAnimationEvent>,
    cursor_ms: u64,
}

impl VisemeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any queued events with a new utterance and rewind the cursor.
    pub fn load(&mut self, events: Vec<TimedAnimationEvent>) {
        self.pending = events.into();
        self.active = None;
        self.cursor_ms = 0;
    }

    /// Advance to `elapsed_ms` and return the active event, if any.
    ///
    /// The cursor never moves backwards; an earlier time is treated as the
    /// current cursor.
    pub fn advance(&mut self, elapsed_ms: u64) -> Option<&TimedAnimationEvent> {
        let t = elapsed_ms.max(self.cursor_ms);
        self.cursor_ms = t;

        while self.pending.front().map_or(false, |e| e.start_ms <= t) {
            self.active = self.pending.pop_front();
        }

        if self.active.as_ref().map_or(false, |e| e.end_ms < t) {
            self.active = None;
        }

        self.active.as_ref()
    }

    pub fn active(&self) -> Option<&TimedAnimationEvent> {
        self.active.as_ref()
    }

    /// Pose the smoother should move toward; neutral in gaps.
    pub fn target(&self) -> BlendShapes {
        self.active
            .as_ref()
            .map(|e| e.blend_shapes)
            .unwrap_or(BlendShapes::NEUTRAL)
    }

    pub fn cursor_ms(&self) -> u64 {
        self.cursor_ms
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True once every event is consumed and audio is no longer playing.
    pub fn is_finished(&self, playing: bool) -> bool {
        self.pending.is_empty() && self.active.is_none() && !playing
    }

    /// Drop all queued and active events.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.active = None;
        self.cursor_ms = 0;
    }
}
