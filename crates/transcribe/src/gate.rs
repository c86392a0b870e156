//! Voice-activity detection
//!
//! A [`LevelProbe`] measures the instantaneous level of an audio track and
//! an [`ActivityGate`] turns the level series into open/close transitions
//! for the transcript stream. The gate never opens a stream itself; it only
//! reports transitions, and the caller tells it on every tick whether a
//! stream is currently active. That keeps a failed stream start retryable:
//! as long as the stream never became active, continued voice keeps
//! reporting [`GateTransition::Engaged`].

use crate::config::GateConfig;
use telecare_core::AudioTap;

/// A state change reported by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    /// Voice crossed the sound threshold; open a stream.
    Engaged,
    /// Silence outlasted the tolerance; close the stream.
    Released,
}

/// Measures the level of an audio track between ticks.
///
/// Each call drains every chunk that arrived since the previous call and
/// returns the mean absolute sample value. No audio since the last tick
/// reads as complete silence.
pub struct LevelProbe {
    tap: AudioTap,
}

impl LevelProbe {
    /// Probe the given tap.
    pub fn new(tap: AudioTap) -> Self {
        Self { tap }
    }

    /// Mean absolute level of all audio since the previous call.
    pub fn level(&mut self) -> f32 {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        while let Some(chunk) = self.tap.try_next() {
            for &sample in chunk.iter() {
                sum += f64::from(sample.abs());
            }
            count += chunk.len();
        }
        if count == 0 {
            0.0
        } else {
            (sum / count as f64) as f32
        }
    }
}

/// Counts loud and quiet ticks against each other.
#[derive(Debug)]
pub struct ActivityGate {
    config: GateConfig,
    sound_count: u32,
    silence_count: u32,
}

impl ActivityGate {
    /// Create a gate with the given tuning.
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            sound_count: 0,
            silence_count: 0,
        }
    }

    /// Feed one tick of level data.
    ///
    /// `stream_active` is the caller's view of whether a transcript stream
    /// is currently open. Engaged is only reported while no stream is
    /// active, Released only while one is.
    pub fn evaluate(&mut self, level: f32, stream_active: bool) -> Option<GateTransition> {
        if level > self.config.amplitude_threshold {
            self.sound_count += 1;
            self.silence_count = 0;
        } else {
            self.silence_count += 1;
            self.sound_count = 0;
        }

        if self.sound_count >= self.config.sound_threshold && !stream_active {
            return Some(GateTransition::Engaged);
        }
        if self.silence_count > self.config.silence_threshold && stream_active {
            self.silence_count = 0;
            return Some(GateTransition::Released);
        }
        None
    }

    /// Forget all counted ticks.
    pub fn reset(&mut self) {
        self.sound_count = 0;
        self.silence_count = 0;
    }
}
