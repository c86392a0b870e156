//! Configuration for the transcription pipeline

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use telecare_core::DEFAULT_LANGUAGE_CODE;

/// Voice-activity gate tuning.
///
/// The gate samples the mixed audio level on every tick. Sound ticks and
/// silence ticks are counted against each other; crossing the sound
/// threshold opens the transcript stream, outlasting the silence threshold
/// closes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Mean absolute sample level that counts as voice, in the f32 domain.
    /// The default corresponds to a deviation of 4 on an 8-bit scope.
    pub amplitude_threshold: f32,

    /// Consecutive loud ticks required to open the stream.
    pub sound_threshold: u32,

    /// Consecutive quiet ticks tolerated before the stream closes.
    pub silence_threshold: u32,

    /// Gate sampling cadence in milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 4.0 / 128.0,
            sound_threshold: 1,
            silence_threshold: 120,
            tick_interval_ms: 16,
        }
    }
}

impl GateConfig {
    /// Opens on the first loud tick. This is the default tuning.
    pub fn quick_trigger() -> Self {
        Self::default()
    }

    /// Slower to open and slower to close, for noisy rooms.
    pub fn steady() -> Self {
        Self {
            sound_threshold: 3,
            silence_threshold: 200,
            ..Self::default()
        }
    }

    /// Validate the gate tuning.
    pub fn validate(&self) -> Result<()> {
        if !(self.amplitude_threshold > 0.0 && self.amplitude_threshold < 1.0) {
            return Err(Error::InvalidConfig(
                "amplitude_threshold must be between 0 and 1".to_string(),
            ));
        }
        if self.sound_threshold == 0 {
            return Err(Error::InvalidConfig(
                "sound_threshold must be greater than 0".to_string(),
            ));
        }
        if self.silence_threshold == 0 {
            return Err(Error::InvalidConfig(
                "silence_threshold must be greater than 0".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`TranscriptionDriver`](crate::driver::TranscriptionDriver)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeConfig {
    /// Language the provider should transcribe, e.g. `zh-TW`.
    pub language_code: String,

    /// Sample rate the provider receives, in hertz.
    pub sample_rate_hz: u32,

    /// Samples accumulated before a frame is cut.
    pub block_size: usize,

    /// Pause between frames sent to the provider, in milliseconds.
    pub drain_interval_ms: u64,

    /// Frames larger than this are truncated before sending.
    pub max_frame_bytes: usize,

    /// Idle time after which a silence frame keeps the stream open,
    /// in milliseconds.
    pub keepalive_after_ms: u64,

    /// Sample count of the silence keep-alive frame.
    pub keepalive_samples: usize,

    /// Wait after stopping a stream before the audio graph is rebuilt,
    /// in milliseconds. Gives the provider time to flush the old stream.
    pub settle_delay_ms: u64,

    /// Voice-activity gate tuning.
    pub gate: GateConfig,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            sample_rate_hz: telecare_core::DEFAULT_SAMPLE_RATE_HZ,
            block_size: 4096,
            drain_interval_ms: 250,
            max_frame_bytes: 16 * 1024,
            keepalive_after_ms: 5000,
            keepalive_samples: 256,
            settle_delay_ms: 2000,
            gate: GateConfig::default(),
        }
    }
}

impl TranscribeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.language_code.is_empty() {
            return Err(Error::InvalidConfig(
                "language_code cannot be empty".to_string(),
            ));
        }
        if self.sample_rate_hz == 0 {
            return Err(Error::InvalidConfig(
                "sample_rate_hz must be greater than 0".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidConfig(
                "block_size must be greater than 0".to_string(),
            ));
        }
        if self.drain_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "drain_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_frame_bytes < telecare_core::pcm::BYTES_PER_SAMPLE {
            return Err(Error::InvalidConfig(
                "max_frame_bytes must hold at least one sample".to_string(),
            ));
        }
        if self.keepalive_samples == 0 {
            return Err(Error::InvalidConfig(
                "keepalive_samples must be greater than 0".to_string(),
            ));
        }
        if self.settle_delay_ms < 100 {
            return Err(Error::InvalidConfig(
                "settle_delay_ms must be at least 100".to_string(),
            ));
        }
        self.gate.validate()
    }

    /// Override the transcription language.
    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.language_code = code.into();
        self
    }

    /// Override the gate tuning.
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TranscribeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.language_code, "zh-TW");
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.max_frame_bytes, 16384);
    }

    #[test]
    fn test_gate_presets_are_valid() {
        assert!(GateConfig::quick_trigger().validate().is_ok());
        assert!(GateConfig::steady().validate().is_ok());
        assert_eq!(GateConfig::steady().sound_threshold, 3);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let config = TranscribeConfig {
            block_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("block_size"));
    }

    #[test]
    fn test_settle_delay_floor() {
        let config = TranscribeConfig {
            settle_delay_ms: 50,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TranscribeConfig {
            settle_delay_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_amplitude_threshold_range() {
        let gate = GateConfig {
            amplitude_threshold: 0.0,
            ..Default::default()
        };
        assert!(gate.validate().is_err());

        let gate = GateConfig {
            amplitude_threshold: 1.5,
            ..Default::default()
        };
        assert!(gate.validate().is_err());
    }

    #[test]
    fn test_default_amplitude_matches_byte_scale() {
        let gate = GateConfig::default();
        assert!((gate.amplitude_threshold - 0.03125).abs() < f32::EPSILON);
    }
}
