//! # Audio Validation
//!
//! Holds one complete utterance of 16-bit PCM and checks it against the
//! format the loaded model requires before any feature extraction happens.
//!
//! ## Checks:
//! - **Length**: the buffer must contain at least one sample
//! - **Sample rate**: must equal the model's rate exactly (no silent resampling of raw buffers)
//! - **Byte input**: little-endian 16-bit data must have an even length

use crate::error::{EngineError, EngineResult};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// One complete utterance: mono 16-bit samples plus the rate they were captured at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Parse raw little-endian 16-bit PCM bytes.
    pub fn from_le_bytes(data: &[u8], sample_rate: u32) -> EngineResult<Self> {
        if data.len() % 2 != 0 {
            return Err(EngineError::InvalidAudioFormat(
                "audio data length must be even for 16-bit samples".to_string(),
            ));
        }

        let mut cursor = Cursor::new(data);
        let mut samples = Vec::with_capacity(data.len() / 2);
        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            samples.push(sample);
        }
        Ok(Self::new(samples, sample_rate))
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Validates buffers against the format a model was trained on.
#[derive(Debug, Clone, Copy)]
pub struct AudioProcessor {
    sample_rate: u32,
}

impl AudioProcessor {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Rate every buffer must match.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// ## Returns:
    /// - **Ok(())**: buffer can be fed to the frontend
    /// - **Err(EmptyInput)**: zero samples
    /// - **Err(InvalidAudioFormat)**: sample rate mismatch
    pub fn validate(&self, audio: &PcmBuffer) -> EngineResult<()> {
        if audio.is_empty() {
            return Err(EngineError::EmptyInput);
        }

        if audio.sample_rate() != self.sample_rate {
            return Err(EngineError::InvalidAudioFormat(format!(
                "Sample rate mismatch: expected {} Hz, got {} Hz",
                self.sample_rate,
                audio.sample_rate()
            )));
        }

        Ok(())
    }
}

/// Convert a 16-bit sample to the [-1.0, 1.0) range.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}
