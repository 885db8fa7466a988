//! Audio buffers and WAV I/O

use crate::{Result, SpeechError};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;
use std::path::Path;

/// Output sample rate of XTTS voices
pub const SAMPLE_RATE: u32 = 22050;

/// Peak-normalized mono audio
///
/// Samples always lie in [-1, 1]. A non-silent buffer has a peak of
/// exactly 1.0. An empty buffer signals a failed synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Normalize raw engine output so the loudest sample has magnitude 1.0
    pub fn normalized(mut samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if let Some(i) = samples.iter().position(|s| !s.is_finite()) {
            return Err(SpeechError::Audio(format!(
                "non-finite sample at index {}",
                i
            )));
        }

        let peak = peak_of(&samples);
        if peak > 0.0 {
            for s in samples.iter_mut() {
                *s = (*s / peak).clamp(-1.0, 1.0);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
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

    /// Maximum absolute sample
    pub fn peak(&self) -> f32 {
        peak_of(&self.samples)
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Write as 16-bit mono PCM
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        if self.samples.is_empty() {
            return Err(SpeechError::Audio(
                "No audio was generated; refusing to write an empty WAV file".to_string(),
            ));
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;

        debug!(
            "Wrote {} samples ({:.2}s) to {}",
            self.samples.len(),
            self.duration_secs(),
            path.display()
        );
        Ok(())
    }
}

/// Decode a WAV file to mono f32 samples, averaging channels.
///
/// Returns the samples and the file's sample rate.
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

fn peak_of(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}
