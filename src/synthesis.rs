//! Synthesis engine adapter
//!
//! Loads the resolved voice onto the selected device and turns requests
//! into normalized audio. Generation never fails outward: problems are
//! logged and come back as an empty buffer.

use crate::audio::{AudioBuffer, SAMPLE_RATE};
use crate::device::{Accelerator, DeviceKind, DeviceSelection};
use crate::engine::{EngineError, EngineHandle, ModelRef, SynthesisEngine, BASE_MODEL};
use crate::voice::{VoiceKind, VoiceProfile};
use crate::{Result, SpeechError};
use log::{debug, error, info, warn};
use std::path::PathBuf;

/// One synthesis call
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub speed: f32,
    pub language: String,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speed: 1.0,
            language: "en".to_string(),
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(format!("speed must be positive, got {}", self.speed));
        }
        if self.text.trim().is_empty() {
            return Err("text is empty".to_string());
        }
        if self.language.trim().is_empty() {
            return Err("language is empty".to_string());
        }
        Ok(())
    }
}

/// A voice loaded and ready to speak
pub struct SynthesisAdapter {
    handle: Box<dyn EngineHandle>,
    speaker: Option<PathBuf>,
}

impl SynthesisAdapter {
    /// Load `profile` on the selected device.
    ///
    /// An accelerator the engine cannot use is retried once on CPU, and
    /// `device` is downgraded to match. Anything else is fatal.
    pub fn new(
        engine: &dyn SynthesisEngine,
        device: &mut DeviceSelection,
        profile: &VoiceProfile,
    ) -> Result<Self> {
        let model = model_ref(profile)?;

        let handle = match engine.load(&model, device.kind()) {
            Ok(handle) => handle,
            Err(EngineError::DeviceIncompatible(reason)) if device.is_accelerator() => {
                warn!("CUDA error when loading TTS model: {}", reason);
                info!("Falling back to CPU for TTS model");
                device.fall_back_to_cpu();
                engine.load(&model, DeviceKind::Cpu).map_err(|e| {
                    SpeechError::Initialization(format!("Failed to initialize TTS model: {}", e))
                })?
            }
            Err(e) => {
                error!("Failed to initialize TTS model: {}", e);
                return Err(SpeechError::Initialization(format!(
                    "Failed to initialize TTS model: {}",
                    e
                )));
            }
        };

        let speaker = if profile.is_multi_speaker() {
            profile.reference().map(PathBuf::from)
        } else {
            None
        };

        info!("Loaded {} voice '{}' on {}", kind_label(profile.kind()), profile.name(), handle.placement());
        Ok(Self { handle, speaker })
    }

    /// Synthesize `request`, degrading any failure to silence
    pub fn generate(&mut self, request: &SynthesisRequest, accelerator: &dyn Accelerator) -> AudioBuffer {
        if let Err(reason) = request.validate() {
            warn!("Rejecting synthesis request: {}", reason);
            return AudioBuffer::empty(SAMPLE_RATE);
        }

        if self.handle.placement() == DeviceKind::Accelerator {
            accelerator.release_cache();
        }

        debug!("Synthesizing {} chars in '{}'", request.text.len(), request.language);
        let raw = match self.handle.synthesize(
            &request.text,
            self.speaker.as_deref(),
            &request.language,
            request.speed,
        ) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Error generating speech: {}", e);
                return AudioBuffer::empty(SAMPLE_RATE);
            }
        };

        match AudioBuffer::normalized(raw, self.handle.sample_rate()) {
            Ok(buf) => buf,
            Err(e) => {
                error!("Error generating speech: {}", e);
                AudioBuffer::empty(SAMPLE_RATE)
            }
        }
    }

    pub fn placement(&self) -> DeviceKind {
        self.handle.placement()
    }

    pub fn is_multi_speaker(&self) -> bool {
        self.speaker.is_some()
    }
}

fn model_ref(profile: &VoiceProfile) -> Result<ModelRef> {
    let missing = |key: &str| {
        SpeechError::Initialization(format!(
            "Voice '{}' has no '{}' asset",
            profile.name(),
            key
        ))
    };

    Ok(match profile.kind() {
        VoiceKind::FineTuned => ModelRef::FineTuned {
            model_dir: profile.asset("model_dir").ok_or_else(|| missing("model_dir"))?.to_path_buf(),
            config_path: profile.asset("config").ok_or_else(|| missing("config"))?.to_path_buf(),
        },
        VoiceKind::BaseWithReference => ModelRef::Base {
            model_name: BASE_MODEL.to_string(),
            reference: profile.reference().ok_or_else(|| missing("reference"))?.to_path_buf(),
        },
    })
}

fn kind_label(kind: VoiceKind) -> &'static str {
    match kind {
        VoiceKind::FineTuned => "fine-tuned",
        VoiceKind::BaseWithReference => "reference-based",
    }
}
