//! Speech lifecycle management
//!
//! `SpeechManager` is the one context object the entry point builds and
//! passes around. It owns the device selection, resolved paths, voice
//! profile and loaded engine handle, and replaces or releases them
//! together.

use crate::audio::{AudioBuffer, SAMPLE_RATE};
use crate::device::{select_device, Accelerator, DeviceSelection};
use crate::engine::SynthesisEngine;
use crate::paths::SpeechPaths;
use crate::synthesis::{SynthesisAdapter, SynthesisRequest};
use crate::voice::{resolve_voice, VoiceProfile, VoiceType};
use crate::{Result, SpeechError};
use log::{debug, error, info, warn};
use std::path::PathBuf;

/// Where the manager looks for models and writes output
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerOptions {
    pub model_root: PathBuf,
    pub output_root: PathBuf,
}

impl ManagerOptions {
    pub fn new(model_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            model_root: model_root.into(),
            output_root: output_root.into(),
        }
    }
}

/// Everything created by one successful `initialize`
struct Session {
    id: u64,
    voice_type: VoiceType,
    device: DeviceSelection,
    paths: SpeechPaths,
    profile: VoiceProfile,
    adapter: SynthesisAdapter,
}

/// Owns the live speech session
pub struct SpeechManager {
    options: ManagerOptions,
    engine: Box<dyn SynthesisEngine>,
    accelerator: Box<dyn Accelerator>,
    session: Option<Session>,
    sessions_started: u64,
}

impl SpeechManager {
    /// Create an uninitialized manager
    pub fn new(
        options: ManagerOptions,
        engine: Box<dyn SynthesisEngine>,
        accelerator: Box<dyn Accelerator>,
    ) -> Self {
        Self {
            options,
            engine,
            accelerator,
            session: None,
            sessions_started: 0,
        }
    }

    /// Select a device, resolve paths and voice, and load the engine.
    ///
    /// Any previous session is released first. On error the manager is
    /// left uninitialized.
    pub fn initialize(&mut self, voice_name: &str, voice_type: &str) -> Result<()> {
        if self.session.is_some() {
            debug!("Replacing existing speech session");
            self.cleanup();
        }

        info!("=========== INITIALIZING TEXT-TO-SPEECH ===========");
        let voice_type: VoiceType = voice_type.parse()?;

        let mut device = select_device(self.accelerator.as_ref());

        match self.build_session(voice_name, voice_type, &mut device) {
            Ok(session) => {
                info!("TTS Model initialized successfully on {}", session.device);
                info!("=========== TEXT-TO-SPEECH INITIALIZED ===========");
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                error!("Error initializing TTS model: {}", e);
                Err(e)
            }
        }
    }

    fn build_session(
        &mut self,
        voice_name: &str,
        voice_type: VoiceType,
        device: &mut DeviceSelection,
    ) -> Result<Session> {
        if voice_name.trim().is_empty() {
            return Err(SpeechError::Initialization("voice name is empty".to_string()));
        }

        let paths = SpeechPaths::resolve(&self.options.model_root, &self.options.output_root)?;
        info!("Using model directory: {}", paths.model_root.display());

        let profile = resolve_voice(&paths, voice_name)?;
        let adapter = SynthesisAdapter::new(self.engine.as_ref(), device, &profile)?;

        self.sessions_started += 1;
        Ok(Session {
            id: self.sessions_started,
            voice_type,
            device: device.clone(),
            paths,
            profile,
            adapter,
        })
    }

    /// Synthesize speech. Returns an empty buffer when uninitialized or on
    /// any synthesis failure.
    pub fn generate(&mut self, text: &str, speed: f32, language: &str) -> AudioBuffer {
        let request = SynthesisRequest::new(text)
            .with_speed(speed)
            .with_language(language);
        self.generate_request(&request)
    }

    pub fn generate_request(&mut self, request: &SynthesisRequest) -> AudioBuffer {
        match self.session.as_mut() {
            Some(session) => session.adapter.generate(request, self.accelerator.as_ref()),
            None => {
                warn!("TTS model not initialized, returning silence");
                AudioBuffer::empty(SAMPLE_RATE)
            }
        }
    }

    /// Synthesize into a WAV file in the generate output directory
    pub fn generate_to_file(&mut self, request: &SynthesisRequest) -> Result<PathBuf> {
        let dir = match &self.session {
            Some(session) => session.paths.generate_speech_dir.clone(),
            None => {
                return Err(SpeechError::Initialization(
                    "TTS model not initialized".to_string(),
                ))
            }
        };

        let audio = self.generate_request(request);
        if audio.is_empty() {
            return Err(SpeechError::Audio("No audio was generated".to_string()));
        }

        // Reserve a fresh name so earlier output is never overwritten
        let (_, path) = tempfile::Builder::new()
            .prefix("speech_")
            .suffix(".wav")
            .tempfile_in(&dir)?
            .keep()
            .map_err(|e| SpeechError::Io(e.error))?;
        audio.write_wav(&path)?;
        info!("Wrote {:.2}s of speech to {}", audio.duration_secs(), path.display());
        Ok(path)
    }

    /// Release device memory and drop the session
    pub fn cleanup(&mut self) {
        info!("Cleaning up speech manager resources");
        self.accelerator.release_cache();
        self.session = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Identifier of the live session; each `initialize` yields a new one
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn device(&self) -> Option<&DeviceSelection> {
        self.session.as_ref().map(|s| &s.device)
    }

    pub fn voice(&self) -> Option<&VoiceProfile> {
        self.session.as_ref().map(|s| &s.profile)
    }

    pub fn voice_type(&self) -> Option<VoiceType> {
        self.session.as_ref().map(|s| s.voice_type)
    }

    pub fn paths(&self) -> Option<&SpeechPaths> {
        self.session.as_ref().map(|s| &s.paths)
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

impl Drop for SpeechManager {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.cleanup();
        }
    }
}
