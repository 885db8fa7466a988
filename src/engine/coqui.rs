//! Coqui TTS engine driven through its `tts` command-line tool
//!
//! Each synthesis runs the tool once, writing to a scratch WAV file that is
//! decoded back into samples.
//!
//! Dependencies:
//! - Coqui TTS (install with: pip install coqui-tts)

use super::{EngineError, EngineHandle, ModelRef, SynthesisEngine};
use crate::audio::{read_wav, SAMPLE_RATE};
use crate::device::DeviceKind;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Phrase synthesized when verifying a model loads on its device
const WARMUP_TEXT: &str = "Ready.";

/// Engine that shells out to the Coqui `tts` executable
pub struct CoquiCliEngine {
    /// Path or name of the `tts` executable
    program: String,

    /// Model cache location handed to the tool as `TTS_HOME`
    tts_home: PathBuf,

    /// Synthesize a short phrase at load time so device problems surface
    /// during initialization rather than on the first request
    warmup: bool,
}

impl CoquiCliEngine {
    /// Create an engine, verifying the executable runs
    pub fn new(program: impl Into<String>, tts_home: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let program = program.into();
        Self::check_program(&program)?;
        debug!("Found Coqui tts at: {}", program);

        Ok(Self {
            program,
            tts_home: tts_home.into(),
            warmup: true,
        })
    }

    pub fn with_warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }

    fn check_program(program: &str) -> Result<(), EngineError> {
        match Command::new(program)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => Ok(()),
            _ => Err(EngineError::Load(format!(
                "'{}' not found or not runnable. Install with: pip install coqui-tts",
                program
            ))),
        }
    }
}

impl SynthesisEngine for CoquiCliEngine {
    fn load(
        &self,
        model: &ModelRef,
        placement: DeviceKind,
    ) -> Result<Box<dyn EngineHandle>, EngineError> {
        info!("Loading {} on {}", model.describe(), placement);

        let mut handle = CoquiCliHandle {
            program: self.program.clone(),
            tts_home: self.tts_home.clone(),
            model: model.clone(),
            placement,
            sample_rate: SAMPLE_RATE,
        };

        if self.warmup {
            let speaker = match model {
                ModelRef::Base { reference, .. } => Some(reference.clone()),
                ModelRef::FineTuned { .. } => None,
            };
            handle
                .run(WARMUP_TEXT, speaker.as_deref(), "en")
                .map_err(|e| match e {
                    EngineError::Synthesis(msg) => EngineError::Load(msg),
                    other => other,
                })?;
        }

        Ok(Box::new(handle))
    }
}

/// A model bound to a device; each call spawns the tool
pub struct CoquiCliHandle {
    program: String,
    tts_home: PathBuf,
    model: ModelRef,
    placement: DeviceKind,
    sample_rate: u32,
}

impl CoquiCliHandle {
    fn command(&self, text: &str, speaker: Option<&Path>, language: &str, out: &Path) -> Command {
        let mut cmd = Command::new(&self.program);

        // Pre-accept the model license so the tool never prompts
        cmd.env("COQUI_TOS_AGREED", "1");
        cmd.env("TTS_HOME", &self.tts_home);

        match &self.model {
            ModelRef::FineTuned {
                model_dir,
                config_path,
            } => {
                cmd.arg("--model_path").arg(model_dir);
                cmd.arg("--config_path").arg(config_path);
            }
            ModelRef::Base { model_name, .. } => {
                cmd.arg("--model_name").arg(model_name);
            }
        }

        cmd.arg("--text").arg(text);
        cmd.arg("--language_idx").arg(language);
        if let Some(speaker) = speaker {
            cmd.arg("--speaker_wav").arg(speaker);
        }
        cmd.arg("--use_cuda")
            .arg(if self.placement == DeviceKind::Accelerator { "true" } else { "false" });
        cmd.arg("--out_path").arg(out);

        cmd.stdin(Stdio::null());
        cmd
    }

    fn run(&mut self, text: &str, speaker: Option<&Path>, language: &str) -> Result<Vec<f32>, EngineError> {
        let scratch = TempDir::new()?;
        let out = scratch.path().join("speech.wav");

        let output = self.command(text, speaker, language, &out).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, self.placement));
        }

        let (samples, rate) =
            read_wav(&out).map_err(|e| EngineError::Synthesis(e.to_string()))?;
        self.sample_rate = rate;
        debug!("tts produced {} samples at {} Hz", samples.len(), rate);
        Ok(samples)
    }
}

impl EngineHandle for CoquiCliHandle {
    fn synthesize(
        &mut self,
        text: &str,
        speaker: Option<&Path>,
        language: &str,
        speed: f32,
    ) -> Result<Vec<f32>, EngineError> {
        if (speed - 1.0).abs() > f32::EPSILON {
            warn!("Coqui CLI has no speed control; ignoring speed {}", speed);
        }
        self.run(text, speaker, language)
    }

    fn placement(&self) -> DeviceKind {
        self.placement
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Map the tool's stderr to an error. CUDA complaints while on the
/// accelerator mean the device, not the model, is at fault.
fn classify_failure(stderr: &str, placement: DeviceKind) -> EngineError {
    let last = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("tts exited with an error")
        .trim()
        .to_string();

    if placement == DeviceKind::Accelerator && stderr.contains("CUDA") {
        EngineError::DeviceIncompatible(last)
    } else {
        EngineError::Synthesis(last)
    }
}
