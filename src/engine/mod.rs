//! Synthesis engine seam
//!
//! The model itself lives outside this crate. An engine loads a model onto
//! a device and hands back a handle that turns text into raw samples.

pub mod coqui;

pub use coqui::CoquiCliEngine;

use crate::device::DeviceKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Registry name of the base multilingual XTTS model
pub const BASE_MODEL: &str = "tts_models/multilingual/multi-dataset/xtts_v2";

/// Errors raised by an engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// The model cannot be placed on the requested device. Loading on CPU
    /// may still succeed.
    #[error("device incompatible: {0}")]
    DeviceIncompatible(String),

    #[error("model load failed: {0}")]
    Load(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to load
#[derive(Debug, Clone, PartialEq)]
pub enum ModelRef {
    /// Voice-specific trained bundle
    FineTuned {
        model_dir: PathBuf,
        config_path: PathBuf,
    },
    /// Shared base model, conditioned per call on `reference`
    Base {
        model_name: String,
        reference: PathBuf,
    },
}

impl ModelRef {
    pub fn describe(&self) -> String {
        match self {
            ModelRef::FineTuned { model_dir, .. } => model_dir.display().to_string(),
            ModelRef::Base { model_name, .. } => model_name.clone(),
        }
    }
}

/// External engine library
pub trait SynthesisEngine {
    /// Load a model onto `placement`
    fn load(
        &self,
        model: &ModelRef,
        placement: DeviceKind,
    ) -> std::result::Result<Box<dyn EngineHandle>, EngineError>;
}

/// A loaded model
pub trait EngineHandle {
    /// Produce raw samples for `text`. `speaker` is passed only for
    /// multi-speaker voices.
    fn synthesize(
        &mut self,
        text: &str,
        speaker: Option<&Path>,
        language: &str,
        speed: f32,
    ) -> std::result::Result<Vec<f32>, EngineError>;

    /// Device the model was placed on
    fn placement(&self) -> DeviceKind;

    /// Native sample rate of the returned samples
    fn sample_rate(&self) -> u32 {
        crate::audio::SAMPLE_RATE
    }
}
