//! Voice resolution
//!
//! A voice is either a fine-tuned XTTS bundle with its own weights, or the
//! base multilingual model conditioned on a reference clip at synthesis
//! time.

use crate::paths::SpeechPaths;
use crate::{Result, SpeechError};
use log::{error, info};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Prefix of fine-tuned bundle directories under `coqui/`
pub const FINE_TUNED_PREFIX: &str = "XTTS-v2_";

/// Reference clip required for reference-based voices
pub const CLONE_SPEECH_FILE: &str = "clone_speech.wav";

pub const CONFIG_FILE: &str = "config.json";
pub const MODEL_FILE: &str = "model.pth";
pub const FINE_TUNED_REFERENCE_FILE: &str = "reference.wav";

/// Voice technology requested at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceType {
    XttsV2,
}

impl FromStr for VoiceType {
    type Err = SpeechError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "xtts_v2" | "xttsv2" => Ok(VoiceType::XttsV2),
            other => Err(SpeechError::Initialization(format!(
                "Unsupported voice type '{}' (supported: xtts_v2)",
                other
            ))),
        }
    }
}

impl fmt::Display for VoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceType::XttsV2 => write!(f, "xtts_v2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceKind {
    FineTuned,
    BaseWithReference,
}

/// A resolved voice and the assets it needs
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    name: String,
    kind: VoiceKind,
    asset_paths: BTreeMap<String, PathBuf>,
}

impl VoiceProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VoiceKind {
        self.kind
    }

    pub fn asset_paths(&self) -> &BTreeMap<String, PathBuf> {
        &self.asset_paths
    }

    pub fn asset(&self, key: &str) -> Option<&Path> {
        self.asset_paths.get(key).map(PathBuf::as_path)
    }

    /// Reference clip path (expected, for fine-tuned voices; verified, for
    /// reference-based voices)
    pub fn reference(&self) -> Option<&Path> {
        self.asset("reference")
    }

    /// Reference-based voices take a speaker clip on every call
    pub fn is_multi_speaker(&self) -> bool {
        self.kind == VoiceKind::BaseWithReference
    }
}

/// The parts of an XTTS `config.json` we look at
#[derive(Debug, Deserialize)]
struct BundleConfig {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    languages: Vec<String>,
}

/// Resolve `name` to a voice profile.
///
/// A fine-tuned bundle wins when both its config and weights exist.
/// Otherwise the voice falls back to the base model and requires
/// `voice_reference_pack/<name>/clone_speech.wav`.
pub fn resolve_voice(paths: &SpeechPaths, name: &str) -> Result<VoiceProfile> {
    check_voice_name(name)?;

    let voices = list_fine_tuned_voices(paths)?;
    info!(
        "Available voices: {}",
        if voices.is_empty() { "None".to_string() } else { voices.join(", ") }
    );

    let bundle_dir = paths.coqui_dir.join(format!("{}{}", FINE_TUNED_PREFIX, name));
    let config_path = bundle_dir.join(CONFIG_FILE);
    let model_path = bundle_dir.join(MODEL_FILE);

    if config_path.is_file() && model_path.is_file() {
        inspect_bundle_config(&config_path)?;
        info!("Using fine-tuned model for voice '{}' from {}", name, bundle_dir.display());

        let asset_paths = BTreeMap::from([
            ("config".to_string(), config_path),
            ("model".to_string(), model_path),
            ("reference".to_string(), bundle_dir.join(FINE_TUNED_REFERENCE_FILE)),
            ("model_dir".to_string(), bundle_dir),
        ]);
        return Ok(VoiceProfile {
            name: name.to_string(),
            kind: VoiceKind::FineTuned,
            asset_paths,
        });
    }

    info!(
        "No fine-tuned model found for {}, using base model with voice reference",
        name
    );

    let voice_dir = paths.voice_reference_pack_dir.join(name);
    fs::create_dir_all(&voice_dir)?;
    let reference = voice_dir.join(CLONE_SPEECH_FILE);

    if !reference.is_file() {
        let message = missing_reference_message(paths, name, &voice_dir, &reference);
        error!("{}", message);
        return Err(SpeechError::ResourceNotFound(message));
    }

    Ok(VoiceProfile {
        name: name.to_string(),
        kind: VoiceKind::BaseWithReference,
        asset_paths: BTreeMap::from([("reference".to_string(), reference)]),
    })
}

/// A voice name must be one plain path segment so it stays inside the
/// model directories
fn check_voice_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if segment == name => Ok(()),
        _ => Err(SpeechError::Initialization(format!(
            "Invalid voice name '{}': must be a single directory name",
            name
        ))),
    }
}

/// Names of fine-tuned voices found under `coqui/`, sorted
pub fn list_fine_tuned_voices(paths: &SpeechPaths) -> Result<Vec<String>> {
    let mut voices: Vec<String> = list_dir(&paths.coqui_dir, true)?
        .into_iter()
        .filter_map(|d| d.strip_prefix(FINE_TUNED_PREFIX).map(String::from))
        .collect();
    voices.sort();
    Ok(voices)
}

/// Names of voice directories in the reference pack, sorted
pub fn list_reference_voices(paths: &SpeechPaths) -> Result<Vec<String>> {
    list_dir(&paths.voice_reference_pack_dir, true)
}

fn inspect_bundle_config(config_path: &Path) -> Result<()> {
    let text = fs::read_to_string(config_path)?;
    let config: BundleConfig = serde_json::from_str(&text).map_err(|e| {
        SpeechError::Initialization(format!("Invalid config {}: {}", config_path.display(), e))
    })?;
    info!(
        "Bundle config: model={}, languages=[{}]",
        config.model.as_deref().unwrap_or("unknown"),
        config.languages.join(", ")
    );
    Ok(())
}

fn missing_reference_message(
    paths: &SpeechPaths,
    name: &str,
    voice_dir: &Path,
    reference: &Path,
) -> String {
    let mut message = format!(
        "Voice reference file not found at {}\n\
         Please ensure voice reference exists at: {}\n\
         The file should be named '{}'.\n",
        reference.display(),
        voice_dir.display(),
        CLONE_SPEECH_FILE
    );

    if let Ok(files) = list_dir(voice_dir, false) {
        if !files.is_empty() {
            message.push_str(&format!(
                "Available files in {} directory: [{}]\n",
                name,
                files.join(", ")
            ));
        }
    }

    if let Ok(voices) = list_dir(&paths.voice_reference_pack_dir, true) {
        message.push_str(&format!(
            "Available voices in reference pack: [{}]",
            voices.join(", ")
        ));
    }

    message
}

/// Sorted entry names of `dir`; only directories when `dirs_only`.
/// A missing directory lists as empty.
fn list_dir(dir: &Path, dirs_only: bool) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if dirs_only && !entry.file_type()?.is_dir() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
