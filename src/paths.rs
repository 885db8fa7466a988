//! Filesystem layout for voice assets and speech output
//!
//! ```text
//! <model_root>/coqui/XTTS-v2_<voice>/{config.json, model.pth, reference.wav}
//! <model_root>/coqui/voice_reference_pack/<voice>/clone_speech.wav
//! <output_root>/speech/{recognize,generate}/
//! ```

use crate::Result;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory holding all Coqui model assets
pub const COQUI_DIR: &str = "coqui";

/// Directory under `coqui/` holding reference clips per voice
pub const VOICE_REFERENCE_PACK_DIR: &str = "voice_reference_pack";

/// Resolved speech directories
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechPaths {
    pub model_root: PathBuf,
    pub coqui_dir: PathBuf,
    pub voice_reference_pack_dir: PathBuf,
    pub speech_dir: PathBuf,
    pub recognize_speech_dir: PathBuf,
    pub generate_speech_dir: PathBuf,
}

impl SpeechPaths {
    /// Compute the layout and create any missing directory.
    ///
    /// Safe to call repeatedly.
    pub fn resolve(model_root: impl AsRef<Path>, output_root: impl AsRef<Path>) -> Result<Self> {
        let paths = Self::layout(model_root.as_ref(), output_root.as_ref());

        if !paths.coqui_dir.exists() {
            warn!("Coqui directory not found, creating: {}", paths.coqui_dir.display());
        }

        for dir in [
            &paths.coqui_dir,
            &paths.voice_reference_pack_dir,
            &paths.speech_dir,
            &paths.recognize_speech_dir,
            &paths.generate_speech_dir,
        ] {
            fs::create_dir_all(dir)?;
        }

        debug!("Speech paths ready under {}", paths.model_root.display());
        Ok(paths)
    }

    /// Compute the layout without touching the filesystem
    pub fn layout(model_root: &Path, output_root: &Path) -> Self {
        let coqui_dir = model_root.join(COQUI_DIR);
        let speech_dir = output_root.join("speech");
        Self {
            model_root: model_root.to_path_buf(),
            voice_reference_pack_dir: coqui_dir.join(VOICE_REFERENCE_PACK_DIR),
            coqui_dir,
            recognize_speech_dir: speech_dir.join("recognize"),
            generate_speech_dir: speech_dir.join("generate"),
            speech_dir,
        }
    }

    /// Named view of every directory
    pub fn as_map(&self) -> BTreeMap<&'static str, &Path> {
        BTreeMap::from([
            ("model_root", self.model_root.as_path()),
            ("coqui_dir", self.coqui_dir.as_path()),
            ("voice_reference_pack_dir", self.voice_reference_pack_dir.as_path()),
            ("speech_dir", self.speech_dir.as_path()),
            ("recognize_speech_dir", self.recognize_speech_dir.as_path()),
            ("generate_speech_dir", self.generate_speech_dir.as_path()),
        ])
    }
}
