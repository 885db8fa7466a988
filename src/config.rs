//! Configuration management

use crate::device::{Accelerator, CpuOnly, NvidiaRuntime};
use crate::manager::ManagerOptions;
use crate::{Result, SpeechError};
use ini::Ini;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Speech settings persisted in an INI file
///
/// Holds model and output locations, the default voice, and the engine
/// program used for synthesis.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path (~/.oarc-speech.cfg by default)
    path: PathBuf,
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| SpeechError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(&path)
                .map_err(|e| SpeechError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self { ini, path })
    }

    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".oarc-speech.cfg")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn data_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oarc")
    }

    fn default_config() -> Ini {
        let mut ini = Ini::new();
        let data = Self::data_root();

        ini.with_section(Some("paths"))
            .set("model_root", data.join("models").to_string_lossy())
            .set("output_root", data.join("output").to_string_lossy());

        ini.with_section(Some("speech"))
            .set("voice", "c3po")
            .set("voice_type", "xtts_v2")
            .set("language", "en")
            .set("speed", "1.0")
            .set("device", "auto");

        ini.with_section(Some("engine"))
            .set("program", "tts")
            .set("warmup", "true");

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    pub fn model_root(&self) -> PathBuf {
        self.ini
            .get_from(Some("paths"), "model_root")
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::data_root().join("models"))
    }

    pub fn output_root(&self) -> PathBuf {
        self.ini
            .get_from(Some("paths"), "output_root")
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::data_root().join("output"))
    }

    pub fn voice(&self) -> String {
        self.get_string("speech", "voice", "c3po")
    }

    pub fn voice_type(&self) -> String {
        self.get_string("speech", "voice_type", "xtts_v2")
    }

    pub fn language(&self) -> String {
        self.get_string("speech", "language", "en")
    }

    /// Speech speed factor; non-positive values fall back to 1.0
    pub fn speed(&self) -> f32 {
        let speed = self.get_float("speech", "speed", 1.0);
        if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            warn!("Ignoring invalid speed {} in config", speed);
            1.0
        }
    }

    /// True when the config forces CPU
    pub fn force_cpu(&self) -> bool {
        self.get_string("speech", "device", "auto").eq_ignore_ascii_case("cpu")
    }

    pub fn engine_program(&self) -> String {
        self.get_string("engine", "program", "tts")
    }

    pub fn engine_warmup(&self) -> bool {
        self.get_bool("engine", "warmup", true)
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions::new(self.model_root(), self.output_root())
    }

    /// Accelerator runtime honoring the `device` setting
    pub fn accelerator(&self) -> Box<dyn Accelerator> {
        if self.force_cpu() {
            Box::new(CpuOnly)
        } else {
            Box::new(NvidiaRuntime::new())
        }
    }
}
