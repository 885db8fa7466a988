//! OARC speech
//!
//! Speech resource initialization and synthesis sequencing for XTTS
//! voices: device selection, voice asset resolution, and a normalized
//! audio front end over an external TTS engine.

pub mod audio;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod manager;
pub mod paths;
pub mod synthesis;
pub mod voice;

pub use audio::{AudioBuffer, SAMPLE_RATE};
pub use error::{Result, SpeechError};
pub use manager::{ManagerOptions, SpeechManager};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "oarc-speech";
