//! oarc-speech command-line entry point
//!
//! Commands:
//! - `speak <text>`: synthesize text to a WAV file
//! - `voices`: list fine-tuned and reference voices
//! - `device`: show which compute device would be used

use anyhow::{bail, Context};
use log::{error, info};
use oarc_speech::config::Config;
use oarc_speech::device::select_device;
use oarc_speech::engine::CoquiCliEngine;
use oarc_speech::paths::SpeechPaths;
use oarc_speech::synthesis::SynthesisRequest;
use oarc_speech::voice::{list_fine_tuned_voices, list_reference_voices};
use oarc_speech::SpeechManager;
use std::path::PathBuf;
use std::process;

const USAGE: &str = "\
Usage: oarc-speech [--debug] [--config PATH] <command>

Commands:
  speak <text> [--voice NAME] [--speed S] [--language L] [--out FILE]
        (the Coqui tts engine has no speed control and ignores --speed)
  voices
  device";

fn main() {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let debug_mode = take_flag(&mut args, &["--debug", "-d"]);

    let level = if debug_mode {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Err(e) = run(args) {
        error!("Fatal error: {:#}", e);
        process::exit(1);
    }
}

fn run(mut args: Vec<String>) -> anyhow::Result<()> {
    let config = match take_option(&mut args, "--config")? {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    info!("{} {} - config from {:?}", oarc_speech::APP_NAME, oarc_speech::VERSION, config.path());

    if args.is_empty() {
        bail!("{}", USAGE);
    }
    let command = args.remove(0);

    match command.as_str() {
        "speak" => speak(&config, args),
        "voices" => voices(&config),
        "device" => {
            let selection = select_device(config.accelerator().as_ref());
            println!("{}", selection);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n{}", other, USAGE),
    }
}

fn speak(config: &Config, mut args: Vec<String>) -> anyhow::Result<()> {
    let voice = take_option(&mut args, "--voice")?.unwrap_or_else(|| config.voice());
    let language = take_option(&mut args, "--language")?.unwrap_or_else(|| config.language());
    let speed = match take_option(&mut args, "--speed")? {
        Some(s) => s.parse::<f32>().with_context(|| format!("Invalid speed '{}'", s))?,
        None => config.speed(),
    };
    let out = take_option(&mut args, "--out")?.map(PathBuf::from);

    let text = args.join(" ");
    if text.trim().is_empty() {
        bail!("Nothing to speak\n{}", USAGE);
    }

    let engine = CoquiCliEngine::new(config.engine_program(), config.model_root())
        .context("Speech engine unavailable")?
        .with_warmup(config.engine_warmup());

    let mut manager = SpeechManager::new(
        config.manager_options(),
        Box::new(engine),
        config.accelerator(),
    );
    manager
        .initialize(&voice, &config.voice_type())
        .with_context(|| format!("Failed to initialize voice '{}'", voice))?;

    let request = SynthesisRequest::new(text)
        .with_speed(speed)
        .with_language(language);

    let written = match out {
        Some(path) => {
            let audio = manager.generate_request(&request);
            audio
                .write_wav(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            path
        }
        None => manager.generate_to_file(&request)?,
    };

    println!("{}", written.display());
    manager.cleanup();
    Ok(())
}

fn voices(config: &Config) -> anyhow::Result<()> {
    let paths = SpeechPaths::resolve(config.model_root(), config.output_root())?;

    println!("Fine-tuned voices ({}):", paths.coqui_dir.display());
    for name in list_fine_tuned_voices(&paths)? {
        println!("  {}", name);
    }

    println!("Reference voices ({}):", paths.voice_reference_pack_dir.display());
    for name in list_reference_voices(&paths)? {
        println!("  {}", name);
    }
    Ok(())
}

/// Remove every occurrence of a boolean flag, returning whether it was set
fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    let before = args.len();
    args.retain(|a| !names.contains(&a.as_str()));
    args.len() != before
}

/// Remove `name VALUE` from the arguments
fn take_option(args: &mut Vec<String>, name: &str) -> anyhow::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{} requires a value", name);
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}
