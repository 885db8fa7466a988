//! Lifecycle tests for the speech manager
//!
//! Uses an in-memory engine and accelerator so the full initialization
//! chain runs without a real TTS install or GPU.

use oarc_speech::device::{Accelerator, DeviceError, DeviceKind};
use oarc_speech::engine::{EngineError, EngineHandle, ModelRef, SynthesisEngine};
use oarc_speech::voice::VoiceKind;
use oarc_speech::{ManagerOptions, SpeechError, SpeechManager};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

#[derive(Default)]
struct EngineLog {
    loads: Vec<(ModelRef, DeviceKind)>,
    calls: Vec<(String, Option<PathBuf>, String, f32)>,
    handles_created: u32,
}

#[derive(Clone, Copy)]
enum LoadBehavior {
    Ok,
    RejectAccelerator,
    Fail,
}

struct FakeEngine {
    log: Rc<RefCell<EngineLog>>,
    load: LoadBehavior,
    output: Result<Vec<f32>, String>,
}

struct FakeHandle {
    id: u32,
    log: Rc<RefCell<EngineLog>>,
    placement: DeviceKind,
    output: Result<Vec<f32>, String>,
}

impl SynthesisEngine for FakeEngine {
    fn load(
        &self,
        model: &ModelRef,
        placement: DeviceKind,
    ) -> Result<Box<dyn EngineHandle>, EngineError> {
        let mut log = self.log.borrow_mut();
        log.loads.push((model.clone(), placement));

        match (self.load, placement) {
            (LoadBehavior::Fail, _) => return Err(EngineError::Load("corrupt weights".into())),
            (LoadBehavior::RejectAccelerator, DeviceKind::Accelerator) => {
                return Err(EngineError::DeviceIncompatible(
                    "Torch not compiled with CUDA enabled".into(),
                ))
            }
            _ => {}
        }

        log.handles_created += 1;
        Ok(Box::new(FakeHandle {
            id: log.handles_created,
            log: Rc::clone(&self.log),
            placement,
            output: self.output.clone(),
        }))
    }
}

impl EngineHandle for FakeHandle {
    fn synthesize(
        &mut self,
        text: &str,
        speaker: Option<&Path>,
        language: &str,
        speed: f32,
    ) -> Result<Vec<f32>, EngineError> {
        self.log.borrow_mut().calls.push((
            format!("{}:{}", self.id, text),
            speaker.map(Path::to_path_buf),
            language.to_string(),
            speed,
        ));
        self.output.clone().map_err(EngineError::Synthesis)
    }

    fn placement(&self) -> DeviceKind {
        self.placement
    }
}

struct FakeAccelerator {
    present: bool,
    allocates: bool,
    released: Rc<Cell<u32>>,
}

impl FakeAccelerator {
    fn new(present: bool, allocates: bool) -> Self {
        Self {
            present,
            allocates,
            released: Rc::new(Cell::new(0)),
        }
    }
}

impl Accelerator for FakeAccelerator {
    fn probe(&self) -> Option<String> {
        self.present.then(|| "12.1".to_string())
    }

    fn trial_allocate(&self) -> Result<(), DeviceError> {
        if self.allocates {
            Ok(())
        } else {
            Err(DeviceError::Allocation("CUDA error: no kernel image".into()))
        }
    }

    fn release_cache(&self) {
        self.released.set(self.released.get() + 1);
    }
}

struct Fixture {
    tmp: TempDir,
    log: Rc<RefCell<EngineLog>>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tmp: TempDir::new().expect("temp dir"),
            log: Rc::new(RefCell::new(EngineLog::default())),
        }
    }

    fn model_root(&self) -> PathBuf {
        self.tmp.path().join("models")
    }

    fn add_reference_voice(&self, voice: &str) -> PathBuf {
        let dir = self.model_root().join("coqui/voice_reference_pack").join(voice);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("clone_speech.wav");
        fs::write(&path, b"RIFF").unwrap();
        path
    }

    fn add_fine_tuned_voice(&self, voice: &str) {
        let dir = self.model_root().join("coqui").join(format!("XTTS-v2_{}", voice));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.json"), "{}").unwrap();
        fs::write(dir.join("model.pth"), b"weights").unwrap();
    }

    fn manager(
        &self,
        load: LoadBehavior,
        output: Result<Vec<f32>, String>,
        accelerator: FakeAccelerator,
    ) -> SpeechManager {
        let engine = FakeEngine {
            log: Rc::clone(&self.log),
            load,
            output,
        };
        SpeechManager::new(
            ManagerOptions::new(self.model_root(), self.tmp.path().join("out")),
            Box::new(engine),
            Box::new(accelerator),
        )
    }
}

fn no_gpu() -> FakeAccelerator {
    FakeAccelerator::new(false, false)
}

fn gpu() -> FakeAccelerator {
    FakeAccelerator::new(true, true)
}

#[test]
fn test_generate_before_initialize_is_empty() {
    let fx = Fixture::new();
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), no_gpu());

    assert!(!manager.is_initialized());
    let audio = manager.generate("hello", 1.0, "en");
    assert!(audio.is_empty());
    assert!(fx.log.borrow().calls.is_empty());
}

#[test]
fn test_reference_voice_passes_speaker() {
    let fx = Fixture::new();
    let reference = fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.1, -0.25, 0.05]), no_gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();
    assert_eq!(manager.voice().unwrap().kind(), VoiceKind::BaseWithReference);

    let audio = manager.generate("hello there", 1.2, "de");
    assert_eq!(audio.len(), 3);
    assert_eq!(audio.peak(), 1.0);

    let log = fx.log.borrow();
    assert!(matches!(log.loads[0].0, ModelRef::Base { .. }));
    let (_, speaker, language, speed) = &log.calls[0];
    assert_eq!(speaker.as_deref(), Some(reference.as_path()));
    assert_eq!(language, "de");
    assert_eq!(*speed, 1.2);
}

#[test]
fn test_fine_tuned_voice_omits_speaker() {
    let fx = Fixture::new();
    fx.add_fine_tuned_voice("hal");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.3]), no_gpu());

    manager.initialize("hal", "xtts_v2").unwrap();
    manager.generate("open the pod bay doors", 1.0, "en");

    let log = fx.log.borrow();
    assert!(matches!(log.loads[0].0, ModelRef::FineTuned { .. }));
    assert_eq!(log.calls[0].1, None);
}

#[test]
fn test_generated_audio_within_unit_range() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");

    for raw in [vec![4.0, -8.0, 2.0], vec![0.001, 0.002], vec![0.0, 0.0], vec![]] {
        let mut manager = fx.manager(LoadBehavior::Ok, Ok(raw), no_gpu());
        manager.initialize("c3po", "xtts_v2").unwrap();
        let audio = manager.generate("hi", 1.0, "en");
        assert!(audio.peak() <= 1.0);
        assert!(audio.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
    }
}

#[test]
fn test_synthesis_failure_degrades_to_silence() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Err("out of memory".into()), no_gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();
    assert!(manager.generate("hello", 1.0, "en").is_empty());

    let mut nan = fx.manager(LoadBehavior::Ok, Ok(vec![0.2, f32::NAN]), no_gpu());
    nan.initialize("c3po", "xtts_v2").unwrap();
    assert!(nan.generate("hello", 1.0, "en").is_empty());
}

#[test]
fn test_invalid_speed_degrades_to_silence() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), no_gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();
    assert!(manager.generate("hello", 0.0, "en").is_empty());
    assert!(fx.log.borrow().calls.is_empty());
}

#[test]
fn test_missing_voice_fails_initialization() {
    let fx = Fixture::new();
    fx.add_reference_voice("hal");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), no_gpu());

    let err = manager.initialize("c3po", "xtts_v2").unwrap_err();
    match err {
        SpeechError::ResourceNotFound(message) => assert!(message.contains("hal")),
        other => panic!("expected ResourceNotFound, got {:?}", other),
    }
    assert!(!manager.is_initialized());
    assert!(fx.log.borrow().loads.is_empty());
}

#[test]
fn test_unusable_accelerator_selects_cpu() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let broken = FakeAccelerator::new(true, false);
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), broken);

    manager.initialize("c3po", "xtts_v2").unwrap();
    assert_eq!(manager.device().unwrap().kind(), DeviceKind::Cpu);
    assert_eq!(fx.log.borrow().loads[0].1, DeviceKind::Cpu);
}

#[test]
fn test_accelerator_rejected_by_engine_retries_on_cpu() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::RejectAccelerator, Ok(vec![0.5]), gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();

    let placements: Vec<DeviceKind> = fx.log.borrow().loads.iter().map(|(_, d)| *d).collect();
    assert_eq!(placements, vec![DeviceKind::Accelerator, DeviceKind::Cpu]);
    assert_eq!(manager.device().unwrap().kind(), DeviceKind::Cpu);
    assert!(!manager.generate("hi", 1.0, "en").is_empty());
}

#[test]
fn test_usable_accelerator_is_kept() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();
    let device = manager.device().unwrap();
    assert_eq!(device.kind(), DeviceKind::Accelerator);
    assert_eq!(device.accelerator_version(), Some("12.1"));
}

#[test]
fn test_engine_load_failure_is_initialization_error() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Fail, Ok(vec![0.5]), gpu());

    let err = manager.initialize("c3po", "xtts_v2").unwrap_err();
    assert!(matches!(err, SpeechError::Initialization(_)));
    assert!(!manager.is_initialized());
    assert_eq!(fx.log.borrow().loads.len(), 1);
}

#[test]
fn test_unsupported_voice_type() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), no_gpu());

    assert!(matches!(
        manager.initialize("c3po", "tortoise"),
        Err(SpeechError::Initialization(_))
    ));
}

#[test]
fn test_cleanup_then_initialize_yields_fresh_handle() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), no_gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();
    let first = manager.session_id();
    manager.generate("one", 1.0, "en");

    manager.cleanup();
    assert!(!manager.is_initialized());
    assert!(manager.voice().is_none());
    assert!(manager.generate("ignored", 1.0, "en").is_empty());

    manager.initialize("c3po", "xtts_v2").unwrap();
    assert_ne!(manager.session_id(), first);
    manager.generate("two", 1.0, "en");

    let log = fx.log.borrow();
    assert_eq!(log.handles_created, 2);
    let texts: Vec<&str> = log.calls.iter().map(|c| c.0.as_str()).collect();
    assert_eq!(texts, vec!["1:one", "2:two"]);
}

#[test]
fn test_failed_reinitialize_clears_previous_session() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), no_gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();
    assert!(manager.initialize("nobody", "xtts_v2").is_err());
    assert!(!manager.is_initialized());
    assert!(manager.generate("hello", 1.0, "en").is_empty());
}

#[test]
fn test_generate_to_file_writes_wav() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.1, 0.2, -0.4]), no_gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();
    let request = oarc_speech::synthesis::SynthesisRequest::new("hello");
    let path = manager.generate_to_file(&request).unwrap();

    assert!(path.starts_with(fx.tmp.path().join("out/speech/generate")));
    let (samples, rate) = oarc_speech::audio::read_wav(&path).unwrap();
    assert_eq!(rate, oarc_speech::SAMPLE_RATE);
    assert_eq!(samples.len(), 3);
}

#[test]
fn test_generate_to_file_never_reuses_a_path() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.1, -0.2]), no_gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();
    let request = oarc_speech::synthesis::SynthesisRequest::new("hello");
    let first = manager.generate_to_file(&request).unwrap();
    let second = manager.generate_to_file(&request).unwrap();

    assert_ne!(first, second);
    assert!(first.is_file());
    assert!(second.is_file());
    assert_eq!(first.extension().and_then(|e| e.to_str()), Some("wav"));
}

#[test]
fn test_generate_to_file_rejects_silence() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let mut manager = fx.manager(LoadBehavior::Ok, Err("boom".into()), no_gpu());

    manager.initialize("c3po", "xtts_v2").unwrap();
    let request = oarc_speech::synthesis::SynthesisRequest::new("hello");
    assert!(matches!(
        manager.generate_to_file(&request),
        Err(SpeechError::Audio(_))
    ));

    let generated = fx.tmp.path().join("out/speech/generate");
    assert_eq!(fs::read_dir(generated).unwrap().count(), 0);
}

#[test]
fn test_accelerator_cache_released_per_generate_and_cleanup() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let accelerator = gpu();
    let released = Rc::clone(&accelerator.released);
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), accelerator);

    manager.initialize("c3po", "xtts_v2").unwrap();
    assert_eq!(released.get(), 0);

    manager.generate("one", 1.0, "en");
    manager.generate("two", 1.0, "en");
    assert_eq!(released.get(), 2);

    manager.cleanup();
    assert_eq!(released.get(), 3);
}

#[test]
fn test_cpu_placement_does_not_release_cache_on_generate() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let accelerator = FakeAccelerator::new(true, false);
    let released = Rc::clone(&accelerator.released);
    let mut manager = fx.manager(LoadBehavior::Ok, Ok(vec![0.5]), accelerator);

    manager.initialize("c3po", "xtts_v2").unwrap();
    manager.generate("one", 1.0, "en");
    assert_eq!(released.get(), 0);

    manager.cleanup();
    assert_eq!(released.get(), 1);
}

#[test]
fn test_engine_fallback_to_cpu_stops_cache_release() {
    let fx = Fixture::new();
    fx.add_reference_voice("c3po");
    let accelerator = gpu();
    let released = Rc::clone(&accelerator.released);
    let mut manager = fx.manager(LoadBehavior::RejectAccelerator, Ok(vec![0.5]), accelerator);

    manager.initialize("c3po", "xtts_v2").unwrap();
    manager.generate("one", 1.0, "en");
    assert_eq!(released.get(), 0);
}
