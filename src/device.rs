//! Compute device selection
//!
//! Decides whether speech models run on an accelerator or the CPU.
//! Presence alone is not enough: the accelerator must also pass a trial
//! allocation before it is selected.

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Matches the runtime version in the `nvidia-smi` banner
static CUDA_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CUDA Version:\s*([0-9]+(?:\.[0-9]+)*)").unwrap());

/// Failure of a trial allocation on the accelerator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("accelerator runtime unavailable: {0}")]
    Unavailable(String),

    #[error("trial allocation failed: {0}")]
    Allocation(String),
}

/// Where models are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Accelerator,
    Cpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Accelerator => write!(f, "cuda"),
            DeviceKind::Cpu => write!(f, "cpu"),
        }
    }
}

/// Result of device selection
///
/// `kind == Accelerator` is only ever produced after a successful trial
/// allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSelection {
    kind: DeviceKind,
    accelerator_version: Option<String>,
}

impl DeviceSelection {
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            accelerator_version: None,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn accelerator_version(&self) -> Option<&str> {
        self.accelerator_version.as_deref()
    }

    pub fn is_accelerator(&self) -> bool {
        self.kind == DeviceKind::Accelerator
    }

    /// Downgrade to CPU after the engine rejected the accelerator
    pub(crate) fn fall_back_to_cpu(&mut self) {
        self.kind = DeviceKind::Cpu;
        self.accelerator_version = None;
    }
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.accelerator_version {
            Some(v) => write!(f, "{} {}", self.kind, v),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Accelerator runtime primitives
pub trait Accelerator {
    /// Runtime version if an accelerator is present
    fn probe(&self) -> Option<String>;

    /// Confirm the runtime can actually allocate on the device
    fn trial_allocate(&self) -> Result<(), DeviceError>;

    /// Release cached device memory, if any is held
    fn release_cache(&self) {}
}

/// Pick the compute device. Never fails; any accelerator problem
/// downgrades to CPU with a warning.
pub fn select_device(accelerator: &dyn Accelerator) -> DeviceSelection {
    let version = match accelerator.probe() {
        Some(v) => v,
        None => {
            info!("CUDA not available. Using CPU for speech processing.");
            return DeviceSelection::cpu();
        }
    };

    match accelerator.trial_allocate() {
        Ok(()) => {
            info!("Using CUDA {} for speech processing.", version);
            DeviceSelection {
                kind: DeviceKind::Accelerator,
                accelerator_version: Some(version),
            }
        }
        Err(e) => {
            warn!("CUDA {} detected but cannot be used: {}", version, e);
            warn!("Using CPU for speech processing instead.");
            DeviceSelection::cpu()
        }
    }
}

/// NVIDIA runtime queried through `nvidia-smi`
pub struct NvidiaRuntime {
    program: String,
}

impl NvidiaRuntime {
    pub fn new() -> Self {
        Self::with_program("nvidia-smi")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, DeviceError> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DeviceError::Unavailable(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeviceError::Unavailable(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for NvidiaRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Accelerator for NvidiaRuntime {
    fn probe(&self) -> Option<String> {
        match self.run(&[]) {
            Ok(banner) => {
                let version = parse_cuda_version(&banner);
                debug!("nvidia-smi reports CUDA version {:?}", version);
                version
            }
            Err(e) => {
                debug!("No NVIDIA runtime: {}", e);
                None
            }
        }
    }

    fn trial_allocate(&self) -> Result<(), DeviceError> {
        let out = self.run(&[
            "--query-gpu=memory.free",
            "--format=csv,noheader,nounits",
        ])?;
        let free_mib = parse_free_memory(&out)?;
        debug!("Largest free device memory: {} MiB", free_mib);
        Ok(())
    }

    fn release_cache(&self) {
        // Engine runs out of process; its memory goes away with it.
        debug!("Device cache release requested");
    }
}

/// Accelerator stand-in used when CPU is forced by configuration
pub struct CpuOnly;

impl Accelerator for CpuOnly {
    fn probe(&self) -> Option<String> {
        None
    }

    fn trial_allocate(&self) -> Result<(), DeviceError> {
        Err(DeviceError::Unavailable("CPU forced".to_string()))
    }
}

fn parse_cuda_version(banner: &str) -> Option<String> {
    CUDA_VERSION
        .captures(banner)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Largest free memory across devices, in MiB. Zero or unparseable output
/// means nothing can be allocated.
fn parse_free_memory(out: &str) -> Result<u64, DeviceError> {
    let max = out
        .lines()
        .filter_map(|l| l.trim().parse::<u64>().ok())
        .max()
        .ok_or_else(|| DeviceError::Allocation(format!("unexpected output: {:?}", out.trim())))?;

    if max == 0 {
        return Err(DeviceError::Allocation("no free device memory".to_string()));
    }
    Ok(max)
}
