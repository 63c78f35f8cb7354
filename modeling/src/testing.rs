//! Fake mount and imaging backend for unit tests

use crate::dome::Dome;
use crate::imaging::{
    BackendResult, CameraProps, CaptureRequest, CaptureResult, ImagingBackend, SolveRequest,
    SolveResult,
};
use async_trait::async_trait;
use skyalign_mount::{MountError, MountLink, MountResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct FakeMountState {
    star_count: u32,
    accept_stars: bool,
    refine_reply: String,
    slew_cycles: u32,
    slewing_remaining: u32,
    overrides: HashMap<String, String>,
    failing: Vec<String>,
    sent: Vec<String>,
}

/// Mount that slews for a few status polls and counts model stars
pub(crate) struct FakeMount {
    state: Mutex<FakeMountState>,
}

impl FakeMount {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeMountState {
                star_count: 0,
                accept_stars: true,
                refine_reply: "V".to_string(),
                slew_cycles: 2,
                slewing_remaining: 0,
                overrides: HashMap::new(),
                failing: Vec::new(),
                sent: Vec::new(),
            }),
        })
    }

    /// Answer commands starting with `prefix` with `reply`
    pub(crate) fn set_reply(&self, prefix: &str, reply: &str) {
        self.state
            .lock()
            .unwrap()
            .overrides
            .insert(prefix.to_string(), reply.to_string());
    }

    /// Fail `command` with a link error
    pub(crate) fn fail_on(&self, command: &str) {
        self.state.lock().unwrap().failing.push(command.to_string());
    }

    pub(crate) fn set_refine_reply(&self, reply: &str) {
        self.state.lock().unwrap().refine_reply = reply.to_string();
    }

    pub(crate) fn set_accept_stars(&self, accept: bool) {
        self.state.lock().unwrap().accept_stars = accept;
    }

    /// Status polls reporting a slew after `MS`
    pub(crate) fn set_slew_cycles(&self, cycles: u32) {
        self.state.lock().unwrap().slew_cycles = cycles;
    }

    pub(crate) fn star_count(&self) -> u32 {
        self.state.lock().unwrap().star_count
    }

    pub(crate) fn is_slewing(&self) -> bool {
        self.state.lock().unwrap().slewing_remaining > 0
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl MountLink for FakeMount {
    async fn send_command(&self, command: &str) -> MountResult<String> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(command.to_string());
        if state.failing.iter().any(|c| c == command) {
            return Err(MountError::Io(format!("link dropped during {}", command)));
        }

        let overridden = state
            .overrides
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, reply)| reply.clone());
        if let Some(reply) = overridden {
            return Ok(reply);
        }

        let reply = match command {
            "Ginfo" => {
                let slewing = state.slewing_remaining > 0;
                if slewing {
                    state.slewing_remaining -= 1;
                }
                format!(
                    "10.0,20.0,W,120.0,45.0,2460000.5,0,{}",
                    if slewing { 1 } else { 0 }
                )
            }
            "GS" => "10:00:00.00".to_string(),
            "MS" => {
                state.slewing_remaining = state.slew_cycles;
                "0".to_string()
            }
            "getalst" => state.star_count.to_string(),
            "CMS" => {
                if state.accept_stars {
                    state.star_count += 1;
                }
                state.refine_reply.clone()
            }
            "CM" => "Coordinates matched".to_string(),
            "CMCFG0" => "0".to_string(),
            "delalig" => {
                state.star_count = 0;
                "1".to_string()
            }
            "newalig" | "endalig" => "V".to_string(),
            "PO" | "AP" | "RT9" | "U2" => String::new(),
            _ if command.starts_with("newalpt") => "1".to_string(),
            _ if ["Sz", "Sa", "Sr", "Sd"].iter().any(|p| command.starts_with(p)) => "1".to_string(),
            _ => String::new(),
        };
        Ok(reply)
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct DomeState {
    slew_cycles: u32,
    slewing_remaining: u32,
    targets: Vec<f64>,
    status_polls: usize,
    failing: bool,
}

/// Connected dome slewing for a number of status polls
pub(crate) struct FakeDome {
    state: Mutex<DomeState>,
}

impl FakeDome {
    pub(crate) fn new(slew_cycles: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DomeState {
                slew_cycles,
                ..Default::default()
            }),
        })
    }

    /// Dome whose slew and status calls fail
    pub(crate) fn failing() -> Arc<Self> {
        let dome = Self::new(0);
        dome.state.lock().unwrap().failing = true;
        dome
    }

    pub(crate) fn targets(&self) -> Vec<f64> {
        self.state.lock().unwrap().targets.clone()
    }

    pub(crate) fn status_polls(&self) -> usize {
        self.state.lock().unwrap().status_polls
    }

    pub(crate) fn still_slewing(&self) -> bool {
        self.state.lock().unwrap().slewing_remaining > 0
    }
}

#[async_trait]
impl Dome for FakeDome {
    fn is_connected(&self) -> bool {
        true
    }

    async fn slew_to_azimuth(&self, azimuth: f64) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.targets.push(azimuth);
        if state.failing {
            return Err("dome not responding".to_string());
        }
        state.slewing_remaining = state.slew_cycles;
        Ok(())
    }

    async fn is_slewing(&self) -> BackendResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.status_polls += 1;
        if state.failing {
            return Err("dome not responding".to_string());
        }
        if state.slewing_remaining > 0 {
            state.slewing_remaining -= 1;
            return Ok(true);
        }
        Ok(false)
    }
}

#[derive(Default)]
struct BackendState {
    capture_calls: usize,
    captures: usize,
    solves: usize,
    fail_capture_at: Option<usize>,
    cancel_after: Option<(usize, Arc<AtomicBool>)>,
}

/// Backend solving every image 0.001h east and 0.0005° south of the hint
pub(crate) struct ScriptedBackend {
    state: Mutex<BackendState>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState::default()),
        })
    }

    /// Fail the capture with this call number (0 based)
    pub(crate) fn fail_capture_at(&self, call: usize) {
        self.state.lock().unwrap().fail_capture_at = Some(call);
    }

    /// Raise `flag` once `solves` images were solved
    pub(crate) fn cancel_after(&self, solves: usize, flag: Arc<AtomicBool>) {
        self.state.lock().unwrap().cancel_after = Some((solves, flag));
    }

    /// Successful captures
    pub(crate) fn captures(&self) -> usize {
        self.state.lock().unwrap().captures
    }
}

#[async_trait]
impl ImagingBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn camera_props(&self) -> BackendResult<CameraProps> {
        Ok(CameraProps {
            sensor_width: 1600,
            sensor_height: 1200,
            can_subframe: true,
            gain: None,
        })
    }

    async fn capture_image(&self, request: &CaptureRequest) -> BackendResult<CaptureResult> {
        {
            let mut state = self.state.lock().unwrap();
            let call = state.capture_calls;
            state.capture_calls += 1;
            if state.fail_capture_at == Some(call) {
                return Err("camera timeout".to_string());
            }
            state.captures += 1;
        }

        let path = request.image_path();
        std::fs::write(&path, b"image").map_err(|e| e.to_string())?;
        Ok(CaptureResult {
            image_path: path,
            scale_hint: None,
        })
    }

    async fn solve_image(&self, request: &SolveRequest) -> BackendResult<SolveResult> {
        let mut state = self.state.lock().unwrap();
        state.solves += 1;
        if let Some((after, flag)) = &state.cancel_after {
            if state.solves >= *after {
                flag.store(true, Ordering::SeqCst);
            }
        }
        Ok(SolveResult {
            ra_j2000: request.ra_j2000_hint + 0.001,
            dec_j2000: request.dec_j2000_hint - 0.0005,
            scale: 1.3,
            angle: 90.0,
            duration_secs: 2.5,
        })
    }
}
