//! In-process stand-in plugin for exercising the instance bridge.

use std::ffi::{CStr, c_void};
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use lv2_raw::core::LV2Feature;
use lv2_raw::urid::LV2UridMap;
use parking_lot::Mutex;

use super::atom;
use super::module::Module;
use super::urid::{LV2_ATOM_SEQUENCE, LV2_MIDI_EVENT, LV2_URID_MAP_URI};
use super::worker::{
    LV2_WORKER_SCHEDULE_URI, LV2_WORKER_SUCCESS, LV2_Worker_Interface,
    LV2_Worker_Respond_Function, LV2_Worker_Respond_Handle, LV2_Worker_Schedule,
    LV2_Worker_Status,
};
use super::{PortDeclaration, PortType};
use crate::error::{Error, Result};

pub const GAIN_URI: &str = "urn:jlv2:test:gain";

/// What the stand-in plugin saw, shared with the test.
#[derive(Default)]
pub struct Recorder {
    pub instantiated: AtomicU32,
    pub activated: AtomicU32,
    pub deactivated: AtomicU32,
    pub freed: AtomicU32,
    pub runs: AtomicU32,
    pub last_frames: AtomicU32,
    pub sample_rate_bits: AtomicU64,
    pub fail_instantiate: AtomicBool,
    pub midi_in: Mutex<Vec<(i64, Vec<u8>)>>,
    /// Non-zero: schedule this value as work during the next `run`.
    pub schedule_value: AtomicU32,
    pub schedule_status: AtomicU32,
    pub had_schedule: AtomicBool,
    pub worked: AtomicU32,
    pub work_responses: AtomicU32,
    pub last_response: AtomicU32,
    pub end_runs: AtomicU32,
}

impl Recorder {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate_bits.load(Ordering::SeqCst))
    }
}

/// Stereo-in, mono-out gain with a level meter output and a MIDI
/// through:
///
/// | index | type    | dir | symbol |
/// |-------|---------|-----|--------|
/// | 0     | Audio   | in  | in_l   |
/// | 1     | Audio   | in  | in_r   |
/// | 2     | Audio   | out | out    |
/// | 3     | Control | in  | gain   |
/// | 4     | Control | out | level  |
/// | 5     | Atom    | in  | events |
/// | 6     | Atom    | out | notify |
///
/// `out = (in_l + in_r) * gain`, `level = gain`, MIDI in is echoed to
/// `notify`. With a worker, `work` echoes each request back as the
/// response.
pub struct GainModule {
    ports: Vec<PortDeclaration>,
    rec: Arc<Recorder>,
    has_editor: bool,
    wants_worker: bool,
    worker_interface: bool,
    schedule: *const LV2_Worker_Schedule,
    /// Built from `gain_ports()`, so `run` knows what the ports hold.
    gain_layout: bool,
    connections: Vec<*mut c_void>,
    instantiated: bool,
    active: bool,
    sequence_urid: u32,
    midi_urid: u32,
}

unsafe impl Send for GainModule {}

impl GainModule {
    pub fn new(rec: Arc<Recorder>) -> Self {
        let mut module = Self::with_ports(gain_ports(), rec);
        module.gain_layout = true;
        module
    }

    pub fn with_ports(ports: Vec<PortDeclaration>, rec: Arc<Recorder>) -> Self {
        let span = ports.iter().map(|p| p.index as usize + 1).max().unwrap_or(0);
        Self {
            ports,
            rec,
            has_editor: false,
            wants_worker: false,
            worker_interface: false,
            schedule: std::ptr::null(),
            gain_layout: false,
            connections: vec![std::ptr::null_mut(); span],
            instantiated: false,
            active: false,
            sequence_urid: 0,
            midi_urid: 0,
        }
    }

    pub fn with_editor(mut self) -> Self {
        self.has_editor = true;
        self
    }

    pub fn with_worker(mut self) -> Self {
        self.wants_worker = true;
        self.worker_interface = true;
        self
    }

    /// Declares the worker extension without exposing its interface.
    pub fn with_unbound_worker(mut self) -> Self {
        self.wants_worker = true;
        self
    }

    unsafe fn schedule_pending(&self) {
        let value = self.rec.schedule_value.swap(0, Ordering::SeqCst);
        if value == 0 || self.schedule.is_null() {
            return;
        }
        let bytes = value.to_ne_bytes();
        let status = unsafe {
            let schedule = &*self.schedule;
            (schedule.schedule_work)(schedule.handle, 4, bytes.as_ptr() as *const c_void)
        };
        self.rec.schedule_status.store(status, Ordering::SeqCst);
    }
}

unsafe extern "C" fn gain_work(
    instance: *mut c_void,
    respond: LV2_Worker_Respond_Function,
    handle: LV2_Worker_Respond_Handle,
    size: u32,
    data: *const c_void,
) -> LV2_Worker_Status {
    let rec = unsafe { &*(instance as *const Recorder) };
    rec.worked.fetch_add(1, Ordering::SeqCst);
    unsafe { respond(handle, size, data) }
}

unsafe extern "C" fn gain_work_response(
    instance: *mut c_void,
    size: u32,
    body: *const c_void,
) -> LV2_Worker_Status {
    let rec = unsafe { &*(instance as *const Recorder) };
    if size == 4 {
        let bytes = unsafe { std::slice::from_raw_parts(body as *const u8, 4) };
        let value = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        rec.last_response.store(value, Ordering::SeqCst);
    }
    rec.work_responses.fetch_add(1, Ordering::SeqCst);
    LV2_WORKER_SUCCESS
}

unsafe extern "C" fn gain_end_run(instance: *mut c_void) -> LV2_Worker_Status {
    let rec = unsafe { &*(instance as *const Recorder) };
    rec.end_runs.fetch_add(1, Ordering::SeqCst);
    LV2_WORKER_SUCCESS
}

static GAIN_WORKER: LV2_Worker_Interface = LV2_Worker_Interface {
    work: gain_work,
    work_response: gain_work_response,
    end_run: Some(gain_end_run),
};

pub fn gain_ports() -> Vec<PortDeclaration> {
    vec![
        PortDeclaration::new(0, PortType::Audio, true, "in_l").with_name("Left In"),
        PortDeclaration::new(1, PortType::Audio, true, "in_r").with_name("Right In"),
        PortDeclaration::new(2, PortType::Audio, false, "out"),
        PortDeclaration::new(3, PortType::Control, true, "gain")
            .with_name("Gain")
            .with_range(0.0, 2.0, 1.0),
        PortDeclaration::new(4, PortType::Control, false, "level").with_range(0.0, 2.0, 0.0),
        PortDeclaration::new(5, PortType::Atom, true, "events").with_midi(),
        PortDeclaration::new(6, PortType::Atom, false, "notify").with_midi(),
    ]
}

impl Module for GainModule {
    fn uri(&self) -> &str {
        GAIN_URI
    }

    fn name(&self) -> &str {
        "Test Gain"
    }

    fn class_label(&self) -> &str {
        "Amplifier"
    }

    fn ports(&self) -> &[PortDeclaration] {
        &self.ports
    }

    fn has_editor(&self) -> bool {
        self.has_editor
    }

    fn wants_worker(&self) -> bool {
        self.wants_worker
    }

    fn handle(&self) -> *mut c_void {
        Arc::as_ptr(&self.rec) as *mut c_void
    }

    fn worker_interface(&self) -> Option<NonNull<LV2_Worker_Interface>> {
        if !self.worker_interface {
            return None;
        }
        NonNull::new(&GAIN_WORKER as *const LV2_Worker_Interface as *mut LV2_Worker_Interface)
    }

    unsafe fn instantiate(&mut self, sample_rate: f64, features: &[&LV2Feature]) -> Result<()> {
        if self.rec.fail_instantiate.load(Ordering::SeqCst) {
            return Err(Error::Instantiation {
                uri: GAIN_URI.to_string(),
                reason: "Could not instantiate plugin.".to_string(),
            });
        }
        let map = features
            .iter()
            .find(|f| unsafe { CStr::from_ptr(f.uri) } == LV2_URID_MAP_URI)
            .map(|f| unsafe { &*(f.data as *const LV2UridMap) })
            .ok_or_else(|| Error::Instantiation {
                uri: GAIN_URI.to_string(),
                reason: "missing urid:map".to_string(),
            })?;
        let map_uri = |uri: &str| {
            let c_uri = std::ffi::CString::new(uri).unwrap_or_default();
            #[allow(unused_unsafe)]
            unsafe {
                (map.map)(map.handle, c_uri.as_ptr())
            }
        };
        self.sequence_urid = map_uri(LV2_ATOM_SEQUENCE);
        self.midi_urid = map_uri(LV2_MIDI_EVENT);

        self.schedule = features
            .iter()
            .find(|f| unsafe { CStr::from_ptr(f.uri) } == LV2_WORKER_SCHEDULE_URI)
            .map_or(std::ptr::null(), |f| f.data as *const LV2_Worker_Schedule);
        self.rec
            .had_schedule
            .store(!self.schedule.is_null(), Ordering::SeqCst);

        self.instantiated = true;
        self.active = false;
        self.rec
            .sample_rate_bits
            .store(sample_rate.to_bits(), Ordering::SeqCst);
        self.rec.instantiated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_instantiated(&self) -> bool {
        self.instantiated
    }

    fn activate(&mut self) {
        if self.instantiated && !self.active {
            self.active = true;
            self.rec.activated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn deactivate(&mut self) {
        if self.active {
            self.active = false;
            self.rec.deactivated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    unsafe fn connect_port(&mut self, port: u32, data: *mut c_void) {
        if let Some(slot) = self.connections.get_mut(port as usize) {
            *slot = data;
        }
    }

    unsafe fn run(&mut self, frames: u32) {
        self.rec.runs.fetch_add(1, Ordering::SeqCst);
        self.rec.last_frames.store(frames, Ordering::SeqCst);
        if !self.active {
            return;
        }
        unsafe { self.schedule_pending() };
        if !self.gain_layout {
            return;
        }
        let c = &self.connections;
        unsafe {
            let in_l = c[0] as *const f32;
            let in_r = c[1] as *const f32;
            let out = c[2] as *mut f32;
            let gain = *(c[3] as *const f32);
            *(c[4] as *mut f32) = gain;
            for i in 0..frames as usize {
                let v = (*in_l.add(i) + *in_r.add(i)) * gain;
                *out.add(i) = v;
            }

            let input = atom::sequence_from_ptr(c[5] as *const u8);
            let events: Vec<(i64, Vec<u8>)> = atom::sequence_events(input, self.sequence_urid)
                .map(|e| (e.frames, e.data.to_vec()))
                .collect();

            // output capacity is whatever the host left as free space
            let capacity = atom::sequence_from_ptr(c[6] as *const u8).len();
            let output = std::slice::from_raw_parts_mut(c[6] as *mut u8, capacity);
            atom::init_sequence(output, self.sequence_urid);
            for (frames, data) in &events {
                atom::append_event(output, *frames, self.midi_urid, data);
            }
            self.rec.midi_in.lock().extend(events);
        }
    }

    fn free(&mut self) {
        if self.instantiated {
            self.deactivate();
            self.instantiated = false;
            self.connections.fill(std::ptr::null_mut());
            self.schedule = std::ptr::null();
            self.rec.freed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
