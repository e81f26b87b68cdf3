//! The instance bridge: one loaded plugin driven by a host.
//!
//! A [`PluginInstance`] is owned by whoever runs audio and moves through
//! `Created -> Instantiated -> Activated <-> Suspended -> Released`. The
//! host side keeps an [`InstanceHandle`] for everything that must not touch
//! the audio thread: parameters, port writes, notifications and state.
//!
//! Traffic between the two goes through fixed-size rings. Nothing in
//! [`PluginInstance::process`] allocates, blocks or logs; anything it
//! cannot deliver is dropped and counted in [`ProcessStats`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use lv2_raw::core::LV2Feature;
use parking_lot::{Mutex, RwLock};
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::{HeapCons, HeapProd};

use super::buffers::{PortBuffer, PortBuffers};
use super::midi::MidiBuffer;
use super::module::Module;
use super::parameter::{Parameter, Parameters};
use super::port_event::{
    ControlSlots, PROTOCOL_FLOAT, PortEvent, PortObserver, PortWriter, float_from_bytes,
    port_event_queue,
};
use super::state::{PluginState, SavedParameter};
use super::stats::{ProcessStats, StatsSnapshot};
use super::urid::{SymbolMap, UridFeatures, Uris};
use super::worker::{WorkThread, Worker, WorkerSetup};
use super::{ChannelConfig, PluginInfo, PortList, PortType};
use crate::config::HostConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Created,
    Instantiated,
    Activated,
    Suspended,
    Released,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Created => "created",
            InstanceState::Instantiated => "instantiated",
            InstanceState::Activated => "activated",
            InstanceState::Suspended => "suspended",
            InstanceState::Released => "released",
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Host side
// ---------------------------------------------------------------------------

struct InstanceShared {
    uri: String,
    writer: Arc<PortWriter>,
    notifications: Mutex<HeapCons<PortEvent>>,
    parameters: RwLock<Arc<Parameters>>,
    observer: RwLock<Option<Arc<dyn PortObserver>>>,
    /// Notifications are fed back into the parameters (no native editor).
    forward_to_parameters: AtomicBool,
    alive: AtomicBool,
    resend_controls: AtomicBool,
    sample_rate_bits: AtomicU64,
    reported_drops: AtomicU64,
    stats: ProcessStats,
}

/// Host-thread view of an instance. Cheap to clone.
#[derive(Clone)]
pub struct InstanceHandle {
    shared: Arc<InstanceShared>,
}

impl InstanceHandle {
    pub fn uri(&self) -> &str {
        &self.shared.uri
    }

    pub fn parameters(&self) -> Arc<Parameters> {
        self.shared.parameters.read().clone()
    }

    pub fn parameter(&self, port: u32) -> Option<Arc<Parameter>> {
        self.shared.parameters.read().for_port(port).cloned()
    }

    pub fn parameter_by_symbol(&self, symbol: &str) -> Option<Arc<Parameter>> {
        self.shared.parameters.read().by_symbol(symbol).cloned()
    }

    /// Queue a write to a plugin port. Protocol 0 carries one `f32` for a
    /// control input; the `atom:eventTransfer` URID carries a complete atom
    /// for an atom input.
    pub fn write(&self, port: u32, protocol: u32, data: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::InvalidState(InstanceState::Released.as_str()));
        }
        self.shared.writer.write(port, protocol, data)
    }

    /// A value reported for `port`. Only protocol 0 with a 4-byte payload
    /// is understood; it updates the port's parameter without writing
    /// anything back. Returns true if a parameter changed.
    pub fn port_event(&self, port: u32, size: u32, protocol: u32, data: &[u8]) -> bool {
        if protocol != PROTOCOL_FLOAT || size != 4 {
            return false;
        }
        let Some(value) = data.get(..4).and_then(float_from_bytes) else {
            return false;
        };
        match self.parameter(port) {
            Some(param) => param.update(value, true),
            None => false,
        }
    }

    /// Drain the notifications emitted by the audio thread. Each one goes
    /// to the parameters (when forwarding is on) and then to the observer.
    /// Returns how many were handled.
    pub fn dispatch_port_events(&self) -> usize {
        let observer = self.shared.observer.read().clone();
        let forward = self.shared.forward_to_parameters.load(Ordering::Acquire);
        let mut handled = 0;
        loop {
            let Some(event) = self.shared.notifications.lock().try_pop() else {
                break;
            };
            if forward {
                self.port_event(event.port, event.size(), event.protocol, event.data());
            }
            if let Some(observer) = &observer {
                observer.port_event(event.port, event.protocol, event.data());
            }
            handled += 1;
        }
        self.report_drops();
        handled
    }

    fn report_drops(&self) {
        let snap = self.stats();
        let drops = snap.dropped_notifications
            + snap.dropped_midi_events
            + snap.dropped_work_requests
            + snap.dropped_work_responses;
        let before = self.shared.reported_drops.swap(drops, Ordering::Relaxed);
        if drops > before {
            log::warn!(
                "{}: {} real-time events dropped since last dispatch",
                self.shared.uri,
                drops - before
            );
        }
    }

    pub fn set_observer(&self, observer: Option<Arc<dyn PortObserver>>) {
        *self.shared.observer.write() = observer;
    }

    pub fn forwards_to_parameters(&self) -> bool {
        self.shared.forward_to_parameters.load(Ordering::Acquire)
    }

    /// Ask the audio thread to report every control port value after the
    /// next block.
    pub fn request_port_values(&self) {
        self.shared.resend_controls.store(true, Ordering::Release);
    }

    pub fn get_state(&self) -> Result<Vec<u8>> {
        let mut state = PluginState::new(&self.shared.uri);
        state.values = self
            .parameters()
            .iter()
            .map(|p| SavedParameter {
                port_index: p.port(),
                symbol: p.symbol().to_string(),
                value: p.plain_value(),
            })
            .collect();
        state.to_bytes()
    }

    /// Restore values saved by [`get_state`](Self::get_state). Values are
    /// matched by symbol, then by port index, and written through the
    /// normal parameter path.
    pub fn set_state(&self, bytes: &[u8]) -> Result<()> {
        let state = PluginState::from_bytes(bytes)?;
        if state.uri != self.shared.uri {
            return Err(Error::State(format!(
                "state belongs to {}, not {}",
                state.uri, self.shared.uri
            )));
        }
        let params = self.parameters();
        for saved in &state.values {
            let param = params
                .by_symbol(&saved.symbol)
                .or_else(|| params.for_port(saved.port_index));
            match param {
                Some(param) => param.set_plain_value(saved.value)?,
                None => log::debug!("{}: no port for saved value '{}'", state.uri, saved.symbol),
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> StatsSnapshot {
        let rate = f64::from_bits(self.shared.sample_rate_bits.load(Ordering::Relaxed));
        let mut snap = self.shared.stats.snapshot(rate);
        snap.dropped_writes = self.shared.writer.dropped();
        snap
    }

    /// False once the instance has been released.
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Audio side
// ---------------------------------------------------------------------------

pub struct PluginInstance {
    module: Box<dyn Module>,
    urid: UridFeatures,
    uris: Uris,
    work_thread: Option<WorkThread>,
    worker: Option<Worker>,
    /// Schedule feature handed to a plugin that never exposed its worker
    /// interface. Kept so the plugin's pointer stays valid.
    unbound_worker: Option<WorkerSetup>,
    worker_queue_size: usize,
    atom_buffer_size: usize,
    state: InstanceState,
    ports: PortList,
    channels: ChannelConfig,
    buffers: PortBuffers,
    shared: Arc<InstanceShared>,
    port_writes: HeapCons<PortEvent>,
    controls: Arc<ControlSlots>,
    notifier: HeapProd<PortEvent>,
    /// Next entry to re-report while a control value resend is under way.
    resend_cursor: Option<usize>,
    midi_port: Option<u32>,
    notify_port: Option<u32>,
    /// (port, is_input) for every atom sequence port.
    sequence_ports: Vec<(u32, bool)>,
    control_inputs: Vec<u32>,
    /// (port, last reported value)
    control_outputs: Vec<(u32, f32)>,
    sample_rate: f64,
    block_size: usize,
}

impl PluginInstance {
    pub fn new(
        module: Box<dyn Module>,
        symbols: Arc<SymbolMap>,
        work_thread: Option<WorkThread>,
        config: &HostConfig,
    ) -> Self {
        // room for one change per control port on top of the usual traffic
        let control_ports = module
            .ports()
            .iter()
            .filter(|p| p.port_type == PortType::Control)
            .count();
        let (write_tx, write_rx) = port_event_queue(config.port_event_queue_size);
        let (notify_tx, notify_rx) =
            port_event_queue(config.port_event_queue_size + control_ports);
        let shared = Arc::new(InstanceShared {
            uri: module.uri().to_string(),
            writer: Arc::new(PortWriter::new(write_tx)),
            notifications: Mutex::new(notify_rx),
            parameters: RwLock::new(Arc::new(Parameters::default())),
            observer: RwLock::new(None),
            forward_to_parameters: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            resend_controls: AtomicBool::new(false),
            sample_rate_bits: AtomicU64::new(config.sample_rate.to_bits()),
            reported_drops: AtomicU64::new(0),
            stats: ProcessStats::new(),
        });

        Self {
            module,
            uris: Uris::new(&symbols),
            urid: UridFeatures::new(symbols),
            work_thread,
            worker: None,
            unbound_worker: None,
            worker_queue_size: config.worker_queue_size,
            atom_buffer_size: config.atom_buffer_size,
            state: InstanceState::Created,
            ports: PortList::new(),
            channels: ChannelConfig::new(),
            buffers: PortBuffers::new(&[], 0, 1, config.atom_buffer_size),
            shared,
            port_writes: write_rx,
            controls: Arc::new(ControlSlots::default()),
            notifier: notify_tx,
            resend_cursor: None,
            midi_port: None,
            notify_port: None,
            sequence_ports: Vec::new(),
            control_inputs: Vec::new(),
            control_outputs: Vec::new(),
            sample_rate: config.sample_rate,
            block_size: config.block_size.max(1),
        }
    }

    pub fn handle(&self) -> InstanceHandle {
        InstanceHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn module(&self) -> &dyn Module {
        &*self.module
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn uri(&self) -> &str {
        self.module.uri()
    }

    pub fn info(&self) -> PluginInfo {
        self.module.info()
    }

    pub fn ports(&self) -> &PortList {
        &self.ports
    }

    pub fn channels(&self) -> &ChannelConfig {
        &self.channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    pub fn num_audio_inputs(&self) -> u32 {
        self.channels.num_audio_inputs()
    }

    pub fn num_audio_outputs(&self) -> u32 {
        self.channels.num_audio_outputs()
    }

    pub fn accepts_midi(&self) -> bool {
        self.midi_port.is_some()
    }

    pub fn produces_midi(&self) -> bool {
        self.notify_port.is_some()
    }

    pub fn input_channel_name(&self, channel: u32) -> String {
        self.channel_name(channel, true)
            .unwrap_or_else(|| format!("Audio In {}", channel + 1))
    }

    pub fn output_channel_name(&self, channel: u32) -> String {
        self.channel_name(channel, false)
            .unwrap_or_else(|| format!("Audio Out {}", channel + 1))
    }

    fn channel_name(&self, channel: u32, is_input: bool) -> Option<String> {
        let port = self.channels.audio_port(channel, is_input)?;
        self.ports.get(port).map(|p| p.name.clone())
    }

    /// Load the plugin at `sample_rate` and lay out its ports.
    pub fn instantiate(&mut self, sample_rate: f64) -> Result<()> {
        match self.state {
            InstanceState::Created => {}
            InstanceState::Released => return Err(Error::InvalidState("released")),
            _ => return Err(Error::InvalidState("already instantiated")),
        }

        let ports = PortList::from_declarations(self.module.ports())?;
        self.create_instance(sample_rate)?;
        self.ports = ports;
        self.build_layout();
        self.state = InstanceState::Instantiated;

        log::info!(
            "Instantiated {} at {} Hz ({} ports, {} parameters)",
            self.module.uri(),
            sample_rate,
            self.ports.len(),
            self.control_inputs.len()
        );
        Ok(())
    }

    fn create_instance(&mut self, sample_rate: f64) -> Result<()> {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }

        let setup = match &self.work_thread {
            Some(thread) if self.module.wants_worker() => {
                Some(WorkerSetup::new(thread, self.worker_queue_size))
            }
            _ => None,
        };
        let worker_feature = setup.as_ref().map(WorkerSetup::make_feature);

        let mut features: Vec<&LV2Feature> =
            vec![self.urid.map_feature(), self.urid.unmap_feature()];
        if let Some(feature) = &worker_feature {
            features.push(feature);
        }

        // SAFETY: the URID features live in `self.urid` and the schedule
        // feature moves into `self.worker` (or `unbound_worker`), both of
        // which outlive the plugin instance.
        unsafe { self.module.instantiate(sample_rate, &features)? };

        if let Some(setup) = setup {
            match self.module.worker_interface() {
                Some(iface) => {
                    // SAFETY: the worker is shut down before the module is
                    // freed or re-instantiated.
                    let worker = unsafe { setup.activate(self.module.handle(), iface.as_ptr()) };
                    self.worker = Some(worker);
                    self.unbound_worker = None;
                }
                None => {
                    log::warn!(
                        "{} declares the worker extension but has no worker interface",
                        self.module.uri()
                    );
                    self.unbound_worker = Some(setup);
                }
            }
        }

        self.sample_rate = sample_rate;
        self.shared
            .sample_rate_bits
            .store(sample_rate.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn build_layout(&mut self) {
        let decls = self.module.ports().to_vec();

        self.channels = self.ports.channel_config();
        self.buffers = PortBuffers::new(
            &decls,
            self.ports.index_span(),
            self.block_size,
            self.atom_buffer_size,
        );

        let params: Vec<Arc<Parameter>> = decls
            .iter()
            .filter(|d| d.port_type == PortType::Control && d.is_input)
            .map(|d| Arc::new(Parameter::new(d, self.shared.writer.clone())))
            .collect();
        *self.shared.parameters.write() = Arc::new(Parameters::new(params));
        self.shared
            .forward_to_parameters
            .store(!self.module.has_editor(), Ordering::Release);

        self.midi_port = decls.iter().find(|d| d.is_input && d.is_midi()).map(|d| d.index);
        self.notify_port = decls.iter().find(|d| !d.is_input && d.is_midi()).map(|d| d.index);
        self.sequence_ports = decls
            .iter()
            .filter(|d| matches!(d.port_type, PortType::Atom | PortType::Midi))
            .map(|d| (d.index, d.is_input))
            .collect();
        self.control_inputs = decls
            .iter()
            .filter(|d| d.port_type == PortType::Control && d.is_input)
            .map(|d| d.index)
            .collect();
        self.controls = Arc::new(ControlSlots::new(&self.control_inputs));
        self.shared.writer.set_controls(self.controls.clone());
        self.control_outputs = decls
            .iter()
            .filter(|d| d.port_type == PortType::Control && !d.is_input)
            .map(|d| (d.index, f32::NAN))
            .collect();
    }

    /// Get ready to process blocks of up to `block_size` frames. A new
    /// sample rate re-instantiates the plugin; control values are kept.
    pub fn prepare(&mut self, sample_rate: f64, block_size: usize) -> Result<()> {
        match self.state {
            InstanceState::Created => return Err(Error::NotInstantiated),
            InstanceState::Released => return Err(Error::InvalidState("released")),
            _ => {}
        }

        if sample_rate != self.sample_rate {
            if self.module.is_active() {
                self.module.deactivate();
            }
            if let Err(e) = self.create_instance(sample_rate) {
                self.state = InstanceState::Created;
                return Err(e);
            }
            log::info!("Re-instantiated {} at {} Hz", self.module.uri(), sample_rate);
        }

        self.channels = self.ports.channel_config();
        self.block_size = block_size.max(1);
        self.buffers.resize_samples(self.block_size);

        if !self.module.is_active() {
            self.connect_own_buffers();
            self.module.activate();
        }
        self.state = InstanceState::Activated;
        Ok(())
    }

    /// Deactivate without releasing; `resume` picks up where it left off.
    pub fn suspend(&mut self) -> Result<()> {
        if self.state != InstanceState::Activated {
            return Err(Error::InvalidState(self.state.as_str()));
        }
        self.module.deactivate();
        self.state = InstanceState::Suspended;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state != InstanceState::Suspended {
            return Err(Error::InvalidState(self.state.as_str()));
        }
        self.connect_own_buffers();
        self.module.activate();
        self.state = InstanceState::Activated;
        Ok(())
    }

    /// Run one block in place.
    ///
    /// Host channel `c` feeds audio input `c` and receives audio output
    /// `c`. Channels the host does not provide read silence and write to
    /// scratch. `midi` carries events into the plugin and, on return, the
    /// MIDI the plugin produced.
    pub fn process(&mut self, audio: &mut [&mut [f32]], midi: &mut MidiBuffer, num_samples: usize) {
        if self.state != InstanceState::Activated {
            self.silence_outputs(audio, num_samples);
            midi.clear();
            self.shared.stats.silenced();
            return;
        }
        if num_samples > self.block_size || !self.channels_fit(audio, num_samples) {
            self.silence_outputs(audio, num_samples);
            midi.clear();
            self.shared.stats.rejected();
            return;
        }

        let started = Instant::now();

        self.reset_sequences();
        self.apply_port_writes();
        self.write_midi(midi, num_samples);
        self.connect_audio(audio, num_samples);

        if let Some(worker) = &mut self.worker {
            worker.deliver_responses();
        }
        // SAFETY: every port is connected to a buffer of at least
        // `num_samples` frames or its type's fixed size.
        unsafe { self.module.run(num_samples as u32) };
        if let Some(worker) = &self.worker {
            worker.end_run();
            self.shared
                .stats
                .set_worker_drops(worker.dropped_requests(), worker.dropped_responses());
        }

        self.emit_notifications();
        self.read_midi(midi);

        self.shared
            .stats
            .record(started.elapsed().as_nanos() as u64, num_samples);
    }

    fn silence_outputs(&self, audio: &mut [&mut [f32]], num_samples: usize) {
        let declared = self
            .module
            .ports()
            .iter()
            .filter(|p| p.port_type == PortType::Audio && !p.is_input)
            .count();
        for channel in audio.iter_mut().take(declared) {
            let n = num_samples.min(channel.len());
            channel[..n].fill(0.0);
        }
    }

    fn channels_fit(&self, audio: &[&mut [f32]], num_samples: usize) -> bool {
        let used = self
            .channels
            .num_audio_inputs()
            .max(self.channels.num_audio_outputs()) as usize;
        audio.iter().take(used).all(|c| c.len() >= num_samples)
    }

    fn connect_own_buffers(&mut self) {
        for (index, buffer) in self.buffers.iter_mut() {
            // SAFETY: the arena outlives the instance and never reallocates
            // between connect and run.
            unsafe { self.module.connect_port(index, buffer.as_mut_ptr()) };
        }
    }

    fn connect_audio(&mut self, audio: &mut [&mut [f32]], num_samples: usize) {
        self.connect_own_buffers();

        for channel in 0..self.channels.num_audio_inputs() {
            let Some(port) = self.channels.audio_port(channel, true) else {
                continue;
            };
            match audio.get_mut(channel as usize) {
                Some(host) => unsafe {
                    self.module.connect_port(port, host.as_mut_ptr().cast());
                },
                None => {
                    if let Some(PortBuffer::Samples(samples)) = self.buffers.get_mut(port) {
                        let n = num_samples.min(samples.len());
                        samples[..n].fill(0.0);
                    }
                }
            }
        }
        for channel in 0..self.channels.num_audio_outputs() {
            let Some(port) = self.channels.audio_port(channel, false) else {
                continue;
            };
            if let Some(host) = audio.get_mut(channel as usize) {
                unsafe { self.module.connect_port(port, host.as_mut_ptr().cast()) };
            }
        }
    }

    fn reset_sequences(&mut self) {
        for &(port, is_input) in &self.sequence_ports {
            if let Some(seq) = self.buffers.sequence_mut(port) {
                if is_input {
                    seq.reset_input(self.uris.atom_sequence);
                } else {
                    seq.reset_output(self.uris.atom_chunk);
                }
            }
        }
    }

    fn apply_port_writes(&mut self) {
        for i in 0..self.controls.len() {
            if let Some((port, value)) = self.controls.take(i) {
                self.apply_control(port, value);
            }
        }

        while let Some(event) = self.port_writes.try_pop() {
            let port = event.port;
            let Some((port_type, is_input)) =
                self.ports.get(port).map(|p| (p.port_type, p.is_input))
            else {
                self.shared.stats.ignored_write();
                continue;
            };

            match port_type {
                PortType::Control if is_input && event.protocol == PROTOCOL_FLOAT => {
                    match event.as_float() {
                        Some(value) => self.apply_control(port, value),
                        None => self.shared.stats.ignored_write(),
                    }
                }
                PortType::Atom | PortType::Midi
                    if is_input && event.protocol == self.uris.atom_event_transfer =>
                {
                    if !self.append_atom(port, event.data()) {
                        self.shared.stats.ignored_write();
                    }
                }
                _ => self.shared.stats.ignored_write(),
            }
        }
    }

    fn apply_control(&mut self, port: u32, value: f32) {
        if self.buffers.control(port) != Some(value) {
            self.buffers.set_control(port, value);
            self.notify(PortEvent::float(port, value));
        }
    }

    /// Append a complete atom (header and body) as an event at frame 0.
    fn append_atom(&mut self, port: u32, atom: &[u8]) -> bool {
        let (Some(size), Some(type_urid)) = (
            atom.get(0..4).and_then(read_u32),
            atom.get(4..8).and_then(read_u32),
        ) else {
            return false;
        };
        let Some(body) = atom.get(8..8 + size as usize) else {
            return false;
        };
        match self.buffers.sequence_mut(port) {
            Some(seq) => seq.append_event(0, type_urid, body),
            None => false,
        }
    }

    /// Events timed at or past the end of the block are dropped.
    fn write_midi(&mut self, midi: &MidiBuffer, num_samples: usize) {
        let Some(port) = self.midi_port else {
            return;
        };
        let Some(seq) = self.buffers.sequence_mut(port) else {
            return;
        };
        for event in midi.iter() {
            let inside = (event.frame as usize) < num_samples;
            if !inside || !seq.append_event(event.frame as i64, self.uris.midi_event, event.data) {
                self.shared.stats.dropped_midi_event();
            }
        }
    }

    fn read_midi(&mut self, midi: &mut MidiBuffer) {
        midi.clear();
        let Some(port) = self.notify_port else {
            return;
        };
        let Some(seq) = self.buffers.sequence(port) else {
            return;
        };
        for event in seq.events(self.uris.atom_sequence) {
            if event.type_urid != self.uris.midi_event {
                continue;
            }
            if !midi.add_event(event.frames.max(0) as u32, event.data) {
                self.shared.stats.dropped_midi_event();
            }
        }
    }

    fn notify(&mut self, event: PortEvent) -> bool {
        if self.notifier.try_push(event).is_err() {
            self.shared.stats.dropped_notification();
            return false;
        }
        true
    }

    fn emit_notifications(&mut self) {
        for i in 0..self.control_outputs.len() {
            let (port, last) = self.control_outputs[i];
            let Some(value) = self.buffers.control(port) else {
                continue;
            };
            if value.to_bits() != last.to_bits() && self.notify(PortEvent::float(port, value)) {
                self.control_outputs[i].1 = value;
            }
        }

        if self.shared.resend_controls.swap(false, Ordering::AcqRel) {
            self.resend_cursor = Some(0);
        }
        if let Some(start) = self.resend_cursor {
            self.resend_cursor = self.resend_controls(start);
        }
    }

    /// Report control values from entry `start` on (inputs, then outputs)
    /// until the ring is full. Returns where to carry on next block.
    fn resend_controls(&mut self, start: usize) -> Option<usize> {
        let inputs = self.control_inputs.len();
        let total = inputs + self.control_outputs.len();
        for next in start..total {
            if self.notifier.is_full() {
                return Some(next);
            }
            let port = if next < inputs {
                self.control_inputs[next]
            } else {
                self.control_outputs[next - inputs].0
            };
            if let Some(value) = self.buffers.control(port) {
                let _ = self.notifier.try_push(PortEvent::float(port, value));
            }
        }
        None
    }

    /// Tear the plugin down. Safe to call more than once.
    pub fn release(&mut self) {
        if self.state == InstanceState::Released {
            return;
        }
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
        if self.module.is_active() {
            self.module.deactivate();
        }

        self.shared
            .forward_to_parameters
            .store(false, Ordering::Release);
        *self.shared.observer.write() = None;
        self.shared.alive.store(false, Ordering::Release);

        self.buffers.resize_samples(1);
        self.module.free();
        self.unbound_worker = None;
        self.state = InstanceState::Released;
        log::info!("Released {}", self.module.uri());
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_u32(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_ne_bytes(bytes.try_into().ok()?))
}
