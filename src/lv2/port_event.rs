//! Port events crossing between the host and the audio thread.
//!
//! Host -> audio: [`PortWriter`] queues writes that `process()` applies to
//! the port buffers before running the plugin. Float writes to control
//! inputs land in [`ControlSlots`] instead, one coalescing slot per port,
//! so they can never overflow.
//! Audio -> host: `process()` queues value notifications that the host
//! drains and hands to parameters and any [`PortObserver`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::types::AtomicF32;
use crate::error::{Error, Result};

/// Largest payload a single port event can carry.
pub const PORT_EVENT_DATA_SIZE: usize = 256;

/// Protocol 0: the payload is one native-endian `f32`.
pub const PROTOCOL_FLOAT: u32 = 0;

#[derive(Clone, Copy)]
pub struct PortEvent {
    pub port: u32,
    pub protocol: u32,
    size: u32,
    data: [u8; PORT_EVENT_DATA_SIZE],
}

impl PortEvent {
    pub fn new(port: u32, protocol: u32, data: &[u8]) -> Option<Self> {
        if data.len() > PORT_EVENT_DATA_SIZE {
            return None;
        }
        let mut event = Self {
            port,
            protocol,
            size: data.len() as u32,
            data: [0; PORT_EVENT_DATA_SIZE],
        };
        event.data[..data.len()].copy_from_slice(data);
        Some(event)
    }

    pub fn float(port: u32, value: f32) -> Self {
        let mut data = [0; PORT_EVENT_DATA_SIZE];
        data[..4].copy_from_slice(&value.to_ne_bytes());
        Self {
            port,
            protocol: PROTOCOL_FLOAT,
            size: 4,
            data,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.size as usize]
    }

    /// The float payload, if this is a protocol 0 event.
    pub fn as_float(&self) -> Option<f32> {
        if self.protocol != PROTOCOL_FLOAT {
            return None;
        }
        float_from_bytes(self.data())
    }
}

impl std::fmt::Debug for PortEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortEvent")
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("size", &self.size)
            .finish()
    }
}

pub fn float_from_bytes(data: &[u8]) -> Option<f32> {
    let bytes: [u8; 4] = data.try_into().ok()?;
    Some(f32::from_ne_bytes(bytes))
}

/// A single-producer, single-consumer ring of port events.
pub fn port_event_queue(capacity: usize) -> (HeapProd<PortEvent>, HeapCons<PortEvent>) {
    HeapRb::<PortEvent>::new(capacity.max(1)).split()
}

/// Latest pending value for each control input, keyed by port index.
///
/// The host stores a value and raises the slot's flag; `process()` takes
/// every flagged value before the next `run()`. Repeated writes between
/// two blocks coalesce into the last one.
#[derive(Default)]
pub struct ControlSlots {
    ports: Vec<u32>,
    slots: Vec<ControlSlot>,
}

struct ControlSlot {
    value: AtomicF32,
    pending: AtomicBool,
}

impl ControlSlots {
    pub fn new(ports: &[u32]) -> Self {
        let mut ports = ports.to_vec();
        ports.sort_unstable();
        ports.dedup();
        let slots = ports
            .iter()
            .map(|_| ControlSlot {
                value: AtomicF32::new(0.0),
                pending: AtomicBool::new(false),
            })
            .collect();
        Self { ports, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, port: u32) -> bool {
        self.ports.binary_search(&port).is_ok()
    }

    /// Returns false if `port` has no slot.
    pub fn store(&self, port: u32, value: f32) -> bool {
        let Ok(i) = self.ports.binary_search(&port) else {
            return false;
        };
        let slot = &self.slots[i];
        slot.value.store(value);
        slot.pending.store(true, Ordering::Release);
        true
    }

    /// Take the pending value of slot `i`, if any. Lock-free.
    pub fn take(&self, i: usize) -> Option<(u32, f32)> {
        let slot = self.slots.get(i)?;
        if !slot.pending.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some((self.ports[i], slot.value.load()))
    }
}

/// Host-side entry point for writes to the audio thread.
///
/// The ring is single-producer; the mutex lets any host thread write.
pub struct PortWriter {
    producer: Mutex<HeapProd<PortEvent>>,
    controls: RwLock<Arc<ControlSlots>>,
    dropped: AtomicU64,
}

impl PortWriter {
    pub fn new(producer: HeapProd<PortEvent>) -> Self {
        Self {
            producer: Mutex::new(producer),
            controls: RwLock::new(Arc::new(ControlSlots::default())),
            dropped: AtomicU64::new(0),
        }
    }

    /// Route float writes for these control inputs through their slots.
    pub fn set_controls(&self, controls: Arc<ControlSlots>) {
        *self.controls.write() = controls;
    }

    pub fn write(&self, port: u32, protocol: u32, data: &[u8]) -> Result<()> {
        if protocol == PROTOCOL_FLOAT
            && let Some(value) = float_from_bytes(data)
            && self.controls.read().store(port, value)
        {
            return Ok(());
        }
        let event = PortEvent::new(port, protocol, data).ok_or(Error::EventTooLarge {
            size: data.len(),
            max: PORT_EVENT_DATA_SIZE,
        })?;
        self.push(event)
    }

    pub fn write_float(&self, port: u32, value: f32) -> Result<()> {
        if self.controls.read().store(port, value) {
            return Ok(());
        }
        self.push(PortEvent::float(port, value))
    }

    fn push(&self, event: PortEvent) -> Result<()> {
        if self.producer.lock().try_push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(Error::QueueFull);
        }
        Ok(())
    }

    /// Writes lost because the ring was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receives every notification the audio thread emits, after parameters
/// have been updated.
pub trait PortObserver: Send + Sync {
    fn port_event(&self, port: u32, protocol: u32, data: &[u8]);
}

#[cfg(test)]
mod tests {
    use ringbuf::traits::Consumer;

    use super::*;

    #[test]
    fn test_float_event() {
        let event = PortEvent::float(3, 0.5);
        assert_eq!(event.size(), 4);
        assert_eq!(event.as_float(), Some(0.5));
    }

    #[test]
    fn test_non_float_protocol_is_opaque() {
        let event = PortEvent::new(1, 7, &0.5f32.to_ne_bytes()).unwrap();
        assert_eq!(event.as_float(), None);
        assert_eq!(event.data(), &0.5f32.to_ne_bytes());
    }

    #[test]
    fn test_wrong_size_float() {
        let event = PortEvent::new(1, PROTOCOL_FLOAT, &[0, 0]).unwrap();
        assert_eq!(event.as_float(), None);
    }

    #[test]
    fn test_oversized_payload() {
        assert!(PortEvent::new(0, 1, &[0; PORT_EVENT_DATA_SIZE + 1]).is_none());
        let (tx, _rx) = port_event_queue(4);
        let writer = PortWriter::new(tx);
        let err = writer.write(0, 1, &[0; PORT_EVENT_DATA_SIZE + 1]).unwrap_err();
        assert!(matches!(err, Error::EventTooLarge { .. }));
    }

    #[test]
    fn test_writer_counts_drops() {
        let (tx, mut rx) = port_event_queue(2);
        let writer = PortWriter::new(tx);
        writer.write_float(0, 1.0).unwrap();
        writer.write_float(0, 2.0).unwrap();
        assert!(matches!(writer.write_float(0, 3.0), Err(Error::QueueFull)));
        assert_eq!(writer.dropped(), 1);

        assert_eq!(rx.try_pop().and_then(|e| e.as_float()), Some(1.0));
        assert_eq!(rx.try_pop().and_then(|e| e.as_float()), Some(2.0));
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_control_writes_coalesce_in_slots() {
        let (tx, mut rx) = port_event_queue(1);
        let writer = PortWriter::new(tx);
        let slots = Arc::new(ControlSlots::new(&[7, 3]));
        writer.set_controls(slots.clone());

        // far more writes than the ring holds
        for i in 0..500 {
            writer.write_float(3, i as f32).unwrap();
        }
        writer.write(7, PROTOCOL_FLOAT, &0.25f32.to_ne_bytes()).unwrap();
        assert!(rx.try_pop().is_none());
        assert_eq!(writer.dropped(), 0);

        assert_eq!(slots.take(0), Some((3, 499.0)));
        assert_eq!(slots.take(0), None);
        assert_eq!(slots.take(1), Some((7, 0.25)));
        assert_eq!(slots.take(2), None);

        // ports without a slot still use the ring
        writer.write_float(4, 1.0).unwrap();
        assert_eq!(rx.try_pop().map(|e| e.port), Some(4));
        assert!(!slots.contains(4));
    }
}
