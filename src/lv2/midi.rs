//! Host-side MIDI event collection passed into and out of `process()`.

/// Fixed-capacity, frame-ordered MIDI event list.
///
/// Storage is allocated up front; adding events never allocates. Events
/// that do not fit are dropped and counted.
#[derive(Debug, Clone)]
pub struct MidiBuffer {
    data: Vec<u8>,
    events: Vec<Slot>,
    max_events: usize,
    max_bytes: usize,
    dropped: u64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    frame: u32,
    offset: u32,
    len: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent<'a> {
    pub frame: u32,
    pub data: &'a [u8],
}

impl MidiBuffer {
    pub fn new(max_events: usize) -> Self {
        Self::with_capacity(max_events, max_events * 8)
    }

    pub fn with_capacity(max_events: usize, max_bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(max_bytes),
            events: Vec::with_capacity(max_events),
            max_events,
            max_bytes,
            dropped: 0,
        }
    }

    /// Insert an event after any already queued for the same or an earlier
    /// frame.
    pub fn add_event(&mut self, frame: u32, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return false;
        }
        if self.events.len() >= self.max_events || self.data.len() + bytes.len() > self.max_bytes
        {
            self.dropped += 1;
            return false;
        }
        let slot = Slot {
            frame,
            offset: self.data.len() as u32,
            len: bytes.len() as u32,
        };
        self.data.extend_from_slice(bytes);
        let pos = self.events.partition_point(|e| e.frame <= frame);
        self.events.insert(pos, slot);
        true
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events rejected for lack of space since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = MidiEvent<'_>> + '_ {
        self.events.iter().map(|slot| {
            let start = slot.offset as usize;
            MidiEvent {
                frame: slot.frame,
                data: &self.data[start..start + slot.len as usize],
            }
        })
    }
}
