//! Atom sequence buffers.
//!
//! Layout (native endian, 8-byte aligned):
//!
//! ```text
//! 0   u32 atom.size   (bytes after the 8-byte atom header)
//! 4   u32 atom.type
//! 8   u32 body.unit
//! 12  u32 body.pad
//! 16  events: i64 frames, u32 size, u32 type, data, padded to 8
//! ```

use std::ffi::c_void;

const ATOM_HEADER_SIZE: usize = 8;
const SEQUENCE_HEADER_SIZE: usize = 16;
const EVENT_HEADER_SIZE: usize = 16;

fn pad8(size: usize) -> usize {
    (size + 7) & !7
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_ne_bytes());
}

/// Write an empty sequence header, as for an input port.
pub fn init_sequence(bytes: &mut [u8], sequence_urid: u32) {
    debug_assert!(bytes.len() >= SEQUENCE_HEADER_SIZE);
    write_u32(bytes, 0, 8);
    write_u32(bytes, 4, sequence_urid);
    write_u32(bytes, 8, 0);
    write_u32(bytes, 12, 0);
}

/// Mark the whole buffer as free space for the plugin to write into.
pub fn init_output(bytes: &mut [u8], chunk_urid: u32) {
    debug_assert!(bytes.len() >= SEQUENCE_HEADER_SIZE);
    write_u32(bytes, 0, (bytes.len() - ATOM_HEADER_SIZE) as u32);
    write_u32(bytes, 4, chunk_urid);
    write_u32(bytes, 8, 0);
    write_u32(bytes, 12, 0);
}

/// Append one event to a sequence. Returns false, leaving the sequence
/// as it was, when the event does not fit.
pub fn append_event(bytes: &mut [u8], frames: i64, type_urid: u32, data: &[u8]) -> bool {
    let size = read_u32(bytes, 0) as usize;
    let end = ATOM_HEADER_SIZE + size;
    let padded = pad8(EVENT_HEADER_SIZE + data.len());
    if end < SEQUENCE_HEADER_SIZE || end + padded > bytes.len() {
        return false;
    }

    bytes[end..end + 8].copy_from_slice(&frames.to_ne_bytes());
    write_u32(bytes, end + 8, data.len() as u32);
    write_u32(bytes, end + 12, type_urid);
    let body = end + EVENT_HEADER_SIZE;
    bytes[body..body + data.len()].copy_from_slice(data);
    bytes[body + data.len()..end + padded].fill(0);
    write_u32(bytes, 0, (size + padded) as u32);
    true
}

/// Events of the sequence in `bytes`; empty unless the atom type is
/// `sequence_urid`.
pub fn sequence_events(bytes: &[u8], sequence_urid: u32) -> AtomEvents<'_> {
    let mut end = SEQUENCE_HEADER_SIZE;
    if bytes.len() >= SEQUENCE_HEADER_SIZE && read_u32(bytes, 4) == sequence_urid {
        end = (ATOM_HEADER_SIZE + read_u32(bytes, 0) as usize).min(bytes.len());
    }
    AtomEvents {
        bytes,
        pos: SEQUENCE_HEADER_SIZE,
        end,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomEvent<'a> {
    pub frames: i64,
    pub type_urid: u32,
    pub data: &'a [u8],
}

pub struct AtomEvents<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Iterator for AtomEvents<'a> {
    type Item = AtomEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + EVENT_HEADER_SIZE > self.end {
            return None;
        }
        let at = self.pos;
        let mut frames = [0u8; 8];
        frames.copy_from_slice(&self.bytes[at..at + 8]);
        let size = read_u32(self.bytes, at + 8) as usize;
        let type_urid = read_u32(self.bytes, at + 12);
        let body = at + EVENT_HEADER_SIZE;
        if body + size > self.end {
            self.pos = self.end;
            return None;
        }
        self.pos = at + pad8(EVENT_HEADER_SIZE + size);
        Some(AtomEvent {
            frames: i64::from_ne_bytes(frames),
            type_urid,
            data: &self.bytes[body..body + size],
        })
    }
}

/// Borrow a sequence owned by someone else (e.g. a port buffer handed to a
/// plugin).
///
/// # Safety
/// `ptr` must point at an 8-byte aligned atom sequence whose header and
/// body (`8 + atom.size` bytes) are readable for `'a`.
pub unsafe fn sequence_from_ptr<'a>(ptr: *const u8) -> &'a [u8] {
    let header = unsafe { std::slice::from_raw_parts(ptr, ATOM_HEADER_SIZE) };
    let size = read_u32(header, 0) as usize;
    unsafe { std::slice::from_raw_parts(ptr, ATOM_HEADER_SIZE + size) }
}

/// An owned, 8-byte aligned sequence buffer of fixed capacity.
pub struct AtomSequence {
    words: Vec<u64>,
}

impl AtomSequence {
    pub fn new(capacity: usize) -> Self {
        let words = pad8(capacity.max(SEQUENCE_HEADER_SIZE)) / 8;
        Self {
            words: vec![0; words],
        }
    }

    pub fn capacity(&self) -> usize {
        self.words.len() * 8
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.capacity()) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.capacity();
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr() as *mut u8, len) }
    }

    pub fn reset_input(&mut self, sequence_urid: u32) {
        init_sequence(self.bytes_mut(), sequence_urid);
    }

    pub fn reset_output(&mut self, chunk_urid: u32) {
        init_output(self.bytes_mut(), chunk_urid);
    }

    pub fn append_event(&mut self, frames: i64, type_urid: u32, data: &[u8]) -> bool {
        append_event(self.bytes_mut(), frames, type_urid, data)
    }

    pub fn events(&self, sequence_urid: u32) -> AtomEvents<'_> {
        sequence_events(self.bytes(), sequence_urid)
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr() as *mut c_void
    }
}
