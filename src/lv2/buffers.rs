//! Port buffer arena, one slot per absolute port index.

use std::ffi::c_void;

use super::atom::AtomSequence;
use super::{PortDeclaration, PortType};

pub enum PortBuffer {
    /// Control port value.
    Value(Box<f32>),
    /// Audio or CV samples, at least one block long.
    Samples(Vec<f32>),
    /// Atom sequence (atom and MIDI ports).
    Sequence(AtomSequence),
    /// Zeroed storage for ports the host does not drive (event, unknown,
    /// or gaps in the index range).
    Opaque(Vec<u64>),
}

impl PortBuffer {
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            PortBuffer::Value(v) => &mut **v as *mut f32 as *mut c_void,
            PortBuffer::Samples(s) => s.as_mut_ptr() as *mut c_void,
            PortBuffer::Sequence(seq) => seq.as_mut_ptr(),
            PortBuffer::Opaque(words) => words.as_mut_ptr() as *mut c_void,
        }
    }
}

pub struct PortBuffers {
    slots: Vec<PortBuffer>,
}

impl PortBuffers {
    pub fn new(
        declarations: &[PortDeclaration],
        span: usize,
        block_size: usize,
        atom_capacity: usize,
    ) -> Self {
        let mut slots: Vec<PortBuffer> = (0..span).map(|_| opaque(atom_capacity)).collect();
        for decl in declarations {
            let Some(slot) = slots.get_mut(decl.index as usize) else {
                continue;
            };
            *slot = match decl.port_type {
                PortType::Control => PortBuffer::Value(Box::new(decl.initial_value())),
                PortType::Audio | PortType::Cv => PortBuffer::Samples(vec![0.0; block_size.max(1)]),
                PortType::Atom | PortType::Midi => {
                    PortBuffer::Sequence(AtomSequence::new(atom_capacity))
                }
                PortType::Event | PortType::Unknown => opaque(atom_capacity),
            };
        }
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut PortBuffer> {
        self.slots.get_mut(index as usize)
    }

    pub fn control(&self, index: u32) -> Option<f32> {
        match self.slots.get(index as usize)? {
            PortBuffer::Value(v) => Some(**v),
            _ => None,
        }
    }

    pub fn set_control(&mut self, index: u32, value: f32) -> bool {
        match self.slots.get_mut(index as usize) {
            Some(PortBuffer::Value(v)) => {
                **v = value;
                true
            }
            _ => false,
        }
    }

    pub fn sequence_mut(&mut self, index: u32) -> Option<&mut AtomSequence> {
        match self.slots.get_mut(index as usize)? {
            PortBuffer::Sequence(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn sequence(&self, index: u32) -> Option<&AtomSequence> {
        match self.slots.get(index as usize)? {
            PortBuffer::Sequence(seq) => Some(seq),
            _ => None,
        }
    }

    /// Resize every sample buffer to `block_size`. Only reallocates when the
    /// size actually changes.
    pub fn resize_samples(&mut self, block_size: usize) {
        let block_size = block_size.max(1);
        for slot in &mut self.slots {
            if let PortBuffer::Samples(samples) = slot
                && samples.len() != block_size
            {
                samples.resize(block_size, 0.0);
                samples.shrink_to_fit();
            }
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut PortBuffer)> {
        self.slots
            .iter_mut()
            .enumerate()
            .map(|(i, slot)| (i as u32, slot))
    }
}

fn opaque(bytes: usize) -> PortBuffer {
    PortBuffer::Opaque(vec![0; bytes.div_ceil(8).max(2)])
}
