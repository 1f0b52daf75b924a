//! Atomic parameter state shared between the control and audio threads.
//!
//! Each automatable parameter is a bit-stored atomic slot plus an
//! "updated" flag. Individual fields use relaxed ordering; a separate
//! `params_updated` flag with acquire/release ordering gates batch
//! reads, so a multi-field change becomes visible no later than the
//! next processed block.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Maximum scheduled sub-block changes per parameter queue.
pub const PARAM_QUEUE_LEN: usize = 64;

/// Declared type of a parameter slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    I32,
    U32,
    F32,
}

/// A parameter value, tagged by type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    I32(i32),
    U32(u32),
    F32(f32),
}

impl ParamValue {
    fn to_bits(self) -> u32 {
        match self {
            ParamValue::I32(v) => v as u32,
            ParamValue::U32(v) => v,
            ParamValue::F32(v) => v.to_bits(),
        }
    }

    fn from_bits(kind: ParamKind, bits: u32) -> Self {
        match kind {
            ParamKind::I32 => ParamValue::I32(bits as i32),
            ParamKind::U32 => ParamValue::U32(bits),
            ParamKind::F32 => ParamValue::F32(f32::from_bits(bits)),
        }
    }
}

struct ParamSlot {
    kind: ParamKind,
    bits: AtomicU32,
    updated: AtomicBool,
}

/// Atomic value slots for a fixed set of parameters.
pub struct AudioParameterList {
    slots: Vec<ParamSlot>,
    params_updated: AtomicBool,
}

impl AudioParameterList {
    /// Create a list with the given slot types and zero/default values.
    pub fn new(kinds: &[ParamKind]) -> Self {
        let slots = kinds
            .iter()
            .map(|&kind| ParamSlot {
                kind,
                bits: AtomicU32::new(0),
                updated: AtomicBool::new(false),
            })
            .collect();
        Self { slots, params_updated: AtomicBool::new(false) }
    }

    /// Number of parameter slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the list has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Set a parameter and mark it (and the batch gate) updated.
    pub fn set(&self, id: usize, value: ParamValue) {
        let slot = &self.slots[id];
        debug_assert_eq!(kind_of(value), slot.kind);
        slot.bits.store(value.to_bits(), Ordering::Relaxed);
        slot.updated.store(true, Ordering::Relaxed);
        self.params_updated.store(true, Ordering::Release);
    }

    /// Set a float parameter.
    pub fn set_f32(&self, id: usize, value: f32) {
        self.set(id, ParamValue::F32(value));
    }

    /// Read a parameter without touching its updated flag.
    pub fn get(&self, id: usize) -> ParamValue {
        let slot = &self.slots[id];
        ParamValue::from_bits(slot.kind, slot.bits.load(Ordering::Relaxed))
    }

    /// Read a float parameter.
    pub fn get_f32(&self, id: usize) -> f32 {
        match self.get(id) {
            ParamValue::F32(v) => v,
            _ => 0.0,
        }
    }

    /// Read a parameter and clear its updated flag.
    ///
    /// Returns the value (which persists across flushes) and whether
    /// the slot had been updated since the last flush.
    pub fn flush(&self, id: usize) -> (ParamValue, bool) {
        let slot = &self.slots[id];
        let updated = slot.updated.swap(false, Ordering::Relaxed);
        let value = ParamValue::from_bits(slot.kind, slot.bits.load(Ordering::Relaxed));
        (value, updated)
    }

    /// Read a float parameter and clear its updated flag.
    pub fn flush_f32(&self, id: usize) -> (f32, bool) {
        match self.flush(id) {
            (ParamValue::F32(v), updated) => (v, updated),
            (_, updated) => (0.0, updated),
        }
    }

    /// If any slot changed since the last batch, visit every updated
    /// slot with its id and value, clearing flags as it goes.
    pub fn flush_if_updated(&self, mut visit: impl FnMut(usize, ParamValue)) {
        if !self.params_updated.swap(false, Ordering::Acquire) {
            return;
        }
        for (id, slot) in self.slots.iter().enumerate() {
            if slot.updated.swap(false, Ordering::Relaxed) {
                visit(id, ParamValue::from_bits(slot.kind, slot.bits.load(Ordering::Relaxed)));
            }
        }
    }
}

fn kind_of(value: ParamValue) -> ParamKind {
    match value {
        ParamValue::I32(_) => ParamKind::I32,
        ParamValue::U32(_) => ParamKind::U32,
        ParamValue::F32(_) => ParamKind::F32,
    }
}

/// A scheduled parameter change within one block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamChange {
    /// Sample offset inside the block at which the change applies
    pub sample_offset: u32,
    /// Parameter id
    pub id: u16,
    /// New value
    pub value: ParamValue,
}

/// Sub-block automation queue, always non-decreasing in sample offset.
#[derive(Debug, Default)]
pub struct ParamQueue {
    values: heapless::Vec<ParamChange, PARAM_QUEUE_LEN>,
}

impl ParamQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a change keeping offset order. Returns false when full.
    pub fn push(&mut self, change: ParamChange) -> bool {
        let pos = self
            .values
            .iter()
            .position(|c| c.sample_offset > change.sample_offset)
            .unwrap_or(self.values.len());
        self.values.insert(pos, change).is_ok()
    }

    /// Scheduled changes in offset order.
    pub fn values(&self) -> &[ParamChange] {
        &self.values
    }

    /// Clear the queue for the next block.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Returns true if no changes are scheduled.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
