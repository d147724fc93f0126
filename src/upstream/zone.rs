//! Shared arena backing peer records.
//!
//! # Responsibilities
//! - Account every allocation made for a pool against a fixed byte budget
//! - Report exhaustion as `None`, never by panicking
//! - Roll back partially built records through [`Reservation`]
//!
//! # Design Decisions
//! - Blocks are linear tokens: they are not `Clone` and must be returned
//!   with [`Zone::free`] exactly once
//! - Accounting is lock-free; a CAS loop keeps `used` under `capacity`

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::observability::metrics;

/// A byte-budgeted arena shared by every worker touching the same pools.
#[derive(Debug)]
pub struct Zone {
    name: String,
    capacity: usize,
    used: AtomicUsize,
    blocks: AtomicUsize,
}

/// A chunk of zone memory.
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    size: usize,
}

impl Block {
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Zone {
    /// Create a zone holding at most `capacity` bytes.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            used: AtomicUsize::new(0),
            blocks: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently handed out.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    /// Number of live blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.load(Ordering::Acquire)
    }

    /// Allocate `size` bytes. Returns `None` when the zone is exhausted.
    pub fn alloc(&self, size: usize) -> Option<Block> {
        let mut prev = self.used.load(Ordering::Relaxed);
        loop {
            let next = prev.checked_add(size)?;
            if next > self.capacity {
                tracing::debug!(zone = %self.name, size, used = prev, "Zone exhausted");
                return None;
            }
            match self.used.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        self.blocks.fetch_add(1, Ordering::AcqRel);
        metrics::record_zone_usage(&self.name, self.used());
        Some(Block { size })
    }

    /// Return a block to the zone.
    pub fn free(&self, block: Block) {
        self.used.fetch_sub(block.size, Ordering::AcqRel);
        self.blocks.fetch_sub(1, Ordering::AcqRel);
        metrics::record_zone_usage(&self.name, self.used());
    }
}

/// Blocks taken for one object under construction.
///
/// Dropping the reservation frees everything it holds; [`Reservation::commit`]
/// hands the blocks to their new owner instead.
#[derive(Debug)]
pub struct Reservation<'a> {
    zone: &'a Zone,
    blocks: Vec<Block>,
}

impl<'a> Reservation<'a> {
    pub fn new(zone: &'a Zone) -> Self {
        Self {
            zone,
            blocks: Vec::with_capacity(4),
        }
    }

    /// Take one more block, or `None` if the zone is exhausted.
    pub fn take(&mut self, size: usize) -> Option<()> {
        let block = self.zone.alloc(size)?;
        self.blocks.push(block);
        Some(())
    }

    pub fn commit(mut self) -> Vec<Block> {
        std::mem::take(&mut self.blocks)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        for block in self.blocks.drain(..) {
            self.zone.free(block);
        }
    }
}
