use crate::SimulationObserver;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts register traffic generated by the boot procedure.
#[derive(Debug, Default)]
pub struct AccessMetrics {
    reads: AtomicU64,
    writes: AtomicU64,
    boots: AtomicU64,
}

impl AccessMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn get_writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get_boots(&self) -> u64 {
        self.boots.load(Ordering::SeqCst)
    }
}

impl SimulationObserver for AccessMetrics {
    fn on_boot_complete(&self) {
        self.boots.fetch_add(1, Ordering::SeqCst);
    }

    fn on_register_read(&self, _addr: u32, _value: u32) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn on_register_write(&self, _addr: u32, _value: u32) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}
