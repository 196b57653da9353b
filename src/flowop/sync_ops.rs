//! Synchronization flowops: block/wakeup and semblock/sempost
//!
//! Both pairs are built around a small shared primitive the builder wires up
//! by name at construction time: a [`Gate`] for block/wakeup (a condvar that
//! wakeup broadcasts, exactly as in the reference implementation — a
//! `wakeup` with nobody yet blocked is a lost signal, matching the
//! reference's own contract rather than "fixing" it into a counting
//! mechanism), and a [`Semaphore`] for semblock/sempost.

use super::{Flowop, FlowopOutcome};
use crate::error::FlowError;
use crate::stats::{FlowStats, FlowopClass};
use crate::threadflow::Threadflow;
use std::sync::{Arc, Condvar, Mutex};

/// Shared wake primitive for a `block`/`wakeup` pairing identified by name.
pub struct Gate {
    pub name: String,
    signaled: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into(), signaled: Mutex::new(false), cv: Condvar::new() })
    }

    fn block(&self) {
        let mut guard = self.signaled.lock().unwrap_or_else(|p| p.into_inner());
        while !*guard {
            guard = self.cv.wait(guard).unwrap_or_else(|p| p.into_inner());
        }
        *guard = false;
    }

    fn wake(&self) {
        let mut guard = self.signaled.lock().unwrap_or_else(|p| p.into_inner());
        *guard = true;
        self.cv.notify_all();
    }
}

pub struct BlockOp {
    pub gate: Arc<Gate>,
    pub stats: FlowStats,
}

impl Flowop for BlockOp {
    fn name(&self) -> &str {
        "block"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Sync, || {
            self.gate.block();
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Sync
    }
}

pub struct WakeupOp {
    pub targets: Vec<Arc<Gate>>,
    pub stats: FlowStats,
}

impl Flowop for WakeupOp {
    fn name(&self) -> &str {
        "wakeup"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Sync, || {
            for gate in &self.targets {
                gate.wake();
            }
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Sync
    }
}

/// Shared counting semaphore for a `semblock`/`sempost` pairing.
pub struct Semaphore {
    pub name: String,
    count: Mutex<i64>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(name: impl Into<String>, initial: i64) -> Arc<Self> {
        Arc::new(Self { name: name.into(), count: Mutex::new(initial), cv: Condvar::new() })
    }

    fn take(&self, value: i64) {
        let mut guard = self.count.lock().unwrap_or_else(|p| p.into_inner());
        while *guard < value {
            guard = self.cv.wait(guard).unwrap_or_else(|p| p.into_inner());
        }
        *guard -= value;
    }

    fn give(&self, value: i64) {
        let mut guard = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *guard += value;
        self.cv.notify_all();
    }
}

pub struct SemBlockOp {
    pub sem: Arc<Semaphore>,
    pub value: i64,
    pub stats: FlowStats,
}

impl Flowop for SemBlockOp {
    fn name(&self) -> &str {
        "semblock"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Sync, || {
            self.sem.take(self.value.max(1));
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Sync
    }
}

pub struct SemPostOp {
    pub targets: Vec<Arc<Semaphore>>,
    pub value: i64,
    pub stats: FlowStats,
}

impl Flowop for SemPostOp {
    fn name(&self) -> &str {
        "sempost"
    }
    fn run(&self, _tf: &mut Threadflow) -> Result<FlowopOutcome, FlowError> {
        super::timed(&self.stats, FlowopClass::Sync, || {
            for sem in &self.targets {
                sem.give(self.value.max(1));
            }
            Ok((FlowopOutcome::Ok, None, 0))
        })
    }
    fn stats(&self) -> &FlowStats {
        &self.stats
    }
    fn class(&self) -> FlowopClass {
        FlowopClass::Sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn block_wakeup_pairing_unblocks_exactly_once() {
        let gate = Gate::new("a");
        let waiter_gate = gate.clone();
        let handle = std::thread::spawn(move || {
            waiter_gate.block();
        });
        std::thread::sleep(Duration::from_millis(20));
        gate.wake();
        handle.join().unwrap();
    }

    #[test]
    fn semaphore_producer_consumer_reaches_target_count() {
        let sem = Semaphore::new("s", 0);
        let consumer_sem = sem.clone();
        let handle = std::thread::spawn(move || {
            for _ in 0..100 {
                consumer_sem.take(1);
            }
        });
        for _ in 0..100 {
            sem.give(1);
        }
        handle.join().unwrap();
    }
}
