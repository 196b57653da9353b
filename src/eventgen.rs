//! Event generator: the token bucket behind every rate-limiting flowop
//!
//! A single counter `q`, filled by a background thread at `rate_hz`
//! events/second while `enabled`, drained by `eventlimit`/`bwlimit`/
//! `iopslimit`/`opslimit`. `bwlimit` converts bytes to events at one event
//! per `BYTES_PER_EVENT` (1 MiB by default), rounding up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Bytes consumed by one event in `bwlimit`'s byte-to-event conversion.
pub const BYTES_PER_EVENT: u64 = 1024 * 1024;

struct Bucket {
    q: Mutex<u64>,
    cv: Condvar,
}

/// Process-wide rate limiter shared by every thread's `eventlimit` and
/// friends. Cheap to clone (wraps `Arc` internals).
#[derive(Clone)]
pub struct EventGenerator {
    bucket: Arc<Bucket>,
    rate_hz: Arc<AtomicU64>,
    enabled: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl EventGenerator {
    pub fn new(rate_hz: u64) -> Self {
        Self {
            bucket: Arc::new(Bucket {
                q: Mutex::new(0),
                cv: Condvar::new(),
            }),
            rate_hz: Arc::new(AtomicU64::new(rate_hz)),
            enabled: Arc::new(AtomicBool::new(rate_hz > 0)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the background fill thread. Returns a handle the controller can
    /// keep to make sure the thread is torn down with the run.
    pub fn spawn_source(&self) -> EventSourceHandle {
        let bucket = self.bucket.clone();
        let rate_hz = self.rate_hz.clone();
        let enabled = self.enabled.clone();
        let generation = self.generation.clone();
        let my_generation = generation.load(Ordering::SeqCst);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = std::thread::spawn(move || loop {
            if stop_clone.load(Ordering::Relaxed) || generation.load(Ordering::SeqCst) != my_generation {
                return;
            }
            let rate = rate_hz.load(Ordering::Relaxed);
            if !enabled.load(Ordering::Relaxed) || rate == 0 {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
            // Fill in small slices for smooth pacing rather than one lump
            // per second.
            let slices_per_second = 50u64;
            let per_slice = (rate / slices_per_second).max(1);
            std::thread::sleep(Duration::from_millis(1000 / slices_per_second));
            let mut guard = bucket.q.lock().unwrap_or_else(|p| p.into_inner());
            *guard += per_slice;
            bucket.cv.notify_all();
        });
        EventSourceHandle { handle: Some(handle), stop }
    }

    /// Block until at least one event is available, then consume it.
    pub fn take_one(&self) {
        self.take(1);
    }

    /// Block until `n` events are available, then consume them atomically.
    pub fn take(&self, n: u64) {
        let mut guard = self.bucket.q.lock().unwrap_or_else(|p| p.into_inner());
        while *guard < n {
            guard = self
                .bucket
                .cv
                .wait_timeout(guard, Duration::from_millis(50))
                .unwrap_or_else(|p| p.into_inner())
                .0;
        }
        *guard -= n;
    }

    /// Convert a byte count to the number of events it costs under
    /// `bwlimit`'s 1-event-per-MiB conversion, rounding up.
    pub fn bytes_to_events(bytes: u64) -> u64 {
        bytes.div_ceil(BYTES_PER_EVENT).max(1)
    }

    /// Zero the bucket and bump the source generation so any currently
    /// running fill thread exits and a fresh one can be spawned.
    pub fn reset(&self) {
        *self.bucket.q.lock().unwrap_or_else(|p| p.into_inner()) = 0;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_rate(&self, rate_hz: u64) {
        self.rate_hz.store(rate_hz, Ordering::Relaxed);
        self.enabled.store(rate_hz > 0, Ordering::Relaxed);
    }
}

/// Owns the background fill thread; dropping it (or calling `stop`) ends the
/// thread promptly instead of leaking it past the run.
pub struct EventSourceHandle {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl EventSourceHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for EventSourceHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_events_rounds_up() {
        assert_eq!(EventGenerator::bytes_to_events(1), 1);
        assert_eq!(EventGenerator::bytes_to_events(BYTES_PER_EVENT), 1);
        assert_eq!(EventGenerator::bytes_to_events(BYTES_PER_EVENT + 1), 2);
    }

    #[test]
    fn take_blocks_until_filled_then_drains() {
        let gen = EventGenerator::new(0);
        // Manually fill the bucket without the background thread for a
        // deterministic test.
        *gen.bucket.q.lock().unwrap() = 3;
        gen.take(2);
        assert_eq!(*gen.bucket.q.lock().unwrap(), 1);
    }

    #[test]
    fn reset_zeroes_the_bucket() {
        let gen = EventGenerator::new(0);
        *gen.bucket.q.lock().unwrap() = 5;
        gen.reset();
        assert_eq!(*gen.bucket.q.lock().unwrap(), 0);
    }
}
