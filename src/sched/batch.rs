//! Batch process generation.
//!
//! While running, the generator records the current tick, waits until
//! `batch-process-freq` ticks have passed, then admits a fresh process named
//! `p<N>` with an instruction count drawn uniformly from
//! `[min-ins, max-ins]`. The name counter is monotonic across start/stop
//! cycles, and stopping never cancels processes already admitted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::process::{generate_program, Process};
use crate::rng::XorShift64;

use super::core::SchedCore;

/// Default RNG seed for batch workloads; reproducible runs by default.
pub const DEFAULT_BATCH_SEED: u64 = 0x853c_49e6_748f_ea9b;

/// Tick-paced generator thread with idempotent start/stop.
pub struct BatchGenerator {
    core: Arc<SchedCore>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    /// Number of processes generated so far; `p<counter+1>` is next.
    counter: Arc<AtomicU64>,
    seed: u64,
    handle: Option<JoinHandle<()>>,
}

impl BatchGenerator {
    pub fn new(core: Arc<SchedCore>, seed: u64) -> Self {
        Self {
            core,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            counter: Arc::new(AtomicU64::new(0)),
            seed,
            handle: None,
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start generating. A second start while running is a no-op.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.store(false, Ordering::Release);

        let core = Arc::clone(&self.core);
        let stop = Arc::clone(&self.stop);
        let counter = Arc::clone(&self.counter);
        // Re-seed against the counter so a restarted generator does not
        // replay the lengths it already produced.
        let seed = self.seed.wrapping_add(counter.load(Ordering::Acquire));

        let handle = std::thread::Builder::new()
            .name("batch-generator".into())
            .spawn(move || run_generator(&core, &stop, &counter, seed))
            .expect("failed to spawn batch generator");
        self.handle = Some(handle);
    }

    /// Stop generating and join the thread. A second stop is a no-op;
    /// already-admitted processes keep running.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Processes generated so far.
    pub fn generated(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

impl Drop for BatchGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_generator(core: &SchedCore, stop: &AtomicBool, counter: &AtomicU64, seed: u64) {
    let cfg = core.config().clone();
    let clock = core.clock().clone();
    let mut rng = XorShift64::new(seed);

    while !stop.load(Ordering::Acquire) {
        let mark = clock.now();
        clock.wait_until_at_least(mark + cfg.batch_process_freq, stop);
        if stop.load(Ordering::Acquire) {
            return;
        }

        let n = counter.fetch_add(1, Ordering::AcqRel) + 1;
        let name = format!("p{n}");
        let length = rng.next_inclusive(cfg.min_ins, cfg.max_ins);
        let process = Process::new(name, generate_program(length, &mut rng));
        if let Err(dup) = core.admit(process) {
            // A user-created process took the name first; skip this slot.
            eprintln!("batch: {dup}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;
    use crate::sink::NullSnapshotSink;
    use crate::tick::TickClock;
    use std::time::{Duration, Instant};

    fn test_core() -> Arc<SchedCore> {
        let cfg = EmulatorConfig {
            batch_process_freq: 2,
            min_ins: 5,
            max_ins: 10,
            ..EmulatorConfig::default()
        };
        Arc::new(SchedCore::new(
            cfg,
            TickClock::new(),
            Box::new(NullSnapshotSink),
        ))
    }

    fn wait_for(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn generates_named_processes_per_tick_budget() {
        let core = test_core();
        let mut batch = BatchGenerator::new(Arc::clone(&core), 1);
        batch.start();
        // Keep ticking while polling so the generator's wait always expires,
        // whatever the thread interleaving.
        assert!(
            wait_for(Duration::from_secs(5), || {
                core.clock().advance(1);
                core.queue_len() >= 1
            }),
            "first batch process never arrived"
        );
        batch.stop();

        let p1 = core.lookup("p1").expect("p1 admitted");
        let len = p1.total_instructions();
        assert!((5..=10).contains(&len), "length {len} outside [min, max]");
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let core = test_core();
        let mut batch = BatchGenerator::new(Arc::clone(&core), 1);
        batch.start();
        batch.start();
        assert!(batch.is_running());
        batch.stop();
        batch.stop();
        assert!(!batch.is_running());
        // Queue contents survive repeated stop calls.
        let before = core.queue_len();
        batch.stop();
        assert_eq!(core.queue_len(), before);
    }

    #[test]
    fn counter_is_monotonic_across_restarts() {
        let core = test_core();
        let mut batch = BatchGenerator::new(Arc::clone(&core), 1);
        batch.start();
        assert!(wait_for(Duration::from_secs(5), || {
            core.clock().advance(1);
            batch.generated() >= 1
        }));
        batch.stop();
        let seen = batch.generated();

        batch.start();
        assert!(wait_for(Duration::from_secs(5), || {
            core.clock().advance(1);
            batch.generated() > seen
        }));
        batch.stop();
        // Names continue from the counter, never reusing earlier ones.
        assert!(core.lookup(&format!("p{}", seen + 1)).is_some());
    }
}
