//! Scheduler threads: dispatcher, per-core workers, batch generation.
//!
//! # Threads
//!
//! | Thread | Loop |
//! |--------|------|
//! | dispatcher | [`SchedCore::dispatch_step`] until stop; parks briefly when nothing dispatched |
//! | worker × N | [`SchedCore::worker_step`] until stop; paces by `delay-per-exec` ticks |
//! | batch-generator | admits `p<N>` every `batch-process-freq` ticks (separately started) |
//!
//! The step functions live in [`core`](self::core); the loops here only add
//! waiting and pacing, so deterministic tests can drive the identical
//! scheduling logic without any of these threads.
//!
//! # Shutdown
//!
//! [`Scheduler::stop`]: stop the batch generator (join), set the stop flag,
//! join the dispatcher, join the workers. In-flight processes stay where
//! they are. Start and stop are both idempotent.

pub mod batch;
pub mod core;
pub mod report;


pub use self::batch::{BatchGenerator, DEFAULT_BATCH_SEED};
pub use self::core::{DuplicateProcess, SchedCore, WorkerStep};
pub use self::report::{ProcessLine, StatusReport};

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_utils::sync::Parker;

use crate::config::EmulatorConfig;
use crate::process::Process;
use crate::sink::SnapshotSink;
use crate::tick::TickClock;

/// Nap for a worker whose slot is empty or whose occupant cannot progress.
const IDLE_NAP: Duration = Duration::from_millis(1);

/// Dispatcher park timeout; a backstop for missed wakeups.
const DISPATCH_PARK: Duration = Duration::from_millis(1);

/// Owns the scheduler threads over a shared [`SchedCore`].
pub struct Scheduler {
    core: Arc<SchedCore>,
    batch: BatchGenerator,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    running: bool,
}

impl Scheduler {
    /// Build a scheduler over a validated configuration.
    ///
    /// # Panics
    ///
    /// Panics if `cfg` fails validation.
    pub fn new(cfg: EmulatorConfig, clock: TickClock, snapshots: Box<dyn SnapshotSink>) -> Self {
        let core = Arc::new(SchedCore::new(cfg, clock, snapshots));
        let batch = BatchGenerator::new(Arc::clone(&core), DEFAULT_BATCH_SEED);
        Self {
            core,
            batch,
            dispatcher: None,
            workers: Vec::new(),
            running: false,
        }
    }

    /// The shared runtime context, for admission, lookups, and reports.
    #[inline]
    pub fn core(&self) -> &Arc<SchedCore> {
        &self.core
    }

    /// Admit a user-created process.
    ///
    /// # Errors
    ///
    /// [`DuplicateProcess`] when the name is taken.
    pub fn submit(&self, process: Arc<Process>) -> Result<(), DuplicateProcess> {
        self.core.admit(process)
    }

    /// Spawn the dispatcher and worker threads. Idempotent.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.core.reset_stop();

        let parker = Parker::new();
        self.core.set_dispatcher_unparker(parker.unparker().clone());
        let dispatcher_core = Arc::clone(&self.core);
        self.dispatcher = Some(
            thread::Builder::new()
                .name("dispatcher".into())
                .spawn(move || run_dispatcher(&dispatcher_core, &parker))
                .expect("failed to spawn dispatcher"),
        );

        let num_cpu = self.core.config().num_cpu;
        self.workers = (0..num_cpu)
            .map(|core_id| {
                let worker_core = Arc::clone(&self.core);
                thread::Builder::new()
                    .name(format!("worker-{core_id}"))
                    .spawn(move || run_worker(&worker_core, core_id))
                    .expect("failed to spawn worker")
            })
            .collect();

        self.running = true;
    }

    /// Stop everything: batch generator first, then dispatcher and workers.
    /// Idempotent; in-flight processes are left as they are.
    pub fn stop(&mut self) {
        self.batch.stop();
        if !self.running {
            return;
        }
        self.core.request_stop();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.running = false;
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start batch generation. Idempotent.
    pub fn start_batch(&mut self) {
        self.batch.start();
    }

    /// Stop batch generation. Idempotent; does not cancel admitted
    /// processes.
    pub fn stop_batch(&mut self) {
        self.batch.stop();
    }

    #[inline]
    pub fn batch_running(&self) -> bool {
        self.batch.is_running()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_dispatcher(core: &SchedCore, parker: &Parker) {
    while !core.stop_requested() {
        if !core.dispatch_step() {
            parker.park_timeout(DISPATCH_PARK);
        }
    }
}

fn run_worker(core: &SchedCore, core_id: usize) {
    let delay = core.config().delay_per_exec;
    let clock = core.clock().clone();

    while !core.stop_requested() {
        let tick_before = clock.now();
        match core.worker_step(core_id) {
            WorkerStep::Idle | WorkerStep::AwaitingMemory => thread::sleep(IDLE_NAP),
            WorkerStep::Sleeping => {
                // Re-check the occupant after roughly one pacing delay.
                if delay > 0 {
                    clock.wait_until_at_least(tick_before + delay, core.stop_flag());
                } else {
                    thread::sleep(IDLE_NAP);
                }
            }
            WorkerStep::Executed | WorkerStep::Preempted => {
                if delay > 0 {
                    clock.wait_until_at_least(tick_before + delay, core.stop_flag());
                }
            }
            WorkerStep::Finished => {}
        }
    }
}
