//! Shared scheduler state and the pure step functions.
//!
//! # Architecture
//!
//! ```text
//!  Batch Generator ──► Ready Queue ──► Dispatcher ──► Core slot ──► Worker
//!                          ▲                                          │
//!                          │  OutOfMemory requeue / RR preemption     │
//!                          └──────────────────────────────────────────┘
//!                                                                     │
//!                                           Finished list ◄───────────┘
//!                                           (memory released)
//! ```
//!
//! [`SchedCore`] is the explicit runtime context every thread shares: the
//! configuration, the tick clock, the mutex-guarded queue/slots/finished
//! list/process table, the memory manager, and the quantum counters. The
//! threaded loops in the parent module and the deterministic tests drive the
//! same two step functions, [`dispatch_step`](SchedCore::dispatch_step) and
//! [`worker_step`](SchedCore::worker_step), so scheduling behavior is
//! exercised without timing dependence.
//!
//! # Lock order
//!
//! cores → queue → finished → memory, everywhere. Quantum counters, the
//! tick counter, the stop flag, and per-process lifecycle fields are
//! atomics and take no lock.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use crossbeam_utils::sync::Unparker;

use crate::config::{EmulatorConfig, SchedPolicy};
use crate::memory::MemoryManager;
use crate::process::{Process, ProcessState, StepOutcome};
use crate::sink::SnapshotSink;
use crate::stamp::now_string;
use crate::tick::TickClock;

/// A process with this name already exists in the process table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateProcess(pub String);

impl fmt::Display for DuplicateProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process {} already exists", self.0)
    }
}

impl std::error::Error for DuplicateProcess {}

/// What one worker step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerStep {
    /// The core slot is empty.
    Idle,
    /// Allocation failed; the process went back to the queue tail, Waiting.
    AwaitingMemory,
    /// The occupant is blocked on its sleep deadline.
    Sleeping,
    /// One instruction (or one whole loop) executed.
    Executed,
    /// RR quantum expired; the occupant went back to the queue tail.
    Preempted,
    /// The occupant finished and was retired to the finished list.
    Finished,
}

/// Shared scheduler state. Owned behind an `Arc`; threads, the shell, and
/// tests all operate on the same instance.
pub struct SchedCore {
    cfg: EmulatorConfig,
    clock: TickClock,
    memory: MemoryManager,
    ready: Mutex<VecDeque<Arc<Process>>>,
    cores: Mutex<Vec<Option<Arc<Process>>>>,
    finished: Mutex<Vec<Arc<Process>>>,
    table: Mutex<AHashMap<String, Arc<Process>>>,
    /// Executed-instruction count since this core's last quantum reset.
    quantum_used: Vec<AtomicU64>,
    /// System-wide executed-instruction count under RR; snapshots fire on
    /// multiples of `quantum-cycles`.
    global_quantum: AtomicU64,
    stop: AtomicBool,
    snapshots: Box<dyn SnapshotSink>,
    dispatcher_wake: Mutex<Option<Unparker>>,
}

impl SchedCore {
    /// Build the runtime context.
    ///
    /// # Panics
    ///
    /// Panics if `cfg` fails validation.
    pub fn new(cfg: EmulatorConfig, clock: TickClock, snapshots: Box<dyn SnapshotSink>) -> Self {
        cfg.validate();
        let memory = MemoryManager::new(cfg.max_overall_mem, cfg.mem_per_proc);
        let quantum_used = (0..cfg.num_cpu).map(|_| AtomicU64::new(0)).collect();
        Self {
            cores: Mutex::new(vec![None; cfg.num_cpu]),
            quantum_used,
            cfg,
            clock,
            memory,
            ready: Mutex::new(VecDeque::new()),
            finished: Mutex::new(Vec::new()),
            table: Mutex::new(AHashMap::new()),
            global_quantum: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            snapshots,
            dispatcher_wake: Mutex::new(None),
        }
    }

    #[inline]
    pub fn config(&self) -> &EmulatorConfig {
        &self.cfg
    }

    #[inline]
    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    #[inline]
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    // ------------------------------------------------------------------
    // Admission and lookup
    // ------------------------------------------------------------------

    /// Register a new process and enqueue it.
    ///
    /// # Errors
    ///
    /// [`DuplicateProcess`] when the name is already taken; the queue is
    /// untouched.
    pub fn admit(&self, process: Arc<Process>) -> Result<(), DuplicateProcess> {
        {
            let mut table = self.table.lock().expect("table mutex poisoned");
            if table.contains_key(process.name()) {
                return Err(DuplicateProcess(process.name().to_string()));
            }
            table.insert(process.name().to_string(), Arc::clone(&process));
        }
        self.enqueue_tail(process);
        Ok(())
    }

    /// Look up a process by name in the global table.
    pub fn lookup(&self, name: &str) -> Option<Arc<Process>> {
        self.table
            .lock()
            .expect("table mutex poisoned")
            .get(name)
            .cloned()
    }

    /// Requeue an existing process at the tail and wake the dispatcher.
    pub(crate) fn enqueue_tail(&self, process: Arc<Process>) {
        self.ready
            .lock()
            .expect("queue mutex poisoned")
            .push_back(process);
        self.wake_dispatcher();
    }

    // ------------------------------------------------------------------
    // Step functions
    // ------------------------------------------------------------------

    /// Assign the queue head to the lowest-index idle core.
    ///
    /// Returns `false` when there is nothing to do: no idle core or an
    /// empty queue. Does not allocate memory; that is the worker's first
    /// act.
    pub fn dispatch_step(&self) -> bool {
        let mut cores = self.cores.lock().expect("cores mutex poisoned");
        let Some(slot) = cores.iter().position(Option::is_none) else {
            return false;
        };
        let Some(process) = self
            .ready
            .lock()
            .expect("queue mutex poisoned")
            .pop_front()
        else {
            return false;
        };
        process.set_state(ProcessState::Running);
        process.set_assigned_core(slot);
        process.mark_started();
        self.quantum_used[slot].store(0, Ordering::Release);
        cores[slot] = Some(process);
        true
    }

    /// Run one worker step for `core_id`: memory admission, sleep check,
    /// one interpreter step, retirement, and RR preemption. Execution
    /// pacing is the calling loop's job.
    pub fn worker_step(&self, core_id: usize) -> WorkerStep {
        let process = {
            let cores = self.cores.lock().expect("cores mutex poisoned");
            cores[core_id].clone()
        };
        let Some(process) = process else {
            return WorkerStep::Idle;
        };

        // A process cannot execute until allocated.
        if process.memory_span().is_none() {
            match self.memory.allocate(process.name()) {
                Ok(span) => process.set_memory_span(span),
                Err(_) => {
                    process.set_state(ProcessState::Waiting);
                    process.clear_assigned_core();
                    self.clear_slot(core_id);
                    self.enqueue_tail(process);
                    return WorkerStep::AwaitingMemory;
                }
            }
        }

        let now = self.clock.now();
        if process.is_sleeping(now) {
            return WorkerStep::Sleeping;
        }

        process.set_state(ProcessState::Running);
        match process.execute_one_step(core_id, now) {
            StepOutcome::Finished => {
                self.retire(core_id, process);
                WorkerStep::Finished
            }
            // A sleep transition does not count against the quantum.
            StepOutcome::Sleeping => WorkerStep::Sleeping,
            StepOutcome::Advanced => {
                if self.cfg.scheduler == SchedPolicy::Rr {
                    self.charge_quantum(core_id, process)
                } else {
                    WorkerStep::Executed
                }
            }
        }
    }

    /// Charge one executed instruction under RR: emit a snapshot on every
    /// global rollover, preempt when the per-core quantum is used up.
    fn charge_quantum(&self, core_id: usize, process: Arc<Process>) -> WorkerStep {
        let global = self.global_quantum.fetch_add(1, Ordering::AcqRel) + 1;
        if global % self.cfg.quantum_cycles == 0 {
            // fetch_add hands each rollover value to exactly one worker,
            // so each snapshot is emitted exactly once.
            let snapshot = self.memory.snapshot(global, now_string());
            self.snapshots.emit(&snapshot);
        }

        let used = self.quantum_used[core_id].fetch_add(1, Ordering::AcqRel) + 1;
        if used >= self.cfg.quantum_cycles {
            self.quantum_used[core_id].store(0, Ordering::Release);
            process.set_state(ProcessState::Waiting);
            process.clear_assigned_core();
            self.clear_slot(core_id);
            self.enqueue_tail(process);
            return WorkerStep::Preempted;
        }
        WorkerStep::Executed
    }

    /// Release memory and move a finished process to the finished list.
    fn retire(&self, core_id: usize, process: Arc<Process>) {
        self.memory.deallocate(process.name());
        process.clear_memory_span();
        process.clear_assigned_core();
        self.quantum_used[core_id].store(0, Ordering::Release);
        self.clear_slot(core_id);
        self.finished
            .lock()
            .expect("finished mutex poisoned")
            .push(process);
        // A core just opened up; the queue head may be waiting for it.
        self.wake_dispatcher();
    }

    fn clear_slot(&self, core_id: usize) {
        let mut cores = self.cores.lock().expect("cores mutex poisoned");
        cores[core_id] = None;
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    /// Count of core slots whose occupant is Running.
    pub fn active_cores(&self) -> usize {
        let cores = self.cores.lock().expect("cores mutex poisoned");
        cores
            .iter()
            .flatten()
            .filter(|p| p.state() == ProcessState::Running)
            .count()
    }

    pub fn queue_len(&self) -> usize {
        self.ready.lock().expect("queue mutex poisoned").len()
    }

    pub fn finished_len(&self) -> usize {
        self.finished.lock().expect("finished mutex poisoned").len()
    }

    /// Finished processes in retirement order.
    pub fn finished_processes(&self) -> Vec<Arc<Process>> {
        self.finished.lock().expect("finished mutex poisoned").clone()
    }

    /// Snapshot of the core slots, index-aligned.
    pub fn core_occupants(&self) -> Vec<Option<Arc<Process>>> {
        self.cores.lock().expect("cores mutex poisoned").clone()
    }

    /// Global quantum counter value (RR only advances it).
    pub fn global_quantum(&self) -> u64 {
        self.global_quantum.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake_dispatcher();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn reset_stop(&self) {
        self.stop.store(false, Ordering::Release);
    }

    pub(crate) fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }

    pub(crate) fn set_dispatcher_unparker(&self, unparker: Unparker) {
        *self
            .dispatcher_wake
            .lock()
            .expect("dispatcher wake mutex poisoned") = Some(unparker);
    }

    fn wake_dispatcher(&self) {
        if let Some(unparker) = self
            .dispatcher_wake
            .lock()
            .expect("dispatcher wake mutex poisoned")
            .as_ref()
        {
            unparker.unpark();
        }
    }
}

impl fmt::Debug for SchedCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedCore")
            .field("cores", &self.cfg.num_cpu)
            .field("scheduler", &self.cfg.scheduler)
            .field("queue_len", &self.queue_len())
            .field("finished_len", &self.finished_len())
            .finish_non_exhaustive()
    }
}
