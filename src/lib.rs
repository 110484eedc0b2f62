//! schedsim: an educational multi-core CPU scheduler emulator.
//!
//! # Overview
//!
//! A configurable pool of cores executes toy processes: short programs of
//! 16-bit arithmetic, prints, sleeps, and bounded loops. A tick counter
//! advanced at a fixed wall-clock rate paces everything; a first-fit
//! contiguous allocator gates execution; FCFS or round-robin decides who
//! runs.
//!
//! ```text
//!  Batch Generator ──► Ready Queue ──► Dispatcher ──► Core slots ──► Workers
//!                          ▲                                           │
//!                          │   OutOfMemory requeue / RR preemption     │
//!                          └───────────────────────────────────────────┘
//!                                        │
//!              Memory Manager ◄──────────┤ allocate / release
//!              Status Reporter ◄─────────┘ read-only
//! ```
//!
//! # Module map
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Configuration record, `key value` file parsing, validation |
//! | [`tick`] | Shared tick counter and its wall-clock driver thread |
//! | [`process`] | Process records, the instruction set, the interpreter |
//! | [`memory`] | First-fit allocator with coalescing and snapshots |
//! | [`sched`] | Ready queue, dispatcher, workers, batch generation, reports |
//! | [`sink`] | Output and snapshot sinks (stdout, file, in-memory) |
//! | [`shell`] | Interactive command surface over the scheduler |
//! | [`rng`] | Deterministic RNG for reproducible batch workloads |
//! | [`stamp`] | Display-only wall-clock timestamp formatting |
//!
//! # Determinism
//!
//! All time-based logic reads the tick counter, never the wall clock, so
//! tests drive scheduling decisions by advancing a [`tick::TickClock`]
//! manually. The scheduling logic itself lives in pure step functions
//! ([`sched::SchedCore::dispatch_step`], [`sched::SchedCore::worker_step`])
//! shared by the threaded loops and the deterministic tests.

pub mod config;
pub mod memory;
pub mod process;
pub mod rng;
pub mod sched;
pub mod shell;
pub mod sink;
pub mod stamp;
pub mod tick;

pub use config::{EmulatorConfig, SchedPolicy};
pub use memory::{MemoryManager, MemorySnapshot, MemorySpan, OutOfMemory};
pub use process::{
    generate_program, Instruction, Operand, Process, ProcessState, StepOutcome,
};
pub use sched::{
    BatchGenerator, DuplicateProcess, ProcessLine, SchedCore, Scheduler, StatusReport,
    WorkerStep,
};
pub use sink::{
    DirSnapshotSink, FileSink, NullSnapshotSink, OutputSink, SnapshotSink, StdoutSink,
    VecSink, VecSnapshotSink,
};
pub use tick::{TickClock, TickDriver, DEFAULT_TICK_PERIOD};
