//! Process records: program, variables, lifecycle, and log.
//!
//! A process is shared as `Arc<Process>`: the global process table owns the
//! canonical reference, while the ready queue, core slots, and finished list
//! hold clones. Hot lifecycle fields (state, program counter, remaining
//! count, sleep deadline, assigned core) are atomics so the worker, the
//! dispatcher, and read-only reporters never contend on a lock for them;
//! variables, the log, the memory span, and display timestamps sit behind
//! small mutexes.

pub mod interpreter;
pub mod program;

pub use interpreter::StepOutcome;
pub use program::{generate_program, Instruction, Operand, FOR_BODY_LEN};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};

use crate::memory::MemorySpan;
use crate::stamp::format_timestamp;

/// Process lifecycle state. `Finished` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessState {
    Waiting = 0,
    Running = 1,
    Finished = 2,
}

impl ProcessState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ProcessState::Waiting,
            1 => ProcessState::Running,
            _ => ProcessState::Finished,
        }
    }
}

/// Atomic cell holding a [`ProcessState`].
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    fn new(state: ProcessState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn load(&self) -> ProcessState {
        ProcessState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, state: ProcessState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Sentinel for "no core assigned".
const NO_CORE: i64 = -1;

/// One emulated process.
pub struct Process {
    name: String,
    instructions: Vec<Instruction>,
    total_instructions: u64,
    remaining_instructions: AtomicU64,
    program_counter: AtomicUsize,
    state: AtomicState,
    assigned_core: AtomicI64,
    /// Tick before which the process may not advance; 0 = not sleeping.
    sleep_until: AtomicU64,
    variables: Mutex<BTreeMap<String, u16>>,
    log: Mutex<Vec<String>>,
    memory_span: Mutex<Option<MemorySpan>>,
    started_at: Mutex<Option<DateTime<Local>>>,
    ended_at: Mutex<Option<DateTime<Local>>>,
}

impl Process {
    /// Create a waiting process from a program.
    ///
    /// # Panics
    ///
    /// Panics on an empty program; `total_instructions` must be positive.
    pub fn new(name: impl Into<String>, instructions: Vec<Instruction>) -> Arc<Self> {
        assert!(!instructions.is_empty(), "a process needs instructions");
        let total = instructions.len() as u64;
        Arc::new(Self {
            name: name.into(),
            instructions,
            total_instructions: total,
            remaining_instructions: AtomicU64::new(total),
            program_counter: AtomicUsize::new(0),
            state: AtomicState::new(ProcessState::Waiting),
            assigned_core: AtomicI64::new(NO_CORE),
            sleep_until: AtomicU64::new(0),
            variables: Mutex::new(BTreeMap::new()),
            log: Mutex::new(Vec::new()),
            memory_span: Mutex::new(None),
            started_at: Mutex::new(None),
            ended_at: Mutex::new(None),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[inline]
    pub fn total_instructions(&self) -> u64 {
        self.total_instructions
    }

    #[inline]
    pub fn remaining_instructions(&self) -> u64 {
        self.remaining_instructions.load(Ordering::Acquire)
    }

    /// Instructions executed so far, for progress displays.
    #[inline]
    pub fn completed_instructions(&self) -> u64 {
        self.total_instructions - self.remaining_instructions()
    }

    #[inline]
    pub fn program_counter(&self) -> usize {
        self.program_counter.load(Ordering::Acquire)
    }

    #[inline]
    pub fn state(&self) -> ProcessState {
        self.state.load()
    }

    #[inline]
    pub fn set_state(&self, state: ProcessState) {
        self.state.store(state);
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state() == ProcessState::Finished
    }

    /// Core index while Running, otherwise `None`.
    pub fn assigned_core(&self) -> Option<usize> {
        match self.assigned_core.load(Ordering::Acquire) {
            NO_CORE => None,
            idx => Some(idx as usize),
        }
    }

    pub fn set_assigned_core(&self, core: usize) {
        self.assigned_core.store(core as i64, Ordering::Release);
    }

    pub fn clear_assigned_core(&self) {
        self.assigned_core.store(NO_CORE, Ordering::Release);
    }

    /// Whether the process is blocked on a sleep at tick `now`.
    #[inline]
    pub fn is_sleeping(&self, now: u64) -> bool {
        let until = self.sleep_until.load(Ordering::Acquire);
        until > 0 && now < until
    }

    #[inline]
    pub fn sleep_until(&self) -> u64 {
        self.sleep_until.load(Ordering::Acquire)
    }

    pub(crate) fn set_sleep_until(&self, tick: u64) {
        self.sleep_until.store(tick, Ordering::Release);
    }

    pub fn memory_span(&self) -> Option<MemorySpan> {
        *self.memory_span.lock().expect("memory span mutex poisoned")
    }

    pub fn set_memory_span(&self, span: MemorySpan) {
        *self.memory_span.lock().expect("memory span mutex poisoned") = Some(span);
    }

    pub fn clear_memory_span(&self) {
        *self.memory_span.lock().expect("memory span mutex poisoned") = None;
    }

    /// Record the first dispatch time; later calls are no-ops.
    pub fn mark_started(&self) {
        let mut started = self.started_at.lock().expect("start time mutex poisoned");
        if started.is_none() {
            *started = Some(Local::now());
        }
    }

    pub fn started_stamp(&self) -> Option<String> {
        self.started_at
            .lock()
            .expect("start time mutex poisoned")
            .map(format_timestamp)
    }

    pub fn ended_stamp(&self) -> Option<String> {
        self.ended_at
            .lock()
            .expect("end time mutex poisoned")
            .map(format_timestamp)
    }

    /// Snapshot of the log lines, taken under the log mutex on demand.
    pub fn log_lines(&self) -> Vec<String> {
        self.log.lock().expect("log mutex poisoned").clone()
    }

    /// Current value of a variable, if declared.
    pub fn variable(&self, name: &str) -> Option<u16> {
        self.variables
            .lock()
            .expect("variables mutex poisoned")
            .get(name)
            .copied()
    }

    // ------------------------------------------------------------------
    // Interpreter internals (crate-visible)
    // ------------------------------------------------------------------

    pub(crate) fn push_log(&self, line: String) {
        self.log.lock().expect("log mutex poisoned").push(line);
    }

    pub(crate) fn store_pc(&self, pc: usize) {
        self.program_counter.store(pc, Ordering::Release);
    }

    /// Charge one executed instruction; returns the remaining count.
    pub(crate) fn consume_one(&self) -> u64 {
        let prev = self
            .remaining_instructions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                Some(r.saturating_sub(1))
            })
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    pub(crate) fn write_variable(&self, name: &str, value: u16) {
        self.variables
            .lock()
            .expect("variables mutex poisoned")
            .insert(name.to_string(), value);
    }

    pub(crate) fn read_variable(&self, name: &str) -> u16 {
        self.variables
            .lock()
            .expect("variables mutex poisoned")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Transition to Finished and stamp the end time once.
    pub(crate) fn finish(&self) {
        self.set_state(ProcessState::Finished);
        let mut ended = self.ended_at.lock().expect("end time mutex poisoned");
        if ended.is_none() {
            *ended = Some(Local::now());
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pc", &self.program_counter())
            .field("remaining", &self.remaining_instructions())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_process_starts_waiting_and_unassigned() {
        let p = Process::new("p1", vec![Instruction::Noop]);
        assert_eq!(p.state(), ProcessState::Waiting);
        assert_eq!(p.assigned_core(), None);
        assert_eq!(p.remaining_instructions(), 1);
        assert_eq!(p.completed_instructions(), 0);
        assert!(p.memory_span().is_none());
        assert!(p.started_stamp().is_none());
    }

    #[test]
    fn mark_started_is_latched() {
        let p = Process::new("p1", vec![Instruction::Noop]);
        p.mark_started();
        let first = p.started_stamp();
        p.mark_started();
        assert_eq!(p.started_stamp(), first);
    }

    #[test]
    fn consume_one_saturates_at_zero() {
        let p = Process::new("p1", vec![Instruction::Noop]);
        assert_eq!(p.consume_one(), 0);
        assert_eq!(p.consume_one(), 0);
    }

    #[test]
    fn sleeping_depends_on_clock() {
        let p = Process::new("p1", vec![Instruction::Noop]);
        assert!(!p.is_sleeping(0));
        p.set_sleep_until(5);
        assert!(p.is_sleeping(4));
        assert!(!p.is_sleeping(5));
    }
}
