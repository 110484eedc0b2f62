//! Per-process instruction interpreter.
//!
//! One call to [`Process::execute_one_step`] advances a process by one
//! scheduling step: a single instruction, or one whole `For` loop. The loop
//! is a single step from the scheduler's point of view, so the quantum is
//! charged per step while `remaining_instructions` is charged per executed
//! instruction, body included.
//!
//! # Step order
//!
//! 1. Program counter past the end → Finished.
//! 2. Unexpired sleep → Sleeping, nothing advances.
//! 3. Expired sleep is cleared, then the instruction at the program counter
//!    executes.
//!
//! # Sleep
//!
//! `Sleep` sets the wake deadline on the shared tick clock, advances past
//! itself, and reports Sleeping. Inside a `For` body it additionally aborts
//! all remaining iterations; execution resumes from the instruction after
//! that `Sleep`.

use super::program::{Instruction, Operand, FOR_BODY_LEN};
use super::Process;
use crate::stamp::now_string;

/// Result of one interpreter step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// One instruction (or one whole loop) executed.
    Advanced,
    /// The process is blocked on its sleep deadline.
    Sleeping,
    /// The process ran out of program or instruction budget.
    Finished,
}

/// Whether executing a basic instruction put the process to sleep.
enum Exec {
    Ran,
    Slept,
}

impl Process {
    /// Execute one scheduling step on behalf of core `core_id` at tick
    /// `now`.
    pub fn execute_one_step(&self, core_id: usize, now: u64) -> StepOutcome {
        let pc = self.program_counter();
        if pc >= self.instructions().len() {
            self.finish();
            return StepOutcome::Finished;
        }

        let until = self.sleep_until();
        if until > 0 {
            if now < until {
                return StepOutcome::Sleeping;
            }
            self.set_sleep_until(0);
        }

        if let Instruction::For { repeats } = &self.instructions()[pc] {
            return self.run_for_loop(*repeats, pc, core_id, now);
        }

        let exec = self.run_basic(pc, core_id, now);
        self.store_pc(pc + 1);
        if self.consume_one() == 0 {
            self.finish();
            return StepOutcome::Finished;
        }
        match exec {
            Exec::Slept => StepOutcome::Sleeping,
            Exec::Ran => StepOutcome::Advanced,
        }
    }

    /// Run a `For` loop: the body is the next [`FOR_BODY_LEN`] instructions,
    /// executed `repeats` times. A `Sleep` in the body commits the loop and
    /// skips the remaining iterations.
    ///
    /// The whole loop is one scheduling step, so the instruction budget is
    /// charged per executed body instruction but only checked once the step
    /// ends; a loop always runs to its sleep or its last iteration.
    fn run_for_loop(&self, repeats: u16, for_pc: usize, core_id: usize, now: u64) -> StepOutcome {
        let body_start = for_pc + 1;
        let body_end = (body_start + FOR_BODY_LEN).min(self.instructions().len());

        // The opcode itself costs one instruction.
        let mut left = self.consume_one();

        for _ in 0..repeats {
            for idx in body_start..body_end {
                let exec = self.run_basic(idx, core_id, now);
                left = self.consume_one();
                if let Exec::Slept = exec {
                    self.store_pc(idx + 1);
                    if left == 0 {
                        self.finish();
                        return StepOutcome::Finished;
                    }
                    return StepOutcome::Sleeping;
                }
            }
        }

        self.store_pc(body_end);
        if left == 0 {
            self.finish();
            return StepOutcome::Finished;
        }
        StepOutcome::Advanced
    }

    /// Execute the non-loop instruction at `idx`.
    fn run_basic(&self, idx: usize, core_id: usize, now: u64) -> Exec {
        match &self.instructions()[idx] {
            Instruction::Print { template, var } => {
                let mut message = template.clone();
                if let Some(var) = var {
                    message.push_str(&self.read_variable(var).to_string());
                }
                self.log_line(core_id, &message);
                Exec::Ran
            }
            Instruction::Declare { name, value } => {
                self.write_variable(name, *value);
                Exec::Ran
            }
            Instruction::Add { dest, a, b } => {
                if let Some(dest) = self.dest_name(dest, idx, core_id) {
                    let sum = u32::from(self.resolve(a)) + u32::from(self.resolve(b));
                    self.write_variable(&dest, sum.min(u32::from(u16::MAX)) as u16);
                }
                Exec::Ran
            }
            Instruction::Subtract { dest, a, b } => {
                if let Some(dest) = self.dest_name(dest, idx, core_id) {
                    // Signed intermediate so the floor at 0 is explicit.
                    let diff = i32::from(self.resolve(a)) - i32::from(self.resolve(b));
                    self.write_variable(&dest, diff.max(0) as u16);
                }
                Exec::Ran
            }
            Instruction::Sleep { ticks } => {
                self.set_sleep_until(now + u64::from(*ticks));
                Exec::Slept
            }
            Instruction::Noop => Exec::Ran,
            // A For nested in another loop's body has no meaning here; it
            // executes as a no-op rather than faulting the process.
            Instruction::For { .. } => Exec::Ran,
        }
    }

    /// Literal operand value, or the variable's value (0 when undeclared).
    fn resolve(&self, operand: &Operand) -> u16 {
        match operand {
            Operand::Lit(v) => *v,
            Operand::Var(name) => self.read_variable(name),
        }
    }

    /// Destination operands must be variable references. A literal is a
    /// malformed operand: the instruction is logged and skipped, and the
    /// process continues.
    fn dest_name(&self, dest: &Operand, idx: usize, core_id: usize) -> Option<String> {
        match dest {
            Operand::Var(name) => Some(name.clone()),
            Operand::Lit(v) => {
                self.log_line(
                    core_id,
                    &format!("skipped line {idx}: literal {v} used as destination"),
                );
                None
            }
        }
    }

    fn log_line(&self, core_id: usize, message: &str) {
        self.push_log(format!("({}) Core:{core_id} \"{message}\"\n", now_string()));
    }
}
