//! Emulator configuration.
//!
//! The on-disk format is the original `config.txt` shape: one `key value`
//! pair per line, whitespace separated, `scheduler` value optionally quoted.
//! A missing file is not an error: the emulator reports it to stderr and
//! runs with defaults. Malformed values likewise fall back per key.
//!
//! # Keys
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `num-cpu` | core count | 4 |
//! | `scheduler` | `fcfs` or `rr` | `fcfs` |
//! | `quantum-cycles` | RR quantum, in executed instructions | 5 |
//! | `batch-process-freq` | ticks between batch spawns | 1 |
//! | `min-ins` / `max-ins` | instruction-count range for batch processes | 1 / 2000 |
//! | `delay-per-exec` | pacing ticks per executed instruction | 100 |
//! | `max-overall-mem` | total emulated memory in bytes | 16384 |
//! | `mem-per-frame` | frame size in bytes (reporting granularity) | 16 |
//! | `mem-per-proc` | contiguous bytes required per process | 4096 |

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scheduling policy selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedPolicy {
    /// First come, first served: a process keeps its core until it finishes.
    Fcfs,
    /// Round robin: preempt after `quantum-cycles` executed instructions.
    Rr,
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedPolicy::Fcfs => f.write_str("fcfs"),
            SchedPolicy::Rr => f.write_str("rr"),
        }
    }
}

impl FromStr for SchedPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fcfs" => Ok(SchedPolicy::Fcfs),
            "rr" => Ok(SchedPolicy::Rr),
            _ => Err(()),
        }
    }
}

/// Complete emulator configuration record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    pub num_cpu: usize,
    pub scheduler: SchedPolicy,
    pub quantum_cycles: u64,
    pub batch_process_freq: u64,
    pub min_ins: u64,
    pub max_ins: u64,
    pub delay_per_exec: u64,
    pub max_overall_mem: u64,
    pub mem_per_frame: u64,
    pub mem_per_proc: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            num_cpu: 4,
            scheduler: SchedPolicy::Fcfs,
            quantum_cycles: 5,
            batch_process_freq: 1,
            min_ins: 1,
            max_ins: 2000,
            delay_per_exec: 100,
            max_overall_mem: 16384,
            mem_per_frame: 16,
            mem_per_proc: 4096,
        }
    }
}

impl EmulatorConfig {
    /// Load configuration from `path`.
    ///
    /// Never fails: an unopenable file is reported to stderr and the
    /// defaults are returned; unknown keys are ignored; a malformed value
    /// keeps that key's default and emits a diagnostic.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                eprintln!(
                    "config: could not open {} ({err}); continuing with defaults",
                    path.display()
                );
                return Self::default();
            }
        };
        Self::parse(&text)
    }

    /// Parse the `key value` text format.
    pub fn parse(text: &str) -> Self {
        let mut cfg = Self::default();
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let Some(key) = parts.next() else { continue };
            let Some(raw) = parts.next() else { continue };
            match key {
                "num-cpu" => set_num(&mut cfg.num_cpu, key, raw),
                "scheduler" => {
                    let value = raw.trim_matches('"');
                    match value.parse() {
                        Ok(policy) => cfg.scheduler = policy,
                        Err(()) => {
                            eprintln!("config: unknown scheduler '{value}', keeping {}", cfg.scheduler)
                        }
                    }
                }
                "quantum-cycles" => set_num(&mut cfg.quantum_cycles, key, raw),
                "batch-process-freq" => set_num(&mut cfg.batch_process_freq, key, raw),
                "min-ins" => set_num(&mut cfg.min_ins, key, raw),
                "max-ins" => set_num(&mut cfg.max_ins, key, raw),
                "delay-per-exec" => set_num(&mut cfg.delay_per_exec, key, raw),
                "max-overall-mem" => set_num(&mut cfg.max_overall_mem, key, raw),
                "mem-per-frame" => set_num(&mut cfg.mem_per_frame, key, raw),
                "mem-per-proc" => set_num(&mut cfg.mem_per_proc, key, raw),
                _ => {}
            }
        }
        cfg
    }

    /// Check invariants the rest of the system assumes.
    ///
    /// # Errors
    ///
    /// Describes the first value no run can make sense of.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.num_cpu == 0 {
            return Err("num-cpu must be > 0".into());
        }
        if self.quantum_cycles == 0 {
            return Err("quantum-cycles must be > 0".into());
        }
        if self.batch_process_freq == 0 {
            return Err("batch-process-freq must be > 0".into());
        }
        if self.min_ins == 0 {
            return Err("min-ins must be > 0".into());
        }
        if self.min_ins > self.max_ins {
            return Err(format!(
                "min-ins ({}) must be <= max-ins ({})",
                self.min_ins, self.max_ins
            ));
        }
        if self.max_overall_mem == 0 {
            return Err("max-overall-mem must be > 0".into());
        }
        if self.mem_per_proc == 0 {
            return Err("mem-per-proc must be > 0".into());
        }
        if self.mem_per_proc > self.max_overall_mem {
            return Err(format!(
                "mem-per-proc ({}) exceeds max-overall-mem ({})",
                self.mem_per_proc, self.max_overall_mem
            ));
        }
        Ok(())
    }

    /// Assert the invariants of [`try_validate`](Self::try_validate).
    ///
    /// # Panics
    ///
    /// Panics with the violation message; a configuration bug, not a
    /// runtime condition.
    pub fn validate(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{err}");
        }
    }
}

fn set_num<T: FromStr + fmt::Display + Copy>(slot: &mut T, key: &str, raw: &str) {
    match raw.parse() {
        Ok(value) => *slot = value,
        Err(_) => eprintln!("config: malformed value '{raw}' for {key}, keeping {}", *slot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EmulatorConfig::default();
        assert_eq!(cfg.num_cpu, 4);
        assert_eq!(cfg.scheduler, SchedPolicy::Fcfs);
        assert_eq!(cfg.quantum_cycles, 5);
        assert_eq!(cfg.batch_process_freq, 1);
        assert_eq!(cfg.min_ins, 1);
        assert_eq!(cfg.max_ins, 2000);
        assert_eq!(cfg.delay_per_exec, 100);
        cfg.validate();
    }

    #[test]
    fn parses_full_file() {
        let text = "\
num-cpu 2
scheduler \"rr\"
quantum-cycles 4
batch-process-freq 3
min-ins 10
max-ins 50
delay-per-exec 0
max-overall-mem 100
mem-per-frame 10
mem-per-proc 40
";
        let cfg = EmulatorConfig::parse(text);
        assert_eq!(cfg.num_cpu, 2);
        assert_eq!(cfg.scheduler, SchedPolicy::Rr);
        assert_eq!(cfg.quantum_cycles, 4);
        assert_eq!(cfg.batch_process_freq, 3);
        assert_eq!(cfg.min_ins, 10);
        assert_eq!(cfg.max_ins, 50);
        assert_eq!(cfg.delay_per_exec, 0);
        assert_eq!(cfg.max_overall_mem, 100);
        assert_eq!(cfg.mem_per_frame, 10);
        assert_eq!(cfg.mem_per_proc, 40);
        cfg.validate();
    }

    #[test]
    fn unquoted_scheduler_value_is_accepted() {
        let cfg = EmulatorConfig::parse("scheduler rr\n");
        assert_eq!(cfg.scheduler, SchedPolicy::Rr);
    }

    #[test]
    fn malformed_and_unknown_lines_keep_defaults() {
        let cfg = EmulatorConfig::parse("num-cpu many\nsomething 12\n\nscheduler \"lottery\"\n");
        assert_eq!(cfg, EmulatorConfig::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = EmulatorConfig::load("/definitely/not/a/real/config.txt");
        assert_eq!(cfg, EmulatorConfig::default());
    }

    #[test]
    #[should_panic(expected = "min-ins")]
    fn validate_rejects_inverted_instruction_range() {
        let cfg = EmulatorConfig {
            min_ins: 10,
            max_ins: 5,
            ..EmulatorConfig::default()
        };
        cfg.validate();
    }

    #[test]
    #[should_panic(expected = "mem-per-proc")]
    fn validate_rejects_process_larger_than_memory() {
        let cfg = EmulatorConfig {
            max_overall_mem: 100,
            mem_per_proc: 200,
            ..EmulatorConfig::default()
        };
        cfg.validate();
    }
}
