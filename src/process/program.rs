//! Toy instruction set and batch program generation.
//!
//! Programs are flat instruction vectors. A `For` instruction loops over the
//! [`FOR_BODY_LEN`] instructions that follow it in the vector; the body is
//! stored once and re-executed per iteration.

use serde::{Deserialize, Serialize};

use crate::rng::XorShift64;

/// Number of instructions forming the body of a `For` loop.
pub const FOR_BODY_LEN: usize = 6;

/// An arithmetic operand: a literal or a variable reference.
///
/// Undeclared variables read as 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Lit(u16),
    Var(String),
}

/// One toy instruction.
///
/// Arithmetic is 16-bit unsigned and saturating: `Add` caps at 65535,
/// `Subtract` floors at 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Append `template` plus the decimal value of `var` (if any) to the
    /// process log.
    Print { template: String, var: Option<String> },
    /// Set a variable, capping the value at the 16-bit maximum.
    Declare { name: String, value: u16 },
    Add { dest: Operand, a: Operand, b: Operand },
    Subtract { dest: Operand, a: Operand, b: Operand },
    /// Block the process for `ticks` ticks of the shared clock.
    Sleep { ticks: u16 },
    Noop,
    /// Repeat the next [`FOR_BODY_LEN`] instructions `repeats` times.
    For { repeats: u16 },
}

fn add(dest: &str, a: Operand, b: Operand) -> Instruction {
    Instruction::Add {
        dest: Operand::Var(dest.to_string()),
        a,
        b,
    }
}

fn print_var(var: &str) -> Instruction {
    Instruction::Print {
        template: format!("Value from: {var} = "),
        var: Some(var.to_string()),
    }
}

fn declare(name: &str) -> Instruction {
    Instruction::Declare {
        name: name.to_string(),
        value: 0,
    }
}

/// Generate a batch process program of exactly `count` instructions.
///
/// The shape mirrors the batch workload this emulator was built around:
/// declare `x`, `y`, `z`, loop a six-instruction increment-and-print body,
/// pad with no-ops. Counts too small for the loop scaffold degrade to a
/// straight-line increment program.
///
/// # Panics
///
/// Panics if `count` is 0; every process has at least one instruction.
pub fn generate_program(count: u64, rng: &mut XorShift64) -> Vec<Instruction> {
    assert!(count > 0, "a process needs at least one instruction");
    let count = count as usize;

    // 3 declares + the FOR opcode + its body.
    let scaffold = 3 + 1 + FOR_BODY_LEN;
    if count < scaffold {
        return straight_line(count);
    }

    let mut program = Vec::with_capacity(count);
    program.push(declare("x"));
    program.push(declare("y"));
    program.push(declare("z"));
    program.push(Instruction::For {
        repeats: rng.next_inclusive(1, 100) as u16,
    });
    for var in ["x", "y", "z"] {
        program.push(add(var, Operand::Var(var.to_string()), Operand::Lit(1)));
        program.push(print_var(var));
    }
    program.resize(count, Instruction::Noop);
    program
}

fn straight_line(count: usize) -> Vec<Instruction> {
    let mut program = Vec::with_capacity(count);
    program.push(declare("x"));
    let filler = [
        add("x", Operand::Var("x".to_string()), Operand::Lit(1)),
        print_var("x"),
        Instruction::Noop,
    ];
    let mut next = filler.iter().cycle();
    while program.len() < count {
        program.push(next.next().cloned().unwrap_or(Instruction::Noop));
    }
    program
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_length_is_exact() {
        let mut rng = XorShift64::new(11);
        for count in [1, 2, 9, 10, 11, 100, 2000] {
            let program = generate_program(count, &mut rng);
            assert_eq!(program.len() as u64, count, "count {count}");
        }
    }

    #[test]
    fn scaffold_shape_declares_then_loops() {
        let mut rng = XorShift64::new(5);
        let program = generate_program(64, &mut rng);
        assert!(matches!(program[0], Instruction::Declare { .. }));
        assert!(matches!(program[1], Instruction::Declare { .. }));
        assert!(matches!(program[2], Instruction::Declare { .. }));
        assert!(matches!(program[3], Instruction::For { .. }));
        // Exactly one FOR, body-sized tail of real work, NOOP padding.
        let fors = program
            .iter()
            .filter(|i| matches!(i, Instruction::For { .. }))
            .count();
        assert_eq!(fors, 1);
        assert!(matches!(program[4 + FOR_BODY_LEN], Instruction::Noop));
    }

    #[test]
    fn small_counts_are_straight_line() {
        let mut rng = XorShift64::new(5);
        let program = generate_program(4, &mut rng);
        assert_eq!(program.len(), 4);
        assert!(!program.iter().any(|i| matches!(i, Instruction::For { .. })));
    }

    #[test]
    fn program_is_serializable() {
        fn assert_serde<T: serde::Serialize + for<'de> serde::Deserialize<'de>>(_: &T) {}
        let mut rng = XorShift64::new(9);
        let program = generate_program(24, &mut rng);
        assert_serde(&program);
    }
}
