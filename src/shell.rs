//! Interactive command shell.
//!
//! The shell is a collaborator of the scheduling core: it parses the command
//! surface, owns the emulator lifetime (clock driver + scheduler), and
//! renders what the core exposes (status reports, process logs). Command
//! parsing is a pure function so the grammar is testable without a terminal.
//!
//! # Commands
//!
//! `initialize`, `scheduler-start`, `scheduler-stop`, `screen -s <name>`,
//! `screen -r <name>`, `screen -ls`, `report-util`, `clear`, `exit`; inside
//! a screen view: `process-smi`, `exit`.

use std::fmt;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::config::EmulatorConfig;
use crate::process::{generate_program, Process};
use crate::rng::XorShift64;
use crate::sched::{Scheduler, DEFAULT_BATCH_SEED};
use crate::sink::{DirSnapshotSink, FileSink};
use crate::stamp::now_string;
use crate::tick::{TickClock, TickDriver, DEFAULT_TICK_PERIOD};

/// File the utilization report is written to by `report-util`.
pub const REPORT_FILE: &str = "csopesy-log.txt";

/// A parsed top-level command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Initialize,
    SchedulerStart,
    SchedulerStop,
    ScreenNew(String),
    ScreenResume(String),
    ScreenList,
    ReportUtil,
    Clear,
    Exit,
    Empty,
    Unknown(String),
}

/// Parse one input line into a [`Command`].
pub fn parse_command(line: &str) -> Command {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Command::Empty;
    };
    match head {
        "initialize" => Command::Initialize,
        "scheduler-start" => Command::SchedulerStart,
        "scheduler-stop" => Command::SchedulerStop,
        "report-util" => Command::ReportUtil,
        "clear" => Command::Clear,
        "exit" => Command::Exit,
        "screen" => match (parts.next(), parts.next()) {
            (Some("-ls"), None) => Command::ScreenList,
            (Some("-s"), Some(name)) => Command::ScreenNew(name.to_string()),
            (Some("-r"), Some(name)) => Command::ScreenResume(name.to_string()),
            _ => Command::Unknown(line.trim().to_string()),
        },
        _ => Command::Unknown(line.trim().to_string()),
    }
}

/// Why a command was rejected. Diagnostics only; nothing here terminates
/// the emulator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    NotInitialized,
    AlreadyInitialized,
    DuplicateProcess(String),
    UnknownProcess(String),
    BadScreenUsage,
    Unrecognized(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::NotInitialized => f.write_str("Please run 'initialize' first."),
            CommandError::AlreadyInitialized => f.write_str("Scheduler already initialized."),
            CommandError::DuplicateProcess(name) => {
                write!(f, "Process {name} already exists.")
            }
            CommandError::UnknownProcess(name) => {
                write!(f, "Process {name} not found or finished.")
            }
            CommandError::BadScreenUsage => {
                f.write_str("Invalid screen command. Usage: screen -s|-r <name> or screen -ls")
            }
            CommandError::Unrecognized(cmd) => {
                write!(f, "'{cmd}' command is not recognized. Please enter a correct command.")
            }
        }
    }
}

/// The running emulator: tick driver plus scheduler threads.
struct Emulator {
    driver: TickDriver,
    scheduler: Scheduler,
}

impl Emulator {
    fn build(cfg: EmulatorConfig) -> Self {
        let clock = TickClock::new();
        let driver = TickDriver::spawn(clock.clone(), DEFAULT_TICK_PERIOD);
        let mut scheduler = Scheduler::new(cfg, clock, Box::new(DirSnapshotSink::default()));
        scheduler.start();
        Self { driver, scheduler }
    }

    fn shutdown(&mut self) {
        self.scheduler.stop();
        self.driver.stop();
    }
}

/// Interactive shell state.
pub struct Shell {
    config_path: PathBuf,
    emulator: Option<Emulator>,
    rng: XorShift64,
}

impl Shell {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            emulator: None,
            rng: XorShift64::new(DEFAULT_BATCH_SEED ^ 1),
        }
    }

    /// Run the read-eval-print loop until `exit` or end of input.
    pub fn run<R: BufRead>(&mut self, mut input: R) -> ExitCode {
        print_banner();
        let mut line = String::new();
        loop {
            print!("Enter a command: ");
            flush_stdout();
            line.clear();
            match input.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            match parse_command(&line) {
                Command::Exit => {
                    println!("exit command recognized. Closing program.");
                    break;
                }
                Command::Empty => {}
                Command::Clear => clear_screen(),
                Command::Initialize => match self.initialize() {
                    Ok(cores) => println!("Scheduler initialized with {cores} cores."),
                    Err(err) => println!("{err}"),
                },
                // Unknown input is diagnosed whether or not the scheduler
                // has been initialized yet.
                Command::Unknown(cmd) if cmd.starts_with("screen") => {
                    println!("{}", CommandError::BadScreenUsage);
                }
                Command::Unknown(cmd) => println!("{}", CommandError::Unrecognized(cmd)),
                command => match self.dispatch(command, &mut input) {
                    Ok(()) => {}
                    Err(err) => println!("{err}"),
                },
            }
        }
        if let Some(mut emulator) = self.emulator.take() {
            emulator.shutdown();
        }
        ExitCode::SUCCESS
    }

    fn initialize(&mut self) -> Result<usize, CommandError> {
        if self.emulator.is_some() {
            return Err(CommandError::AlreadyInitialized);
        }
        let cfg = EmulatorConfig::load(&self.config_path);
        if let Err(err) = cfg.try_validate() {
            // Unrecoverable: the configuration cannot drive a run.
            eprintln!("initialize: {err}");
            std::process::exit(1);
        }
        let cores = cfg.num_cpu;
        self.emulator = Some(Emulator::build(cfg));
        Ok(cores)
    }

    fn dispatch<R: BufRead>(
        &mut self,
        command: Command,
        input: &mut R,
    ) -> Result<(), CommandError> {
        let emulator = self.emulator.as_mut().ok_or(CommandError::NotInitialized)?;
        match command {
            Command::SchedulerStart => {
                emulator.scheduler.start_batch();
                println!("Scheduler started generating processes.");
            }
            Command::SchedulerStop => {
                emulator.scheduler.stop_batch();
                println!("Scheduler stopped generating processes.");
            }
            Command::ScreenList => {
                let report = emulator.scheduler.core().status_report();
                print!("{}", report.render());
            }
            Command::ReportUtil => {
                let report = emulator.scheduler.core().status_report();
                match FileSink::create(REPORT_FILE) {
                    Ok(sink) => {
                        report.write_to(&sink);
                        println!("Report saved to {REPORT_FILE}");
                    }
                    Err(err) => eprintln!("report-util: cannot write {REPORT_FILE}: {err}"),
                }
            }
            Command::ScreenNew(name) => {
                let core = emulator.scheduler.core();
                if core.lookup(&name).is_some() {
                    return Err(CommandError::DuplicateProcess(name));
                }
                let cfg = core.config();
                let length = self.rng.next_inclusive(cfg.min_ins, cfg.max_ins);
                let process = Process::new(name.clone(), generate_program(length, &mut self.rng));
                core.admit(Arc::clone(&process))
                    .map_err(|dup| CommandError::DuplicateProcess(dup.0))?;
                println!("Created new process: {name}");
                screen_view(&process, input);
            }
            Command::ScreenResume(name) => {
                let core = emulator.scheduler.core();
                let process = core
                    .lookup(&name)
                    .filter(|p| !p.is_finished())
                    .ok_or(CommandError::UnknownProcess(name))?;
                screen_view(&process, input);
            }
            // Handled before dispatch; listed for exhaustiveness.
            Command::Unknown(_)
            | Command::Initialize
            | Command::Clear
            | Command::Exit
            | Command::Empty => {}
        }
        Ok(())
    }
}

/// Attached process view: progress header plus an inner command loop.
fn screen_view<R: BufRead>(process: &Process, input: &mut R) {
    clear_screen();
    println!("Displaying process: {}", process.name());
    println!("Process: {}", process.name());
    println!(
        "Instruction: {}/{}",
        process.completed_instructions(),
        process.total_instructions()
    );
    println!("TimeStamp: {}", now_string());

    let mut line = String::new();
    loop {
        println!("Type 'exit' to return to main menu, 'process-smi' for info");
        print!("Enter a command: ");
        flush_stdout();
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        match line.trim() {
            "exit" => {
                clear_screen();
                println!("Back to main menu.");
                return;
            }
            "process-smi" => print_process_smi(process),
            other if other.is_empty() => {}
            other => println!("{}", CommandError::Unrecognized(other.to_string())),
        }
    }
}

/// `process-smi`: name, log, and progress for one process.
fn print_process_smi(process: &Process) {
    println!("Process name: {}", process.name());
    println!("Logs:");
    for log_line in process.log_lines() {
        print!("{log_line}");
    }
    println!();
    println!(
        "Current instruction line: {}",
        process.completed_instructions()
    );
    println!("Lines of code: {}", process.total_instructions());
    if process.is_finished() {
        println!("\nFinished!");
    }
}

fn print_banner() {
    println!("======================================");
    println!(" schedsim : CPU scheduler emulator");
    println!("======================================");
    println!("Type 'initialize' to set up the scheduler, 'exit' to quit.");
}

fn clear_screen() {
    // ANSI clear + home; harmless on terminals that ignore it.
    print!("\x1b[2J\x1b[H");
    flush_stdout();
}

fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_full_command_surface() {
        assert_eq!(parse_command("initialize"), Command::Initialize);
        assert_eq!(parse_command("scheduler-start"), Command::SchedulerStart);
        assert_eq!(parse_command("scheduler-stop"), Command::SchedulerStop);
        assert_eq!(parse_command("report-util"), Command::ReportUtil);
        assert_eq!(parse_command("clear"), Command::Clear);
        assert_eq!(parse_command("exit"), Command::Exit);
        assert_eq!(parse_command("screen -ls"), Command::ScreenList);
        assert_eq!(
            parse_command("screen -s worker1"),
            Command::ScreenNew("worker1".to_string())
        );
        assert_eq!(
            parse_command("screen -r worker1"),
            Command::ScreenResume("worker1".to_string())
        );
    }

    #[test]
    fn whitespace_and_unknown_lines() {
        assert_eq!(parse_command(""), Command::Empty);
        assert_eq!(parse_command("   \t  "), Command::Empty);
        assert_eq!(
            parse_command("frobnicate"),
            Command::Unknown("frobnicate".to_string())
        );
        // screen without a usable flag is unknown, not a panic.
        assert_eq!(
            parse_command("screen"),
            Command::Unknown("screen".to_string())
        );
        assert_eq!(
            parse_command("screen -s"),
            Command::Unknown("screen -s".to_string())
        );
    }

    #[test]
    fn errors_render_their_diagnostics() {
        assert_eq!(
            CommandError::NotInitialized.to_string(),
            "Please run 'initialize' first."
        );
        assert_eq!(
            CommandError::DuplicateProcess("p1".into()).to_string(),
            "Process p1 already exists."
        );
        assert_eq!(
            CommandError::UnknownProcess("p9".into()).to_string(),
            "Process p9 not found or finished."
        );
    }

    #[test]
    fn commands_before_initialize_are_rejected() {
        let mut shell = Shell::new("/nonexistent/config.txt");
        let mut input = std::io::empty();
        let err = shell
            .dispatch(Command::SchedulerStart, &mut input)
            .unwrap_err();
        assert_eq!(err, CommandError::NotInitialized);
    }
}
