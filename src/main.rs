//! Emulator entry point: an interactive shell over the scheduler.

use std::io;
use std::process::ExitCode;

use schedsim_rs::shell::Shell;

/// Configuration file looked up in the working directory.
const CONFIG_FILE: &str = "config.txt";

fn main() -> ExitCode {
    let stdin = io::stdin();
    Shell::new(CONFIG_FILE).run(stdin.lock())
}
