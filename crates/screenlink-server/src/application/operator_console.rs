//! Line-based operator input for the headless server.
//!
//! Each non-empty line is one command in its wire form (`pause`, `kick`,
//! `key_down:Return`, `button:1:640:360`, `resize:320:180`, or free text).
//! `quit` ends the console and triggers shutdown.

use std::io::BufRead;

use screenlink_core::domain::{CommandSender, ShutdownSignal};
use screenlink_core::Command;
use tracing::{debug, warn};

/// What a single console line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(Command),
    Quit,
    Blank,
}

pub fn parse_line(line: &str) -> ConsoleInput {
    match line.trim() {
        "" => ConsoleInput::Blank,
        "quit" | "exit" => ConsoleInput::Quit,
        text => ConsoleInput::Command(Command::from(text)),
    }
}

/// Feeds `input` into the Command Queue until EOF, `quit`, or shutdown.
///
/// Blocking; meant for a dedicated presentation thread.  Queue sends need no
/// runtime.  Returns the number of commands queued.
pub fn run_console<R: BufRead>(input: R, commands: &CommandSender, shutdown: &ShutdownSignal) -> u64 {
    let mut queued = 0;
    for line in input.lines() {
        if shutdown.is_triggered() {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("console read failed: {e}");
                break;
            }
        };
        match parse_line(&line) {
            ConsoleInput::Blank => {}
            ConsoleInput::Quit => {
                shutdown.trigger();
                break;
            }
            ConsoleInput::Command(command) => {
                debug!("operator queued {command}");
                if commands.send(command).is_err() {
                    break;
                }
                queued += 1;
            }
        }
    }
    queued
}
