//! Line-based text front end for switching modes.

use crate::app::TimerModel;
use crate::models::format_remaining;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("Missing argument for '{0}'")]
    MissingArgument(&'static str),
    #[error("Expected a number of minutes, got '{0}'")]
    InvalidMinutes(String),
    #[error("Expected 'on' or 'off', got '{0}'")]
    InvalidToggle(String),
}

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Select(String),
    Reset,
    Status,
    Notify(bool),
    /// Change a mode's budget, in minutes.
    SetTotal(String, f64),
    /// Correct a mode's used time, in minutes.
    SetUsed(String, f64),
    Help,
    Quit,
}

/// What the console loop should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Quit,
}

const HELP: &str = "\
Commands:
  <mode> | select <mode>   switch to a mode
  status                   show all timers
  reset                    zero all timers
  notify on|off            toggle expiry notifications
  total <mode> <minutes>   change a mode's budget
  used <mode> <minutes>    correct a mode's used time
  quit                     save and exit";

/// Parses a command line. Anything that isn't a keyword selects a mode.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    let command = match keyword {
        "status" => Command::Status,
        "reset" => Command::Reset,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "select" if rest.is_empty() => return Err(CommandError::MissingArgument("select")),
        "select" => Command::Select(rest.to_string()),
        "notify" => match rest {
            "on" => Command::Notify(true),
            "off" => Command::Notify(false),
            "" => return Err(CommandError::MissingArgument("notify")),
            other => return Err(CommandError::InvalidToggle(other.to_string())),
        },
        "total" => {
            let (name, minutes) = mode_and_minutes("total", rest)?;
            Command::SetTotal(name, minutes)
        }
        "used" => {
            let (name, minutes) = mode_and_minutes("used", rest)?;
            Command::SetUsed(name, minutes)
        }
        _ => Command::Select(line.to_string()),
    };
    Ok(Some(command))
}

fn mode_and_minutes(keyword: &'static str, rest: &str) -> Result<(String, f64), CommandError> {
    let (name, minutes) = rest
        .rsplit_once(char::is_whitespace)
        .ok_or(CommandError::MissingArgument(keyword))?;
    let minutes = match minutes.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => return Err(CommandError::InvalidMinutes(minutes.to_string())),
    };
    Ok((name.trim().to_string(), minutes))
}

/// Applies a command to the model.
pub fn execute(model: &mut TimerModel, command: Command) -> Reply {
    let result = match command {
        Command::Select(name) => model
            .select(&name)
            .map(|()| format!("Switched to {}", model.selected().name())),
        Command::Reset => {
            model.reset();
            Ok(format!("Timers reset, now in {}", model.selected().name()))
        }
        Command::Status => Ok(status(model)),
        Command::Notify(enabled) => {
            model.set_notify_enabled(enabled);
            Ok(format!(
                "Notifications {}",
                if enabled { "enabled" } else { "disabled" }
            ))
        }
        Command::SetTotal(name, minutes) => model
            .set_total(&name, minutes * 60.0)
            .map(|()| format!("{} budget set to {} minutes", name, minutes)),
        Command::SetUsed(name, minutes) => model
            .set_used(&name, minutes * 60.0)
            .map(|()| format!("{} used time set to {} minutes", name, minutes)),
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => return Reply::Quit,
    };

    match result {
        Ok(text) => Reply::Text(text),
        Err(e) => Reply::Text(e.to_string()),
    }
}

/// One line per mode; `*` marks the selected mode, `>` the active one.
pub fn status(model: &TimerModel) -> String {
    model
        .modes()
        .iter()
        .map(|mode| {
            let marker = if mode.name() == model.selected().name() {
                "*"
            } else if mode.name() == model.active().name() {
                ">"
            } else {
                " "
            };
            if mode.is_visible() {
                format!("{} {}", marker, mode)
            } else {
                format!("{} {} ({} used)", marker, mode, format_remaining(mode.used()))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads commands until end of input or `quit`.
pub fn run_console(
    model: &Mutex<TimerModel>,
    shutdown: &AtomicBool,
    input: impl BufRead,
    mut output: impl Write,
) -> std::io::Result<()> {
    for line in input.lines() {
        let line = line?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(output, "{}", e)?;
                continue;
            }
        };

        let reply = {
            let mut model = match model.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            execute(&mut model, command)
        };

        match reply {
            Reply::Text(text) => writeln!(output, "{}", text)?,
            Reply::Quit => {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
    Ok(())
}
