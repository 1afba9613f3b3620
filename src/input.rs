//! Operator commands and where they come from.
//!
//! Commands are plain text lines (`add 120 80`, `n`, `save`, ...). The stdin
//! source reads them on a helper thread and hands them to the control loop
//! over a channel; the scripted source replays a fixed schedule.

use std::collections::VecDeque;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    AddPoint { x: i32, y: i32 },
    UndoLastPoint,
    FinalizeZone,
    TogglePause,
    ToggleHelp,
    SaveZones,
    LoadZones,
    Quit,
}

pub const HELP_TEXT: &str = "\
commands:
  add X Y   (a)        add a vertex to the zone being drawn
  undo      (z)        remove the last vertex
  new       (n)        close the drawn polygon as a new zone
  pause     (p)        pause / resume processing
  help      (h)        toggle this help
  save      (s)        save zones
  load      (l)        reload zones from disk
  quit      (q, exit)  stop";

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let word = parts
            .next()
            .ok_or_else(|| anyhow!("empty command"))?
            .to_ascii_lowercase();
        let command = match word.as_str() {
            "add" | "a" => {
                let x = parts.next().ok_or_else(|| anyhow!("add needs X and Y"))?;
                let y = parts.next().ok_or_else(|| anyhow!("add needs X and Y"))?;
                Command::AddPoint {
                    x: x.parse().with_context(|| format!("invalid X '{}'", x))?,
                    y: y.parse().with_context(|| format!("invalid Y '{}'", y))?,
                }
            }
            "undo" | "z" => Command::UndoLastPoint,
            "new" | "finalize" | "n" => Command::FinalizeZone,
            "pause" | "p" => Command::TogglePause,
            "help" | "h" => Command::ToggleHelp,
            "save" | "s" => Command::SaveZones,
            "load" | "l" => Command::LoadZones,
            "quit" | "q" | "exit" => Command::Quit,
            other => bail!("unknown command '{}'", other),
        };
        if let Some(extra) = parts.next() {
            bail!("unexpected argument '{}' for {}", extra, word);
        }
        Ok(command)
    }
}

/// Non-blocking supplier of pending commands.
pub trait CommandSource {
    /// Return everything that arrived since the last call, oldest first.
    fn poll(&mut self) -> Vec<Command>;
}

/// Commands typed on standard input.
pub struct StdinCommands {
    rx: Receiver<Command>,
    closed: bool,
}

impl StdinCommands {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("{:#} (type 'help' for commands)", e),
                }
            }
        });
        Self { rx, closed: false }
    }
}

impl CommandSource for StdinCommands {
    fn poll(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while !self.closed {
            match self.rx.try_recv() {
                Ok(command) => commands.push(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::debug!("stdin closed; no more commands");
                    self.closed = true;
                }
            }
        }
        commands
    }
}

/// Commands delivered on a fixed schedule of poll steps.
///
/// Step `n` is the `n`-th call to `poll` (0-based); a step's commands are
/// delivered together, in script order.
#[derive(Debug, Default)]
pub struct ScriptedCommands {
    pending: VecDeque<(u64, Command)>,
    step: u64,
}

impl ScriptedCommands {
    pub fn new(mut script: Vec<(u64, Command)>) -> Self {
        script.sort_by_key(|(step, _)| *step);
        Self {
            pending: script.into(),
            step: 0,
        }
    }

    /// Parse `STEP COMMAND...` lines. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut script = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (step, rest) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("line {}: expected 'STEP COMMAND'", lineno + 1))?;
            let step: u64 = step
                .parse()
                .with_context(|| format!("line {}: invalid step '{}'", lineno + 1, step))?;
            let command = rest
                .parse()
                .with_context(|| format!("line {}", lineno + 1))?;
            script.push((step, command));
        }
        Ok(Self::new(script))
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl CommandSource for ScriptedCommands {
    fn poll(&mut self) -> Vec<Command> {
        let mut due = Vec::new();
        while let Some((step, _)) = self.pending.front() {
            if *step > self.step {
                break;
            }
            if let Some((_, command)) = self.pending.pop_front() {
                due.push(command);
            }
        }
        self.step += 1;
        due
    }
}

impl CommandSource for Receiver<Command> {
    fn poll(&mut self) -> Vec<Command> {
        self.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(
            "add 12 -4".parse::<Command>().unwrap(),
            Command::AddPoint { x: 12, y: -4 }
        );
        assert_eq!(
            "A 1 2".parse::<Command>().unwrap(),
            Command::AddPoint { x: 1, y: 2 }
        );
        assert_eq!("z".parse::<Command>().unwrap(), Command::UndoLastPoint);
        assert_eq!("finalize".parse::<Command>().unwrap(), Command::FinalizeZone);
        assert_eq!("n".parse::<Command>().unwrap(), Command::FinalizeZone);
        assert_eq!(" pause ".parse::<Command>().unwrap(), Command::TogglePause);
        assert_eq!("h".parse::<Command>().unwrap(), Command::ToggleHelp);
        assert_eq!("save".parse::<Command>().unwrap(), Command::SaveZones);
        assert_eq!("l".parse::<Command>().unwrap(), Command::LoadZones);
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!("".parse::<Command>().is_err());
        assert!("add 1".parse::<Command>().is_err());
        assert!("add x 2".parse::<Command>().is_err());
        assert!("add 1 2 3".parse::<Command>().is_err());
        assert!("jump".parse::<Command>().is_err());
        assert!("quit now".parse::<Command>().is_err());
    }

    #[test]
    fn script_delivers_commands_at_their_step() {
        let mut script = ScriptedCommands::parse(
            "# draw a zone\n0 add 0 0\n0 add 10 0\n2 n\n\n1 add 10 10\n",
        )
        .unwrap();
        assert_eq!(
            script.poll(),
            vec![
                Command::AddPoint { x: 0, y: 0 },
                Command::AddPoint { x: 10, y: 0 }
            ]
        );
        assert_eq!(script.poll(), vec![Command::AddPoint { x: 10, y: 10 }]);
        assert_eq!(script.poll(), vec![Command::FinalizeZone]);
        assert!(script.poll().is_empty());
        assert_eq!(script.remaining(), 0);
    }

    #[test]
    fn script_errors_name_the_line() {
        let err = ScriptedCommands::parse("0 add 1 1\nx quit\n").unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn channel_receiver_is_a_source() {
        let (tx, mut rx) = mpsc::channel();
        tx.send(Command::Quit).unwrap();
        assert_eq!(rx.poll(), vec![Command::Quit]);
        assert!(rx.poll().is_empty());
    }
}
