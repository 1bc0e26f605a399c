//! Line-oriented commands for the terminal host.

use std::str::FromStr;

use anyhow::{bail, Result};

use crate::format::{format_clock, format_total};
use crate::models::{SessionKind, TimerSession};
use crate::timer::{Phase, TimerController, TimerSnapshot};

const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(SessionKind),
    Stop,
    Status,
    Recent(usize),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            bail!("empty command");
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "study" | "s" => Command::Start(SessionKind::Study),
            "break" | "b" => Command::Start(SessionKind::Break),
            "stop" | "x" => Command::Stop,
            "status" | "?" => Command::Status,
            "recent" | "r" => {
                let limit = match parts.next() {
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| anyhow::anyhow!("recent expects a number, got '{raw}'"))?,
                    None => DEFAULT_RECENT_LIMIT,
                };
                Command::Recent(limit)
            }
            "help" | "h" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("unknown command '{other}' (try 'help')"),
        };
        Ok(command)
    }
}

pub const HELP: &str = "commands: study | break | stop | status | recent [n] | help | quit";

/// Run one command and return the text to show. `None` means quit.
pub async fn execute(controller: &TimerController, command: Command) -> Option<String> {
    let output = match command {
        Command::Start(kind) => match controller.start_timer(kind).await {
            Ok(()) => describe(&controller.snapshot().await),
            Err(err) => format!("error: {err}"),
        },
        Command::Stop => match controller.stop_timer().await {
            Ok(()) => describe(&controller.snapshot().await),
            Err(err) => format!("error: {err}"),
        },
        Command::Status => {
            let snapshot = controller.sample_now().await;
            let pending = controller.pending_closes().await.len();
            if pending > 0 {
                format!("{}\n{pending} close(s) waiting to sync", describe(&snapshot))
            } else {
                describe(&snapshot)
            }
        }
        Command::Recent(limit) => match controller.recent_sessions(limit).await {
            Ok(sessions) if sessions.is_empty() => "no sessions yet".to_string(),
            Ok(sessions) => sessions.iter().map(describe_session).collect::<Vec<_>>().join("\n"),
            Err(err) => format!("error: {err}"),
        },
        Command::Help => HELP.to_string(),
        Command::Quit => return None,
    };
    Some(output)
}

pub fn describe(snapshot: &TimerSnapshot) -> String {
    let phase = match snapshot.phase {
        Phase::Idle => "idle",
        Phase::Studying => "studying",
        Phase::Break => "on break",
    };
    format!(
        "{phase} {} | study {} | break {} | {:.0}% study",
        format_clock(snapshot.elapsed_ms as i64),
        format_total(snapshot.total_study_ms as i64),
        format_total(snapshot.total_break_ms as i64),
        snapshot.study_share()
    )
}

fn describe_session(session: &TimerSession) -> String {
    let length = match session.ended_at {
        Some(_) => format_clock(session.duration_ms as i64),
        None => "running".to_string(),
    };
    format!(
        "{} {:<5} {}",
        session.started_at.format("%Y-%m-%d %H:%M"),
        session.kind,
        length
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verbs_and_aliases() {
        assert_eq!("study".parse::<Command>().unwrap(), Command::Start(SessionKind::Study));
        assert_eq!("B".parse::<Command>().unwrap(), Command::Start(SessionKind::Break));
        assert_eq!(" stop ".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!("recent".parse::<Command>().unwrap(), Command::Recent(DEFAULT_RECENT_LIMIT));
        assert_eq!("recent 3".parse::<Command>().unwrap(), Command::Recent(3));
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_unknown_and_malformed_input() {
        assert!("".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
        assert!("recent lots".parse::<Command>().is_err());
    }

    #[test]
    fn describes_running_snapshot() {
        let snapshot = TimerSnapshot {
            phase: Phase::Studying,
            elapsed_ms: 65_000,
            total_study_ms: 35_000,
            total_break_ms: 0,
        };
        assert_eq!(describe(&snapshot), "studying 00:01:05 | study 0:00 | break 0:00 | 100% study");
    }
}
