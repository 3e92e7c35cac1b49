//! Operator console: one text command per line on stdin.

use crate::model::{ControllerEvent, InfoEvent, DAY_NAMES, NUM_DAYS, NUM_SLOTS};
use crate::orchestrator::UiCommand;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

pub(crate) const HELP: &str = "\
Commands:
  open                          Start apps now
  close                         Quit apps now
  reload                        Reload schedule file
  apps                          Reload app list
  save                          Save schedule
  test                          Toggle test mode (manual clock)
  slot +N | slot -N             Step test time by half hours
  day +N | day -N               Step test day
  toggle <day> <HH:MM>          Flip one cell
  paint <day> <HH:MM> <HH:MM> on|off
                                Set a range of cells (inclusive)
  gaps [<day>]                  Show schedule gaps
  status                        Show current state
  help                          Show this help
  quit                          Exit
Days: mon..sun or 0..6. Times: HH:00 / HH:30, or a slot number 0..47.";

fn parse_day(s: &str) -> Result<usize, String> {
    if let Ok(n) = s.parse::<usize>() {
        return if n < NUM_DAYS {
            Ok(n)
        } else {
            Err(format!("day {n} out of range 0..{}", NUM_DAYS - 1))
        };
    }
    let lower = s.to_ascii_lowercase();
    DAY_NAMES
        .iter()
        .position(|d| lower.starts_with(&d.to_ascii_lowercase()))
        .ok_or_else(|| format!("unknown day {s:?}"))
}

/// Parse `HH:MM` on a half-hour boundary, or a bare slot number.
pub(crate) fn parse_slot(s: &str) -> Result<usize, String> {
    let slot = match s.split_once(':') {
        Some((h, m)) => {
            let h: usize = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
            let m: usize = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
            if h > 23 || (m != 0 && m != 30) {
                return Err(format!("{s:?} is not a half-hour boundary"));
            }
            h * 2 + m / 30
        }
        None => s.parse().map_err(|_| format!("bad time {s:?}"))?,
    };
    if slot < NUM_SLOTS {
        Ok(slot)
    } else {
        Err(format!("slot {slot} out of range 0..{}", NUM_SLOTS - 1))
    }
}

fn parse_delta(s: Option<&str>) -> Result<i32, String> {
    match s {
        None => Ok(1),
        Some(s) => s
            .trim_start_matches('+')
            .parse()
            .map_err(|_| format!("bad step {s:?}")),
    }
}

/// `Ok(None)` for a blank line.
pub(crate) fn parse_command(line: &str) -> Result<Option<UiCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let cmd = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("open", []) => UiCommand::Open,
        ("close", []) => UiCommand::Close,
        ("reload", []) => UiCommand::ReloadSchedule,
        ("apps", []) => UiCommand::ReloadRoster,
        ("save", []) => UiCommand::Save,
        ("test", []) => UiCommand::ToggleClockMode,
        ("status", []) => UiCommand::Status,
        ("quit" | "exit", []) => UiCommand::Quit,
        ("slot", [] | [_]) => UiCommand::StepSlot(parse_delta(args.first().copied())?),
        ("day", [] | [_]) => UiCommand::StepDay(parse_delta(args.first().copied())?),
        ("toggle", [day, time]) => UiCommand::Toggle {
            day: parse_day(day)?,
            slot: parse_slot(time)?,
        },
        ("paint", [day, from, to, value]) => UiCommand::Paint {
            day: parse_day(day)?,
            from: parse_slot(from)?,
            to: parse_slot(to)?,
            value: match value.to_ascii_lowercase().as_str() {
                "on" | "active" | "1" => true,
                "off" | "dark" | "0" => false,
                other => return Err(format!("expected on/off, got {other:?}")),
            },
        },
        ("gaps", []) => UiCommand::Gaps(None),
        ("gaps", [day]) => UiCommand::Gaps(Some(parse_day(day)?)),
        ("help" | "?", _) => return Err(HELP.to_string()),
        (v, _) => return Err(format!("unknown command or arguments: {v:?} (try 'help')")),
    };
    Ok(Some(cmd))
}

/// Read commands from stdin until EOF or `quit`. Parse errors go back to the
/// operator as info events.
pub(crate) async fn run_console(
    cmd_tx: UnboundedSender<UiCommand>,
    event_tx: UnboundedSender<ControllerEvent>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                let _ = event_tx.send(ControllerEvent::Info(InfoEvent::Failed(format!(
                    "stdin: {e}"
                ))));
                break;
            }
        };
        match parse_command(&line) {
            Ok(Some(cmd)) => {
                let quit = cmd == UiCommand::Quit;
                if cmd_tx.send(cmd).is_err() || quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(msg) => {
                let _ = event_tx.send(ControllerEvent::Info(InfoEvent::Message(msg)));
            }
        }
    }
}
