//! Interactive text commands.
//!
//! Each line is parsed into an [`Event`] and posted on
//! [`Topic::RemoteCmd`], the same path remote clients use.
//!
//! ```text
//! connect | disconnect | capture | ignore | state | mode | stop
//! download on|off
//! low_latency on|off
//! get <setting>              shutter aperture iso auto_iso battery focal focus
//!                            nr vr target program meter all
//! choices <setting>          shutter aperture iso
//! set <setting> <value>      shutter <us> | aperture <f-number> | iso <n>
//!                            auto_iso|nr|vr on|off | target <name> | focus next
//! interval <ms> <count>
//! help | quit
//! ```
//!
//! Everything but `help` and `quit` goes through a `clap` command table.

use camctl_common::events::{Event, Topic};
use camctl_runtime::broker::EventBroker;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,

    #[error(transparent)]
    Parse(#[from] clap::Error),
}

/// One console line.
#[derive(Parser, Debug)]
#[command(name = "camctl>")]
#[command(no_binary_name = true)]
#[command(disable_help_flag = true, disable_help_subcommand = true, disable_version_flag = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the camera
    Connect,
    /// Disconnect from the camera
    Disconnect,
    /// Take one picture
    Capture,
    /// Leave the error state without reconnecting
    Ignore,
    /// Report the camera controller state
    State,
    /// Report the current mode
    Mode,
    /// Stop the running mode
    Stop,
    /// Download each picture after capture
    Download { enabled: Switch },
    /// Skip the configuration refresh on ready
    #[command(name = "low_latency")]
    LowLatency { enabled: Switch },
    /// Read a setting
    Get { setting: Setting },
    /// List the values a setting accepts
    Choices { setting: ChoiceSetting },
    /// Change a setting
    Set {
        #[command(subcommand)]
        assignment: Assignment,
    },
    /// Start the intervalometer
    Interval {
        #[arg(allow_negative_numbers = true)]
        ms: i32,
        count: i32,
    },
}

#[derive(Subcommand, Debug)]
enum Assignment {
    /// Exposure time in microseconds
    Shutter {
        #[arg(allow_negative_numbers = true)]
        us: i32,
    },
    /// F-number such as 8, 5.6 or f/2.8
    Aperture {
        #[arg(value_parser = parse_f_number)]
        f_number: i32,
    },
    Iso { iso: i32 },
    #[command(name = "auto_iso")]
    AutoIso { enabled: Switch },
    /// Long exposure noise reduction
    Nr { enabled: Switch },
    /// Vibration reduction
    Vr { enabled: Switch },
    Target {
        #[arg(required = true)]
        name: Vec<String>,
    },
    Focus { step: FocusStep },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Switch {
    #[value(alias = "true", alias = "1")]
    On,
    #[value(alias = "false", alias = "0")]
    Off,
}

impl From<Switch> for bool {
    fn from(s: Switch) -> bool {
        matches!(s, Switch::On)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FocusStep {
    Next,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Setting {
    Shutter,
    Aperture,
    Iso,
    #[value(name = "auto_iso")]
    AutoIso,
    Battery,
    Focal,
    Focus,
    Nr,
    Vr,
    Target,
    Program,
    Meter,
    All,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ChoiceSetting {
    Shutter,
    Aperture,
    Iso,
}

/// F-number as typed (`8`, `5.6`, `f/2.8`, `F/8`) to hundredths.
fn parse_f_number(value: &str) -> Result<i32, String> {
    let lower = value.to_ascii_lowercase();
    let digits = lower
        .strip_prefix("f/")
        .or_else(|| lower.strip_prefix('f'))
        .unwrap_or(&lower);
    let f: f32 = digits.parse().map_err(|_| format!("not an f-number: {value}"))?;
    if !(0.5..=128.0).contains(&f) {
        return Err(format!("f-number out of range: {value}"));
    }
    Ok((f * 100.0).round() as i32)
}

impl Setting {
    fn request(self) -> Event {
        match self {
            Setting::Shutter => Event::ConfigGetShutterSpeed,
            Setting::Aperture => Event::ConfigGetAperture,
            Setting::Iso => Event::ConfigGetIso,
            Setting::AutoIso => Event::ConfigGetAutoIso,
            Setting::Battery => Event::ConfigGetBattery,
            Setting::Focal => Event::ConfigGetFocalLength,
            Setting::Focus => Event::ConfigGetFocusMode,
            Setting::Nr => Event::ConfigGetLongExpNr,
            Setting::Vr => Event::ConfigGetVibRed,
            Setting::Target => Event::ConfigGetCaptureTarget,
            Setting::Program => Event::ConfigGetExposureProgram,
            Setting::Meter => Event::ConfigGetLightMeter,
            Setting::All => Event::ConfigGetAll,
        }
    }
}

impl ChoiceSetting {
    fn request(self) -> Event {
        match self {
            ChoiceSetting::Shutter => Event::ConfigGetChoicesShutterSpeed,
            ChoiceSetting::Aperture => Event::ConfigGetChoicesAperture,
            ChoiceSetting::Iso => Event::ConfigGetChoicesIso,
        }
    }
}

impl From<Assignment> for Event {
    fn from(assignment: Assignment) -> Event {
        match assignment {
            Assignment::Shutter { us } => Event::ConfigSetShutterSpeed { shutter_speed: us },
            Assignment::Aperture { f_number } => Event::ConfigSetAperture { aperture: f_number },
            Assignment::Iso { iso } => Event::ConfigSetIso { iso },
            Assignment::AutoIso { enabled } => Event::ConfigSetAutoIso { auto_iso: enabled.into() },
            Assignment::Nr { enabled } => Event::ConfigSetLongExpNr { long_exp_nr: enabled.into() },
            Assignment::Vr { enabled } => Event::ConfigSetVibRed { vr: enabled.into() },
            Assignment::Target { name } => Event::ConfigSetCaptureTarget { target: name.join(" ") },
            Assignment::Focus { step: FocusStep::Next } => Event::ConfigNextFocusMode,
        }
    }
}

impl From<Command> for Event {
    fn from(command: Command) -> Event {
        match command {
            Command::Connect => Event::CameraCmdConnect,
            Command::Disconnect => Event::CameraCmdDisconnect,
            Command::Capture => Event::CameraCmdCapture,
            Command::Ignore => Event::CameraIgnoreError,
            Command::State => Event::GetCameraControllerState,
            Command::Mode => Event::GetCurrentMode,
            Command::Stop => Event::ModeStop,
            Command::Download { enabled } => Event::CameraCmdDownload { download: enabled.into() },
            Command::LowLatency { enabled } => Event::CameraCmdLowLatency {
                low_latency: enabled.into(),
            },
            Command::Get { setting } => setting.request(),
            Command::Choices { setting } => setting.request(),
            Command::Set { assignment } => assignment.into(),
            Command::Interval { ms, count } => Event::ModeIntervalometer {
                intervalms: ms,
                total_captures: count,
            },
        }
    }
}

/// Translate one command line into an event.
pub fn parse_command(line: &str) -> Result<Event, ConsoleError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Err(ConsoleError::Empty);
    }
    let parsed = Line::try_parse_from(words)?;
    Ok(parsed.command.into())
}

/// Read commands until EOF, `quit`, or `running` is cleared.
///
/// `quit` clears `running`, which shuts the whole application down.
pub fn run_console<R: BufRead>(input: R, broker: &EventBroker, running: &AtomicBool) -> io::Result<()> {
    for line in input.lines() {
        if !running.load(Ordering::Acquire) {
            break;
        }
        let line = line?;
        let line = line.trim();
        match line {
            "" => continue,
            "help" => {
                println!("{}", Line::command().render_help());
                continue;
            }
            "quit" | "exit" => {
                info!("quit requested from console");
                running.store(false, Ordering::Release);
                break;
            }
            _ => {}
        }
        match parse_command(line) {
            Ok(event) => broker.post(event, Topic::RemoteCmd),
            Err(ConsoleError::Parse(e)) => warn!(kind = ?e.kind(), "{}", e.render().to_string().trim_end()),
            Err(e) => warn!("{e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camctl_runtime::mailbox::{Mailbox, Message};
    use clap::error::ErrorKind;
    use std::io::Cursor;
    use std::sync::Arc;

    fn parsed(line: &str) -> Event {
        parse_command(line).unwrap()
    }

    fn rejected(line: &str) -> ErrorKind {
        match parse_command(line) {
            Err(ConsoleError::Parse(e)) => e.kind(),
            other => panic!("{line:?} parsed as {other:?}"),
        }
    }

    #[test]
    fn parses_plain_commands() {
        assert_eq!(parsed("capture"), Event::CameraCmdCapture);
        assert_eq!(parsed("  state "), Event::GetCameraControllerState);
        assert_eq!(parsed("download on"), Event::CameraCmdDownload { download: true });
        assert_eq!(
            parsed("low_latency false"),
            Event::CameraCmdLowLatency { low_latency: false }
        );
        assert_eq!(
            parsed("interval 2000 15"),
            Event::ModeIntervalometer { intervalms: 2000, total_captures: 15 }
        );
        assert_eq!(
            parsed("interval -1 3"),
            Event::ModeIntervalometer { intervalms: -1, total_captures: 3 }
        );
    }

    #[test]
    fn parses_settings() {
        assert_eq!(parsed("get all"), Event::ConfigGetAll);
        assert_eq!(parsed("get auto_iso"), Event::ConfigGetAutoIso);
        assert_eq!(parsed("choices iso"), Event::ConfigGetChoicesIso);
        assert_eq!(parsed("set iso 400"), Event::ConfigSetIso { iso: 400 });
        assert_eq!(parsed("set vr off"), Event::ConfigSetVibRed { vr: false });
        assert_eq!(
            parsed("set target Memory card"),
            Event::ConfigSetCaptureTarget { target: "Memory card".to_string() }
        );
        assert_eq!(parsed("set focus next"), Event::ConfigNextFocusMode);
    }

    #[test]
    fn f_number_accepts_either_prefix_case() {
        assert_eq!(parsed("set aperture 8"), Event::ConfigSetAperture { aperture: 800 });
        assert_eq!(parsed("set aperture f/5.6"), Event::ConfigSetAperture { aperture: 560 });
        assert_eq!(parsed("set aperture F/8"), Event::ConfigSetAperture { aperture: 800 });
        assert_eq!(parsed("set aperture F2.8"), Event::ConfigSetAperture { aperture: 280 });
        assert_eq!(parse_f_number("f/0.1").ok(), None);
        assert_eq!(parse_f_number("/8").ok(), None);
    }

    #[test]
    fn reports_bad_input() {
        assert!(matches!(parse_command("   "), Err(ConsoleError::Empty)));
        assert_eq!(rejected("shoot"), ErrorKind::InvalidSubcommand);
        assert_eq!(rejected("get zoom"), ErrorKind::InvalidValue);
        assert_eq!(rejected("set iso"), ErrorKind::MissingRequiredArgument);
        assert_eq!(rejected("set iso loud"), ErrorKind::ValueValidation);
        assert_eq!(rejected("low_latency maybe"), ErrorKind::InvalidValue);
    }

    #[test]
    fn command_table_is_consistent() {
        Line::command().debug_assert();
    }

    #[test]
    fn console_posts_commands_and_quits() {
        let broker = EventBroker::new();
        let remote: Arc<Mailbox<Message>> = Arc::new(Mailbox::new());
        broker.subscribe(remote.clone(), Topic::RemoteCmd);
        let running = AtomicBool::new(true);

        let input = Cursor::new("connect\n\nbogus\nset iso 800\nquit\ncapture\n");
        run_console(input, &broker, &running).unwrap();

        assert!(!running.load(Ordering::Acquire));
        assert_eq!(remote.len(), 2);
    }
}
