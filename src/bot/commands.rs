use thiserror::Error;

/// Step used by `vup` / `vdown` when none is given.
pub const DEFAULT_VOLUME_STEP: i64 = 10;

/// A prefix command after parsing. Names are case-sensitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join,
    Leave,
    Play(String),
    Pause,
    Resume,
    Skip,
    Stop,
    NowPlaying,
    Queue,
    Volume(i64),
    VolumeUp(i64),
    VolumeDown(i64),
    Bass(String),
    Speed(f64),
    ResetFilters,
    Nodes,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("command `{0}` is not found")]
    Unknown(String),
    #[error("missing argument, usage: `{usage}`")]
    MissingArgument { usage: &'static str },
    #[error("`{value}` is not valid here, usage: `{usage}`")]
    InvalidArgument { value: String, usage: &'static str },
}

const PLAY_USAGE: &str = "play <query or url>";
const VOLUME_USAGE: &str = "volume <0-150>";
const VUP_USAGE: &str = "vup [step]";
const VDOWN_USAGE: &str = "vdown [step]";
const BASS_USAGE: &str = "bass <off|light|medium|hard|extreme>";
const SPEED_USAGE: &str = "speed <0.5-2.0>";

/// Parses `content` if it starts with `prefix`.
///
/// Returns `None` for ordinary chat messages.
pub fn parse(prefix: &str, content: &str) -> Option<Result<Command, ParseError>> {
    let body = content.strip_prefix(prefix)?;
    let body = body.trim_start();
    if body.is_empty() {
        return None;
    }

    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    let first_arg = rest.split_whitespace().next();

    let command = match name {
        "join" => Command::Join,
        "leave" => Command::Leave,
        "play" => {
            if rest.is_empty() {
                return Some(Err(ParseError::MissingArgument { usage: PLAY_USAGE }));
            }
            Command::Play(rest.to_string())
        }
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "skip" => Command::Skip,
        "stop" => Command::Stop,
        "np" => Command::NowPlaying,
        "queue" => Command::Queue,
        "volume" | "vol" => match required(first_arg, VOLUME_USAGE) {
            Ok(level) => Command::Volume(level),
            Err(e) => return Some(Err(e)),
        },
        "vup" => match optional(first_arg, VUP_USAGE) {
            Ok(step) => Command::VolumeUp(step),
            Err(e) => return Some(Err(e)),
        },
        "vdown" => match optional(first_arg, VDOWN_USAGE) {
            Ok(step) => Command::VolumeDown(step),
            Err(e) => return Some(Err(e)),
        },
        "bass" => match first_arg {
            Some(level) => Command::Bass(level.to_string()),
            None => return Some(Err(ParseError::MissingArgument { usage: BASS_USAGE })),
        },
        "speed" => match speed(first_arg) {
            Ok(rate) => Command::Speed(rate),
            Err(e) => return Some(Err(e)),
        },
        "fxreset" | "clearfx" | "fxoff" | "resetfx" => Command::ResetFilters,
        "nodes" => Command::Nodes,
        other => return Some(Err(ParseError::Unknown(other.to_string()))),
    };

    Some(Ok(command))
}

fn required(arg: Option<&str>, usage: &'static str) -> Result<i64, ParseError> {
    let value = arg.ok_or(ParseError::MissingArgument { usage })?;
    if let Ok(number) = value.parse() {
        return Ok(number);
    }

    // enteros fuera de rango se saturan; el volumen se recorta después
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(if value.starts_with('-') { i64::MIN } else { i64::MAX });
    }

    Err(ParseError::InvalidArgument {
        value: value.to_string(),
        usage,
    })
}

fn optional(arg: Option<&str>, usage: &'static str) -> Result<i64, ParseError> {
    match arg {
        Some(_) => required(arg, usage),
        None => Ok(DEFAULT_VOLUME_STEP),
    }
}

fn speed(arg: Option<&str>) -> Result<f64, ParseError> {
    let value = arg.ok_or(ParseError::MissingArgument { usage: SPEED_USAGE })?;
    match value.parse::<f64>() {
        Ok(rate) if rate.is_finite() => Ok(rate),
        _ => Err(ParseError::InvalidArgument {
            value: value.to_string(),
            usage: SPEED_USAGE,
        }),
    }
}
