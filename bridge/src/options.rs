//! Engine options the GUI can set with `setoption`

use std::fmt;
use std::str::FromStr;

use chess::Variant;
use lichess_client::{ColorChoice, TimeControl};
use uci::{OptionKind, OptionSpec};

pub const DEFAULT_OPPONENT: &str = "maia1";

const MINUTES: (i64, i64, i64) = (5, 0, 180);
const INCREMENT: (i64, i64, i64) = (3, 0, 180);
const DAYS: (i64, i64, i64) = (1, 1, 14);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeMode {
    #[default]
    Realtime,
    Correspondence,
    Unlimited,
}

impl TimeMode {
    pub const ALL: [TimeMode; 3] = [
        TimeMode::Realtime,
        TimeMode::Correspondence,
        TimeMode::Unlimited,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeMode::Realtime => "realtime",
            TimeMode::Correspondence => "correspondence",
            TimeMode::Unlimited => "unlimited",
        }
    }
}

impl FromStr for TimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown time mode: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionError {
    #[error("Unknown option: {0}")]
    Unknown(String),
    #[error("Invalid value {value:?} for option {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// Current option values.
#[derive(Clone, PartialEq, Eq)]
pub struct Options {
    pub token: String,
    pub opponent: String,
    pub play_as: ColorChoice,
    pub variant: Variant,
    pub time_mode: TimeMode,
    pub minutes: u32,
    pub increment: u32,
    pub days: u32,
    pub rated: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            token: String::new(),
            opponent: DEFAULT_OPPONENT.to_string(),
            play_as: ColorChoice::Random,
            variant: Variant::Standard,
            time_mode: TimeMode::Realtime,
            minutes: MINUTES.0 as u32,
            increment: INCREMENT.0 as u32,
            days: DAYS.0 as u32,
            rated: false,
        }
    }
}

// The token must never reach a log line.
impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("opponent", &self.opponent)
            .field("play_as", &self.play_as)
            .field("variant", &self.variant)
            .field("time_mode", &self.time_mode)
            .field("minutes", &self.minutes)
            .field("increment", &self.increment)
            .field("days", &self.days)
            .field("rated", &self.rated)
            .finish()
    }
}

impl Options {
    /// Apply one `setoption`. Names match case-insensitively; numbers are
    /// clamped into range. On error the options are unchanged.
    pub fn apply(&mut self, name: &str, value: Option<&str>) -> Result<(), OptionError> {
        let value = value.unwrap_or("").trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "lichesstoken" => self.token = value.to_string(),
            "opponent" => self.opponent = value.to_string(),
            "playas" => self.play_as = parse_value("PlayAs", value)?,
            "variant" => self.variant = parse_value("Variant", value)?,
            "timemode" => self.time_mode = parse_value("TimeMode", value)?,
            "minutes" => self.minutes = parse_spin("Minutes", value, MINUTES)?,
            "increment" => self.increment = parse_spin("Increment", value, INCREMENT)?,
            "days" => self.days = parse_spin("Days", value, DAYS)?,
            "rated" => {
                self.rated = match value.to_ascii_lowercase().as_str() {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(OptionError::InvalidValue {
                            name: "Rated",
                            value: value.to_string(),
                        })
                    }
                }
            }
            _ => return Err(OptionError::Unknown(name.to_string())),
        }
        Ok(())
    }

    /// The first option that must be set before a game can start.
    pub fn missing_for_challenge(&self) -> Option<&'static str> {
        if self.token.trim().is_empty() {
            Some("LichessToken")
        } else if self.opponent.trim().is_empty() {
            Some("Opponent")
        } else {
            None
        }
    }

    pub fn time_control(&self) -> TimeControl {
        match self.time_mode {
            TimeMode::Realtime => TimeControl::Realtime {
                limit_secs: self.minutes * 60,
                increment_secs: self.increment,
            },
            TimeMode::Correspondence => TimeControl::Correspondence { days: self.days },
            TimeMode::Unlimited => TimeControl::Unlimited,
        }
    }
}

fn parse_value<T: FromStr>(name: &'static str, value: &str) -> Result<T, OptionError> {
    value.parse().map_err(|_| OptionError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_spin(
    name: &'static str,
    value: &str,
    (_, min, max): (i64, i64, i64),
) -> Result<u32, OptionError> {
    let n: i64 = parse_value(name, value)?;
    // Both bounds fit in u32.
    Ok(n.clamp(min, max) as u32)
}

/// Option lines sent in reply to `uci`.
pub fn option_specs() -> Vec<OptionSpec> {
    let spin = |(default, min, max): (i64, i64, i64)| OptionKind::Spin { default, min, max };
    let combo = |default: &str, vars: Vec<&str>| OptionKind::Combo {
        default: default.to_string(),
        vars: vars.into_iter().map(str::to_string).collect(),
    };

    vec![
        OptionSpec::new(
            "LichessToken",
            OptionKind::String {
                default: String::new(),
            },
        ),
        OptionSpec::new(
            "Opponent",
            OptionKind::String {
                default: DEFAULT_OPPONENT.to_string(),
            },
        ),
        OptionSpec::new("PlayAs", combo("random", vec!["white", "black", "random"])),
        OptionSpec::new(
            "Variant",
            combo(
                Variant::Standard.as_key(),
                Variant::ALL.iter().map(|v| v.as_key()).collect(),
            ),
        ),
        OptionSpec::new(
            "TimeMode",
            combo(
                TimeMode::Realtime.as_str(),
                TimeMode::ALL.iter().map(|m| m.as_str()).collect(),
            ),
        ),
        OptionSpec::new("Minutes", spin(MINUTES)),
        OptionSpec::new("Increment", spin(INCREMENT)),
        OptionSpec::new("Days", spin(DAYS)),
        OptionSpec::new("Rated", OptionKind::Check { default: false }),
    ]
}
