use std::fmt;

/// An option advertised in reply to `uci`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: String,
    pub kind: OptionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionKind {
    Check { default: bool },
    Spin { default: i64, min: i64, max: i64 },
    Combo { default: String, vars: Vec<String> },
    String { default: String },
    Button,
}

impl OptionSpec {
    pub fn new(name: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for OptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "option name {} type ", self.name)?;
        match &self.kind {
            OptionKind::Check { default } => write!(f, "check default {}", default),
            OptionKind::Spin { default, min, max } => {
                write!(f, "spin default {} min {} max {}", default, min, max)
            }
            OptionKind::Combo { default, vars } => {
                write!(f, "combo default {}", default)?;
                for var in vars {
                    write!(f, " var {}", var)?;
                }
                Ok(())
            }
            // An empty string default is spelled "<empty>" by the UCI protocol,
            // but most GUIs only understand a bare trailing "default".
            OptionKind::String { default } if default.is_empty() => f.write_str("string default"),
            OptionKind::String { default } => write!(f, "string default {}", default),
            OptionKind::Button => f.write_str("button"),
        }
    }
}
