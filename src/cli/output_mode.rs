use arbitrary::Arbitrary;
use clap::ValueEnum;

/// How command reports are printed
#[derive(ValueEnum, Arbitrary, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum OutputMode {
    #[default]
    Auto,
    Json,
    Pretty,
}

impl OutputMode {
    /// `Auto` becomes `Pretty` on a terminal and `Json` otherwise.
    #[must_use]
    pub fn resolve(self) -> OutputMode {
        match self {
            OutputMode::Auto => {
                if atty::is(atty::Stream::Stdout) {
                    OutputMode::Pretty
                } else {
                    OutputMode::Json
                }
            }
            other => other,
        }
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Json => write!(f, "json"),
            Self::Pretty => write!(f, "pretty"),
        }
    }
}
