use crate::model::OutputFormat;
use arbitrary::Arbitrary;
use clap::ValueEnum;

#[derive(ValueEnum, Arbitrary, Clone, Copy, PartialEq, Eq, Debug)]
pub enum FormatArg {
    Jpeg,
    Png,
    Webp,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Jpeg => OutputFormat::Jpeg,
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Webp => OutputFormat::Webp,
        }
    }
}

impl std::fmt::Display for FormatArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        OutputFormat::from(*self).fmt(f)
    }
}
