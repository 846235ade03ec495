use std::path::PathBuf;

/// Where structured JSON logs go, in addition to the console
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum JsonLogBehaviour {
    #[default]
    Disabled,
    File(PathBuf),
}
