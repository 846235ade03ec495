use crate::cli::json_log_behaviour::JsonLogBehaviour;
use crate::cli::to_args::ToArgs;
use arbitrary::Arbitrary;
use clap::Args;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::Level;

#[derive(Args, Arbitrary, Clone, PartialEq, Debug, Default)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[clap(long, global = true)]
    pub debug: bool,

    /// Also write JSON logs to this file
    #[clap(long, global = true)]
    #[arbitrary(value = None)]
    pub log_file: Option<PathBuf>,
}

impl GlobalArgs {
    #[must_use]
    pub fn log_level(&self) -> Level {
        if self.debug { Level::DEBUG } else { Level::INFO }
    }

    #[must_use]
    pub fn json_log_behaviour(&self) -> JsonLogBehaviour {
        match &self.log_file {
            Some(path) => JsonLogBehaviour::File(path.clone()),
            None => JsonLogBehaviour::Disabled,
        }
    }
}

impl ToArgs for GlobalArgs {
    fn to_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if self.debug {
            args.push("--debug".into());
        }
        if let Some(path) = &self.log_file {
            args.push("--log-file".into());
            args.push(path.into());
        }
        args
    }
}
