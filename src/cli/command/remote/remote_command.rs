use crate::cli::command::remote::remote_disable_command::RemoteDisableArgs;
use crate::cli::command::remote::remote_enable_command::RemoteEnableArgs;
use crate::cli::command::remote::remote_set_command::RemoteSetArgs;
use crate::cli::command::remote::remote_show_command::RemoteShowArgs;
use crate::cli::command::remote::remote_test_command::RemoteTestArgs;
use crate::cli::to_args::ToArgs;
use arbitrary::Arbitrary;
use clap::Subcommand;
use std::ffi::OsString;

#[derive(Subcommand, Clone, Arbitrary, PartialEq, Debug)]
pub enum RemoteCommand {
    /// Show the current remote settings (secret masked)
    Show(RemoteShowArgs),

    /// Update credentials, region, buckets or endpoint
    Set(RemoteSetArgs),

    /// Check connectivity and turn remote offload on
    Enable(RemoteEnableArgs),

    /// Turn remote offload off
    Disable(RemoteDisableArgs),

    /// Check connectivity without changing anything
    Test(RemoteTestArgs),
}

impl RemoteCommand {
    pub fn invoke(self) -> eyre::Result<()> {
        match self {
            RemoteCommand::Show(args) => args.invoke(),
            RemoteCommand::Set(args) => args.invoke(),
            RemoteCommand::Enable(args) => args.invoke(),
            RemoteCommand::Disable(args) => args.invoke(),
            RemoteCommand::Test(args) => args.invoke(),
        }
    }
}

impl ToArgs for RemoteCommand {
    fn to_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        match self {
            RemoteCommand::Show(a) => {
                args.push("show".into());
                args.extend(a.to_args());
            }
            RemoteCommand::Set(a) => {
                args.push("set".into());
                args.extend(a.to_args());
            }
            RemoteCommand::Enable(a) => {
                args.push("enable".into());
                args.extend(a.to_args());
            }
            RemoteCommand::Disable(a) => {
                args.push("disable".into());
                args.extend(a.to_args());
            }
            RemoteCommand::Test(a) => {
                args.push("test".into());
                args.extend(a.to_args());
            }
        }
        args
    }
}
