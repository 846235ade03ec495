pub mod remote_command;
pub mod remote_disable_command;
pub mod remote_enable_command;
pub mod remote_set_command;
pub mod remote_show_command;
pub mod remote_test_command;

use crate::cli::command::remote::remote_command::RemoteCommand;
use crate::cli::to_args::ToArgs;
use crate::remote::s3::S3Store;
use crate::remote::settings::ConnectionCheckError;
use crate::remote::settings::RemoteSettings;
use arbitrary::Arbitrary;
use clap::Args;
use std::ffi::OsString;

#[derive(Args, Arbitrary, PartialEq, Debug)]
pub struct RemoteArgs {
    #[clap(subcommand)]
    pub command: RemoteCommand,
}

impl RemoteArgs {
    pub fn invoke(self) -> eyre::Result<()> {
        self.command.invoke()
    }
}

impl ToArgs for RemoteArgs {
    fn to_args(&self) -> Vec<OsString> {
        self.command.to_args()
    }
}

/// Store client for a connectivity check; construction failures read as configuration errors.
pub(crate) fn store_for_check(settings: &RemoteSettings) -> Result<S3Store, ConnectionCheckError> {
    if !settings.has_credentials() {
        return Err(ConnectionCheckError::MissingCredentials);
    }
    S3Store::new(settings).map_err(ConnectionCheckError::from)
}
