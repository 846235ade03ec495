use crate::app_home::APP_HOME;
use crate::cli::to_args::ToArgs;
use crate::remote::settings::RemoteSettings;
use arbitrary::Arbitrary;
use clap::Args;
use std::ffi::OsString;

/// Turn remote offload off
#[derive(Args, Arbitrary, Clone, PartialEq, Debug)]
pub struct RemoteDisableArgs {}

impl RemoteDisableArgs {
    pub fn invoke(self) -> eyre::Result<()> {
        let settings = RemoteSettings::load(&APP_HOME)?;
        if !settings.enabled {
            println!("Remote offload is already disabled");
            return Ok(());
        }
        RemoteSettings {
            enabled: false,
            ..settings
        }
        .save(&APP_HOME)?;
        println!("Remote offload disabled; thumbnails will be rendered locally");
        Ok(())
    }
}

impl ToArgs for RemoteDisableArgs {
    fn to_args(&self) -> Vec<OsString> {
        vec![]
    }
}
