use crate::app_home::APP_HOME;
use crate::cli::command::remote::store_for_check;
use crate::cli::to_args::ToArgs;
use crate::remote::settings::RemoteSettings;
use crate::remote::settings::validate_connection;
use arbitrary::Arbitrary;
use clap::Args;
use std::ffi::OsString;

/// Check connectivity without changing anything
#[derive(Args, Arbitrary, Clone, PartialEq, Debug)]
pub struct RemoteTestArgs {}

impl RemoteTestArgs {
    pub fn invoke(self) -> eyre::Result<()> {
        let settings = RemoteSettings::load(&APP_HOME)?;
        tokio::runtime::Runtime::new()?
            .block_on(async {
                let store = store_for_check(&settings)?;
                validate_connection(&settings, &store).await
            })
            .map_err(|e| eyre::eyre!("Connection check failed: {}", e))?;
        println!(
            "Connection OK: bucket {} is reachable at {}",
            settings.input_bucket,
            settings.resolved_endpoint()
        );
        Ok(())
    }
}

impl ToArgs for RemoteTestArgs {
    fn to_args(&self) -> Vec<OsString> {
        vec![]
    }
}
