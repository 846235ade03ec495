use crate::app_home::APP_HOME;
use crate::cli::command::remote::store_for_check;
use crate::cli::to_args::ToArgs;
use crate::remote::settings::RemoteSettings;
use crate::remote::settings::enable_remote;
use arbitrary::Arbitrary;
use clap::Args;
use std::ffi::OsString;
use tracing::warn;

/// Check connectivity and turn remote offload on
#[derive(Args, Arbitrary, Clone, PartialEq, Debug)]
pub struct RemoteEnableArgs {}

impl RemoteEnableArgs {
    pub fn invoke(self) -> eyre::Result<()> {
        let settings = RemoteSettings::load(&APP_HOME)?;
        let outcome = tokio::runtime::Runtime::new()?.block_on(async {
            let store = store_for_check(&settings)?;
            enable_remote(&settings, &store).await
        });
        match outcome {
            Ok(enabled) => {
                enabled.save(&APP_HOME)?;
                println!(
                    "Remote offload enabled ({} -> {})",
                    enabled.input_bucket, enabled.output_bucket
                );
                Ok(())
            }
            Err(e) => {
                warn!("Remote offload stays disabled: {}", e);
                if settings.enabled {
                    RemoteSettings {
                        enabled: false,
                        ..settings
                    }
                    .save(&APP_HOME)?;
                }
                Err(eyre::eyre!("Could not enable remote offload: {}", e))
            }
        }
    }
}

impl ToArgs for RemoteEnableArgs {
    fn to_args(&self) -> Vec<OsString> {
        vec![]
    }
}
