use crate::app_home::APP_HOME;
use crate::cli::output_mode::OutputMode;
use crate::cli::to_args::ToArgs;
use crate::remote::settings::RemoteSettings;
use crate::remote::settings::mask;
use arbitrary::Arbitrary;
use clap::Args;
use facet::Facet;
use facet_pretty::FacetPretty;
use std::ffi::OsString;

/// Show the current remote settings (secret masked)
#[derive(Args, Arbitrary, Clone, PartialEq, Debug)]
pub struct RemoteShowArgs {
    /// Output mode: auto|json|pretty
    #[clap(long, value_enum, default_value_t = OutputMode::Auto)]
    pub output: OutputMode,
}

/// Settings as printed: the secret never leaves this process unmasked
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct RemoteSettingsView {
    pub enabled: bool,
    pub ready: bool,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub input_bucket: String,
    pub output_bucket: String,
    pub endpoint: String,
    pub config_file: String,
}

impl RemoteSettingsView {
    #[must_use]
    pub fn new(settings: &RemoteSettings, config_file: String) -> Self {
        Self {
            enabled: settings.enabled,
            ready: settings.is_ready(),
            access_key_id: settings.access_key_id.clone(),
            secret_access_key: mask(&settings.secret_access_key),
            region: settings.region.clone(),
            input_bucket: settings.input_bucket.clone(),
            output_bucket: settings.output_bucket.clone(),
            endpoint: settings.resolved_endpoint(),
            config_file,
        }
    }
}

impl RemoteShowArgs {
    pub fn invoke(self) -> eyre::Result<()> {
        let settings = RemoteSettings::load(&APP_HOME)?;
        let view = RemoteSettingsView::new(
            &settings,
            RemoteSettings::file_path(&APP_HOME).display().to_string(),
        );
        match self.output.resolve() {
            OutputMode::Json => {
                let json = facet_json::to_string(&view)
                    .map_err(|e| eyre::eyre!("Failed to serialize settings: {}", e))?;
                println!("{}", json);
            }
            _ => println!("{}", view.pretty()),
        }
        Ok(())
    }
}

impl ToArgs for RemoteShowArgs {
    fn to_args(&self) -> Vec<OsString> {
        let mut rtn = vec![];
        if self.output != OutputMode::Auto {
            rtn.push(OsString::from("--output"));
            rtn.push(OsString::from(self.output.to_string()));
        }
        rtn
    }
}
