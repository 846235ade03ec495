use crate::app_home::APP_HOME;
use crate::cli::arbitrary_values;
use crate::cli::to_args::ToArgs;
use crate::remote::settings::RemoteSettings;
use arbitrary::Arbitrary;
use clap::Args;
use std::ffi::OsString;
use tracing::info;

/// Update credentials, region, buckets or endpoint
#[derive(Args, Arbitrary, Clone, PartialEq, Debug)]
pub struct RemoteSetArgs {
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_name)]
    pub access_key_id: Option<String>,

    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_name)]
    pub secret_access_key: Option<String>,

    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_name)]
    pub region: Option<String>,

    /// Bucket source images are uploaded to
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_name)]
    pub input_bucket: Option<String>,

    /// Bucket the worker writes `thumb-<key>` objects to
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_name)]
    pub output_bucket: Option<String>,

    /// Custom S3-compatible endpoint, e.g. http://localhost:9000
    #[clap(long, conflicts_with = "clear_endpoint")]
    #[arbitrary(with = arbitrary_values::optional_name)]
    pub endpoint: Option<String>,

    /// Go back to the AWS regional endpoint
    #[clap(long)]
    #[arbitrary(value = false)]
    pub clear_endpoint: bool,
}

impl RemoteSetArgs {
    /// Apply the given fields. Any change to an enabled configuration disables it until it is
    /// validated again.
    #[must_use]
    pub fn apply(&self, current: &RemoteSettings) -> RemoteSettings {
        let mut next = current.clone();
        let set = |target: &mut String, value: &Option<String>| {
            if let Some(value) = value {
                *target = value.trim().to_string();
            }
        };
        set(&mut next.access_key_id, &self.access_key_id);
        set(&mut next.secret_access_key, &self.secret_access_key);
        set(&mut next.region, &self.region);
        set(&mut next.input_bucket, &self.input_bucket);
        set(&mut next.output_bucket, &self.output_bucket);
        if let Some(endpoint) = &self.endpoint {
            let endpoint = endpoint.trim();
            next.endpoint = (!endpoint.is_empty()).then(|| endpoint.to_string());
        }
        if self.clear_endpoint {
            next.endpoint = None;
        }
        if next.region.is_empty() {
            next.region = RemoteSettings::DEFAULT_REGION.to_string();
        }
        if next != *current {
            next.enabled = false;
        }
        next
    }

    pub fn invoke(self) -> eyre::Result<()> {
        let current = RemoteSettings::load(&APP_HOME)?;
        let next = self.apply(&current);
        if next == current {
            println!("Remote settings unchanged");
            return Ok(());
        }
        next.save(&APP_HOME)?;
        info!(path = %RemoteSettings::file_path(&APP_HOME).display(), "Saved remote settings");
        println!("Saved remote settings: {:?}", next);
        if current.enabled {
            println!("Remote offload was disabled; run `remote enable` to validate the new settings");
        }
        Ok(())
    }
}

impl ToArgs for RemoteSetArgs {
    fn to_args(&self) -> Vec<OsString> {
        let mut rtn = vec![];
        let mut push = |flag: &str, value: &Option<String>| {
            if let Some(value) = value {
                rtn.push(OsString::from(flag));
                rtn.push(OsString::from(value));
            }
        };
        push("--access-key-id", &self.access_key_id);
        push("--secret-access-key", &self.secret_access_key);
        push("--region", &self.region);
        push("--input-bucket", &self.input_bucket);
        push("--output-bucket", &self.output_bucket);
        push("--endpoint", &self.endpoint);
        if self.clear_endpoint {
            rtn.push(OsString::from("--clear-endpoint"));
        }
        rtn
    }
}
