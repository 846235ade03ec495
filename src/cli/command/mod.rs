pub mod clean;
pub mod edit;
pub mod generate;
pub mod remote;

use crate::cli::command::clean::clean_command::CleanArgs;
use crate::cli::command::edit::edit_command::EditArgs;
use crate::cli::command::generate::generate_command::GenerateArgs;
use crate::cli::command::remote::RemoteArgs;
use crate::cli::to_args::ToArgs;
use arbitrary::Arbitrary;
use clap::Subcommand;
use std::ffi::OsString;

#[derive(Subcommand, Arbitrary, PartialEq, Debug)]
pub enum Command {
    /// Generate thumbnails for files, directories or glob patterns
    Generate(GenerateArgs),

    /// Adjust one image with undoable edits and save the result
    Edit(EditArgs),

    /// Remote offload settings (show/set/enable/disable/test)
    Remote(RemoteArgs),

    /// Clean cached tagging responses
    Clean(CleanArgs),
}

impl Command {
    pub fn invoke(self) -> eyre::Result<()> {
        match self {
            Command::Generate(args) => args.invoke(),
            Command::Edit(args) => args.invoke(),
            Command::Remote(args) => args.invoke(),
            Command::Clean(args) => args.invoke(),
        }
    }
}

impl ToArgs for Command {
    fn to_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        match self {
            Command::Generate(generate_args) => {
                args.push("generate".into());
                args.extend(generate_args.to_args());
            }
            Command::Edit(edit_args) => {
                args.push("edit".into());
                args.extend(edit_args.to_args());
            }
            Command::Remote(remote_args) => {
                args.push("remote".into());
                args.extend(remote_args.to_args());
            }
            Command::Clean(clean_args) => {
                args.push("clean".into());
                args.extend(clean_args.to_args());
            }
        }
        args
    }
}
