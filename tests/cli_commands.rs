use clap::Parser;
use cloudthumb::cli::Cli;
use cloudthumb::cli::command::Command;
use cloudthumb::cli::command::remote::remote_command::RemoteCommand;

#[test]
fn no_command_parses() {
    let cli = Cli::try_parse_from(["cloudthumb"]).unwrap();
    assert!(cli.command.is_none());
}

#[test]
fn generate_parses_with_defaults() {
    let cli = Cli::try_parse_from(["cloudthumb", "generate", "a.png", "photos/*.jpg"]).unwrap();
    let Some(Command::Generate(args)) = cli.command else {
        panic!("expected generate");
    };
    assert_eq!(args.inputs, vec!["a.png", "photos/*.jpg"]);
    assert_eq!(args.max_width, 300);
    assert_eq!(args.concurrency, 8);
    assert!(!args.no_remote);
}

#[test]
fn generate_requires_an_input() {
    assert!(Cli::try_parse_from(["cloudthumb", "generate"]).is_err());
}

#[test]
fn generate_rejects_zero_width() {
    assert!(Cli::try_parse_from(["cloudthumb", "generate", "--max-width", "0", "a.png"]).is_err());
}

#[test]
fn edit_accepts_negative_rotation() {
    let cli = Cli::try_parse_from([
        "cloudthumb",
        "edit",
        "--rotate",
        "-90",
        "--rotate=180",
        "--brightness",
        "120",
        "a.png",
    ])
    .unwrap();
    let Some(Command::Edit(args)) = cli.command else {
        panic!("expected edit");
    };
    assert_eq!(args.rotate, vec![-90, 180]);
    assert_eq!(args.brightness, Some(120.0));
}

#[test]
fn remote_subcommands_parse() {
    for sub in ["show", "enable", "disable", "test"] {
        assert!(
            Cli::try_parse_from(["cloudthumb", "remote", sub]).is_ok(),
            "remote {sub}"
        );
    }
}

#[test]
fn remote_set_parses_fields() {
    let cli = Cli::try_parse_from([
        "cloudthumb",
        "remote",
        "set",
        "--input-bucket",
        "uploads",
        "--endpoint",
        "http://localhost:9000",
    ])
    .unwrap();
    let Some(Command::Remote(remote)) = cli.command else {
        panic!("expected remote");
    };
    let RemoteCommand::Set(set) = remote.command else {
        panic!("expected set");
    };
    assert_eq!(set.input_bucket.as_deref(), Some("uploads"));
    assert_eq!(set.endpoint.as_deref(), Some("http://localhost:9000"));
    assert_eq!(set.output_bucket, None);
}

#[test]
fn remote_set_endpoint_conflicts_with_clear() {
    assert!(
        Cli::try_parse_from([
            "cloudthumb",
            "remote",
            "set",
            "--endpoint",
            "http://x",
            "--clear-endpoint",
        ])
        .is_err()
    );
}

#[test]
fn clean_parses() {
    assert!(Cli::try_parse_from(["cloudthumb", "clean", "--dry-run"]).is_ok());
}
