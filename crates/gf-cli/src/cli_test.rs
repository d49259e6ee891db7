use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn test_run_args() {
    let cli = Cli::try_parse_from([
        "gf",
        "-vv",
        "run",
        "-d",
        "a,b",
        "--force-datasets",
        "b",
        "--transform-only",
        "-o",
        "json",
    ])
    .unwrap();
    assert_eq!(cli.global.verbose, 2);
    let Commands::Run(args) = cli.command else {
        panic!("expected run");
    };
    assert_eq!(args.datasets, vec!["a", "b"]);
    assert_eq!(args.force_datasets, vec!["b"]);
    assert!(args.transform_only);
    assert!(!args.force);
    assert_eq!(args.output, OutputFormat::Json);
}

#[test]
fn test_conflicting_modes_rejected() {
    assert!(Cli::try_parse_from(["gf", "run", "--extract-only", "--transform-only"]).is_err());
    assert!(Cli::try_parse_from(["gf", "run", "--force", "--force-datasets", "a"]).is_err());
}

#[test]
fn test_reset_requires_target() {
    assert!(Cli::try_parse_from(["gf", "reset"]).is_err());
    let cli = Cli::try_parse_from(["gf", "reset", "-d", "roads"]).unwrap();
    let Commands::Reset(args) = cli.command else {
        panic!("expected reset");
    };
    assert_eq!(args.dataset.as_deref(), Some("roads"));
    assert!(args.template.is_none());
}

#[test]
fn test_ls_defaults_to_datasets() {
    let cli = Cli::try_parse_from(["gf", "ls"]).unwrap();
    let Commands::Ls(args) = cli.command else {
        panic!("expected ls");
    };
    assert_eq!(args.resource, LsResource::Datasets);
    assert_eq!(args.output, OutputFormat::Text);
}

#[test]
fn test_export_args() {
    let cli = Cli::try_parse_from([
        "gf", "export", "-f", "fgb", "-t", "parks,roads", "--srs", "EPSG:3006",
    ])
    .unwrap();
    let Commands::Export(args) = cli.command else {
        panic!("expected export");
    };
    assert_eq!(args.format, ExportFormatArg::Fgb);
    assert_eq!(args.tables, vec!["parks", "roads"]);
    assert_eq!(args.srs.as_deref(), Some("EPSG:3006"));
    assert!(args.output_dir.is_none());

    let cli = Cli::try_parse_from(["gf", "export"]).unwrap();
    let Commands::Export(args) = cli.command else {
        panic!("expected export");
    };
    assert_eq!(args.format, ExportFormatArg::Parquet);
    assert!(args.tables.is_empty());
}
