//! nandpatch CLI - patch Meraki MR33 NAND dumps with a known-good bootloader

mod patch;

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nandpatch")]
#[command(author, version, about = "Patch Meraki MR33 NAND dumps")]
#[command(long_about = "nandpatch copies a full MR33 NAND dump (including OOB data) to a new file and \
writes the bundled U-Boot and UBI payloads at their fixed block offsets.\n\n\
The input image is never modified and an existing output file is never overwritten.")]
struct Cli {
    /// Input NAND image (full dump including OOB data)
    input: OsString,

    /// Output patched image (must not exist)
    output: OsString,

    /// Also write the repaired ART calibration data (block 88)
    #[arg(long)]
    art: bool,

    /// Directory holding the payload files
    #[arg(long, value_name = "DIR", env = "NANDPATCH_RESOURCES")]
    resources: Option<PathBuf>,

    /// JSON device layout to use instead of the built-in MR33 layout
    #[arg(long, value_name = "FILE")]
    layout: Option<PathBuf>,

    /// Write directly to the output path (a failure leaves a partial file)
    #[arg(long)]
    in_place: bool,

    /// Allow payload ranges to overlap; later payloads win
    #[arg(long)]
    allow_overlap: bool,

    /// Check inputs and print the plan without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Re-read the output and check every byte after patching
    #[arg(long)]
    verify: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::builder()
        .with_env_var("NANDPATCH_LOG")
        .try_from_env();

    match filter {
        Ok(filter) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        Err(_) => {
            let level = match verbose {
                0 => tracing::Level::WARN,
                1 => tracing::Level::INFO,
                2 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            };
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version go to stdout and are not failures
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    init_logging(cli.verbose);

    let args = patch::PatchArgs {
        input: PathBuf::from(cli.input),
        output: PathBuf::from(cli.output),
        art: cli.art,
        resources: cli.resources,
        layout: cli.layout,
        in_place: cli.in_place,
        allow_overlap: cli.allow_overlap,
        dry_run: cli.dry_run,
        verify: cli.verify,
    };

    match patch::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
