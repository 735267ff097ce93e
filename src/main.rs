use clap::Parser;
use otf2_convert::archive::{JsonArchive, MemoryArchive};
use otf2_convert::cli::{Cli, Commands};
use otf2_convert::convert::{self, ConvertOptions};
use otf2_convert::input;
use otf2_convert::logger;
use otf2_convert::reporter;
use std::path::PathBuf;
use std::process;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            output,
            clock_resolution,
            world_size,
            verbosity,
            strict,
            dry_run,
            json,
            quiet,
            inputs,
        } => {
            if let Err(e) = logger::init(verbosity) {
                eprintln!("Warning: Failed to install logger: {}", e);
            }
            let options = ConvertOptions {
                clock_resolution,
                world_size,
                strict,
            };
            if let Err(e) = run_convert(inputs, output, &options, dry_run, json, quiet) {
                eprintln!("Error: {:#}", e);
                process::exit(1);
            }
        }
    }
}

fn run_convert(
    inputs: Vec<PathBuf>,
    output: PathBuf,
    options: &ConvertOptions,
    dry_run: bool,
    json: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let inputs = input::discover(&inputs)?;

    let summary = if dry_run {
        let mut summary =
            convert::convert_files(&inputs, &output, options, &mut MemoryArchive::new())?;
        summary.output = None;
        summary
    } else {
        convert::convert_files(&inputs, &output, options, &mut JsonArchive::new())?
    };

    // Output results
    if json {
        reporter::print_json(&summary)?;
    } else if !quiet {
        reporter::print_summary(&summary);
        if dry_run {
            eprintln!("Dry run: nothing written to {}", output.display());
        }
    }

    Ok(())
}
