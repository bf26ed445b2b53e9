//! ldt CLI - checksummed tar archives

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

use ldt::ops::{check_archive, checksum_file, create_archive, extract_archive, list_archive};
use ldt::{Algorithm, Config};

#[derive(Parser)]
#[command(name = "ldt")]
#[command(about = "tar archives with embedded per-file checksums")]
#[command(version)]
struct Cli {
    /// config file (toml)
    #[arg(short, long, env = "LDT_CONFIG")]
    config: Option<PathBuf>,

    /// more logging, repeat for debug output
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// archive files and directories
    Archive {
        /// archive to create (.tar)
        output: PathBuf,

        /// files and directories to archive
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// skip paths matching this regular expression
        #[arg(short, long)]
        exclude: Option<String>,
    },

    /// extract an archive and verify its checksums
    Extract {
        /// archive to extract
        archive: PathBuf,

        /// destination directory
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,
    },

    /// verify the checksums of an archive without extracting it
    Check {
        /// archive to check
        archive: PathBuf,
    },

    /// list archive contents
    List {
        /// archive to list
        archive: PathBuf,
    },

    /// print checksums of a file
    Checksum {
        /// file to checksum
        file: PathBuf,

        /// algorithms to use (default: the configured one)
        #[arg(short, long = "algorithm")]
        algorithms: Vec<Algorithm>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(cli: Cli) -> ldt::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Archive {
            output,
            paths,
            exclude,
        } => {
            if let Some(exclude) = exclude {
                config.exclude = Some(match config.exclude.take() {
                    Some(configured) => format!("(?:{})|(?:{})", configured, exclude),
                    None => exclude,
                });
            }
            let stats = create_archive(&output, &paths, &config)?;
            println!(
                "archived {} entries ({} files, {} bytes) to {}",
                stats.entries,
                stats.files,
                stats.bytes,
                output.display()
            );
        }

        Commands::Extract { archive, directory } => {
            let stats = extract_archive(&archive, &directory, &config)?;
            println!(
                "extracted {} entries to {}",
                stats.entries,
                directory.display()
            );
        }

        Commands::Check { archive } => {
            let stats = check_archive(&archive, &config)?;
            println!(
                "{}: ok ({} entries, {} files)",
                archive.display(),
                stats.entries,
                stats.files
            );
        }

        Commands::List { archive } => {
            for entry in list_archive(&archive, &config)? {
                println!("{}", entry);
            }
        }

        Commands::Checksum { file, algorithms } => {
            let algorithms = if algorithms.is_empty() {
                vec![config.algorithm]
            } else {
                algorithms
            };
            for (algorithm, digest) in checksum_file(&file, &algorithms)? {
                println!("{}  {}  {}", algorithm, digest, file.display());
            }
        }
    }

    Ok(())
}
