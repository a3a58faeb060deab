use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use dupsync::{Agent, Config, Driver, RcloneAgent};

#[derive(Parser)]
#[command(name = "dsync", version, about = "Two-way file tree reconciliation over a pluggable agent")]
struct Cli {
    /// Folders to sync, relative to BASE_L / BASE_R. Defaults to the
    /// config's DEFAULT_DIRS when omitted.
    folders: Vec<String>,

    /// Directory holding dsync.json, master.json and the crash marker
    #[arg(long, default_value = ".")]
    config_path: PathBuf,

    /// Override the config file name within --config_path
    #[arg(long, default_value = "dsync.json")]
    config: String,

    /// Don't run the live pass, only show what would happen
    #[arg(short = 'd', long)]
    dry: bool,

    /// Run rmdirs on both roots after a live pass
    #[arg(short = 'c', long)]
    clean: bool,

    /// Sync the config's DEFAULT_DIRS instead of positional folders
    #[arg(short = 'D', long)]
    default_dirs: bool,

    /// Force recovery mode (newest-mtime-wins) for every folder synced
    #[arg(short = 'r', long)]
    recovery: bool,

    /// Skip the confirmation prompt before a live pass
    #[arg(short = 'a', long)]
    auto: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Override Config::log_folder for this run
    #[arg(long)]
    log_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive first-run setup: probes both roots and writes a config file.
    Config {
        /// Local root folder
        #[arg(long)]
        base_l: String,
        /// Remote root, e.g. "onedrive:"
        #[arg(long)]
        base_r: String,
        /// Hash function both sides are expected to support
        #[arg(long, default_value = "SHA-1")]
        hash_name: String,
        /// List both roots once to confirm the agent reports the requested hash
        #[arg(long)]
        probe: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {err:#}", "Error:".red());
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Some(Command::Config { base_l, base_r, hash_name, probe }) = &cli.command {
        return run_config_wizard(&cli, base_l, base_r, hash_name, *probe);
    }

    let config_file = cli.config_path.join(&cli.config);
    let mut config = Config::load(&config_file).context("loading config")?;
    if let Some(log_folder) = &cli.log_folder {
        config.log_folder = log_folder.display().to_string();
    }

    let agent = RcloneAgent::new(config.agent_bin.clone(), Vec::new());
    let mut driver = Driver::new(config.clone(), Box::new(agent), cli.config_path.clone());

    let folders = if cli.default_dirs || cli.folders.is_empty() {
        driver.default_dirs()
    } else {
        cli.folders.clone()
    };

    if folders.is_empty() {
        anyhow::bail!("no folders to sync: pass folders on the command line or set DEFAULT_DIRS");
    }

    for folder in &folders {
        println!();
        println!("{} {folder}", "Syncing:".green().bold());

        let outcome = driver
            .sync_folder(folder, cli.dry, cli.auto, cli.clean, cli.recovery)
            .with_context(|| format!("syncing folder {folder}"))?;

        if outcome.dry_report.operations == 0 {
            println!("{}", "In sync.".green());
            continue;
        }

        println!("{} {} job(s) found", "Dry pass:".yellow(), outcome.dry_report.operations);

        match outcome.live_report {
            Some(report) => {
                println!(
                    "{} {} operation(s) applied, {} new director{} created",
                    "Done:".green().bold(),
                    report.operations,
                    report.new_dirs.len(),
                    if report.new_dirs.len() == 1 { "y" } else { "ies" }
                );
            }
            None if cli.dry => println!("(dry run, nothing applied)"),
            None => println!("Skipped."),
        }
    }

    println!();
    println!("{}", "All synced!".green().bold());
    Ok(())
}

fn run_config_wizard(cli: &Cli, base_l: &str, base_r: &str, hash_name: &str, probe: bool) -> Result<()> {
    let mut config = Config {
        base_l: normalize_root(base_l, false),
        base_r: normalize_root(base_r, true),
        hash_name: hash_name.to_string(),
        ..Config::default()
    };

    if probe {
        let agent = RcloneAgent::new(config.agent_bin.clone(), Vec::new());
        for (label, root) in [("local", config.base_l.as_str()), ("remote", config.base_r.as_str())] {
            let hashes = agent
                .hashsum(&config.hash_name, root)
                .with_context(|| format!("probing {label} root for hash support"))?;
            if hashes.is_empty() {
                println!(
                    "{} {label} root reported no hashes for {}; pick a different --hash-name",
                    "WARN:".yellow(),
                    config.hash_name
                );
            } else {
                println!("{} {label} root supports {}", "OK:".green(), config.hash_name);
            }
        }
    }

    let config_file = cli.config_path.join(&cli.config);
    config.save(&config_file)?;
    println!("{} wrote {}", "Done:".green().bold(), config_file.display());
    Ok(())
}

fn normalize_root(root: &str, is_remote: bool) -> String {
    let mut root = root.to_string();
    if !root.ends_with('/') && !(is_remote && root.ends_with(':')) {
        root.push('/');
    }
    root
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
