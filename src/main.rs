// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use packledger::config::Config;
use packledger::filesystem::safe_join;
use packledger::install::{InstallOptions, Installer};
use packledger::ledger::OwnershipLedger;
use packledger::progress::LogProgress;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "packledger")]
#[command(author, version, about = "Install asset packages and track which package owns each file", long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/packledger/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Install root directory (overrides the configuration)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package from a .zip archive
    Install {
        /// Path to the archive
        archive: PathBuf,
        /// Package name in the ledger (default: installed folder name)
        #[arg(short, long)]
        name: Option<String>,
        /// Replace an existing folder with the same name
        #[arg(long)]
        overwrite: bool,
        /// Copy into an existing folder instead of replacing it (implies --overwrite)
        #[arg(long)]
        merge: bool,
        /// Skip the free-space estimate
        #[arg(long)]
        no_space_check: bool,
        /// Take over files owned by other packages without asking
        #[arg(short, long)]
        force: bool,
    },
    /// Remove an installed package, or only some of its files
    Remove {
        /// Package name to remove
        package: String,
        /// Files to remove (removes the whole package if omitted)
        files: Vec<String>,
    },
    /// Query installed packages
    Query {
        /// Package name pattern (optional, shows all if omitted)
        pattern: Option<String>,
        /// List the files each package owns
        #[arg(long)]
        files: bool,
    },
    /// Show which installed files an archive would take over
    Conflicts {
        /// Path to the archive
        archive: PathBuf,
        /// Package name the archive would be installed as
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Check the ledger for inconsistencies and missing files
    Verify,
    /// Forget every package and delete the ledger file (installed files stay)
    Clear,
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load_or_default(path).context("Failed to load configuration")?;
    config.merge_env();
    if let Some(root) = root {
        config.install_root = Some(root);
    }
    Ok(config)
}

fn open_ledger(config: &Config) -> Result<OwnershipLedger> {
    let root = config.install_root()?;
    Ok(OwnershipLedger::open(config.ledger_path(root)))
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Commands::Install {
            archive,
            name,
            overwrite,
            merge,
            no_space_check,
            force,
        }) => {
            let config = load_config(config_path, cli.root)?;
            let installer = Installer::from_config(&config)?;
            let mut ledger = open_ledger(&config)?;
            let options = InstallOptions {
                package: name,
                overwrite: overwrite || merge,
                merge,
                check_space: config.check_disk_space && !no_space_check,
            };

            if !force {
                let plan = installer.preflight(&archive, &ledger, &options)?;
                if !plan.conflicts.is_empty() {
                    println!("Installing {} would take over:", plan.package);
                    for conflict in &plan.conflicts {
                        println!("  {} (owned by {})", conflict.file, conflict.existing_owner);
                    }
                    return Err(anyhow::anyhow!(
                        "{} file(s) are owned by other packages; rerun with --force to take them over",
                        plan.conflicts.len()
                    ));
                }
            }

            let label = archive
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let mut progress = LogProgress::new(label);
            let report = match installer.install(&archive, &mut ledger, &options, &mut progress) {
                Ok(report) => report,
                Err(e) => {
                    if e.is_abort() {
                        eprintln!("Install aborted; the install root and ledger were not changed");
                    }
                    return Err(e).with_context(|| format!("Failed to install {}", archive.display()));
                }
            };

            println!("Installed package: {}", report.package);
            println!("  Location: {}", report.target_dir.display());
            println!("  Files: {}", report.files.len());
            if !report.conflicts.is_empty() {
                println!("  Taken over from other packages: {}", report.conflicts.len());
            }
            if !report.ledger_saved {
                eprintln!("Warning: the ledger could not be saved and may be stale");
            }
            Ok(())
        }
        Some(Commands::Remove { package, files }) => {
            let config = load_config(config_path, cli.root)?;
            let installer = Installer::from_config(&config)?;
            let mut ledger = open_ledger(&config)?;

            let report = if files.is_empty() {
                installer.uninstall(&package, &mut ledger)?
            } else {
                installer.remove_files(&package, files.as_slice(), &mut ledger)?
            };

            if !report.was_installed {
                println!("Package '{}' is not installed", package);
                return Ok(());
            }

            println!("Removed package: {}", report.package);
            println!("  Files removed: {}", report.removed);
            if report.missing > 0 {
                println!("  Already missing: {}", report.missing);
            }
            for file in &report.failed {
                println!("  Could not remove: {}", file);
            }
            if !report.ledger_saved {
                eprintln!("Warning: the ledger could not be saved and may be stale");
            }
            Ok(())
        }
        Some(Commands::Query { pattern, files }) => {
            let config = load_config(config_path, cli.root)?;
            let ledger = open_ledger(&config)?;
            let needle = pattern.map(|p| p.to_lowercase());

            let matches: Vec<_> = ledger
                .packages()
                .filter(|record| {
                    needle
                        .as_deref()
                        .is_none_or(|n| record.name.to_lowercase().contains(n))
                })
                .collect();

            if matches.is_empty() {
                println!("No packages found.");
                return Ok(());
            }

            println!("Installed packages:");
            for record in &matches {
                let installed = record
                    .install_time
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("  {} ({} files, installed {})", record.name, record.files.len(), installed);
                if files {
                    for file in &record.files {
                        println!("    {}", file);
                    }
                }
            }
            println!("\nTotal: {} package(s)", matches.len());
            Ok(())
        }
        Some(Commands::Conflicts { archive, name }) => {
            let config = load_config(config_path, cli.root)?;
            let installer = Installer::from_config(&config)?;
            let ledger = open_ledger(&config)?;
            let options = InstallOptions {
                package: name,
                ..InstallOptions::default()
            };

            let plan = installer.preflight(&archive, &ledger, &options)?;
            println!("Package: {} -> {}", plan.package, plan.folder_name);
            println!("  Files: {}", plan.files.len());
            if plan.destination_exists {
                println!("  Folder already exists (install needs --overwrite)");
            }
            if plan.conflicts.is_empty() {
                println!("No conflicts.");
            } else {
                for conflict in &plan.conflicts {
                    println!("  {} (owned by {})", conflict.file, conflict.existing_owner);
                }
                println!("\nTotal: {} conflict(s)", plan.conflicts.len());
            }
            Ok(())
        }
        Some(Commands::Verify) => {
            let config = load_config(config_path, cli.root)?;
            let root = config.install_root()?;
            // Audit the file as stored; a normal load would repair it silently
            let ledger = OwnershipLedger::load_unrepaired(config.ledger_path(root))?;

            let mut problems = ledger.verify_consistency();
            for record in ledger.packages() {
                for file in &record.files {
                    match safe_join(root, file) {
                        Ok(path) if path.is_file() => {}
                        Ok(_) => problems.push(format!("{}: {} is missing on disk", record.name, file)),
                        Err(e) => problems.push(format!("{}: {}", record.name, e)),
                    }
                }
            }

            if problems.is_empty() {
                println!("Ledger OK: {} package(s)", ledger.len());
                return Ok(());
            }
            for problem in &problems {
                println!("  {}", problem);
            }
            Err(anyhow::anyhow!("{} problem(s) found", problems.len()))
        }
        Some(Commands::Clear) => {
            let config = load_config(config_path, cli.root)?;
            let mut ledger = open_ledger(&config)?;
            let count = ledger.len();
            ledger.clear()?;
            info!("Cleared ledger at {}", ledger.path().display());
            println!("Forgot {} package(s)", count);
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "packledger", &mut std::io::stdout());
            Ok(())
        }
        None => {
            println!("packledger v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'packledger --help' for usage information");
            Ok(())
        }
    }
}
