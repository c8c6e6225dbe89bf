// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use katello_agent::config::DEFAULT_CONFIG_PATH;
use katello_agent::content::{ContentOptions, ContentUnit};
use katello_agent::{AgentConfig, Dispatcher};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "katello-agent")]
#[command(author, version, about = "Host-side content management agent for Katello", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install content units
    Install {
        /// Units as TYPE:NAME (e.g. rpm:zsh, package_group:Development Tools,
        /// erratum:RHSA-2024:1234)
        units: Vec<String>,

        /// Read units as a JSON array instead of positional arguments
        #[arg(long)]
        units_file: Option<PathBuf>,

        /// Resolve the transaction without committing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Update content units
    Update {
        /// Units as TYPE:NAME; empty with --all updates everything
        units: Vec<String>,

        /// Read units as a JSON array instead of positional arguments
        #[arg(long)]
        units_file: Option<PathBuf>,

        /// Resolve the transaction without committing it
        #[arg(long)]
        dry_run: bool,

        /// Update all installed packages
        #[arg(long)]
        all: bool,
    },
    /// Remove content units
    Uninstall {
        /// Units as TYPE:NAME
        units: Vec<String>,

        /// Read units as a JSON array instead of positional arguments
        #[arg(long)]
        units_file: Option<PathBuf>,

        /// Resolve the transaction without committing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Upload the installed-package profile
    Profile {
        /// Upload even when the plugin toggle is off or the content is
        /// unchanged
        #[arg(long)]
        force: bool,

        /// Drop the upload cache instead of uploading
        #[arg(long)]
        purge_cache: bool,
    },
    /// Upload the enabled-repositories report
    Repos {
        /// Upload even when the plugin toggle is off or the content is
        /// unchanged
        #[arg(long)]
        force: bool,

        /// Drop the upload cache instead of uploading
        #[arg(long)]
        purge_cache: bool,
    },
    /// Upload restart traces (applications running outdated binaries)
    Tracer {
        /// Drop dnf/yum from the report, as after a triggered transaction
        #[arg(long)]
        skip_package_manager: bool,
    },
}

/// Parse a TYPE:NAME unit argument. Errata are keyed by advisory id,
/// everything else by name.
fn parse_unit(arg: &str) -> Result<ContentUnit> {
    let (type_id, value) = arg
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid unit '{}': expected TYPE:NAME", arg))?;
    if type_id.is_empty() || value.is_empty() {
        return Err(anyhow::anyhow!("Invalid unit '{}': expected TYPE:NAME", arg));
    }
    let key = if type_id == "erratum" { "id" } else { "name" };
    Ok(ContentUnit {
        type_id: type_id.to_string(),
        unit_key: serde_json::from_value(json!({ key: value }))?,
    })
}

/// Gather units from positional arguments or a JSON file.
fn gather_units(units: &[String], units_file: Option<&PathBuf>) -> Result<Vec<ContentUnit>> {
    if let Some(path) = units_file {
        let raw = std::fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&raw)?);
    }
    units.iter().map(|arg| parse_unit(arg)).collect()
}

fn run_dispatch(
    units: Vec<ContentUnit>,
    options: ContentOptions,
    op: impl FnOnce(&Dispatcher, &[ContentUnit], &ContentOptions) -> katello_agent::DispatchReport,
) -> Result<()> {
    let backend = katello_agent::backend::detect()?;
    info!("Using {} backend", backend.name());
    let dispatcher = Dispatcher::with_default_handlers(backend.into());
    let report = op(&dispatcher, &units, &options);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AgentConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Install {
            units,
            units_file,
            dry_run,
        }) => {
            let units = gather_units(&units, units_file.as_ref())?;
            let options = ContentOptions {
                apply: !dry_run,
                all: false,
            };
            run_dispatch(units, options, |dispatcher, units, options| {
                dispatcher.install(units, options)
            })
        }
        Some(Commands::Update {
            units,
            units_file,
            dry_run,
            all,
        }) => {
            let mut units = gather_units(&units, units_file.as_ref())?;
            if all && units.is_empty() {
                // An update-everything request still needs a unit to route
                // on; an empty rpm key means "no specific packages".
                units.push(ContentUnit {
                    type_id: "rpm".to_string(),
                    unit_key: serde_json::Map::new(),
                });
            }
            let options = ContentOptions {
                apply: !dry_run,
                all,
            };
            run_dispatch(units, options, |dispatcher, units, options| {
                dispatcher.update(units, options)
            })
        }
        Some(Commands::Uninstall {
            units,
            units_file,
            dry_run,
        }) => {
            let units = gather_units(&units, units_file.as_ref())?;
            let options = ContentOptions {
                apply: !dry_run,
                all: false,
            };
            run_dispatch(units, options, |dispatcher, units, options| {
                dispatcher.uninstall(units, options)
            })
        }
        Some(Commands::Profile { force, purge_cache }) => {
            if purge_cache {
                katello_agent::profile::purge_profile_cache(&config)?;
                println!("Profile cache purged");
                return Ok(());
            }
            let uploaded = katello_agent::profile::upload_profile(&config, force)?;
            println!(
                "{}",
                if uploaded {
                    "Package profile uploaded"
                } else {
                    "Package profile upload skipped"
                }
            );
            Ok(())
        }
        Some(Commands::Repos { force, purge_cache }) => {
            if purge_cache {
                katello_agent::profile::repos::purge_enabled_repos_cache(&config)?;
                println!("Enabled-repos cache purged");
                return Ok(());
            }
            let uploaded = katello_agent::profile::repos::upload_enabled_repos(&config, force)?;
            println!(
                "{}",
                if uploaded {
                    "Enabled-repos report uploaded"
                } else {
                    "Enabled-repos upload skipped"
                }
            );
            Ok(())
        }
        Some(Commands::Tracer {
            skip_package_manager,
        }) => {
            let count = katello_agent::tracer::upload_traces(&config, skip_package_manager)?;
            println!("Uploaded {} restart traces", count);
            Ok(())
        }
        None => {
            println!("Katello agent v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'katello-agent --help' for usage information");
            Ok(())
        }
    }
}
