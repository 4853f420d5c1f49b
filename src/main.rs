//! pkgbuild - build Debian source packages inside an overlay of a root.
//!
//! The root is overlaid with a scratch upper layer, the package is fetched,
//! optionally patched and compiled in a chroot, and the resulting `.deb`
//! files are installed into the real root before the overlay goes away.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pkgbuild::config::Config;

#[derive(Parser)]
#[command(name = "pkgbuild")]
#[command(about = "Build Debian source packages in an overlay of a root filesystem")]
#[command(
    after_help = "QUICK START:\n  pkgbuild preflight --rootdir ./rootfs      Check host and root\n  pkgbuild build -p stress --rootdir ./rootfs Build and install a package\n  pkgbuild clean --rootdir ./rootfs           Recover from an interrupted build"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a source package and install it into the root
    Build {
        /// Source package name
        #[arg(short, long)]
        package: String,

        /// Patch applied with `patch -p0` after the source is fetched
        #[arg(long)]
        patch: Option<PathBuf>,

        /// Root filesystem (overrides PKGBUILD_ROOTDIR)
        #[arg(long)]
        rootdir: Option<PathBuf>,

        /// Write a JSON build report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run the pkg_build actions of a YAML recipe
    Action {
        /// YAML file with one action or a list of actions
        file: PathBuf,

        /// Root filesystem (overrides PKGBUILD_ROOTDIR)
        #[arg(long)]
        rootdir: Option<PathBuf>,

        /// Write a JSON build report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run preflight checks (host tools, privileges, kernel, root)
    Preflight {
        /// Root filesystem to check (overrides PKGBUILD_ROOTDIR)
        #[arg(long)]
        rootdir: Option<PathBuf>,

        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Unmount a leftover overlay and remove scratch directories
    Clean {
        /// Root filesystem (overrides PKGBUILD_ROOTDIR)
        #[arg(long)]
        rootdir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show mount and scratch state
    Status {
        /// Root filesystem (overrides PKGBUILD_ROOTDIR)
        #[arg(long)]
        rootdir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pkgbuild=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let base_dir = std::env::current_dir()?;
    let config = Config::load(&base_dir);

    match cli.command {
        Commands::Build {
            package,
            patch,
            rootdir,
            report,
        } => {
            let rootdir = commands::resolve_rootdir(rootdir, &config)?;
            commands::cmd_build(&config, &package, patch, &rootdir, report.as_deref())?;
        }

        Commands::Action {
            file,
            rootdir,
            report,
        } => {
            let rootdir = commands::resolve_rootdir(rootdir, &config)?;
            commands::cmd_action(&config, &file, &rootdir, report.as_deref())?;
        }

        Commands::Preflight { rootdir, strict } => {
            let rootdir = rootdir.or_else(|| config.rootdir.clone());
            commands::cmd_preflight(&config, rootdir.as_deref(), strict)?;
        }

        Commands::Show { what } => match what {
            ShowTarget::Config => {
                commands::cmd_show(commands::show::ShowTarget::Config, &config, None)?;
            }
            ShowTarget::Status { rootdir } => {
                let rootdir = rootdir.or_else(|| config.rootdir.clone());
                commands::cmd_show(
                    commands::show::ShowTarget::Status,
                    &config,
                    rootdir.as_deref(),
                )?;
            }
        },

        Commands::Clean { rootdir } => {
            let rootdir = rootdir.or_else(|| config.rootdir.clone());
            commands::cmd_clean(&config, rootdir.as_deref())?;
        }
    }

    Ok(())
}
