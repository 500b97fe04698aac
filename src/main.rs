use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, WrapErr};
use tracing::{Level, info, subscriber::set_global_default};
use tracing_subscriber::EnvFilter;
use zotcopy_acquire::{CatalogAcquirer, Library, LocalAcquirer, RemoteAcquirer};
use zotcopy_catalog::Snapshot;
use zotcopy_config::{LibraryType, Settings};

/// Deduplicating attachment copier for Zotero libraries
///
/// Reads the library catalog (from the Zotero Web API or a local
/// `zotero.sqlite`), resolves every attachment to a file on disk, collapses
/// byte-identical duplicates, and copies one file per distinct content into
/// a directory tree named after item titles.
#[derive(Parser)]
#[command(name = "zotcopy")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file path (defaults to the platform config directory).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More logging (-v for debug, -vv for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the catalog from the Zotero Web API and write a snapshot
    Fetch {
        /// Write the snapshot here instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Read the catalog from the local zotero.sqlite and write a snapshot
    Read {
        /// Write the snapshot here instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Resolve, deduplicate and copy every attachment to the destination
    Copy {
        /// Reuse a snapshot written by `fetch` or `read` instead of
        /// acquiring one.
        #[arg(long, value_name = "FILE", conflicts_with = "source")]
        snapshot: Option<PathBuf>,

        /// Where to acquire a fresh snapshot from.
        #[arg(long, value_enum, default_value_t = Source::Local)]
        source: Source,

        /// Print the report as JSON instead of the text summary.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Source {
    Remote,
    Local,
}

/// Bridge an `exn` result into a miette diagnostic; `Exn` does not implement
/// `std::error::Error`, so `IntoDiagnostic` cannot be used directly.
fn diagnostic<T, E: std::error::Error + Send + Sync + 'static>(
    r: Result<T, exn::Exn<E>>,
) -> miette::Result<T> {
    r.map_err(|err| miette::Report::msg(err.to_string()))
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    let _ = set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli).await
}

async fn run(cli: Cli) -> miette::Result<()> {
    let settings = diagnostic(Settings::load(cli.config.as_deref()))?;
    match cli.command {
        Commands::Fetch { output } => {
            let snapshot = diagnostic(remote_acquirer(&settings).await?.acquire().await)?;
            report_acquired(&snapshot);
            write_snapshot(&snapshot, output.as_deref())?;
        }
        Commands::Read { output } => {
            let acquirer = open_local(&settings).await?;
            let snapshot = diagnostic(acquirer.acquire().await)?;
            report_acquired(&snapshot);
            write_snapshot(&snapshot, output.as_deref())?;
        }
        Commands::Copy { snapshot, source, json } => {
            let snapshot = match snapshot {
                Some(path) => read_snapshot(&path)?,
                None => {
                    let snapshot = match source {
                        Source::Remote => {
                            diagnostic(remote_acquirer(&settings).await?.acquire().await)?
                        }
                        Source::Local => {
                            diagnostic(open_local(&settings).await?.acquire().await)?
                        }
                    };
                    report_acquired(&snapshot);
                    snapshot
                }
            };
            let catalog = diagnostic(snapshot.normalize()).wrap_err("catalog failed validation")?;
            let storage_root = diagnostic(settings.storage_root())?;
            let destination = diagnostic(settings.destination())?;
            let report =
                diagnostic(zotcopy_dedupe::run(&catalog, &storage_root, destination).await)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
            } else {
                print!("{report}");
            }
        }
    }
    Ok(())
}

async fn open_local(settings: &Settings) -> miette::Result<LocalAcquirer> {
    let database = diagnostic(settings.database_path())?;
    diagnostic(LocalAcquirer::open(database).await)
}

/// Build a remote acquirer from settings, auto-discovering the library ID
/// from the API key when it isn't configured.
async fn remote_acquirer(settings: &Settings) -> miette::Result<RemoteAcquirer> {
    let api_key = diagnostic(settings.api_key())?;
    match &settings.library_id {
        Some(id) => {
            let library = match settings.library_type {
                LibraryType::User => Library::User(id.clone()),
                LibraryType::Group => Library::Group(id.clone()),
            };
            diagnostic(RemoteAcquirer::new(api_key, library))
        }
        None => diagnostic(RemoteAcquirer::discover(api_key).await),
    }
}

fn report_acquired(snapshot: &Snapshot) {
    info!(
        items = snapshot.items.len(),
        attachments = snapshot.attachments.len(),
        "catalog acquired"
    );
}

fn write_snapshot(snapshot: &Snapshot, output: Option<&Path>) -> miette::Result<()> {
    let rendered = serde_json::to_string_pretty(snapshot).into_diagnostic()?;
    match output {
        Some(path) => std::fs::write(path, rendered)
            .into_diagnostic()
            .wrap_err_with(|| format!("could not write snapshot to \"{}\"", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> miette::Result<Snapshot> {
    let contents = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not read snapshot from \"{}\"", path.display()))?;
    serde_json::from_str(&contents).into_diagnostic()
}
