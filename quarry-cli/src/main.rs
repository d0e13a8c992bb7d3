mod input;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, warn};

use quarry_core::provider::Provider;
use quarry_core::registry::Registry;
use quarry_core::resource::{Resource, State, Value};
use quarry_core::timeouts::Operation;
use quarry_provider_aws::AwsProvider;
use quarry_provider_aws::conns::AwsClient;
use quarry_provider_aws::service::service_packages;
use quarry_state::{LocalBackend, ResourceState, StateBackend, StateFile};

use crate::input::Document;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Drive AWS resources through the Quarry provider", long_about = None)]
struct Cli {
    /// Path to the state file
    #[arg(long, global = true, default_value = LocalBackend::DEFAULT_STATE_FILE)]
    state: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every resource against its schema
    Validate {
        /// Path to the input document
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Create resources not yet recorded in state
    Create {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Refresh recorded resources and read data sources
    Read {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Apply the configuration to recorded resources in place
    Update {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Delete recorded resources in reverse declaration order
    Delete {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// List registered resource and data source types
    Types,
    /// Remove a stale state lock
    ForceUnlock {
        /// ID of the lock to remove
        lock_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let backend = LocalBackend::with_path(cli.state);

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file).await,
        Commands::Create { file } => run_create(&file, &backend).await,
        Commands::Read { file } => run_read(&file, &backend).await,
        Commands::Update { file } => run_update(&file, &backend).await,
        Commands::Delete { file } => run_delete(&file, &backend).await,
        Commands::Types => run_types(),
        Commands::ForceUnlock { lock_id } => run_force_unlock(&backend, &lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

/// Hold the state lock while `command` runs. The lock lasts for `expected`
/// plus a margin. Ctrl-C abandons the command but still releases the lock.
async fn with_lock(
    backend: &LocalBackend,
    operation: &str,
    expected: Duration,
    command: impl Future<Output = Result<(), String>>,
) -> Result<(), String> {
    let lock = backend
        .acquire_lock(operation, expected)
        .await
        .map_err(|e| e.to_string())?;
    debug!(
        "acquired lock {} for {} ({}s)",
        lock.id,
        operation,
        lock.time_remaining().num_seconds()
    );

    let result = tokio::select! {
        result = command => result,
        _ = tokio::signal::ctrl_c() => Err("Interrupted, remote operations may be incomplete".to_string()),
    };

    if let Err(e) = backend.release_lock(&lock).await {
        warn!("failed to release lock {}: {}", lock.id, e);
        if result.is_ok() {
            return Err(format!("Failed to release state lock: {}", e));
        }
    }
    result
}

/// State loaded for one command; every change is written through
struct Session<'a> {
    backend: &'a LocalBackend,
    state: StateFile,
}

impl<'a> Session<'a> {
    async fn open(backend: &'a LocalBackend) -> Result<Self, String> {
        let state = backend
            .read_state()
            .await
            .map_err(|e| e.to_string())?
            .unwrap_or_default();
        Ok(Self { backend, state })
    }

    fn identifier(&self, resource: &Resource) -> Option<String> {
        self.state
            .find_resource(&resource.id)
            .map(|r| r.identifier.clone())
    }

    async fn record(&mut self, recorded: ResourceState) -> Result<(), String> {
        self.state.upsert_resource(recorded);
        self.save().await
    }

    async fn forget(&mut self, resource: &Resource) -> Result<(), String> {
        if self.state.remove_resource(&resource.id).is_some() {
            self.save().await?;
        }
        Ok(())
    }

    async fn save(&mut self) -> Result<(), String> {
        self.state.increment_serial();
        self.backend
            .write_state(&self.state)
            .await
            .map_err(|e| format!("Failed to write state: {}", e))
    }
}

/// Outcome counts of a command touching several resources
#[derive(Default)]
struct Tally {
    succeeded: usize,
    failed: usize,
}

impl Tally {
    fn ok(&mut self, message: impl std::fmt::Display) {
        println!("  {} {}", "✓".green(), message);
        self.succeeded += 1;
    }

    fn fail(&mut self, message: impl std::fmt::Display, error: impl std::fmt::Display) {
        println!("  {} {} - {}", "✗".red(), message, error);
        self.failed += 1;
    }

    fn finish(self, verb: &str) -> Result<(), String> {
        println!();
        if self.failed == 0 {
            println!(
                "{}",
                format!("{} complete! {} resources.", verb, self.succeeded)
                    .green()
                    .bold()
            );
            Ok(())
        } else {
            Err(format!(
                "{} failed. {} succeeded, {} failed.",
                verb, self.succeeded, self.failed
            ))
        }
    }
}

async fn load(file: &Path) -> Result<(Document, AwsProvider), String> {
    let doc = Document::load(file)?;
    let provider = AwsProvider::new(&doc.provider)
        .await
        .map_err(|e| e.to_string())?;
    println!(
        "{}",
        format!("Using AWS provider (region: {})", doc.provider.region).cyan()
    );
    Ok((doc, provider))
}

/// Longest a command calling `op` on each of `resources` in turn may run
fn expected_run<'a>(
    provider: &AwsProvider,
    resources: impl IntoIterator<Item = &'a Resource>,
    op: Operation,
) -> Result<Duration, String> {
    resources.into_iter().try_fold(Duration::ZERO, |total, resource| {
        let bound = provider
            .operation_bound(resource, op)
            .map_err(|e| e.to_string())?;
        Ok(total.saturating_add(bound))
    })
}

/// Record a provider state under `identifier` when the state carries none
fn recorded(provider: &AwsProvider, state: State, identifier: &str) -> Option<ResourceState> {
    let state = match state.identifier {
        Some(_) => state,
        None => state.with_identifier(identifier),
    };
    ResourceState::from_state(&state, provider.name())
}

async fn run_validate(file: &Path) -> Result<(), String> {
    let (doc, provider) = load(file).await?;

    println!("{}", "Validating...".cyan());

    let errors: Vec<String> = doc
        .resources
        .iter()
        .filter_map(|r| provider.validate(r).err())
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(errors.join("\n"));
    }

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", doc.resources.len())
            .green()
            .bold()
    );
    for resource in &doc.resources {
        let kind = if resource.is_data_source() {
            " (data source)"
        } else {
            ""
        };
        println!("  • {}{}", resource.id, kind);
    }
    Ok(())
}

async fn run_create(file: &Path, backend: &LocalBackend) -> Result<(), String> {
    let (doc, provider) = load(file).await?;
    let expected = expected_run(&provider, doc.managed(), Operation::Create)?;
    with_lock(backend, "create", expected, create_all(&doc, &provider, backend)).await
}

async fn create_all(
    doc: &Document,
    provider: &AwsProvider,
    backend: &LocalBackend,
) -> Result<(), String> {
    let mut session = Session::open(backend).await?;

    println!("{}", "Creating resources...".cyan().bold());
    println!();

    let mut tally = Tally::default();
    for resource in doc.managed() {
        if let Some(identifier) = session.identifier(resource) {
            println!(
                "  {} {} already exists ({})",
                "-".dimmed(),
                resource.id,
                identifier
            );
            continue;
        }

        match provider.create(resource).await {
            Ok(state) => match ResourceState::from_state(&state, provider.name()) {
                Some(entry) => {
                    let identifier = entry.identifier.clone();
                    session.record(entry).await?;
                    tally.ok(format!("{} ({})", resource.id, identifier));
                }
                None => tally.fail(&resource.id, "provider returned no identifier"),
            },
            Err(e) => tally.fail(&resource.id, e),
        }
    }

    tally.finish("Create")
}

async fn run_read(file: &Path, backend: &LocalBackend) -> Result<(), String> {
    let (doc, provider) = load(file).await?;
    let expected = expected_run(&provider, &doc.resources, Operation::Read)?;
    with_lock(backend, "read", expected, read_all(&doc, &provider, backend)).await
}

async fn read_all(
    doc: &Document,
    provider: &AwsProvider,
    backend: &LocalBackend,
) -> Result<(), String> {
    let mut session = Session::open(backend).await?;

    let mut tally = Tally::default();
    for resource in &doc.resources {
        if resource.is_data_source() {
            match provider.read_data_source(resource).await {
                Ok(state) => {
                    tally.ok(&resource.id);
                    print_attributes(&state);
                }
                Err(e) => tally.fail(&resource.id, e),
            }
            continue;
        }

        let Some(identifier) = session.identifier(resource) else {
            println!("  {} {} not created", "-".dimmed(), resource.id);
            continue;
        };

        match provider.read(resource, &identifier).await {
            Ok(state) if state.exists => {
                tally.ok(&resource.id);
                print_attributes(&state);
                if let Some(entry) = recorded(provider, state, &identifier) {
                    session.record(entry).await?;
                }
            }
            Ok(_) => {
                println!(
                    "  {} {} no longer exists, removed from state",
                    "!".yellow(),
                    resource.id
                );
                session.forget(resource).await?;
            }
            Err(e) => tally.fail(&resource.id, e),
        }
    }

    tally.finish("Read")
}

async fn run_update(file: &Path, backend: &LocalBackend) -> Result<(), String> {
    let (doc, provider) = load(file).await?;
    let expected = expected_run(&provider, doc.managed(), Operation::Update)?;
    with_lock(backend, "update", expected, update_all(&doc, &provider, backend)).await
}

async fn update_all(
    doc: &Document,
    provider: &AwsProvider,
    backend: &LocalBackend,
) -> Result<(), String> {
    let mut session = Session::open(backend).await?;

    println!("{}", "Updating resources...".cyan().bold());
    println!();

    let mut tally = Tally::default();
    for resource in doc.managed() {
        let Some(identifier) = session.identifier(resource) else {
            println!("  {} {} not created", "-".dimmed(), resource.id);
            continue;
        };

        match provider.update(resource, &identifier).await {
            Ok(state) => {
                if let Some(entry) = recorded(provider, state, &identifier) {
                    session.record(entry).await?;
                }
                tally.ok(&resource.id);
            }
            Err(e) => tally.fail(&resource.id, e),
        }
    }

    tally.finish("Update")
}

async fn run_delete(file: &Path, backend: &LocalBackend) -> Result<(), String> {
    let (doc, provider) = load(file).await?;
    let expected = expected_run(&provider, doc.managed(), Operation::Delete)?;
    with_lock(backend, "delete", expected, delete_all(&doc, &provider, backend)).await
}

async fn delete_all(
    doc: &Document,
    provider: &AwsProvider,
    backend: &LocalBackend,
) -> Result<(), String> {
    let mut session = Session::open(backend).await?;

    println!("{}", "Deleting resources...".red().bold());
    println!();

    // Dependents are declared after their dependencies
    let mut destroy_order: Vec<&Resource> = doc.managed().collect();
    destroy_order.reverse();

    let mut tally = Tally::default();
    for resource in destroy_order {
        let Some(identifier) = session.identifier(resource) else {
            continue;
        };

        match provider.delete(resource, &identifier).await {
            Ok(()) => {
                session.forget(resource).await?;
                tally.ok(format!("{} ({})", resource.id, identifier));
            }
            Err(e) => tally.fail(&resource.id, e),
        }
    }

    tally.finish("Delete")
}

fn run_types() -> Result<(), String> {
    let registry = Registry::<AwsClient>::from_packages(service_packages())
        .map_err(|e| e.to_string())?;

    println!("{}", "Resources:".bold());
    for type_name in registry.resource_types() {
        let service = registry.resource_service(type_name).unwrap_or("-");
        println!("  {} {}", type_name, format!("({})", service).dimmed());
    }

    println!("{}", "Data sources:".bold());
    for type_name in registry.data_source_types() {
        println!("  {}", type_name);
    }
    Ok(())
}

async fn run_force_unlock(backend: &LocalBackend, lock_id: &str) -> Result<(), String> {
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("Lock {} removed.", lock_id).green());
    Ok(())
}

fn print_attributes(state: &State) {
    let sorted: BTreeMap<_, _> = state.attributes.iter().collect();
    for (key, value) in sorted {
        println!("      {}: {}", key, format_value(value));
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let sorted: BTreeMap<_, _> = map.iter().collect();
            let strs: Vec<_> = sorted
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
    }
}
