//! Binary entry point for the session attribute store CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Value};
use sombra_sessions::{
    primitives::store::{AccessMode, MemStore, Store, StoreStats},
    storage::{CounterMetrics, ImmutableScalars, JsonMarshaller, MetricsSnapshot},
    types::{AttributeKey, MetaDataKey, NamesKey, NamesMap, SessionMetaData},
    AttributesFactoryConfig, SessionAttributesFactory, SessionId,
};
use tracing_subscriber::{fmt, EnvFilter};

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(
    name = "sombra-sessions",
    version,
    about = "Fine-grained session attribute store tooling",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "SOMBRA_SESSIONS_CONFIG",
        help = "Configuration file (defaults to <config dir>/sombra/sessions.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        env = "SOMBRA_SESSIONS_LOG",
        default_value = "warn",
        help = "Log filter directive, e.g. `sombra_sessions=debug`"
    )]
    log: String,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted workload against in-memory stores and print counters
    Simulate(SimulateCmd),
    /// Print the effective configuration
    Config {
        #[arg(long, help = "Print the resolved configuration path instead")]
        path: bool,
    },
}

#[derive(Args, Debug)]
struct SimulateCmd {
    #[arg(long, default_value_t = 100, help = "Sessions to create")]
    sessions: usize,

    #[arg(long, default_value_t = 4, help = "Attributes set per session")]
    attributes: usize,

    #[arg(
        long,
        default_value_t = 2,
        help = "Every Nth session has its metadata evicted"
    )]
    evict_every: usize,

    #[arg(long, default_value_t = 1, help = "Sessions to corrupt before reload")]
    corrupt: usize,

    #[arg(long, default_value_t = 5000, help = "Cascade drain timeout (ms)")]
    drain_timeout_ms: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    sessions: usize,
    attributes_per_session: usize,
    evicted: usize,
    cascade_drained: bool,
    reloaded: usize,
    corrupted: usize,
    removed: usize,
    metrics: MetricsSnapshot,
    metadata_store: StoreStats,
    names_store: StoreStats,
    attribute_store: StoreStats,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    install_tracing_subscriber(&cli.log);
    let cli_config = CliConfig::load(cli.config.clone())?;

    match cli.command {
        Command::Simulate(cmd) => {
            let report = simulate(&cli_config, &cmd)?;
            emit(&cli.format, &report, print_simulation_text)?;
        }
        Command::Config { path } => {
            if path {
                match cli_config.path() {
                    Some(path) => println!("{}", path.display()),
                    None => println!("<none>"),
                }
            } else {
                match cli.format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(cli_config.config())?)
                    }
                    OutputFormat::Text => {
                        if !cli_config.loaded() {
                            println!("# defaults (no configuration file found)");
                        }
                        print!("{}", cli_config.render()?);
                    }
                }
            }
        }
    }
    Ok(())
}

fn install_tracing_subscriber(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn simulate(cli_config: &CliConfig, cmd: &SimulateCmd) -> Result<SimulationReport, Box<dyn Error>> {
    let config = cli_config.config();
    let metadata = MemStore::<MetaDataKey, SessionMetaData>::open(config.stores.metadata.clone())?;
    let names = MemStore::<NamesKey, NamesMap>::open(config.stores.names.clone())?;
    let attributes = MemStore::<AttributeKey, Bytes>::open(config.stores.attributes.clone())?;
    let metrics = Arc::new(CounterMetrics::default());

    let factory_config = AttributesFactoryConfig::<Value, ()>::new(
        metadata.clone(),
        names.clone(),
        attributes.clone(),
        Arc::new(JsonMarshaller::<Value>::new()),
        (),
    )
    .immutability(Arc::new(ImmutableScalars))
    .options(config.factory.to_options().metrics(metrics.clone()));
    let factory = SessionAttributesFactory::open(factory_config)?;

    let ids: Vec<SessionId> = (0..cmd.sessions)
        .map(|n| SessionId::new(format!("session-{n:05}")))
        .collect();

    for id in &ids {
        let meta = SessionMetaData::new(Duration::from_secs(1800));
        metadata.put(MetaDataKey(id.clone()), meta.clone(), AccessMode::WriteOnly)?;
        let view =
            factory.create_attributes_view(id, factory.create_value(id), &meta, ())?;
        for n in 0..cmd.attributes {
            let value = if n % 2 == 0 {
                json!(format!("value-{n}"))
            } else {
                json!({ "items": [n, n + 1] })
            };
            view.set(&format!("attr-{n}"), value)?;
        }
        view.close();
    }

    let mut evicted = 0;
    if cmd.evict_every > 0 {
        for id in ids.iter().step_by(cmd.evict_every) {
            metadata.evict(&MetaDataKey(id.clone()))?;
            evicted += 1;
        }
    }
    let cascade_drained = factory.await_cascade(Duration::from_millis(cmd.drain_timeout_ms));

    let mut corrupted = 0;
    for id in ids.iter().take(cmd.corrupt) {
        let Some(index) = names.get(&NamesKey(id.clone()))? else {
            continue;
        };
        if let Some(attribute) = index.values().next() {
            attributes.put(
                AttributeKey::new(id.clone(), *attribute),
                Bytes::from_static(b"\0\0\0\0corrupt"),
                AccessMode::Silent,
            )?;
            corrupted += 1;
        }
    }

    let mut reloaded = 0;
    for id in &ids {
        if factory.find_value(id)?.is_some_and(|bundle| !bundle.is_empty()) {
            reloaded += 1;
        }
    }

    let mut removed = 0;
    for id in &ids {
        if factory.remove(id)? {
            removed += 1;
        }
    }
    factory.close();

    Ok(SimulationReport {
        sessions: cmd.sessions,
        attributes_per_session: cmd.attributes,
        evicted,
        cascade_drained,
        reloaded,
        corrupted,
        removed,
        metrics: metrics.snapshot(),
        metadata_store: metadata.stats(),
        names_store: names.stats(),
        attribute_store: attributes.stats(),
    })
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(&T),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(value),
    }
    Ok(())
}

fn print_simulation_text(report: &SimulationReport) {
    println!(
        "Workload: sessions={} attributes_per_session={} evicted={} corrupted={}",
        report.sessions, report.attributes_per_session, report.evicted, report.corrupted
    );
    println!(
        "Outcome: reloaded={} removed={} cascade_drained={}",
        report.reloaded, report.removed, report.cascade_drained
    );
    println!();
    let m = &report.metrics;
    println!(
        "Attributes: loaded_sessions={} loaded_attributes={} corrupt={} written={} skipped={}",
        m.sessions_loaded,
        m.attributes_loaded,
        m.sessions_corrupt,
        m.attributes_written,
        m.attribute_writes_skipped
    );
    println!(
        "Deletes: removed={} purged={} cascade_evictions={}",
        m.sessions_removed, m.sessions_purged, m.cascade_evictions
    );
    println!(
        "Activation: passivate={} activate={}",
        m.passivation_notifications, m.activation_notifications
    );
    println!();
    for (label, stats) in [
        ("metadata", &report.metadata_store),
        ("names", &report.names_store),
        ("attributes", &report.attribute_store),
    ] {
        println!(
            "Store {label}: active={} passivated={} passivations={} activations={}",
            stats.active, stats.passivated, stats.passivations, stats.activations
        );
    }
}
