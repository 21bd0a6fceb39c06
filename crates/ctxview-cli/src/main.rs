use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use ctxview_jdwp::{JdwpClient, TcpJdwpClient, ThreadId, ThreadInfo};
use ctxview_snapshot::materialize::{
    display_tree, dotted_path, parse_selection, to_pretty_json, SchemaGenerator,
};
use ctxview_snapshot::{
    init_tracing, snapshot, CtxviewConfig, LimitsConfig, PausedFrame, RootSource, Snapshot,
    SnapshotOptions, WalkLimits,
};

#[derive(Parser)]
#[command(
    name = "ctxview",
    version,
    about = "Snapshot variables of a paused JVM over JDWP"
)]
struct Cli {
    /// TOML config file (defaults to $CTXVIEW_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk one variable of a paused frame and print it
    Snapshot(SnapshotArgs),
    /// List the target VM's threads and whether they are suspended
    Threads(ThreadsArgs),
}

#[derive(Args)]
struct ConnectArgs {
    /// Debuggee host (overrides `connection.host`)
    #[arg(long)]
    host: Option<String>,
    /// JDWP port (overrides `connection.port`)
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("root").required(true).args(["local", "binding"])))]
struct SnapshotArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// Thread name or id (defaults to the first suspended thread)
    #[arg(long, conflicts_with = "break_at")]
    thread: Option<String>,
    /// Frame index, 0 being the innermost
    #[arg(long, default_value_t = 0)]
    frame: usize,
    /// Install a line breakpoint, resume the VM and snapshot when it is hit
    #[arg(long = "break", value_name = "CLASS:LINE")]
    break_at: Option<String>,
    /// Local variable to snapshot (`this` for the receiver)
    #[arg(long, value_name = "NAME")]
    local: Option<String>,
    /// Script binding variable to snapshot (defaults to `snapshot.binding_key`)
    #[arg(long, value_name = "KEY", num_args = 0..=1)]
    binding: Option<Option<String>>,
    #[arg(long, value_enum, default_value_t = Format::Tree)]
    format: Format,
    /// Child indices for `--format path`, e.g. `2.0.1`
    #[arg(long, value_name = "I.J.K", default_value = "")]
    select: String,
    #[arg(long)]
    max_depth: Option<usize>,
    #[arg(long)]
    max_nodes: Option<usize>,
    /// Write the result to a file instead of stdout
    #[arg(long, short, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ThreadsArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// Emit JSON suitable for scripts
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Indented display tree
    Tree,
    Json,
    /// Groovy `@Canonical` classes describing the value's shape
    Schema,
    /// Dotted path of the node picked by `--select`
    Path,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref());
    match cli.command {
        Command::Snapshot(args) => run_snapshot(&config, args),
        Command::Threads(args) => run_threads(&config, args),
    }
}

/// Load the config file, falling back to defaults when it cannot be read.
fn load_config(explicit: Option<&Path>) -> CtxviewConfig {
    let Some(path) = CtxviewConfig::discover(explicit) else {
        let config = CtxviewConfig::default();
        init_tracing(&config.logging);
        return config;
    };

    match CtxviewConfig::load_from_path(&path) {
        Ok(config) => {
            init_tracing(&config.logging);
            tracing::debug!(target: "ctxview.config", path = %path.display(), "loaded config");
            config
        }
        Err(err) => {
            let config = CtxviewConfig::default();
            init_tracing(&config.logging);
            tracing::warn!(
                target: "ctxview.config",
                path = %path.display(),
                error = %err,
                "failed to load config; using defaults"
            );
            config
        }
    }
}

fn connect(config: &CtxviewConfig, args: &ConnectArgs) -> Result<TcpJdwpClient> {
    let host = args.host.as_deref().unwrap_or(&config.connection.host);
    let port = args.port.unwrap_or(config.connection.port);
    let mut client =
        TcpJdwpClient::with_timeout(Duration::from_millis(config.connection.timeout_ms));
    client
        .connect(host, port)
        .with_context(|| format!("failed to attach to {host}:{port}"))?;
    tracing::info!(target: "ctxview.cli", host, port, "attached");
    Ok(client)
}

fn run_threads(config: &CtxviewConfig, args: ThreadsArgs) -> Result<i32> {
    let mut client = connect(config, &args.connect)?;
    let threads = client.threads().context("failed to list threads")?;

    if args.json {
        let rows: Vec<_> = threads
            .iter()
            .map(|t| serde_json::json!({ "id": t.id, "name": t.name, "suspended": t.suspended }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for t in &threads {
            let state = if t.suspended { "suspended" } else { "running" };
            println!("{}\t{}\t{}", t.id, state, t.name);
        }
    }
    dispose(&mut client);
    Ok(0)
}

fn run_snapshot(config: &CtxviewConfig, args: SnapshotArgs) -> Result<i32> {
    // Fail on a bad selection before touching the VM.
    let selection = parse_selection(&args.select)?;
    let source = root_source(config, &args);
    let options = SnapshotOptions {
        limits: walk_limits(config, &args),
    };

    let mut client = connect(config, &args.connect)?;
    let thread = match &args.break_at {
        Some(spec) => Some(wait_at_breakpoint(&mut client, config, spec)?),
        None => pick_thread(&mut client, args.thread.as_deref())?,
    };

    let paused = match thread {
        Some(thread) => match PausedFrame::locate(&mut client, thread, args.frame) {
            Ok(paused) => Some(paused),
            Err(err) => {
                tracing::debug!(target: "ctxview.cli", thread, error = %err, "no paused frame");
                None
            }
        },
        None => None,
    };

    let snap = snapshot(&mut client, paused.as_ref(), &source, &options);
    dispose(&mut client);

    let text = render(config, &snap, args.format, &selection)?;
    match &args.output {
        Some(path) => std::fs::write(path, &text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{text}"),
    }

    Ok(if snap.is_diagnostic() { 1 } else { 0 })
}

fn root_source(config: &CtxviewConfig, args: &SnapshotArgs) -> RootSource {
    match (&args.local, &args.binding) {
        (Some(name), _) => RootSource::local(name.clone()),
        (None, binding) => RootSource::Binding {
            holder_path: config.snapshot.binding_path.clone(),
            key: binding
                .clone()
                .flatten()
                .unwrap_or_else(|| config.snapshot.binding_key.clone()),
        },
    }
}

/// Command-line bounds win over the configured ones, field by field.
fn walk_limits(config: &CtxviewConfig, args: &SnapshotArgs) -> WalkLimits {
    LimitsConfig {
        max_depth: args.max_depth.or(config.limits.max_depth),
        max_nodes: args.max_nodes.or(config.limits.max_nodes),
    }
    .into()
}

/// The thread named (by name or id) on the command line, else the first
/// thread already suspended by an event.
fn pick_thread(client: &mut TcpJdwpClient, requested: Option<&str>) -> Result<Option<ThreadId>> {
    let threads = client.threads().context("failed to list threads")?;
    let found = match requested {
        Some(wanted) => Some(
            find_thread(&threads, wanted)
                .with_context(|| format!("no thread named `{wanted}`"))?,
        ),
        None => threads.iter().find(|t| t.suspended),
    };
    if found.is_none() {
        tracing::warn!(target: "ctxview.cli", "no suspended thread found");
    }
    Ok(found.map(|t| t.id))
}

fn find_thread<'a>(threads: &'a [ThreadInfo], wanted: &str) -> Option<&'a ThreadInfo> {
    threads
        .iter()
        .find(|t| t.name == wanted)
        .or_else(|| {
            let id = wanted.parse::<ThreadId>().ok()?;
            threads.iter().find(|t| t.id == id)
        })
}

fn wait_at_breakpoint(
    client: &mut TcpJdwpClient,
    config: &CtxviewConfig,
    spec: &str,
) -> Result<ThreadId> {
    let Some((class, line)) = spec.rsplit_once(':') else {
        bail!("invalid breakpoint `{spec}`; expected CLASS:LINE");
    };
    let line: u32 = line
        .parse()
        .with_context(|| format!("invalid line number in breakpoint `{spec}`"))?;

    let request_id = client
        .set_line_breakpoint(class, line)
        .with_context(|| format!("failed to set breakpoint at {class}:{line}"))?;
    client.resume_vm().context("failed to resume the target VM")?;

    let timeout = Duration::from_millis(config.connection.breakpoint_timeout_ms);
    let hit = client
        .wait_for_breakpoint(timeout)
        .with_context(|| format!("breakpoint {class}:{line} was not hit"))?;
    tracing::info!(target: "ctxview.cli", class, line, thread = hit.thread, "breakpoint hit");

    if let Err(err) = client.clear_breakpoint(request_id) {
        tracing::debug!(target: "ctxview.cli", request_id, error = %err, "failed to clear breakpoint");
    }
    Ok(hit.thread)
}

fn dispose(client: &mut TcpJdwpClient) {
    if let Err(err) = client.dispose() {
        tracing::debug!(target: "ctxview.cli", error = %err, "failed to dispose JDWP connection");
    }
}

fn render(
    config: &CtxviewConfig,
    snap: &Snapshot,
    format: Format,
    selection: &[usize],
) -> Result<String> {
    let text = match format {
        Format::Tree => display_tree(snap).render(),
        Format::Json => format!("{}\n", to_pretty_json(&snap.root)?),
        Format::Schema => SchemaGenerator::generate(config.schema.clone(), &snap.root),
        Format::Path => format!("{}\n", dotted_path(snap, selection)?),
    };
    Ok(text)
}
