use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info, warn};

use enkente::settings::{self, APP_NAME, AppConfig};
use enkente::sink::{ConsoleSink, ConsoleStyle, FanoutSink, StoreSink};
use enkente::storage::LocalKvStore;
use enkente::{DispatchConfig, DispatchReport, MessageHandler, Pipeline};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_tail(ctx: RuntimeContext, cmd: TailCommand) -> Result<()> {
    handle_tail(&ctx, cmd).await
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("resolved paths: {:#?}", ctx.paths);

    match cli.command {
        Command::Tail(cmd) => async_tail(ctx, cmd),
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Enkente - live chat-log ingestion.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Emit additional diagnostics for troubleshooting
    #[arg(long = "diagnostics", global = true)]
    diagnostics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow a chat log file and print new messages
    Tail(TailCommand),
    /// Accept live messages over HTTP, optionally tailing a log as well
    Serve(ServeCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct PoolArgs {
    /// Number of worker tasks
    #[arg(long, value_name = "N")]
    workers: Option<usize>,
    /// Queue capacity before producers block
    #[arg(long, value_name = "N")]
    queue: Option<usize>,
    /// Persist handled messages to the data directory
    #[arg(long)]
    store: bool,
}

#[derive(Debug, Clone, Args)]
struct TailCommand {
    /// Chat log file (JSON array of messages)
    #[arg(long, value_name = "PATH")]
    log: PathBuf,
    /// Milliseconds between polls
    #[arg(long = "interval-ms", value_name = "MS")]
    interval_ms: Option<u64>,
    #[command(flatten)]
    pool: PoolArgs,
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Also tail this chat log into the same queue
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Milliseconds between polls when tailing
    #[arg(long = "interval-ms", value_name = "MS")]
    interval_ms: Option<u64>,
    #[command(flatten)]
    pool: PoolArgs,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let config = settings::load(&paths.config_file)
            .with_context(|| format!("loading config from {}", paths.config_file.display()))?;
        let paths = paths.apply_overrides(&config)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("enkente={level},tower_http={level}")));

        // Log lines go to stderr; stdout carries the message stream.
        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!self.disable_color(io::stderr().is_terminal()))
                        .with_target(self.common.diagnostics)
                        .with_file(self.common.diagnostics)
                        .with_line_number(self.common.diagnostics),
                )
                .try_init()
                .ok();
        }

        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Info),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn disable_color(&self, is_terminal: bool) -> bool {
        let force_color = matches!(self.common.color, ColorOption::Always)
            || env::var_os("FORCE_COLOR").is_some();
        self.common.no_color
            || matches!(self.common.color, ColorOption::Never)
            || env::var_os("NO_COLOR").is_some()
            || (!force_color && !is_terminal)
    }

    fn console_style(&self) -> ConsoleStyle {
        if self.disable_color(io::stdout().is_terminal()) {
            ConsoleStyle::plain()
        } else {
            ConsoleStyle::ansi()
        }
    }

    fn dispatch_config(&self, pool: &PoolArgs) -> DispatchConfig {
        let mut config = self.config.dispatch;
        if let Some(workers) = pool.workers {
            config.workers = workers;
        }
        if let Some(queue) = pool.queue {
            config.queue_capacity = queue;
        }
        config
    }

    fn poll_interval(&self, interval_ms: Option<u64>) -> Duration {
        match interval_ms {
            Some(ms) => Duration::from_millis(ms.max(1)),
            None => self.config.tail.poll_interval(),
        }
    }

    /// Console output, plus the chat store when `--store` or `storage.enabled`.
    async fn build_handler(&self, pool: &PoolArgs) -> Result<Arc<dyn MessageHandler>> {
        let console = ConsoleSink::stdout(self.console_style());
        if !(pool.store || self.config.storage.enabled) {
            return Ok(Arc::new(console));
        }

        let store_dir = self.paths.data_dir.join("store");
        let store = LocalKvStore::open(&store_dir)
            .await
            .with_context(|| format!("opening store at {}", store_dir.display()))?;
        info!("Persisting messages to {}", store.root().display());

        let fanout = FanoutSink::new()
            .with(Arc::new(console))
            .with(Arc::new(StoreSink::new(Arc::new(store))));
        Ok(Arc::new(fanout))
    }
}

#[derive(Debug, Clone)]
struct AppPaths {
    config_file: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        Ok(Self {
            config_file,
            data_dir: default_data_dir()?,
        })
    }

    fn apply_overrides(mut self, cfg: &AppConfig) -> Result<Self> {
        if let Some(ref data_override) = cfg.storage.data_dir {
            self.data_dir = expand_str_path(data_override)?;
        }
        Ok(self)
    }
}

async fn handle_tail(ctx: &RuntimeContext, cmd: TailCommand) -> Result<()> {
    let log_path = expand_path(cmd.log)?;
    let dispatch = ctx.dispatch_config(&cmd.pool);
    let interval = ctx.poll_interval(cmd.interval_ms);

    let handler = ctx.build_handler(&cmd.pool).await?;
    let mut pipeline = Pipeline::start(dispatch, handler).context("starting worker pool")?;
    pipeline.tail(&log_path, interval)?;

    info!(
        "Tailing {} every {:?} with {} workers (queue {})",
        log_path.display(),
        interval,
        dispatch.workers,
        dispatch.queue_capacity
    );

    let report = pipeline.run_until(shutdown_signal()).await?;
    log_report(&report);
    Ok(())
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    let dispatch = ctx.dispatch_config(&cmd.pool);
    let mut server = ctx.config.server.clone();
    if let Some(host) = cmd.host {
        server.host = host;
    }
    if let Some(port) = cmd.port {
        server.port = port;
    }

    let handler = ctx.build_handler(&cmd.pool).await?;
    let mut pipeline = Pipeline::start(dispatch, handler).context("starting worker pool")?;

    if let Some(log) = cmd.log {
        let log_path = expand_path(log)?;
        let interval = ctx.poll_interval(cmd.interval_ms);
        pipeline.tail(&log_path, interval)?;
        info!("Tailing {} every {:?}", log_path.display(), interval);
    }

    // A bind failure still has to drain the worker pool before exiting.
    let bound = match pipeline.serve(&server.bind_addr()).await {
        Ok(addr) => addr,
        Err(err) => {
            let _ = pipeline.shutdown().await;
            return Err(err.into());
        }
    };
    info!(
        "Accepting POST http://{}/ingest with {} workers (queue {})",
        bound, dispatch.workers, dispatch.queue_capacity
    );

    let report = pipeline.run_until(shutdown_signal()).await?;
    log_report(&report);
    Ok(())
}

fn log_report(report: &DispatchReport) {
    info!(
        "Stopped: {} messages handled by {} workers",
        report.handled, report.workers_finished
    );
    if report.workers_panicked > 0 {
        warn!("{} worker(s) panicked", report.workers_panicked);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining queue...");
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            let path = &ctx.paths.config_file;
            if path.exists() && !force {
                return Err(anyhow!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                ));
            }
            write_default_config(path)?;
            info!("Wrote default config to {}", path.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        let mut path = PathBuf::from(dir);
        path.push(APP_NAME);
        return Ok(path);
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }
    let body = settings::default_toml(path).context("serializing default config to TOML")?;
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}
