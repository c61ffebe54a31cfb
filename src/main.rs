use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use vertrim::config::{self, VertrimConfig};
use vertrim::engine::{
    CheckpointPolicy, InteractiveCheckpoint, RunOutcome, TargetSelection, TrimEngine,
    UnattendedCheckpoint, resolve_targets,
};
use vertrim::exceptions::ExceptionLog;
use vertrim::observability;
use vertrim::remote::{RemoteApi, RemoteClient, RemoteError};
use vertrim::retry::with_backoff;
use vertrim::sizing;
use vertrim::state::RunStateStore;

/// CLI arguments for the version trimmer
#[derive(Parser, Debug)]
#[command(version, about = "Trims old file versions out of remote document libraries", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to ./vertrim.toml, then
    /// ~/.config/vertrim/vertrim.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run a trim against the configured site
    Trim(TrimArgs),
    /// Estimate how much the selected libraries hold, without trimming
    Estimate {
        /// Library titles to estimate (repeatable; default: configured
        /// selection)
        #[arg(short, long = "library")]
        libraries: Vec<String>,
        /// Estimate every visible document library
        #[arg(long)]
        all_libraries: bool,
    },
    /// Show the persisted run state for a site
    State {
        /// Site identifier (default: the configured site)
        #[arg(long)]
        site: Option<String>,
    },
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to
        /// ~/.config/vertrim/vertrim.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Flags that override `[trim]` settings from the config file.
#[derive(clap::Args, Debug, Default)]
struct TrimArgs {
    /// Trim versions older than this many days (minimum 5)
    #[arg(long)]
    older_than_days: Option<u32>,

    /// Actually delete. The first run against a site stays dry regardless
    #[arg(long)]
    delete: bool,

    /// Library title to trim (repeatable)
    #[arg(short, long = "library")]
    libraries: Vec<String>,

    /// CSV file of library titles, first column
    #[arg(long)]
    libraries_csv: Option<PathBuf>,

    /// Trim every visible document library
    #[arg(long)]
    all_libraries: bool,

    /// Skip items whose name contains this token (repeatable)
    #[arg(long = "skip-token")]
    skip_tokens: Vec<String>,

    /// CSV file of skip tokens, first column
    #[arg(long)]
    skip_tokens_csv: Option<PathBuf>,

    /// Version labels deleted per commit round-trip (1-500)
    #[arg(long)]
    batch_size: Option<u32>,

    /// Abort after this many items (1-1000000)
    #[arg(long)]
    max_files: Option<u64>,

    /// Checkpoints log and continue instead of prompting
    #[arg(long)]
    unattended: bool,

    /// Estimate library sizes before and after the run (slow)
    #[arg(long)]
    measure_size: bool,
}

impl TrimArgs {
    /// Lay these flags over the `[trim]` section. Flags that were not given
    /// leave the config value alone.
    fn apply_to(&self, trim: &mut config::TrimConfig) {
        if let Some(days) = self.older_than_days {
            trim.older_than_days = Some(days);
        }
        if self.delete {
            trim.delete = true;
        }
        if !self.libraries.is_empty() {
            trim.libraries = self.libraries.clone();
        }
        if let Some(path) = &self.libraries_csv {
            trim.libraries_csv = Some(path.clone());
        }
        if self.all_libraries {
            trim.all_libraries = true;
        }
        if !self.skip_tokens.is_empty() {
            trim.skip_name_tokens.extend(self.skip_tokens.iter().cloned());
        }
        if let Some(path) = &self.skip_tokens_csv {
            trim.skip_tokens_csv = Some(path.clone());
        }
        if let Some(size) = self.batch_size {
            trim.version_batch_size = size;
        }
        if let Some(max) = self.max_files {
            trim.max_files = max;
        }
        if self.unattended {
            trim.unattended = true;
        }
        if self.measure_size {
            trim.measure_size = true;
        }
    }
}

/// Starter configuration written by `vertrim init`.
fn default_config_toml() -> &'static str {
    r#"# vertrim configuration
# Versions older than the cutoff are deleted from the selected libraries.
# Runs are dry until [trim] delete = true, and the first run against a
# site is always dry.

[remote]
base_url = "https://contoso.example.com"
# Site identifier for run-state keying; defaults to base_url.
# site = "https://contoso.example.com/sites/ops"
# Environment variable holding the bearer token.
auth_token_env = "VERTRIM_TOKEN"
request_timeout_secs = 120
page_size = 2000

[trim]
older_than_days = 180
delete = false
# libraries = ["Shared Documents"]
# libraries_csv = "libraries.csv"
all_libraries = true
# skip_name_tokens = ["contract", "confidential"]
version_batch_size = 50
chunk_pause_ms = 500
max_files = 200000
checkpoint_every_files = 5000
checkpoint_every_minutes = 10
unattended = false
max_retry_attempts = 4

[logs]
# exceptions_csv = "/var/log/vertrim/exceptions.csv"
# operational = "/var/log/vertrim/vertrim.log"
# state_dir = "/var/lib/vertrim/state"

[logging]
level = "info"
format = "compact"
"#
}

/// Get the default config directory path.
fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("vertrim"))
}

/// Get the default config file path.
fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("vertrim.toml"))
}

/// Resolve the config path: explicit flag, then ./vertrim.toml, then the
/// default location.
fn resolve_config_path(explicit_path: Option<&str>) -> Result<PathBuf, String> {
    if let Some(path) = explicit_path {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return Ok(path);
    }

    let cwd_config = PathBuf::from("vertrim.toml");
    if cwd_config.exists() {
        return Ok(cwd_config);
    }

    if let Some(default_path) = default_config_path()
        && default_path.exists()
    {
        return Ok(default_path);
    }

    Err("No config file found. Create one with: vertrim init".to_string())
}

/// Load the config file and bring up tracing.
fn load_config(explicit_path: Option<&str>) -> VertrimConfig {
    let config_path = match resolve_config_path(explicit_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = match VertrimConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    observability::init_tracing(&config.logging);
    tracing::debug!(config_file = %config_path.display(), "Loaded configuration");

    config
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Command::Trim(trim_args) => {
            run_trim(args.config.as_deref(), &trim_args).await;
        }
        Command::Estimate {
            libraries,
            all_libraries,
        } => {
            run_estimate(args.config.as_deref(), libraries, all_libraries).await;
        }
        Command::State { site } => {
            run_state(args.config.as_deref(), site).await;
        }
        Command::Init { output, force } => {
            run_init(output, force);
        }
    }
}

async fn run_trim(explicit_config_path: Option<&str>, trim_args: &TrimArgs) {
    let mut config = load_config(explicit_config_path);
    trim_args.apply_to(&mut config.trim);

    // Flags merged on top of the file can break ranges the file satisfied
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let remote = match RemoteClient::connect(&config.remote) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let store = match RunStateStore::open(config.logs.state_dir_path()).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open the run-state store: {}", e);
            std::process::exit(1);
        }
    };

    let log = match ExceptionLog::open(
        config.logs.exceptions_csv_path(),
        config.logs.operational_path(),
    ) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Failed to open the exception log: {}", e);
            std::process::exit(1);
        }
    };

    let checkpoint: Box<dyn CheckpointPolicy> = if config.trim.unattended {
        Box::new(UnattendedCheckpoint)
    } else {
        Box::new(InteractiveCheckpoint)
    };

    let site = config.remote.site_identifier().to_string();
    let page_size = config.remote.page_size;
    let mut engine = TrimEngine::new(
        remote,
        store,
        log,
        checkpoint,
        site,
        page_size,
        config.trim.clone(),
    );

    match engine.run().await {
        Ok(report) => {
            println!("{}", report);
            if let RunOutcome::SafetyCeiling { .. } = report.outcome {
                std::process::exit(3);
            }
        }
        Err(e) => {
            eprintln!("Trim run failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_estimate(
    explicit_config_path: Option<&str>,
    libraries: Vec<String>,
    all_libraries: bool,
) {
    let config = load_config(explicit_config_path);

    let remote = match RemoteClient::connect(&config.remote) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Flags pick the selection; otherwise fall back to the [trim] section
    let selection = if libraries.is_empty() && !all_libraries {
        TargetSelection::from_options(
            &config.trim.libraries,
            config.trim.libraries_csv.as_deref(),
            config.trim.all_libraries,
        )
    } else {
        TargetSelection::from_options(&libraries, None, all_libraries)
    };
    let selection = match selection {
        Ok(selection) => selection,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let attempts = config.trim.max_retry_attempts;
    let listed = with_backoff(
        "list libraries",
        attempts,
        RemoteError::is_retryable,
        || remote.list_libraries(),
    )
    .await;
    let all = match listed {
        Ok(all) => all,
        Err(e) => {
            eprintln!("Failed to list libraries: {}", e);
            std::process::exit(1);
        }
    };

    let targets = match resolve_targets(&selection, &all) {
        Ok(targets) => targets,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut total: u64 = 0;
    for library in &targets {
        match sizing::estimate_library_bytes(&remote, library, config.remote.page_size, attempts)
            .await
        {
            Ok(bytes) => {
                total = total.saturating_add(bytes);
                println!("{:<40} {}", library, sizing::format_bytes(bytes));
            }
            Err(e) => {
                eprintln!("Failed to estimate {}: {}", library, e);
                std::process::exit(1);
            }
        }
    }
    println!("{:<40} {}", "total", sizing::format_bytes(total));
}

async fn run_state(explicit_config_path: Option<&str>, site: Option<String>) {
    let config = load_config(explicit_config_path);
    let site = site.unwrap_or_else(|| config.remote.site_identifier().to_string());

    let store = match RunStateStore::open(config.logs.state_dir_path()).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open the run-state store: {}", e);
            std::process::exit(1);
        }
    };

    match store.load(&site).await {
        Ok(Some(state)) => {
            println!("site: {}", site);
            println!(
                "last run:           {}",
                state
                    .last_run_at
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
            );
            println!(
                "last dry run:       {}",
                state
                    .last_dry_run_at
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
            );
            println!(
                "last policy change: {}",
                state
                    .last_policy_change_at
                    .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339())
            );
            if let Some(run_id) = state.last_run_id {
                println!("written by run:     {}", run_id);
            }
        }
        Ok(None) => {
            println!("site: {}", site);
            println!("No run recorded. The next run will be a dry run.");
        }
        Err(e) => {
            eprintln!("Failed to load run state: {}", e);
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
fn run_init(output: Option<String>, force: bool) {
    let Some(output_path) = output.map(PathBuf::from).or_else(default_config_path) else {
        eprintln!("Could not determine default config path. Please specify one with --output.");
        std::process::exit(1);
    };

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    // Create parent directories if needed
    if let Some(parent) = output_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Set remote.base_url, export the bearer token, then preview with:");
    println!("  vertrim trim --older-than-days 180 --all-libraries");
}
