//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use sheetsync_core::{
    BatchSyncLog, MediaAttacher, Preview, PreviewBody, RowOutcome, SheetReport, SyncProgress,
    SyncServices, preview_row, run_batch_sync,
};
use sheetsync_shared::{
    AppConfig, SheetConfig, SheetMode, SyncSettings, config_file_path, expand_home, init_config,
    load_config_from, save_config_to,
};
use sheetsync_source::{HttpFetcher, export_url};
use sheetsync_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// sheetsync: turn spreadsheet rows into content records.
#[derive(Parser)]
#[command(
    name = "sheetsync",
    version,
    about = "Sync spreadsheet rows into a local content store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.sheetsync/sheetsync.toml).
    #[arg(long, env = "SHEETSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Sync all configured sheets (or one) into the content store.
    Sync {
        /// Only sync the sheet with this name or id.
        #[arg(long)]
        sheet: Option<String>,

        /// Print the sync log as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show what syncing one row would do, without writing anything.
    Preview {
        /// Sheet name or id.
        #[arg(long)]
        sheet: String,

        /// 1-based data row (clamped to the sheet).
        #[arg(long, default_value = "1")]
        row: usize,

        /// Print the preview as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage configured sheets.
    Sheets {
        #[command(subcommand)]
        action: SheetsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Sheet management subcommands.
#[derive(Subcommand)]
pub(crate) enum SheetsAction {
    /// List configured sheets.
    List,
    /// Add a sheet.
    Add {
        /// Spreadsheet share link or CSV URL.
        url: String,

        /// Display name (defaults to "Sheet N").
        #[arg(short, long)]
        name: Option<String>,

        /// Rendering mode: simple or developer.
        #[arg(short, long, default_value = "simple")]
        mode: String,

        /// HTML template with {{column}} tokens (developer mode).
        #[arg(short, long)]
        template: Option<String>,

        /// Content type of created records.
        #[arg(long, default_value = "post")]
        target_type: String,
    },
    /// Remove a sheet by name or id.
    Remove {
        /// Sheet name or id.
        sheet: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sheetsync=info",
        1 => "sheetsync=debug",
        _ => "sheetsync=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path()?,
    };

    match cli.command {
        Command::Sync { sheet, json } => cmd_sync(&config_path, sheet.as_deref(), json).await,
        Command::Preview { sheet, row, json } => {
            cmd_preview(&config_path, &sheet, row, json).await
        }
        Command::Sheets { action } => match action {
            SheetsAction::List => cmd_sheets_list(&config_path),
            SheetsAction::Add {
                url,
                name,
                mode,
                template,
                target_type,
            } => cmd_sheets_add(
                &config_path,
                &url,
                name.as_deref(),
                &mode,
                template,
                &target_type,
            ),
            SheetsAction::Remove { sheet } => cmd_sheets_remove(&config_path, &sheet),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&config_path),
            ConfigAction::Show => cmd_config_show(&config_path),
        },
    }
}

/// Load config from `path`, or defaults if the file does not exist yet.
fn load(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        Ok(load_config_from(path)?)
    } else {
        Ok(AppConfig::default())
    }
}

fn find_sheet<'c>(config: &'c AppConfig, key: &str) -> Result<&'c SheetConfig> {
    config
        .find_sheet(key)
        .ok_or_else(|| eyre!("no sheet named '{key}'; see `sheetsync sheets list`"))
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let db_path = expand_home(&config.defaults.database)?;
    Ok(Storage::open(&db_path).await?)
}

// ---------------------------------------------------------------------------
// sync / preview
// ---------------------------------------------------------------------------

async fn cmd_sync(config_path: &Path, sheet: Option<&str>, json: bool) -> Result<()> {
    let config = load(config_path)?;
    let sheets: Vec<SheetConfig> = match sheet {
        Some(key) => vec![find_sheet(&config, key)?.clone()],
        None => config.sheets.clone(),
    };
    if sheets.is_empty() {
        return Err(eyre!("no sheets configured; add one with `sheetsync sheets add <url>`"));
    }

    let settings = SyncSettings::from(&config);
    let storage = open_storage(&config).await?;
    let fetcher = HttpFetcher::new(settings.fetch_timeout)?;
    let media_dir = expand_home(&config.defaults.media_dir)?;
    let images = MediaAttacher::new(fetcher.client().clone(), media_dir, &storage);

    let services = SyncServices {
        fetcher: &fetcher,
        store: &storage,
        taxonomy: &storage,
        images: &images,
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let ctrl_c = {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing current row");
                cancel.store(true, Ordering::Relaxed);
            }
        })
    };

    info!(sheets = sheets.len(), "starting sync");
    let progress = CliProgress::new(json);
    let log = run_batch_sync(&sheets, &settings, &services, &storage, &progress, &cancel).await;
    progress.finish();
    ctrl_c.abort();
    let log = log?;

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        print_log(&log);
    }
    Ok(())
}

fn print_log(log: &BatchSyncLog) {
    if log.lock_busy {
        println!("Another sync is already running; nothing done.");
        return;
    }

    println!();
    for report in &log.reports {
        print_report(report);
    }
    if log.reports.len() > 1 {
        print_report(&log.totals());
    }
    let elapsed = log.finished_at - log.started_at;
    println!(
        "  Time: {:.1}s",
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    println!();
}

fn print_report(report: &SheetReport) {
    println!("  {}", report.sheet_name);
    if let Some(error) = &report.error {
        println!("    Error:     {error}");
        return;
    }
    println!("    Rows:      {}", report.rows);
    println!("    Created:   {}", report.created);
    println!("    Updated:   {}", report.updated);
    println!("    Unchanged: {}", report.unchanged);
    println!("    Skipped:   {}", report.skipped);
    println!(
        "    Images:    {} set, {} failed",
        report.images_set, report.images_failed
    );
    if report.cancelled {
        println!("    (cancelled before all rows were processed)");
    }
}

async fn cmd_preview(config_path: &Path, sheet: &str, row: usize, json: bool) -> Result<()> {
    let config = load(config_path)?;
    let sheet = find_sheet(&config, sheet)?;
    let settings = SyncSettings::from(&config);
    let storage = open_storage(&config).await?;
    let fetcher = HttpFetcher::new(settings.fetch_timeout)?;

    let preview = preview_row(sheet, &settings, &fetcher, &storage, row).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        print_preview(&preview);
    }
    Ok(())
}

fn print_preview(preview: &Preview) {
    println!();
    println!(
        "  {}: row {} of {}",
        preview.sheet_name, preview.row, preview.total_rows
    );
    let details = match &preview.body {
        PreviewBody::Invalid { reason } => {
            println!("  Skipped: {reason}");
            println!();
            return;
        }
        PreviewBody::Details(details) => details,
    };

    let or_none = |s: &str| if s.is_empty() { "(none)".to_string() } else { s.to_string() };

    println!("  Action:   {}", details.action);
    println!("            {}", details.message);
    println!("  Title:    {}", details.title);
    println!("  Type:     {}", details.content_type);
    match details.date {
        Some(date) => println!("  Status:   {} ({})", details.status, date.to_rfc3339()),
        None => println!("  Status:   {}", details.status),
    }
    println!("  Category: {}", or_none(&details.category));
    println!("  Tags:     {}", or_none(&details.tags.join(", ")));
    println!("  Image:    {}", or_none(&details.image_url));
    println!();
    println!("{}", details.content_html);
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar per sheet.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl SyncProgress for CliProgress {
    fn sheet_started(&self, sheet: &SheetConfig, rows: usize) {
        self.bar.reset();
        self.bar.set_length(rows as u64);
        self.bar.set_message(sheet.name.clone());
    }

    fn row_done(&self, _position: usize, _outcome: &RowOutcome) {
        self.bar.inc(1);
    }

    fn sheet_finished(&self, report: &SheetReport) {
        let line = match &report.error {
            Some(error) => format!("✗ {}: {error}", report.sheet_name),
            None => format!(
                "✓ {}: {} created, {} updated, {} unchanged, {} skipped",
                report.sheet_name, report.created, report.updated, report.unchanged, report.skipped
            ),
        };
        self.bar.println(line);
    }
}

// ---------------------------------------------------------------------------
// sheets
// ---------------------------------------------------------------------------

fn cmd_sheets_list(config_path: &Path) -> Result<()> {
    let config = load(config_path)?;
    if config.sheets.is_empty() {
        println!("No sheets configured.");
        return Ok(());
    }
    for sheet in &config.sheets {
        println!("{}  {}", sheet.id, sheet.name);
        println!("    url:  {}", sheet.source_url);
        println!("    mode: {}  type: {}", sheet.mode, sheet.target_type);
    }
    Ok(())
}

fn cmd_sheets_add(
    config_path: &Path,
    url: &str,
    name: Option<&str>,
    mode: &str,
    template: Option<String>,
    target_type: &str,
) -> Result<()> {
    // Reject links we could never fetch.
    export_url(url)?;

    let mut config = load(config_path)?;
    let mut sheet = SheetConfig::new(name.unwrap_or_default(), url);
    sheet.mode = SheetMode::from(mode.to_string());
    if let Some(template) = template {
        sheet.template = template;
    }
    sheet.target_type = target_type.to_string();
    sheet.normalize(config.sheets.len() + 1);

    if config.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(&sheet.name)) {
        return Err(eyre!("a sheet named '{}' already exists", sheet.name));
    }

    println!("Added sheet {} ({})", sheet.name, sheet.id);
    config.sheets.push(sheet);
    save_config_to(&config, config_path)?;
    Ok(())
}

fn cmd_sheets_remove(config_path: &Path, key: &str) -> Result<()> {
    let mut config = load(config_path)?;
    let before = config.sheets.len();
    config.sheets.retain(|s| !s.matches(key));
    if config.sheets.len() == before {
        return Err(eyre!("no sheet named '{key}'"));
    }
    save_config_to(&config, config_path)?;
    println!("Removed sheet '{key}'");
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        return Err(eyre!("config already exists at {}", config_path.display()));
    }
    let path = if Some(config_path) == config_file_path().ok().as_deref() {
        init_config()?
    } else {
        save_config_to(&AppConfig::default(), config_path)?;
        config_path.to_path_buf()
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", config_path.display());
    println!("{toml_str}");
    Ok(())
}
