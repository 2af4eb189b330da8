//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use futures::StreamExt;
use futures::stream::BoxStream;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use chatscribe_core::{Pipeline, PipelineOptions};
use chatscribe_llm::OpenAiClient;
use chatscribe_shared::{AppConfig, ProgressEvent, init_config, load_config, validate_api_key};
use chatscribe_transcript::HttpFetcher;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Chatscribe: turn shared ChatGPT conversations into blog articles.
#[derive(Parser)]
#[command(
    name = "chatscribe",
    version,
    about = "Turn shared ChatGPT conversations into streamed blog articles.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Generate an article from a share link or a conversation text file.
    Generate {
        /// Shared conversation URL.
        #[arg(required_unless_present = "input", conflicts_with = "input")]
        url: Option<String>,

        /// Read conversation text from a file instead of fetching a URL.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file (defaults to <output_dir>/blog_<timestamp>.md).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Keep one representative chunk per topic cluster.
        #[arg(long)]
        cluster: bool,
    },

    /// Serve the article pipeline over HTTP with server-sent events.
    Serve {
        /// Bind host (overrides config).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
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
        0 => "chatscribe=info",
        1 => "chatscribe=debug",
        _ => "chatscribe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Generate {
            url,
            input,
            out,
            cluster,
        } => cmd_generate(url, input, out, cluster).await,
        Command::Serve { host, port } => cmd_serve(host, port).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Build a pipeline backed by the configured provider.
pub(crate) fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    validate_api_key(config)?;
    let client = Arc::new(OpenAiClient::from_config(&config.provider)?);
    Ok(Pipeline::new(client.clone(), PipelineOptions::from(config)).with_embedder(client))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    url: Option<String>,
    input: Option<PathBuf>,
    out: Option<PathBuf>,
    cluster: bool,
) -> Result<()> {
    let mut config = load_config()?;
    config.defaults.cluster |= cluster;
    let pipeline = build_pipeline(&config)?;

    let events = match (url, input) {
        (_, Some(path)) => {
            let text = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            info!(path = %path.display(), chars = text.len(), "generating from file");
            pipeline.run(text)
        }
        (Some(url), None) => {
            info!(%url, "generating from share link");
            let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
            pipeline.run_url(fetcher, url)
        }
        (None, None) => return Err(eyre!("either a URL or --input is required")),
    };

    let progress = CliProgress::new();
    let article = collect_article(events, |event| progress.update(event)).await;
    progress.finish();
    let article = article?;

    let path = out.unwrap_or_else(|| default_output_path(Path::new(&config.defaults.output_dir)));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, &article)
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;

    println!();
    println!("  Blog generated successfully!");
    println!("  Words:  {}", article.split_whitespace().count());
    println!("  Path:   {}", path.display());
    println!();

    Ok(())
}

async fn cmd_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = load_config()?;
    let pipeline = build_pipeline(&config)?;
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);

    let host = host.unwrap_or(config.server.host);
    let port = port.unwrap_or(config.server.port);
    crate::server::serve(&host, port, pipeline, fetcher).await
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Article collection
// ---------------------------------------------------------------------------

/// Drain a run, concatenating its text. A terminal error becomes `Err`.
pub(crate) async fn collect_article(
    mut events: BoxStream<'static, ProgressEvent>,
    mut on_event: impl FnMut(&ProgressEvent),
) -> Result<String> {
    let mut article = String::new();
    while let Some(event) = events.next().await {
        on_event(&event);
        if let Some(chunk) = &event.chunk {
            article.push_str(chunk);
        }
        if event.is_error() {
            return Err(eyre!("{}", event.status));
        }
        if event.is_terminal() {
            return Ok(article);
        }
    }
    Err(eyre!("run ended without a final status"))
}

/// `<dir>/blog_<YYYYmmdd_HHMMSS>.md`.
pub(crate) fn default_output_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("blog_{stamp}.md"))
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{prefix:>3}%] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn update(&self, event: &ProgressEvent) {
        self.spinner.set_prefix(event.percent.to_string());
        self.spinner.set_message(event.status.clone());
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(list: Vec<ProgressEvent>) -> BoxStream<'static, ProgressEvent> {
        Box::pin(futures::stream::iter(list))
    }

    #[tokio::test]
    async fn collects_text_until_success() {
        let run = events(vec![
            ProgressEvent::status(70, "Generating blog..."),
            ProgressEvent::text(70, "Generating...", "Hello"),
            ProgressEvent::text(80, "Generating...", "\nWorld"),
            ProgressEvent::completed(),
        ]);
        let mut seen = 0;
        let article = collect_article(run, |_| seen += 1).await.unwrap();
        assert_eq!(article, "Hello\nWorld");
        assert_eq!(seen, 4);
    }

    #[tokio::test]
    async fn terminal_error_is_returned() {
        let run = events(vec![ProgressEvent::failed("fetch error: 404")]);
        let err = collect_article(run, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("fetch error: 404"));
    }

    #[tokio::test]
    async fn truncated_run_is_an_error() {
        let run = events(vec![ProgressEvent::status(55, "Normalizing text...")]);
        assert!(collect_article(run, |_| {}).await.is_err());
    }

    #[test]
    fn output_path_is_timestamped_markdown() {
        let path = default_output_path(Path::new("out"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(path.starts_with("out"));
        assert!(name.starts_with("blog_") && name.ends_with(".md"));
        assert_eq!(name.len(), "blog_20240101_120000.md".len());
    }
}
