//! CLI binary for edgequake-pdf2csv.
//!
//! A thin shim over the library crate: `extract` runs one PDF through the
//! pipeline and prints CSV, `serve` starts the HTTP service.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2csv::csv::{to_csv_string, CSV_FILE_NAME};
use edgequake_pdf2csv::server::{run_server, DEFAULT_MAX_BODY_BYTES};
use edgequake_pdf2csv::{
    ExtractError, ExtractionConfig, ExtractionConfigBuilder, ExtractionProgressCallback, Extractor,
    PipelineStage, PlaceholderTextExtractor, ProgressCallback, Schema, SchemaField,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Percentage bar driven by pipeline stage transitions.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: PipelineStage) {
        let msg = match stage {
            PipelineStage::Pending => "validating…",
            PipelineStage::TextExtracted => "reading PDF text…",
            PipelineStage::ModelInvoked => "waiting for model…",
            PipelineStage::Normalized => "normalising rows…",
        };
        self.bar.set_position(u64::from(stage.percent()));
        self.bar.set_message(msg);
    }

    fn on_fallback(&self, reason: &str) {
        self.bar.println(format!(
            "  {} model reply unusable ({reason}), emitting placeholder row",
            yellow("⚠")
        ));
    }

    fn on_success(&self, rows: usize, _degraded: bool) {
        self.bar.set_position(100);
        self.bar.finish_and_clear();
        eprintln!("{} {} rows extracted", green("✔"), bold(&rows.to_string()));
    }

    fn on_failure(&self, _stage: PipelineStage, _error: &ExtractError) {
        self.bar.abandon();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Inline schema, CSV on stdout
  pdf2csv extract invoice.pdf -f "Company:text:Vendor name" -f "Total:number"

  # Schema from a JSON file, CSV to a file
  pdf2csv extract invoice.pdf --schema schema.json -o extracted_data.csv

  # From a URL, rows as JSON
  pdf2csv extract https://example.com/invoice.pdf --schema schema.json --json

  # HTTP service (POST /extract)
  pdf2csv serve --port 8787

SCHEMA FILE:
  [
    { "name": "Company", "type": "text",   "description": "Vendor name" },
    { "name": "Total",   "type": "number", "description": "Invoice total" }
  ]
  Types: text, number, date, boolean. Ids are assigned when omitted.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY      OpenAI API key
  OPENAI_BASE_URL     OpenAI-compatible endpoint (default https://api.openai.com/v1)
  PDF2CSV_MODEL       Model ID (default gpt-4o-mini)
  PDF2CSV_PROVIDER    edgequake-llm provider (anthropic, gemini, ollama, …)
  RUST_LOG            Log filter, e.g. edgequake_pdf2csv=debug
"#;

/// Extract tabular data from PDFs with an LLM and export it as CSV.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2csv",
    version,
    about = "Extract schema-driven tabular data from PDFs with an LLM",
    long_about = "Extract tabular data from PDF documents (local files or URLs) using a \
user-defined schema and a language model, and export it as semicolon-delimited CSV. \
Also serves the same pipeline over HTTP.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    model: ModelArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2CSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2CSV_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract rows from one PDF.
    Extract(ExtractArgs),
    /// Serve POST /extract over HTTP.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// OpenAI API key.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, global = true, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Model ID (default gpt-4o-mini).
    #[arg(long, global = true, env = "PDF2CSV_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider instead of the built-in OpenAI client.
    #[arg(long, global = true, env = "PDF2CSV_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "PDF2CSV_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, global = true, env = "PDF2CSV_MAX_TOKENS", default_value_t = 2000)]
    max_tokens: usize,

    /// LLM call timeout in seconds.
    #[arg(long, global = true, env = "PDF2CSV_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, global = true, env = "PDF2CSV_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Use the fixed sample text instead of reading the PDF.
    #[arg(long, global = true)]
    placeholder_text: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// JSON file holding the schema (array of fields).
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Inline field `name[:type[:description]]`; repeatable.
    #[arg(short, long = "field", value_name = "SPEC")]
    fields: Vec<String>,

    /// Write CSV to this file instead of stdout.
    #[arg(short, long, env = "PDF2CSV_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the rows as JSON instead of CSV.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2CSV_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2CSV_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "PDF2CSV_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(short, long, env = "PDF2CSV_PORT", default_value_t = 8787)]
    port: u16,

    /// Maximum request body size in bytes.
    #[arg(long, env = "PDF2CSV_MAX_BODY", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Keep library INFO logs out of the way of the progress bar.
    let show_progress = match &cli.command {
        Command::Extract(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let extractor = build_extractor(&cli.model, progress).await?;

    match cli.command {
        Command::Extract(args) => run_extract(&extractor, &args, cli.quiet).await,
        Command::Serve(args) => {
            run_server(&args.host, args.port, Arc::new(extractor), args.max_body)
                .await
                .with_context(|| format!("Server on {}:{} failed", args.host, args.port))
        }
    }
}

async fn run_extract(extractor: &Extractor, args: &ExtractArgs, quiet: bool) -> Result<()> {
    let schema = load_schema(args).await?;
    schema.validate().context("Invalid schema")?;
    if let Some(e) = extractor.configuration_error() {
        bail!("{e}\nSet OPENAI_API_KEY or pass --api-key / --provider.");
    }

    if let Some(ref output_path) = args.output {
        let output = extractor
            .extract_to_csv_file(&args.input, &schema, output_path, args.download_timeout)
            .await
            .context("Extraction failed")?;
        if !quiet {
            eprintln!(
                "{}  {} rows  {}ms  →  {}",
                if output.degraded { yellow("⚠") } else { green("✔") },
                output.rows.len(),
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {} tokens in  /  {} tokens out",
                dim(&output.stats.input_tokens.to_string()),
                dim(&output.stats.output_tokens.to_string()),
            );
        }
        return Ok(());
    }

    let output = extractor
        .extract_file(&args.input, &schema, args.download_timeout)
        .await
        .context("Extraction failed")?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    } else {
        let csv = to_csv_string(&schema, &output.rows).context("Failed to render CSV")?;
        handle
            .write_all(csv.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if !quiet && !args.json {
        if output.degraded {
            eprintln!(
                "{} model reply was not usable JSON; output holds a placeholder row",
                yellow("⚠")
            );
        }
        eprintln!(
            "{}",
            dim(&format!(
                "{} rows in {}ms (use -o {} to save)",
                output.rows.len(),
                output.stats.total_duration_ms,
                CSV_FILE_NAME
            ))
        );
    }
    Ok(())
}

/// Schema from `--schema` and/or repeated `--field` flags.
async fn load_schema(args: &ExtractArgs) -> Result<Schema> {
    let mut fields: Vec<SchemaField> = Vec::new();
    if let Some(ref path) = args.schema {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read schema from {:?}", path))?;
        let schema = Schema::from_json(&json)
            .with_context(|| format!("Failed to parse schema file {:?}", path))?;
        fields.extend(schema.fields().iter().cloned());
    }
    for spec in &args.fields {
        fields.push(SchemaField::parse_spec(spec).with_context(|| format!("Bad --field '{spec}'"))?);
    }
    if fields.is_empty() {
        bail!("No schema given. Use --schema <file.json> or --field <name[:type[:description]]>.");
    }
    Ok(Schema::new(fields))
}

/// Map CLI args to an [`Extractor`].
async fn build_extractor(args: &ModelArgs, progress: Option<ProgressCallback>) -> Result<Extractor> {
    let system_prompt = if let Some(ref path) = args.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = ExtractionConfigBuilder::from_config(ExtractionConfig::from_env())
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .api_timeout_secs(args.api_timeout);
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref url) = args.base_url {
        builder = builder.base_url(url.clone());
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    let config = builder.build().context("Invalid configuration")?;

    let mut extractor = Extractor::builder().config(config);
    if args.placeholder_text {
        extractor = extractor.text_extractor(Arc::new(PlaceholderTextExtractor));
    }
    if let Some(cb) = progress {
        extractor = extractor.progress_callback(cb);
    }
    extractor.build().context("Failed to initialise extractor")
}
