//! CLI binary for docsift.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs the extraction pipeline on one or more text
//! files, and prints records as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use docsift::{DocumentInput, DocumentType, ExtractionConfig, Extractor, InferenceMode};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"Examples:
  docsift invoice.txt
  docsift --doc-type resume cv.txt
  docsift --mode cloud --max-retries 5 *.txt
  docsift --health

Backends:
  local  Ollama at OLLAMA_HOST (default http://localhost:11434)
  cloud  any OpenAI-compatible endpoint at CLOUD_BASE_URL with CLOUD_API_KEY

With fallback enabled (default), the backend of the other kind is tried
once after the primary exhausts its retries.
"#;

/// Extract structured fields from documents using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "docsift",
    version,
    about = "Extract structured fields from invoices and resumes using LLMs",
    long_about = "Classify document text (invoice / resume / unknown), prompt a language model \
for structured fields, and emit scored JSON records. Runs against a local Ollama server or any \
OpenAI-compatible cloud endpoint, with retry, backoff, and cross-backend fallback.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Text files to extract from.
    #[arg(required_unless_present = "health")]
    inputs: Vec<PathBuf>,

    /// Force a document type instead of classifying: invoice, resume, unknown.
    #[arg(long, env = "DOCSIFT_DOC_TYPE")]
    doc_type: Option<String>,

    /// Inference mode: local (Ollama) or cloud (OpenAI-compatible API).
    #[arg(long, env = "DOCSIFT_MODE")]
    mode: Option<String>,

    /// Model ID override for the selected mode.
    #[arg(long, env = "DOCSIFT_MODEL")]
    model: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "DOCSIFT_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Attempts against the primary backend before falling back.
    #[arg(long, env = "DOCSIFT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Disable cross-backend fallback.
    #[arg(long, env = "DOCSIFT_NO_FALLBACK")]
    no_fallback: bool,

    /// Number of documents extracted concurrently.
    #[arg(short, long, env = "DOCSIFT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Write records to this file instead of stdout.
    #[arg(short, long, env = "DOCSIFT_OUTPUT")]
    output: Option<PathBuf>,

    /// Emit compact JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Probe backend availability and exit.
    #[arg(long)]
    health: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn build_config(&self) -> Result<ExtractionConfig> {
        let env_config = ExtractionConfig::from_env().context("invalid environment")?;
        let mode = match &self.mode {
            Some(raw) => raw.parse::<InferenceMode>()?,
            None => env_config.mode,
        };
        let mut builder = env_config.into_builder().mode(mode);
        if let Some(model) = &self.model {
            builder = match mode {
                InferenceMode::Local => builder.ollama_model(model),
                InferenceMode::Cloud => builder.cloud_model(model),
            };
        }

        Ok(builder
            .request_timeout_secs(self.timeout)
            .max_retries(self.max_retries)
            .fallback_enabled(!self.no_fallback)
            .concurrency(self.concurrency)
            .build()?)
    }

    fn forced_type(&self) -> Result<Option<DocumentType>> {
        let Some(raw) = &self.doc_type else {
            return Ok(None);
        };
        match raw.to_lowercase().as_str() {
            "invoice" => Ok(Some(DocumentType::Invoice)),
            "resume" => Ok(Some(DocumentType::Resume)),
            "unknown" => Ok(Some(DocumentType::Unknown)),
            other => anyhow::bail!("unknown document type '{other}' (invoice, resume, unknown)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.build_config()?;
    let extractor = Extractor::new(config).context("failed to initialise extractor")?;

    if cli.health {
        let health = extractor.health_check().await;
        println!("{}", serde_json::to_string_pretty(&health)?);
        if !health.primary_available && !health.fallback_available {
            anyhow::bail!("no backend available");
        }
        return Ok(());
    }

    let force_type = cli.forced_type()?;

    let mut docs = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        docs.push(DocumentInput::new(text, name));
    }

    let records = extractor.extract_batch(&docs, force_type).await;

    let rendered = if cli.compact {
        serde_json::to_string(&records)?
    } else {
        serde_json::to_string_pretty(&records)?
    };

    match &cli.output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }

    let failed = records.iter().filter(|r| !r.success).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} document(s) failed", records.len());
    }
    Ok(())
}
