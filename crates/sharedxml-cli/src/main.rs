use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sharedxml::{
    render, try_encode, Config, EncodeStatus, LoadMode, Loader, LocalDocumentService, MemoryStore,
    SharedStore,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sharedxml",
    version,
    about = "Load XML into a shared record tree and print it as an indented outline"
)]
struct Args {
    /// Input file (defaults to stdin)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,
    /// Encode in the background and wait for it to finish
    #[arg(long = "async")]
    load_async: bool,
    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,
    /// Spaces before the root line
    #[arg(short, long, default_value_t = 0)]
    indent: usize,
    /// Bound on waiting for the document, 0 waits forever
    #[arg(long, value_name = "MS")]
    wait_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(ms) = args.wait_timeout_ms {
        config.wait_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }

    let lines = match &args.input {
        Some(path) => load_file(path, config, LoadMode::from_async_flag(args.load_async), args.indent).await?,
        None => encode_stdin(config, args.indent)?,
    };

    let mut text = lines.join("\n");
    text.push('\n');
    write_output(&args.output, text.as_bytes())
}

async fn load_file(path: &Path, config: Config, mode: LoadMode, indent: usize) -> Result<Vec<String>> {
    let file = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid input file name {}", path.display()))?;
    let data_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let timeout = config.wait_timeout;

    let loader = Loader::new(config.with_data_dir(data_dir), Arc::new(LocalDocumentService::default()));
    let id = loader
        .load_document(file, mode)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;
    let session = loader
        .session(id)
        .with_context(|| format!("document {id} disappeared"))?;

    let finished = session.wait_encoded();
    let status = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, finished)
            .await
            .with_context(|| format!("timed out encoding {}", path.display()))?,
        None => finished.await,
    };
    if status == EncodeStatus::Failed {
        bail!("failed to encode {}", path.display());
    }

    Ok(render(session.document().store().as_ref(), session.root(), indent))
}

fn encode_stdin(config: Config, indent: usize) -> Result<Vec<String>> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read stdin")?;
    if buffer.trim().is_empty() {
        bail!("no input provided on stdin");
    }

    let store = MemoryStore::new();
    let root = store.create_map()?;
    try_encode(&store, &buffer, root, config.parser).context("failed to encode stdin")?;
    Ok(render(&store, root, indent))
}

fn write_output(path: &Option<PathBuf>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, data)
            .with_context(|| format!("failed to write output file {}", path.display())),
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(data).context("failed to write stdout")?;
            Ok(())
        }
    }
}
