use anyhow::{bail, Context};
use clap::Parser;
use recon::tracker::Phase;
use recon::{ReconConfig, UploadWorkflow};
use recon_client::HttpIngestionApi;
use recon_core::{CanonicalField, RawFile};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Upload a CSV/XLS/XLSX transaction file for reconciliation and follow the
/// processing job until it finishes.
#[derive(Parser, Debug)]
#[command(name = "recon-upload", version)]
struct Args {
    /// File to upload (.csv, .xls or .xlsx)
    file: PathBuf,

    /// Column holding the transaction ID
    #[arg(long)]
    transaction_id: Option<String>,

    /// Column holding the amount
    #[arg(long)]
    amount: Option<String>,

    /// Column holding the reference number
    #[arg(long)]
    reference_number: Option<String>,

    /// Column holding the transaction date
    #[arg(long)]
    date: Option<String>,

    /// Print the column headers and exit
    #[arg(long)]
    headers: bool,

    /// Print the first rows as JSON and exit
    #[arg(long)]
    preview: bool,

    /// Path to recon.toml
    #[arg(long, env = "RECON_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL, overrides the config file
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ReconConfig::load(args.config.as_deref())?;
    if let Some(url) = &args.api_url {
        config.api_base_url = url.clone();
    }

    let file = RawFile::read(&args.file)
        .await
        .with_context(|| format!("Cannot open {}", args.file.display()))?;
    println!("{} ({})", file.name(), file.size_mb());

    let api = HttpIngestionApi::new(
        &config.api_base_url,
        config.api_token.clone(),
        config.request_timeout(),
    )?;
    let mut workflow = UploadWorkflow::new(Arc::new(api), config.poll_interval());

    if let Err(e) = workflow.select_file(file).await {
        let shown = workflow.message().map(|m| m.to_string()).unwrap_or_default();
        return Err(e).context(shown);
    }

    if args.headers || args.preview {
        if args.headers {
            for header in workflow.headers().iter() {
                println!("{header}");
            }
        }
        if args.preview {
            for row in workflow.load_preview().await? {
                println!("{}", serde_json::to_string(row)?);
            }
        }
        return Ok(());
    }

    let selections = [
        (CanonicalField::TransactionId, &args.transaction_id),
        (CanonicalField::Amount, &args.amount),
        (CanonicalField::ReferenceNumber, &args.reference_number),
        (CanonicalField::Date, &args.date),
    ];
    for (field, header) in selections {
        if let Some(header) = header {
            workflow
                .set_mapping(field, Some(header.as_str()))
                .with_context(|| format!("Cannot map {}", field.label()))?;
        }
    }

    if let Err(e) = workflow.submit().await {
        match workflow.message() {
            Some(message) => bail!("{message}"),
            None => return Err(e.into()),
        }
    }

    let mut updates = workflow.subscribe();
    let mut last_progress = None;
    loop {
        let state = updates.borrow_and_update().clone();
        if state.phase() == Phase::Polling && last_progress != Some(state.progress()) {
            if let Some(job) = state.job_id() {
                println!("Job {job}: {}%", state.progress());
            }
            last_progress = Some(state.progress());
        }
        if state.phase().is_terminal() {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                workflow.reset();
                bail!("Cancelled; the server keeps processing the job");
            }
        }
    }

    let state = workflow.state();
    match (state.phase(), workflow.message()) {
        (Phase::Completed, Some(notice)) => println!("{notice}"),
        (Phase::Completed, None) => println!("Upload completed: {}%", state.progress()),
        (_, Some(message)) => bail!("{message}"),
        (phase, None) => bail!("Upload ended in state {phase}"),
    }
    Ok(())
}
