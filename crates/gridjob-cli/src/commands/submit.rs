use std::path::{Path, PathBuf};
use std::sync::Arc;

use gridjob_client::{GridClient, JobHandle};
use gridjob_core::{ClientConfig, Dag, ExecutionOutcome, FsCodeLoader};
use serde_json::json;
use tracing::{info, warn};

pub struct SubmitArgs {
    pub config: PathBuf,
    pub name: String,
    pub graph: PathBuf,
    pub code_root: PathBuf,
    pub code: Vec<String>,
    pub archives: Vec<String>,
    pub data: Vec<String>,
}

pub fn run(args: SubmitArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let graph = load_graph(&args.graph)?;
    tokio::runtime::Runtime::new()?.block_on(submit(args, config, graph))
}

async fn submit(args: SubmitArgs, config: ClientConfig, graph: Dag) -> anyhow::Result<()> {
    let client = GridClient::connect(config)?
        .with_code_loader(Arc::new(FsCodeLoader::new(args.code_root.clone())));
    let job = client.job(&args.name)?;
    stage(&job, &args)?;
    info!(job = %args.name, resources = job.resource_count(), transport = %job.transport(), "submitting");

    let result = run_to_completion(&job, graph).await;
    if let Err(e) = job.destroy().await {
        warn!(job = %args.name, error = %e, "destroy failed");
    }
    let (outcome, report) = result?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !outcome.is_success() {
        anyhow::bail!("job {} did not complete", args.name);
    }
    Ok(())
}

/// A missing config file falls back to the defaults.
fn load_config(path: &Path) -> anyhow::Result<ClientConfig> {
    if path.exists() {
        ClientConfig::from_file(path)
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
        Ok(ClientConfig::default())
    }
}

fn load_graph(path: &Path) -> anyhow::Result<Dag> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn stage(job: &JobHandle, args: &SubmitArgs) -> anyhow::Result<()> {
    let code: Vec<&str> = args.code.iter().map(String::as_str).collect();
    job.add_code(&code)?;
    for locator in &args.archives {
        job.add_archive(locator, None)?;
    }
    for locator in &args.data {
        job.add_data(locator, None)?;
    }
    Ok(())
}

async fn run_to_completion(
    job: &JobHandle,
    graph: Dag,
) -> anyhow::Result<(ExecutionOutcome, serde_json::Value)> {
    job.init(None).await?;
    job.submit(graph).await?;
    let outcome = job.execute().await?.await?;
    let accumulators = job.accumulators().await?;
    let report = json!({
        "job": job.name(),
        "outcome": outcome,
        "accumulators": accumulators,
    });
    Ok((outcome, report))
}
