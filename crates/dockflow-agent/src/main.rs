//! dockflow: runs the four-stage docking workflow from the command line.

mod cli;
mod output;
mod progress;
mod view;

use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dockflow_config::Config;
use dockflow_molecules::docking::{DockingAlgorithm, DockingConfiguration, DockingTaskDispatcher};
use dockflow_molecules::ligand::ingest;
use dockflow_molecules::pipeline::{StateUpdate, WorkflowStateMachine};
use dockflow_molecules::protein::prepare_protein_file;
use dockflow_molecules::report::ReportRequest;
use dockflow_molecules::service::{ComputationService, HttpComputationService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let (config, config_error) = match Config::load() {
        Ok(c) => (c, None),
        Err(e) => (Config::default(), Some(e)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    info!("🔬 dockflow starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match config_error {
        None => info!("Configuration loaded. Service: {}", config.service.base_url),
        Some(e) => {
            warn!("Could not load dockflow.toml: {e}");
            warn!("Copy dockflow.example.toml to dockflow.toml and edit it. Using built-in defaults for now.");
        }
    }

    let service = Arc::new(HttpComputationService::connect(
        &config.service.base_url,
        Duration::from_secs(config.service.timeout_secs),
        &config.service.allowed_hosts,
    )?);
    let mut workflow = WorkflowStateMachine::new();

    // Stage 1: protein
    let protein = prepare_protein_file(service.as_ref(), &args.protein)
        .await
        .with_context(|| format!("Protein preparation failed for {}", args.protein.display()))?;
    info!("✅ Protein prepared: {} cysteines", protein.cysteines.len());
    workflow.merge_update(StateUpdate::new().protein(protein));
    if !workflow.advance() {
        bail!("Prepared protein has no structure reference usable for docking");
    }

    // Stage 2: molecules
    for input in args.molecule_inputs().await? {
        match ingest(service.as_ref(), input).await {
            Ok(report) => {
                info!("Ingested {} molecules ({} rejected)", report.processed, report.rejected);
                workflow.append_molecules(report.molecules);
            }
            Err(e) if e.is_per_item() => warn!("Skipping ligand input: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
    if !workflow.advance() {
        bail!("No valid molecules to dock");
    }

    // Stage 3: docking configuration
    let algorithm: DockingAlgorithm = args
        .algorithm
        .as_deref()
        .unwrap_or(&config.docking.default_algorithm)
        .parse()?;
    let docking_config = match args.covalent.as_deref() {
        Some(target) => DockingConfiguration::covalent(algorithm, Some(target)),
        None => DockingConfiguration::standard(algorithm),
    };
    workflow.merge_update(StateUpdate::new().docking_config(docking_config));
    if !workflow.advance() {
        let available: Vec<String> = workflow
            .state()
            .protein()
            .map(|p| p.cysteines.iter().map(|c| c.target_id()).collect())
            .unwrap_or_default();
        bail!(
            "Covalent target {} is not a cysteine of the prepared protein (available: {})",
            args.covalent.as_deref().unwrap_or("<none>"),
            available.join(", ")
        );
    }

    // Stage 4: results
    let (progress_tx, progress_rx) = broadcast::channel(config.docking.progress_capacity.max(1));
    let progress_log = progress::spawn_log(progress_rx);
    let dispatcher = DockingTaskDispatcher::new(service.clone()).with_progress(progress_tx);
    let ranked = workflow.run_results_stage(&dispatcher).await?.clone();
    drop(dispatcher);
    progress::finish_log(progress_log).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
    } else {
        for line in output::result_rows(&ranked) {
            println!("{}", line);
        }
    }
    println!("{}", ranked.summary());

    let (Some(protein), Some(docking_config)) = (workflow.state().protein(), workflow.state().docking_config())
    else {
        bail!("Workflow state lost its protein or docking configuration");
    };

    if args.report {
        match ReportRequest::from_results(protein, docking_config, &ranked) {
            Ok(request) => match service.generate_report(&request).await {
                Ok(receipt) => {
                    println!("Report: {}", receipt.report_url);
                    if let Some(cid) = receipt.cid {
                        println!("CID:    {}", cid);
                    }
                }
                Err(e) => warn!("Report generation failed: {e}"),
            },
            Err(e) => warn!("No report: {e}"),
        }
    }

    if args.view {
        let (outcome, scene) = view::render(&config, protein, ranked.best()).await?;
        info!("View outcome: {:?}", outcome);
        for line in scene.describe() {
            println!("{}", line);
        }
    }

    Ok(())
}
