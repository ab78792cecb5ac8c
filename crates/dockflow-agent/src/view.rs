//! Composes the receptor and the best pose into a scene.

use std::time::Duration;
use tracing::{info, warn};

use dockflow_config::Config;
use dockflow_molecules::docking::DockingOutcome;
use dockflow_molecules::protein::ProteinDescriptor;
use dockflow_viewer::{
    ApplyOutcome, DisplayOptions, HttpStructureFetcher, LigandState, SceneGraph, SourceResolver,
    StructureVisualizationAdapter, ViewInputs,
};

pub fn display_options(config: &Config, binding_site: Option<[f64; 3]>) -> DisplayOptions {
    DisplayOptions {
        show_surface: config.viewer.show_surface,
        show_binding_site: config.viewer.show_binding_site,
        show_ligand: config.viewer.show_ligand,
        binding_site,
        binding_site_radius: config.viewer.binding_site_radius,
        surface_opacity: config.viewer.surface_opacity,
    }
}

/// Geometric centre of the ATOM/HETATM records in a PDB or PDBQT payload.
pub fn pose_centroid(coordinates: &str) -> Option<[f64; 3]> {
    let mut sum = [0.0_f64; 3];
    let mut n = 0usize;
    for line in coordinates.lines() {
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
            continue;
        }
        let xyz = [line.get(30..38), line.get(38..46), line.get(46..54)];
        let parsed: Option<Vec<f64>> = xyz
            .iter()
            .map(|field| field.and_then(|f| f.trim().parse::<f64>().ok()))
            .collect();
        if let Some(p) = parsed {
            for (acc, v) in sum.iter_mut().zip(p) {
                *acc += v;
            }
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }
    Some(sum.map(|v| v / n as f64))
}

pub fn view_inputs(protein: &ProteinDescriptor, best: Option<&DockingOutcome>) -> ViewInputs {
    let inline = best.and_then(|o| o.poses.first()).and_then(|p| p.inline_coordinates.clone());
    ViewInputs {
        receptor: protein.visual_ref.clone(),
        ligand: best.and_then(|o| o.pose_ref.clone()),
        inline_pose: inline,
    }
}

/// Load the receptor and best pose over HTTP and return the composed scene.
pub async fn render(
    config: &Config,
    protein: &ProteinDescriptor,
    best: Option<&DockingOutcome>,
) -> anyhow::Result<(ApplyOutcome, SceneGraph)> {
    let timeout = Duration::from_secs(config.service.timeout_secs);
    let fetcher = HttpStructureFetcher::for_backend(&config.service.base_url, timeout, &config.service.allowed_hosts)?;
    let resolver = SourceResolver::new(&config.service.base_url)?;

    let inputs = view_inputs(protein, best);
    let site = inputs.inline_pose.as_deref().and_then(pose_centroid);
    let mut view = StructureVisualizationAdapter::new(SceneGraph::new(), resolver, display_options(config, site));

    let outcome = view.load(inputs, &fetcher).await;
    match &outcome {
        ApplyOutcome::Composed(LigandState::Failed(message)) => warn!("Ligand layer unavailable: {}", message),
        ApplyOutcome::ReceptorFailed(message) => warn!("Receptor could not be shown: {}", message),
        other => info!("View composed: {:?}", other),
    }
    Ok((outcome, view.into_context()))
}
