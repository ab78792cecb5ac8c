//! Terminal rendering of ranked docking results.

use dockflow_molecules::docking::DockingOutcome;
use dockflow_molecules::scoring::RankedResultSet;

/// One table row per outcome, in display order. Failed entries carry the
/// failure message in place of a score.
pub fn result_rows(ranked: &RankedResultSet) -> Vec<String> {
    let mut rows = vec![format!("{:>4}  {:<24} {:>10}  {:<10} {}", "#", "Molecule", "Affinity", "Covalent", "Status")];
    rows.extend(ranked.entries().enumerate().map(|(i, o)| row(i + 1, o)));
    rows
}

fn row(rank: usize, outcome: &DockingOutcome) -> String {
    let affinity = outcome
        .score()
        .map(|a| format!("{:.2}", a))
        .unwrap_or_else(|| "-".to_string());
    let status = match &outcome.failure {
        Some(reason) => format!("failed: {}", reason.message),
        None => outcome.status.clone().unwrap_or_else(|| "docked".to_string()),
    };
    format!(
        "{:>4}  {:<24} {:>10}  {:<10} {}",
        rank,
        truncate(&outcome.molecule_name, 24),
        affinity,
        outcome.covalent.label(),
        status
    )
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        return name.to_string();
    }
    let mut short: String = name.chars().take(width - 1).collect();
    short.push('…');
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockflow_molecules::docking::{DockingMode, DockingOutcome};
    use dockflow_molecules::ligand::MoleculeDescriptor;
    use dockflow_molecules::scoring::ResultRanker;
    use dockflow_molecules::service::DockingResponse;
    use dockflow_molecules::DockflowError;

    #[test]
    fn test_failed_rows_follow_scored_rows() {
        let err = DockflowError::RemoteRequest { status: Some(502), message: "bad gateway".into() };
        let outcomes = vec![
            DockingOutcome::failed(0, MoleculeDescriptor::new("C1CC", Some("broken")), &err),
            DockingOutcome::settle(
                1,
                MoleculeDescriptor::new("CCO", Some("ethanol")),
                DockingMode::Standard,
                Ok(DockingResponse { best_affinity: Some(-6.25), ..DockingResponse::default() }),
            ),
        ];
        let rows = result_rows(&ResultRanker::new().rank(outcomes));

        assert_eq!(rows.len(), 3);
        assert!(rows[1].contains("ethanol") && rows[1].contains("-6.25"));
        assert!(rows[2].contains("broken") && rows[2].contains("failed:"));
    }

    #[test]
    fn test_long_names_are_cut() {
        let name = "a".repeat(40);
        assert_eq!(truncate(&name, 24).chars().count(), 24);
        assert_eq!(truncate("short", 24), "short");
    }
}
