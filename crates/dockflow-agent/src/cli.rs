//! Command-line arguments.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;

use dockflow_molecules::library::LibraryKind;
use dockflow_molecules::ligand::MoleculeInput;

#[derive(Debug, Parser)]
#[command(name = "dockflow", version, about = "Run a docking workflow against a computation service")]
pub struct Cli {
    /// Receptor structure (.pdb)
    #[arg(long, value_name = "FILE")]
    pub protein: PathBuf,

    /// Ligand SMILES; repeat for several ligands
    #[arg(long = "smiles", value_name = "SMILES")]
    pub smiles: Vec<String>,

    /// File with one SMILES per line
    #[arg(long, value_name = "FILE")]
    pub smiles_file: Option<PathBuf>,

    /// SDF file with ligands
    #[arg(long, value_name = "FILE")]
    pub sdf: Option<PathBuf>,

    /// Curated library to dock: covalent, non-covalent, warheads or test-set
    #[arg(long = "library", value_name = "NAME")]
    pub libraries: Vec<LibraryKind>,

    /// Dock the compounds the service finds on PubChem
    #[arg(long)]
    pub pubchem: bool,

    /// Dock covalently against this cysteine, e.g. A_145
    #[arg(long, value_name = "CHAIN_RES")]
    pub covalent: Option<String>,

    /// autodock, glide or gold (defaults to docking.default_algorithm)
    #[arg(long)]
    pub algorithm: Option<String>,

    /// Request a report for the best result
    #[arg(long)]
    pub report: bool,

    /// Render the best pose and print the composed layers
    #[arg(long)]
    pub view: bool,

    /// Print the ranked results as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Ligand input batches in a fixed order: SMILES, SMILES file, SDF,
    /// libraries, PubChem.
    pub async fn molecule_inputs(&self) -> anyhow::Result<Vec<MoleculeInput>> {
        let mut inputs: Vec<MoleculeInput> = self
            .smiles
            .iter()
            .map(|s| MoleculeInput::Smiles { smiles: s.clone(), name: None })
            .collect();

        if let Some(path) = &self.smiles_file {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Cannot read {}", path.display()))?;
            inputs.push(MoleculeInput::Batch(text));
        }

        if let Some(path) = &self.sdf {
            let contents = tokio::fs::read(path)
                .await
                .with_context(|| format!("Cannot read {}", path.display()))?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("ligands.sdf")
                .to_string();
            inputs.push(MoleculeInput::Sdf { file_name, contents });
        }

        inputs.extend(self.libraries.iter().copied().map(MoleculeInput::Library));
        if self.pubchem {
            inputs.push(MoleculeInput::PubChem);
        }

        if inputs.is_empty() {
            bail!("No ligands given; use --smiles, --smiles-file, --sdf, --library or --pubchem");
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_repeated_smiles_flags() {
        let cli = Cli::try_parse_from([
            "dockflow", "--protein", "mk2.pdb", "--smiles", "CCO", "--smiles", "CC(=O)Nc1ccccc1",
            "--covalent", "A_145",
        ])
        .unwrap();
        assert_eq!(cli.smiles, vec!["CCO", "CC(=O)Nc1ccccc1"]);
        assert_eq!(cli.covalent.as_deref(), Some("A_145"));
        assert!(!cli.report);
    }

    #[test]
    fn test_protein_is_required() {
        assert!(Cli::try_parse_from(["dockflow", "--smiles", "CCO"]).is_err());
    }

    #[tokio::test]
    async fn test_inputs_keep_flag_order() {
        let mut batch = tempfile::NamedTempFile::new().unwrap();
        writeln!(batch, "CCN\nCCC").unwrap();
        let path = batch.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from(["dockflow", "--protein", "mk2.pdb", "--smiles", "CCO", "--smiles-file", &path])
            .unwrap();
        let inputs = cli.molecule_inputs().await.unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(matches!(&inputs[0], MoleculeInput::Smiles { smiles, .. } if smiles == "CCO"));
        assert!(matches!(&inputs[1], MoleculeInput::Batch(text) if text.contains("CCC")));
    }

    #[tokio::test]
    async fn test_library_and_pubchem_inputs() {
        let cli = Cli::try_parse_from([
            "dockflow", "--protein", "mk2.pdb", "--library", "warheads", "--library", "test-set", "--pubchem",
        ])
        .unwrap();
        let inputs = cli.molecule_inputs().await.unwrap();
        assert_eq!(inputs.len(), 3);
        assert!(matches!(inputs[0], MoleculeInput::Library(LibraryKind::Warheads)));
        assert!(matches!(inputs[1], MoleculeInput::Library(LibraryKind::TestSet)));
        assert!(matches!(inputs[2], MoleculeInput::PubChem));
    }

    #[test]
    fn test_unknown_library_is_rejected() {
        assert!(Cli::try_parse_from(["dockflow", "--protein", "mk2.pdb", "--library", "fragments"]).is_err());
    }

    #[tokio::test]
    async fn test_no_ligands_is_an_error() {
        let cli = Cli::try_parse_from(["dockflow", "--protein", "mk2.pdb"]).unwrap();
        assert!(cli.molecule_inputs().await.is_err());
    }
}
