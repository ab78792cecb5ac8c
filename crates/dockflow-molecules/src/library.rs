//! Curated ligand libraries and compound search hosted by the service.
//!
//! Endpoints (relative to the service base URL):
//!   GET library/covalent          known covalent inhibitors
//!   GET library/non-covalent      known non-covalent binders
//!   GET library/warheads          warhead fragments
//!   GET library/test-set          covalent and non-covalent sets combined
//!   GET library/process-test-set  test set with 3D structures already built
//!   GET search/pubchem            PubChem hits for the target

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use dockflow_common::DockflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LibraryKind {
    Covalent,
    NonCovalent,
    Warheads,
    TestSet,
}

impl LibraryKind {
    pub const ALL: [LibraryKind; 4] = [
        LibraryKind::Covalent,
        LibraryKind::NonCovalent,
        LibraryKind::Warheads,
        LibraryKind::TestSet,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            LibraryKind::Covalent => "covalent",
            LibraryKind::NonCovalent => "non-covalent",
            LibraryKind::Warheads => "warheads",
            LibraryKind::TestSet => "test-set",
        }
    }

    /// Listing endpoint, relative to the service base URL.
    pub fn path(&self) -> String {
        format!("library/{}", self.slug())
    }
}

impl fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for LibraryKind {
    type Err = DockflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "covalent" => Ok(LibraryKind::Covalent),
            "non-covalent" | "noncovalent" => Ok(LibraryKind::NonCovalent),
            "warheads" | "warhead" => Ok(LibraryKind::Warheads),
            "test-set" | "testset" | "test" => Ok(LibraryKind::TestSet),
            other => Err(DockflowError::Config(format!(
                "Unknown library '{}'. Expected covalent, non-covalent, warheads or test-set",
                other
            ))),
        }
    }
}

/// One named molecule of a curated library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    pub smiles: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LibraryMolecule {
    smiles: String,
    #[serde(default)]
    description: Option<String>,
}

/// Body of a library listing: `{"molecules": {"<name>": {"smiles", "description"}}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct LibraryEnvelope {
    #[serde(default)]
    molecules: BTreeMap<String, LibraryMolecule>,
}

impl LibraryEnvelope {
    /// Entries ordered by name.
    pub(crate) fn into_entries(self) -> Vec<LibraryEntry> {
        self.molecules
            .into_iter()
            .map(|(name, m)| LibraryEntry {
                name,
                smiles: m.smiles,
                description: m.description.filter(|d| !d.trim().is_empty()),
            })
            .collect()
    }
}

/// A PubChem compound returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundHit {
    pub name: String,
    pub smiles: String,
    pub molecular_weight: Option<String>,
    pub molecular_formula: Option<String>,
    pub pubchem_cid: Option<String>,
}

impl CompoundHit {
    /// Read one search hit. PubChem fields arrive as strings or numbers and
    /// may be blank; entries without SMILES are skipped.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        let smiles = text_field(json, "smiles")?;
        let pubchem_cid = text_field(json, "pubchem_cid");
        let name = text_field(json, "name").unwrap_or_else(|| match &pubchem_cid {
            Some(cid) => format!("CID_{}", cid),
            None => "CID_unknown".to_string(),
        });
        Some(Self {
            name,
            smiles,
            molecular_weight: text_field(json, "molecular_weight"),
            molecular_formula: text_field(json, "molecular_formula"),
            pubchem_cid,
        })
    }
}

fn text_field(json: &serde_json::Value, key: &str) -> Option<String> {
    let text = match &json[key] {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Names and SMILES as parallel lists, ready for batch processing.
pub fn batch_lists<'a, I>(named: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    named
        .into_iter()
        .map(|(name, smiles)| (smiles.to_string(), name.to_string()))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_library_kind_parsing() {
        assert_eq!("non_covalent".parse::<LibraryKind>().unwrap(), LibraryKind::NonCovalent);
        assert_eq!("Test-Set".parse::<LibraryKind>().unwrap(), LibraryKind::TestSet);
        assert!("fragments".parse::<LibraryKind>().is_err());
        assert_eq!(LibraryKind::Warheads.path(), "library/warheads");
    }

    #[test]
    fn test_library_envelope_orders_by_name() {
        let envelope: LibraryEnvelope = serde_json::from_value(json!({
            "success": true,
            "molecules": {
                "chloroacetamide": { "smiles": "ClCC(=O)N", "description": "Chloroacetamide warhead" },
                "acrylamide": { "smiles": "C=CC(=O)N", "description": "" }
            }
        }))
        .unwrap();
        let entries = envelope.into_entries();
        assert_eq!(entries[0].name, "acrylamide");
        assert_eq!(entries[0].description, None);
        assert_eq!(entries[1].smiles, "ClCC(=O)N");
    }

    #[test]
    fn test_compound_hit_tolerates_numbers_and_blanks() {
        let hit = CompoundHit::from_json(&json!({
            "name": "",
            "smiles": "CC(=O)Nc1ccccc1",
            "molecular_weight": "135.16",
            "molecular_formula": "",
            "pubchem_cid": 904
        }))
        .unwrap();
        assert_eq!(hit.name, "CID_904");
        assert_eq!(hit.pubchem_cid.as_deref(), Some("904"));
        assert_eq!(hit.molecular_formula, None);

        assert!(CompoundHit::from_json(&json!({ "name": "no structure" })).is_none());
    }

    #[test]
    fn test_batch_lists_keep_pairs_aligned() {
        let (smiles, names) = batch_lists([("acrylamide", "C=CC(=O)N"), ("propiolamide", "C#CC(=O)N")]);
        assert_eq!(smiles, vec!["C=CC(=O)N", "C#CC(=O)N"]);
        assert_eq!(names, vec!["acrylamide", "propiolamide"]);
    }
}
