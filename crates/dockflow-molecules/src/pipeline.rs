//! Four-stage workflow controller.
//!
//! Stages run in a fixed order:
//!   Protein → Molecules → DockingConfig → Results
//!
//! Each stage may only be left once its data is present. Going back keeps
//! everything accumulated so far. State changes happen through
//! [`WorkflowStateMachine::merge_update`] only, and results of a docking run
//! are applied only if no newer run or input change happened meanwhile.

use serde::Serialize;
use std::fmt;
use tracing::{debug, info, instrument, warn};

use dockflow_common::{DockflowError, Generation, GenerationTicket, Result};
use crate::docking::{DockingConfiguration, DockingTaskDispatcher};
use crate::ligand::MoleculeDescriptor;
use crate::protein::ProteinDescriptor;
use crate::scoring::RankedResultSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Protein,
    Molecules,
    DockingConfig,
    Results,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Protein, Stage::Molecules, Stage::DockingConfig, Stage::Results];

    pub fn index(&self) -> usize {
        match self {
            Stage::Protein => 0,
            Stage::Molecules => 1,
            Stage::DockingConfig => 2,
            Stage::Results => 3,
        }
    }

    pub fn next(&self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(&self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Stage::ALL[i])
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::Protein => "Protein Preparation",
            Stage::Molecules => "Molecule Input",
            Stage::DockingConfig => "Docking Configuration",
            Stage::Results => "Results",
        }
    }

    /// Whether `state` holds what this stage must produce before it can be left.
    /// The terminal stage can never be left.
    pub fn is_satisfied(&self, state: &WorkflowState) -> bool {
        match self {
            Stage::Protein => state.protein.as_ref().is_some_and(ProteinDescriptor::is_docking_eligible),
            Stage::Molecules => !state.molecules.is_empty(),
            Stage::DockingConfig => state
                .docking_config
                .as_ref()
                .is_some_and(|c| c.is_complete(state.protein.as_ref())),
            Stage::Results => false,
        }
    }

    pub fn contract(&self) -> StageContract {
        use StateField::*;
        let stage = *self;
        match self {
            Stage::Protein => StageContract { stage, requires: &[], produces: &[Protein] },
            Stage::Molecules => StageContract { stage, requires: &[Protein], produces: &[Molecules] },
            Stage::DockingConfig => StageContract {
                stage,
                requires: &[Protein, Molecules],
                produces: &[DockingConfig],
            },
            Stage::Results => StageContract {
                stage,
                requires: &[Protein, Molecules, DockingConfig],
                produces: &[Results],
            },
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    Protein,
    Molecules,
    DockingConfig,
    Results,
}

/// Inputs a stage reads on entry and the fields it fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageContract {
    pub stage: Stage,
    pub requires: &'static [StateField],
    pub produces: &'static [StateField],
}

/// Accumulated workflow data. Owned by the state machine; read-only elsewhere.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    protein: Option<ProteinDescriptor>,
    molecules: Vec<MoleculeDescriptor>,
    docking_config: Option<DockingConfiguration>,
    results: Option<RankedResultSet>,
    version: u64,
}

impl WorkflowState {
    pub fn protein(&self) -> Option<&ProteinDescriptor> {
        self.protein.as_ref()
    }

    pub fn molecules(&self) -> &[MoleculeDescriptor] {
        &self.molecules
    }

    pub fn docking_config(&self) -> Option<&DockingConfiguration> {
        self.docking_config.as_ref()
    }

    pub fn results(&self) -> Option<&RankedResultSet> {
        self.results.as_ref()
    }

    /// Bumped by every merged update.
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Partial state. Fields left `None` keep their current value on merge.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    protein: Option<ProteinDescriptor>,
    molecules: Option<Vec<MoleculeDescriptor>>,
    docking_config: Option<DockingConfiguration>,
    results: Option<RankedResultSet>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protein(mut self, protein: ProteinDescriptor) -> Self {
        self.protein = Some(protein);
        self
    }

    pub fn molecules(mut self, molecules: Vec<MoleculeDescriptor>) -> Self {
        self.molecules = Some(molecules);
        self
    }

    pub fn docking_config(mut self, config: DockingConfiguration) -> Self {
        self.docking_config = Some(config);
        self
    }

    pub fn results(mut self, results: RankedResultSet) -> Self {
        self.results = Some(results);
        self
    }

    fn touches_inputs(&self) -> bool {
        self.protein.is_some() || self.molecules.is_some() || self.docking_config.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_inputs() && self.results.is_none()
    }
}

/// Snapshot of the inputs for one docking run, tagged with its generation.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    ticket: GenerationTicket,
    protein: ProteinDescriptor,
    molecules: Vec<MoleculeDescriptor>,
    config: DockingConfiguration,
}

impl DispatchJob {
    pub fn generation(&self) -> u64 {
        self.ticket.id()
    }

    pub fn molecules(&self) -> &[MoleculeDescriptor] {
        &self.molecules
    }

    /// Run the job. Does not touch the state machine, so callers can await
    /// it while the workflow keeps changing.
    pub async fn run(self, dispatcher: &DockingTaskDispatcher) -> CompletedDispatch {
        let result = dispatcher.dispatch(&self.protein, &self.molecules, &self.config).await;
        CompletedDispatch { ticket: self.ticket, result }
    }
}

/// Settled docking run waiting to be accepted.
#[derive(Debug)]
pub struct CompletedDispatch {
    ticket: GenerationTicket,
    result: Result<RankedResultSet>,
}

impl CompletedDispatch {
    pub fn generation(&self) -> u64 {
        self.ticket.id()
    }

    pub fn is_current(&self) -> bool {
        self.ticket.is_current()
    }

    pub fn result(&self) -> &Result<RankedResultSet> {
        &self.result
    }
}

/// Top-level workflow controller.
#[derive(Debug, Default)]
pub struct WorkflowStateMachine {
    stage: Stage,
    state: WorkflowState,
    generation: Generation,
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn can_advance(&self) -> bool {
        self.stage.is_satisfied(&self.state)
    }

    /// Move to the next stage. Returns false (and changes nothing) when the
    /// current stage is incomplete or terminal.
    pub fn advance(&mut self) -> bool {
        if !self.can_advance() {
            debug!(stage = ?self.stage, "Advance blocked");
            return false;
        }
        match self.stage.next() {
            Some(next) => {
                info!(from = ?self.stage, to = ?next, "Stage advanced");
                self.stage = next;
                true
            }
            None => false,
        }
    }

    /// Move back one stage, keeping all accumulated data.
    pub fn retreat(&mut self) -> bool {
        match self.stage.previous() {
            Some(prev) => {
                info!(from = ?self.stage, to = ?prev, "Stage retreated");
                self.stage = prev;
                true
            }
            None => false,
        }
    }

    /// Shallow-merge `update` into the state. Changing any docking input
    /// discards existing results and invalidates in-flight runs.
    pub fn merge_update(&mut self, update: StateUpdate) {
        if update.is_empty() {
            return;
        }
        let touches_inputs = update.touches_inputs();

        if let Some(protein) = update.protein {
            self.state.protein = Some(protein);
        }
        if let Some(molecules) = update.molecules {
            self.state.molecules = molecules;
        }
        if let Some(config) = update.docking_config {
            self.state.docking_config = Some(config);
        }
        if touches_inputs {
            self.generation.invalidate();
            if self.state.results.take().is_some() {
                debug!("Inputs changed, previous results discarded");
            }
        }
        if let Some(results) = update.results {
            self.state.results = Some(results);
        }
        self.state.version += 1;
    }

    /// Append a processed batch, keeping insertion order.
    pub fn append_molecules(&mut self, batch: Vec<MoleculeDescriptor>) {
        if batch.is_empty() {
            return;
        }
        let mut molecules = self.state.molecules.clone();
        molecules.extend(batch);
        self.merge_update(StateUpdate::new().molecules(molecules));
    }

    /// Remove the molecule at `index`. Out-of-range indices change nothing.
    pub fn remove_molecule(&mut self, index: usize) -> Option<MoleculeDescriptor> {
        if index >= self.state.molecules.len() {
            return None;
        }
        let mut molecules = self.state.molecules.clone();
        let removed = molecules.remove(index);
        self.merge_update(StateUpdate::new().molecules(molecules));
        Some(removed)
    }

    /// Snapshot the inputs for a docking run. Only available in the results
    /// stage with every earlier stage still satisfied. Starting a job makes
    /// any earlier job stale.
    pub fn begin_dispatch(&self) -> Result<DispatchJob> {
        if self.stage != Stage::Results {
            return Err(DockflowError::Precondition(format!(
                "Docking can only start in the results stage (current: {})",
                self.stage
            )));
        }
        if let Some(stage) = Stage::ALL[..Stage::Results.index()]
            .iter()
            .find(|s| !s.is_satisfied(&self.state))
        {
            return Err(DockflowError::Precondition(format!("{} is incomplete", stage)));
        }

        let (protein, config) = match (&self.state.protein, &self.state.docking_config) {
            (Some(p), Some(c)) => (p.clone(), c.clone()),
            _ => return Err(DockflowError::Precondition("Missing protein or docking configuration".into())),
        };

        let ticket = self.generation.advance();
        debug!(generation = ticket.id(), n = self.state.molecules.len(), "Dispatch job created");
        Ok(DispatchJob {
            ticket,
            protein,
            molecules: self.state.molecules.clone(),
            config,
        })
    }

    /// Apply a finished run. Returns Ok(false) if the run was stale and
    /// therefore dropped.
    pub fn accept_results(&mut self, completed: CompletedDispatch) -> Result<bool> {
        if !completed.ticket.is_current() {
            warn!(
                generation = completed.ticket.id(),
                current = self.generation.current(),
                "Discarding stale docking results"
            );
            return Ok(false);
        }
        let ranked = completed.result?;
        info!(generation = completed.ticket.id(), "{}", ranked.summary());
        self.merge_update(StateUpdate::new().results(ranked));
        Ok(true)
    }

    /// Begin, run and accept one docking job.
    #[instrument(skip_all)]
    pub async fn run_results_stage(&mut self, dispatcher: &DockingTaskDispatcher) -> Result<&RankedResultSet> {
        let job = self.begin_dispatch()?;
        let completed = job.run(dispatcher).await;
        if !self.accept_results(completed)? {
            return Err(DockflowError::Precondition("Docking results went stale".into()));
        }
        self.state
            .results
            .as_ref()
            .ok_or_else(|| DockflowError::Precondition("No results recorded".into()))
    }
}
