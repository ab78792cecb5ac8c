//! Layered structure view over a [`RenderContext`].
//!
//! Loading is split in three steps so a slow fetch never holds the adapter:
//!
//! 1. [`StructureVisualizationAdapter::plan`] compares the new references
//!    with the current ones and hands out a generation-tagged [`LoadPlan`]
//!    (or nothing, when only display state changed).
//! 2. [`LoadPlan::fetch`] downloads the receptor, then the ligand.
//! 3. [`StructureVisualizationAdapter::apply`] builds the scene, unless a
//!    newer plan was issued in the meantime.

use tracing::{debug, info, warn};

use dockflow_common::{Generation, GenerationTicket};
use crate::fetch::StructureFetcher;
use crate::scene::{ModelId, ModelStyle, RenderContext, ShapeId, SphereSpec, StructureFormat, SurfaceStyle};
use crate::source::{SourceResolver, StructureSource};

/// Structure references driving the view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewInputs {
    pub receptor: Option<String>,
    pub ligand: Option<String>,
    pub inline_pose: Option<String>,
}

impl ViewInputs {
    pub fn receptor(reference: &str) -> Self {
        Self {
            receptor: Some(reference.to_string()),
            ..Self::default()
        }
    }

    pub fn with_ligand(mut self, reference: &str) -> Self {
        self.ligand = Some(reference.to_string());
        self
    }

    pub fn with_inline_pose(mut self, coordinates: &str) -> Self {
        self.inline_pose = Some(coordinates.to_string());
        self
    }
}

/// Layer toggles. Changing these never triggers a fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOptions {
    pub show_surface: bool,
    pub show_binding_site: bool,
    pub show_ligand: bool,
    pub binding_site: Option<[f64; 3]>,
    pub binding_site_radius: f64,
    pub surface_opacity: f64,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_surface: false,
            show_binding_site: true,
            show_ligand: true,
            binding_site: None,
            binding_site_radius: 3.0,
            surface_opacity: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewPhase {
    Idle,
    LoadingReceptor,
    ReceptorLoaded,
    ReceptorFailed(String),
    LoadingLigand,
    LigandLoaded,
    LigandFailed(String),
    Composed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LigandOrigin {
    File,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LigandState {
    /// No ligand source was given.
    Absent,
    Loaded(LigandOrigin),
    /// Every source failed; the receptor is still shown.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Same references as before; nothing fetched.
    Unchanged,
    /// A newer plan superseded this one.
    Stale,
    /// No receptor reference; the view is empty.
    NothingToShow,
    ReceptorFailed(String),
    Composed(LigandState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadScope {
    Full,
    /// Receptor already on screen; only the ligand is replaced.
    LigandOnly,
}

/// Sources to fetch for one load cycle.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    ticket: GenerationTicket,
    scope: LoadScope,
    inputs: ViewInputs,
    receptor: StructureSource,
    ligand: Vec<StructureSource>,
}

#[derive(Debug, Clone)]
enum ReceptorPayload {
    Kept,
    Missing,
    Loaded(String),
    Failed(String),
}

#[derive(Debug, Clone)]
struct LigandPayload {
    origin: LigandOrigin,
    data: std::result::Result<String, String>,
}

/// Downloaded payloads of one plan, waiting to be applied.
#[derive(Debug, Clone)]
pub struct FetchedStructures {
    ticket: GenerationTicket,
    scope: LoadScope,
    inputs: ViewInputs,
    receptor: ReceptorPayload,
    ligand: Vec<LigandPayload>,
}

impl FetchedStructures {
    pub fn generation(&self) -> u64 {
        self.ticket.id()
    }

    pub fn is_current(&self) -> bool {
        self.ticket.is_current()
    }
}

impl LoadPlan {
    pub fn scope(&self) -> LoadScope {
        self.scope
    }

    pub fn generation(&self) -> u64 {
        self.ticket.id()
    }

    /// Fetch receptor, then ligand candidates in order. A receptor failure
    /// ends the cycle before any ligand request.
    pub async fn fetch(self, fetcher: &dyn StructureFetcher) -> FetchedStructures {
        let receptor = match (self.scope, &self.receptor) {
            (LoadScope::LigandOnly, _) => ReceptorPayload::Kept,
            (LoadScope::Full, StructureSource::Absent) => ReceptorPayload::Missing,
            (LoadScope::Full, StructureSource::Inline(data)) => ReceptorPayload::Loaded(data.clone()),
            (LoadScope::Full, StructureSource::Remote(url)) => match fetcher.fetch(url).await {
                Ok(data) => ReceptorPayload::Loaded(data),
                Err(e) => ReceptorPayload::Failed(e.to_string()),
            },
        };

        let mut ligand = Vec::new();
        if matches!(receptor, ReceptorPayload::Kept | ReceptorPayload::Loaded(_)) {
            for source in &self.ligand {
                let payload = match source {
                    StructureSource::Remote(url) => LigandPayload {
                        origin: LigandOrigin::File,
                        data: fetcher.fetch(url).await.map_err(|e| e.to_string()),
                    },
                    StructureSource::Inline(data) => LigandPayload {
                        origin: LigandOrigin::Inline,
                        data: Ok(data.clone()),
                    },
                    StructureSource::Absent => continue,
                };
                ligand.push(payload);
            }
        }

        FetchedStructures {
            ticket: self.ticket,
            scope: self.scope,
            inputs: self.inputs,
            receptor,
            ligand,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LoadedLigand {
    model: ModelId,
    origin: LigandOrigin,
}

/// Owns a render context and keeps it in sync with structure references
/// and layer toggles.
pub struct StructureVisualizationAdapter<C: RenderContext> {
    context: C,
    resolver: SourceResolver,
    generation: Generation,
    display: DisplayOptions,
    phase: ViewPhase,
    ligand_state: LigandState,
    planned: Option<ViewInputs>,
    applied: Option<ViewInputs>,
    receptor: Option<ModelId>,
    ligand: Option<LoadedLigand>,
    surface: Option<ShapeId>,
    site: Option<ShapeId>,
}

impl<C: RenderContext> StructureVisualizationAdapter<C> {
    pub fn new(context: C, resolver: SourceResolver, display: DisplayOptions) -> Self {
        Self {
            context,
            resolver,
            generation: Generation::new(),
            display,
            phase: ViewPhase::Idle,
            ligand_state: LigandState::Absent,
            planned: None,
            applied: None,
            receptor: None,
            ligand: None,
            surface: None,
            site: None,
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }

    pub fn phase(&self) -> &ViewPhase {
        &self.phase
    }

    pub fn ligand_state(&self) -> &LigandState {
        &self.ligand_state
    }

    pub fn display(&self) -> &DisplayOptions {
        &self.display
    }

    /// Start a load cycle for `inputs`. Returns `None` when the references
    /// are already on screen and no other plan is outstanding.
    ///
    /// A plan that was dropped before `apply` leaves `planned` ahead of
    /// `applied`, so the same references can be planned again. A failed
    /// receptor can always be retried.
    pub fn plan(&mut self, inputs: ViewInputs) -> Option<LoadPlan> {
        if self.is_settled_on(&inputs) {
            debug!("Structure references unchanged, nothing to load");
            return None;
        }

        let receptor_on_screen = self.receptor.is_some()
            && self.applied.as_ref().map(|a| &a.receptor) == Some(&inputs.receptor);
        let scope = if receptor_on_screen { LoadScope::LigandOnly } else { LoadScope::Full };

        let ticket = self.generation.advance();
        let receptor = self.resolver.resolve(inputs.receptor.as_deref());
        let ligand = self
            .resolver
            .ligand_candidates(inputs.ligand.as_deref(), inputs.inline_pose.as_deref());

        info!(generation = ticket.id(), ?scope, ligand_sources = ligand.len(), "Structure load planned");
        self.phase = match scope {
            LoadScope::Full => ViewPhase::LoadingReceptor,
            LoadScope::LigandOnly => ViewPhase::LoadingLigand,
        };
        self.planned = Some(inputs.clone());

        Some(LoadPlan { ticket, scope, inputs, receptor, ligand })
    }

    /// Build the scene from fetched payloads. Stale payloads are dropped
    /// without touching the context.
    pub fn apply(&mut self, fetched: FetchedStructures) -> ApplyOutcome {
        if !fetched.ticket.is_current() {
            debug!(generation = fetched.ticket.id(), "Dropping stale structure load");
            return ApplyOutcome::Stale;
        }

        match fetched.receptor {
            ReceptorPayload::Kept => {
                if let Some(old) = self.ligand.take() {
                    self.context.remove_model(old.model);
                }
            }
            ReceptorPayload::Missing => {
                self.release_all();
                self.applied = Some(fetched.inputs);
                self.ligand_state = LigandState::Absent;
                self.phase = ViewPhase::Idle;
                self.context.render();
                return ApplyOutcome::NothingToShow;
            }
            ReceptorPayload::Failed(message) => {
                self.release_all();
                return self.fail_receptor(fetched.inputs, message);
            }
            ReceptorPayload::Loaded(data) => {
                self.release_all();
                match self.context.add_model(&data, StructureFormat::Pdb) {
                    Ok(id) => {
                        self.receptor = Some(id);
                        self.phase = ViewPhase::ReceptorLoaded;
                    }
                    Err(e) => return self.fail_receptor(fetched.inputs, e.to_string()),
                }
            }
        }
        self.applied = Some(fetched.inputs);

        self.phase = ViewPhase::LoadingLigand;
        self.ligand_state = self.load_ligand(fetched.ligand);
        match &self.ligand_state {
            LigandState::Loaded(_) => self.phase = ViewPhase::LigandLoaded,
            LigandState::Failed(message) => self.phase = ViewPhase::LigandFailed(message.clone()),
            LigandState::Absent => {}
        }

        self.restyle();
        self.context.zoom_to();
        self.context.render();
        self.phase = ViewPhase::Composed;
        ApplyOutcome::Composed(self.ligand_state.clone())
    }

    /// Plan, fetch and apply in one go.
    pub async fn load(&mut self, inputs: ViewInputs, fetcher: &dyn StructureFetcher) -> ApplyOutcome {
        match self.plan(inputs) {
            Some(plan) => {
                let fetched = plan.fetch(fetcher).await;
                self.apply(fetched)
            }
            None => ApplyOutcome::Unchanged,
        }
    }

    /// Change layer toggles and restyle loaded models.
    pub fn set_display(&mut self, options: DisplayOptions) {
        if self.display == options {
            return;
        }
        self.display = options;
        if self.receptor.is_some() {
            self.restyle();
            self.context.render();
        }
    }

    /// Release everything and ignore loads still in flight.
    pub fn teardown(&mut self) {
        self.generation.invalidate();
        self.release_all();
        self.planned = None;
        self.applied = None;
        self.ligand_state = LigandState::Absent;
        self.phase = ViewPhase::Idle;
    }

    fn is_settled_on(&self, inputs: &ViewInputs) -> bool {
        self.applied.as_ref() == Some(inputs)
            && self.planned == self.applied
            && !matches!(self.phase, ViewPhase::ReceptorFailed(_))
    }

    fn fail_receptor(&mut self, inputs: ViewInputs, message: String) -> ApplyOutcome {
        warn!("Receptor load failed: {}", message);
        self.applied = Some(inputs);
        self.ligand_state = LigandState::Absent;
        self.phase = ViewPhase::ReceptorFailed(message.clone());
        self.context.render();
        ApplyOutcome::ReceptorFailed(message)
    }

    fn load_ligand(&mut self, candidates: Vec<LigandPayload>) -> LigandState {
        let mut last_error = None;
        for candidate in candidates {
            let added = candidate
                .data
                .and_then(|data| {
                    self.context
                        .add_model(&data, StructureFormat::Pdbqt)
                        .map_err(|e| e.to_string())
                });
            match added {
                Ok(model) => {
                    if last_error.is_some() {
                        info!(origin = ?candidate.origin, "Ligand loaded from fallback source");
                    }
                    self.ligand = Some(LoadedLigand { model, origin: candidate.origin });
                    return LigandState::Loaded(candidate.origin);
                }
                Err(e) => {
                    warn!(origin = ?candidate.origin, "Ligand load failed: {}", e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => LigandState::Failed(e),
            None => LigandState::Absent,
        }
    }

    fn restyle(&mut self) {
        let Some(receptor) = self.receptor else {
            return;
        };
        self.context.set_style(receptor, ModelStyle::receptor());

        if let Some(id) = self.surface.take() {
            self.context.remove_surface(id);
        }
        if self.display.show_surface {
            let style = SurfaceStyle {
                opacity: self.display.surface_opacity,
                color: "white".to_string(),
            };
            self.surface = Some(self.context.add_surface(receptor, style));
        }

        if let Some(id) = self.site.take() {
            self.context.remove_sphere(id);
        }
        if let (true, Some(center)) = (self.display.show_binding_site, self.display.binding_site) {
            self.site = Some(self.context.add_sphere(SphereSpec {
                center,
                radius: self.display.binding_site_radius,
                color: "yellow".to_string(),
                opacity: 0.5,
            }));
        }

        if let Some(ligand) = self.ligand {
            let style = match (self.display.show_ligand, ligand.origin) {
                (false, _) => ModelStyle::Hidden,
                (true, LigandOrigin::File) => ModelStyle::ligand_from_file(),
                (true, LigandOrigin::Inline) => ModelStyle::ligand_inline(),
            };
            self.context.set_style(ligand.model, style);
        }
    }

    fn release_all(&mut self) {
        self.context.clear();
        self.receptor = None;
        self.ligand = None;
        self.surface = None;
        self.site = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::InMemoryFetcher;
    use crate::scene::SceneGraph;

    const RECEPTOR: &str = "ATOM      1  N   MET A   1      11.104  13.207   9.188  1.00 20.00           N\n";
    const POSE: &str = "HETATM    1  C1  LIG     1      12.000  14.000  10.000  1.00  0.00     0.000 C\n";

    fn adapter() -> StructureVisualizationAdapter<SceneGraph> {
        let resolver = SourceResolver::new("http://localhost:8000/api").unwrap();
        StructureVisualizationAdapter::new(SceneGraph::new(), resolver, DisplayOptions::default())
    }

    #[tokio::test]
    async fn test_receptor_and_ligand_compose() {
        let fetcher = InMemoryFetcher::new()
            .with_file("http://localhost:8000/uploads/r.pdb", RECEPTOR)
            .with_file("http://localhost:8000/uploads/p1.pdbqt", POSE);
        let mut view = adapter();

        let outcome = view
            .load(ViewInputs::receptor("/uploads/r.pdb").with_ligand("/uploads/p1.pdbqt"), &fetcher)
            .await;

        assert_eq!(outcome, ApplyOutcome::Composed(LigandState::Loaded(LigandOrigin::File)));
        assert_eq!(view.phase(), &ViewPhase::Composed);
        assert_eq!(view.context().model_count(), 2);
    }

    #[tokio::test]
    async fn test_same_inputs_do_not_replan() {
        let fetcher = InMemoryFetcher::new().with_file("http://localhost:8000/uploads/r.pdb", RECEPTOR);
        let mut view = adapter();
        view.load(ViewInputs::receptor("/uploads/r.pdb"), &fetcher).await;
        assert!(view.plan(ViewInputs::receptor("/uploads/r.pdb")).is_none());
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_dropped_plan_can_be_planned_again() {
        let fetcher = InMemoryFetcher::new().with_file("http://localhost:8000/uploads/r.pdb", RECEPTOR);
        let mut view = adapter();
        let abandoned = view.plan(ViewInputs::receptor("/uploads/r.pdb"));
        assert!(abandoned.is_some());
        drop(abandoned);

        let outcome = view.load(ViewInputs::receptor("/uploads/r.pdb"), &fetcher).await;
        assert_eq!(outcome, ApplyOutcome::Composed(LigandState::Absent));
        assert_eq!(view.context().model_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_receptor_leaves_empty_view() {
        let fetcher = InMemoryFetcher::new();
        let mut view = adapter();
        let outcome = view.load(ViewInputs { receptor: Some("#".into()), ..Default::default() }, &fetcher).await;
        assert_eq!(outcome, ApplyOutcome::NothingToShow);
        assert_eq!(view.phase(), &ViewPhase::Idle);
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_hidden_ligand_keeps_model() {
        let fetcher = InMemoryFetcher::new()
            .with_file("http://localhost:8000/uploads/r.pdb", RECEPTOR)
            .with_file("http://localhost:8000/uploads/p1.pdbqt", POSE);
        let mut view = adapter();
        view.load(ViewInputs::receptor("/uploads/r.pdb").with_ligand("/uploads/p1.pdbqt"), &fetcher)
            .await;

        view.set_display(DisplayOptions { show_ligand: false, ..DisplayOptions::default() });
        let hidden = view
            .context()
            .models()
            .filter(|(_, m)| m.style == Some(ModelStyle::Hidden))
            .count();
        assert_eq!(hidden, 1);
        assert_eq!(view.context().model_count(), 2);
    }
}
