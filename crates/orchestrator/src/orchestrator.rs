use crawl::{AcquisitionError, ContentSource, PageRecord, ResearchTask, ValidationError};
use extract::{AnalysisError, Entity, Relationship, Sentiment, TextAnalysis, TextAnalyzer};
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use graph::{GraphSnapshot, GraphStore, GraphStoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::chain::Chain;
use crate::graph_builder::{build_graph, BuiltGraph, PageAnalysis};
use crate::summary::build_summary_prompt;

const STEP_ACQUIRE: &str = "acquire";
const STEP_ANALYZE: &str = "analyze";
const STEP_BUILD_GRAPH: &str = "build_graph";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Entities per page that take part in all-pairs linking
    pub max_entities_per_page: usize,
    /// In-flight graph writes during graph building
    pub write_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_entities_per_page: 10,
            write_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Acquiring,
    Analyzing,
    GraphBuilding,
    Summarizing,
    Completed,
    Failed,
}

impl RunState {
    fn for_step(step: &str) -> Option<Self> {
        match step {
            STEP_ACQUIRE => Some(RunState::Acquiring),
            STEP_ANALYZE => Some(RunState::Analyzing),
            STEP_BUILD_GRAPH => Some(RunState::GraphBuilding),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Acquiring => "acquiring",
            RunState::Analyzing => "analyzing",
            RunState::GraphBuilding => "graph_building",
            RunState::Summarizing => "summarizing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    GraphStore(#[from] GraphStoreError),
}

/// First error of a failed run, tagged with the state it was raised in.
#[derive(Debug, thiserror::Error)]
#[error("research failed while {state}: {cause}")]
pub struct ResearchError {
    pub state: RunState,
    #[source]
    pub cause: StageError,
}

impl ResearchError {
    fn new(state: RunState, cause: impl Into<StageError>) -> Self {
        Self {
            state,
            cause: cause.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.cause, StageError::Validation(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDigest {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub sentiment: Sentiment,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub pages: usize,
    pub entities: usize,
    pub relationships: usize,
    pub graph_nodes: usize,
    pub graph_links: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub query: String,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub summary: String,
    /// Keywords of the closing analysis call
    pub insights: Vec<String>,
    pub pages: Vec<PageDigest>,
    pub stats: RunStats,
}

/// Record each chain step enriches
#[derive(Default)]
struct ResearchRun {
    task: ResearchTask,
    pages: Vec<PageRecord>,
    analyses: Vec<PageAnalysis>,
    graph: BuiltGraph,
}

impl ResearchRun {
    fn into_outcome(self, snapshot: &GraphSnapshot, closing: TextAnalysis) -> ResearchOutcome {
        let stats = RunStats {
            pages: self.pages.len(),
            entities: self.graph.entities.len(),
            relationships: self.graph.relationships.len(),
            graph_nodes: snapshot.nodes.len(),
            graph_links: snapshot.links.len(),
        };

        let pages = self
            .analyses
            .into_iter()
            .map(|page| PageDigest {
                url: page.url,
                title: page.title,
                summary: page.analysis.summary,
                sentiment: page.analysis.sentiment,
                keywords: page.analysis.keywords,
            })
            .collect();

        ResearchOutcome {
            query: self.task.query,
            entities: self.graph.entities,
            relationships: self.graph.relationships,
            summary: closing.summary,
            insights: closing.keywords,
            pages,
            stats,
        }
    }
}

/// Runs one research task through acquisition, analysis, graph building and
/// summarization. Fail-fast: the first error ends the run with no partial
/// result.
pub struct Orchestrator {
    analyzer: Arc<dyn TextAnalyzer>,
    store: Arc<dyn GraphStore>,
    chain: Chain<ResearchRun, StageError>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ContentSource>,
        analyzer: Arc<dyn TextAnalyzer>,
        store: Arc<dyn GraphStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let mut chain: Chain<ResearchRun, StageError> = Chain::new();

        chain.add_step(STEP_ACQUIRE, move |mut run: ResearchRun| {
            let source = Arc::clone(&source);
            async move {
                run.pages = source.fetch(&run.task).await?;
                info!(query = %run.task.query, pages = run.pages.len(), "Pages acquired");
                Ok::<_, StageError>(run)
            }
        });

        let step_analyzer = Arc::clone(&analyzer);
        chain.add_step(STEP_ANALYZE, move |mut run: ResearchRun| {
            let analyzer = Arc::clone(&step_analyzer);
            async move {
                let analyses =
                    try_join_all(run.pages.iter().map(|page| analyze_page(analyzer.as_ref(), page)))
                        .await?;
                let entities: usize = analyses.iter().map(|a| a.entities.len()).sum();
                info!(pages = analyses.len(), entities, "Pages analyzed");

                run.analyses = analyses;
                Ok::<_, StageError>(run)
            }
        });

        let step_store = Arc::clone(&store);
        let max_entities = config.max_entities_per_page;
        let concurrency = config.write_concurrency.max(1);
        chain.add_step(STEP_BUILD_GRAPH, move |mut run: ResearchRun| {
            let store = Arc::clone(&step_store);
            async move {
                run.graph = build_graph(&run.analyses, max_entities);
                write_graph(store.as_ref(), &mut run.graph, concurrency).await?;
                info!(
                    entities = run.graph.entities.len(),
                    relationships = run.graph.relationships.len(),
                    "Graph written"
                );
                Ok::<_, StageError>(run)
            }
        });

        Self {
            analyzer,
            store,
            chain,
        }
    }

    pub async fn execute_research(
        &self,
        task: ResearchTask,
    ) -> Result<ResearchOutcome, ResearchError> {
        self.execute_research_with(task, |_| {}).await
    }

    /// Execute `task`, reporting every state the run enters to `on_transition`.
    /// The last reported state is `Completed` or `Failed`.
    pub async fn execute_research_with<F>(
        &self,
        task: ResearchTask,
        mut on_transition: F,
    ) -> Result<ResearchOutcome, ResearchError>
    where
        F: FnMut(RunState) + Send,
    {
        let query = task.query.clone();
        let result = self.drive(task, &mut on_transition).await;

        match &result {
            Ok(outcome) => {
                info!(
                    query = %query,
                    entities = outcome.stats.entities,
                    relationships = outcome.stats.relationships,
                    "Research completed"
                );
                on_transition(RunState::Completed);
            }
            Err(e) => {
                error!(query = %query, state = %e.state, error = %e, "Research failed");
                on_transition(RunState::Failed);
            }
        }
        result
    }

    /// Execute once, then release the graph store whether or not the run succeeded.
    pub async fn run_once<F>(
        self,
        task: ResearchTask,
        on_transition: F,
    ) -> Result<ResearchOutcome, ResearchError>
    where
        F: FnMut(RunState) + Send,
    {
        let result = self.execute_research_with(task, on_transition).await;
        if let Err(e) = self.close().await {
            warn!(error = %e, "Failed to close graph store");
        }
        result
    }

    pub async fn close(&self) -> Result<(), GraphStoreError> {
        self.store.close().await
    }

    async fn drive<F>(
        &self,
        task: ResearchTask,
        on_transition: &mut F,
    ) -> Result<ResearchOutcome, ResearchError>
    where
        F: FnMut(RunState) + Send,
    {
        task.validate()
            .map_err(|e| ResearchError::new(RunState::Acquiring, e))?;

        let run = ResearchRun {
            task,
            ..Default::default()
        };

        let run = self
            .chain
            .run_observed(run, |step| {
                if let Some(state) = RunState::for_step(step) {
                    debug!(state = %state, "Entering state");
                    on_transition(state);
                }
            })
            .await
            .map_err(|e| {
                let state = RunState::for_step(&e.step).unwrap_or(RunState::Acquiring);
                ResearchError::new(state, e.source)
            })?;

        debug!(state = %RunState::Summarizing, "Entering state");
        on_transition(RunState::Summarizing);

        let snapshot = self
            .store
            .read_all()
            .await
            .map_err(|e| ResearchError::new(RunState::Summarizing, e))?;
        let prompt = build_summary_prompt(&run.task.query, &snapshot);
        let closing = self
            .analyzer
            .analyze(&prompt)
            .await
            .map_err(|e| ResearchError::new(RunState::Summarizing, e))?;

        Ok(run.into_outcome(&snapshot, closing))
    }
}

async fn analyze_page(
    analyzer: &dyn TextAnalyzer,
    page: &PageRecord,
) -> Result<PageAnalysis, AnalysisError> {
    let (analysis, entities) = tokio::try_join!(
        analyzer.analyze(&page.content),
        analyzer.extract_entities(&page.content)
    )?;

    Ok(PageAnalysis {
        url: page.url.clone(),
        title: page.title.clone(),
        analysis,
        entities,
    })
}

/// Every entity is written before the first relationship. Relationships
/// whose endpoints are not among this run's entities are dropped, so the
/// returned graph lists only what was written.
async fn write_graph(
    store: &dyn GraphStore,
    graph: &mut BuiltGraph,
    concurrency: usize,
) -> Result<(), GraphStoreError> {
    let entity_writes: Vec<_> = graph
        .entities
        .iter()
        .map(|entity| store.upsert_entity(entity))
        .collect();
    stream::iter(entity_writes)
        .buffer_unordered(concurrency)
        .try_collect::<Vec<()>>()
        .await?;

    let known: HashSet<&str> = graph.entities.iter().map(|e| e.id.as_str()).collect();
    let (linked, dangling): (Vec<Relationship>, Vec<Relationship>) =
        std::mem::take(&mut graph.relationships)
            .into_iter()
            .partition(|r| {
                known.contains(r.source.as_str()) && known.contains(r.target.as_str())
            });
    for r in &dangling {
        warn!(
            source = %r.source,
            target = %r.target,
            "Dropping relationship with unknown endpoint"
        );
    }

    let relationship_writes: Vec<_> = linked
        .iter()
        .map(|relationship| store.upsert_relationship(relationship))
        .collect();
    stream::iter(relationship_writes)
        .buffer_unordered(concurrency)
        .try_collect::<Vec<()>>()
        .await?;

    graph.relationships = linked;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{page, FakeAnalyzer, FakeSource, RecordingStore, StoreCall};
    use extract::{AnalysisParseError, EntityType, ExtractedEntity};
    use std::sync::Mutex;

    fn extracted(name: &str, entity_type: EntityType, relevance: f64) -> ExtractedEntity {
        ExtractedEntity {
            name: name.to_string(),
            entity_type,
            relevance,
        }
    }

    fn orchestrator(
        source: &Arc<FakeSource>,
        analyzer: &Arc<FakeAnalyzer>,
        store: &Arc<RecordingStore>,
    ) -> Orchestrator {
        Orchestrator::new(
            source.clone(),
            analyzer.clone(),
            store.clone(),
            OrchestratorConfig::default(),
        )
    }

    fn climate_fixture() -> (Arc<FakeSource>, Arc<FakeAnalyzer>) {
        let source = FakeSource::with_pages(vec![
            page("https://example.org/ipcc", "IPCC and the Paris Agreement"),
            page("https://example.org/report", "The IPCC report"),
        ]);
        let analyzer = FakeAnalyzer::default()
            .with_entities(
                "IPCC and the Paris Agreement",
                vec![
                    extracted("IPCC", EntityType::Organization, 0.9),
                    extracted("Paris Agreement", EntityType::Concept, 0.8),
                ],
            )
            .with_entities(
                "The IPCC report",
                vec![extracted("IPCC", EntityType::Organization, 0.6)],
            );
        (Arc::new(source), Arc::new(analyzer))
    }

    #[tokio::test]
    async fn test_climate_policy_end_to_end() {
        let (source, analyzer) = climate_fixture();
        let store = Arc::new(RecordingStore::default());
        let task = ResearchTask::new("climate policy").with_max_pages(2);

        let outcome = orchestrator(&source, &analyzer, &store)
            .execute_research(task)
            .await
            .unwrap();

        let ids: Vec<_> = outcome.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["IPCC", "Paris Agreement"]);
        assert_eq!(outcome.entities[0].relevance(), 0.9);

        assert_eq!(outcome.relationships.len(), 1);
        let edge = &outcome.relationships[0];
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("IPCC", "Paris Agreement"));
        assert_eq!(edge.rel_type, "RELATED_TO");
        assert!((edge.confidence() - 0.85).abs() < 1e-9);

        assert!(!outcome.summary.is_empty());
        assert!(!outcome.insights.is_empty() && outcome.insights.len() <= 5);
        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.stats.graph_nodes, 2);
        assert_eq!(outcome.stats.graph_links, 1);

        let calls = store.calls();
        assert_eq!(
            calls.iter().filter(|c| matches!(c, StoreCall::Entity(_))).count(),
            2
        );
        assert_eq!(calls.last(), Some(&StoreCall::ReadAll));

        // Task went to the source as given
        assert_eq!(source.tasks()[0].max_pages, Some(2));
    }

    #[tokio::test]
    async fn test_entities_are_written_before_relationships() {
        let source = FakeSource::with_pages(vec![
            page("https://a.example", "a"),
            page("https://b.example", "b"),
        ]);
        let analyzer = FakeAnalyzer::default()
            .with_entities(
                "a",
                vec![
                    extracted("A1", EntityType::Concept, 0.5),
                    extracted("A2", EntityType::Concept, 0.5),
                    extracted("A3", EntityType::Concept, 0.5),
                ],
            )
            .with_entities(
                "b",
                vec![
                    extracted("B1", EntityType::Person, 0.5),
                    extracted("A1", EntityType::Concept, 0.5),
                ],
            );
        let (source, analyzer) = (Arc::new(source), Arc::new(analyzer));
        let store = Arc::new(RecordingStore::default());

        orchestrator(&source, &analyzer, &store)
            .execute_research(ResearchTask::new("ordering"))
            .await
            .unwrap();

        let calls = store.calls();
        let last_entity = calls
            .iter()
            .rposition(|c| matches!(c, StoreCall::Entity(_)))
            .unwrap();
        let first_edge = calls
            .iter()
            .position(|c| matches!(c, StoreCall::Relationship(..)))
            .unwrap();
        assert!(last_entity < first_edge);
        assert_eq!(
            calls.iter().filter(|c| matches!(c, StoreCall::Relationship(..))).count(),
            4
        );
    }

    #[tokio::test]
    async fn test_research_runs_on_a_spawned_task() {
        let (source, analyzer) = climate_fixture();
        let store = Arc::new(RecordingStore::default());
        let config = OrchestratorConfig {
            write_concurrency: 1,
            ..OrchestratorConfig::default()
        };
        let orchestrator = Orchestrator::new(source, analyzer, store.clone(), config);

        let handle = tokio::spawn(async move {
            orchestrator
                .execute_research(ResearchTask::new("climate policy"))
                .await
        });
        let outcome = handle.await.unwrap().unwrap();

        assert_eq!(outcome.stats.entities, 2);
        assert_eq!(outcome.stats.relationships, 1);
        assert_eq!(
            store.calls()[..3],
            [
                StoreCall::Entity("IPCC".to_string()),
                StoreCall::Entity("Paris Agreement".to_string()),
                StoreCall::Relationship("IPCC".to_string(), "Paris Agreement".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_acquisition_still_summarizes() {
        let source = Arc::new(FakeSource::with_pages(Vec::new()));
        let analyzer = Arc::new(FakeAnalyzer::default());
        let store = Arc::new(RecordingStore::default());

        let outcome = orchestrator(&source, &analyzer, &store)
            .execute_research(ResearchTask::new("nothing here"))
            .await
            .unwrap();

        assert!(outcome.entities.is_empty());
        assert!(outcome.relationships.is_empty());
        assert!(!outcome.summary.is_empty());
        assert_eq!(store.calls(), vec![StoreCall::ReadAll]);

        let prompts = analyzer.analyzed();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("ENTITY COUNT: 0"));
    }

    #[tokio::test]
    async fn test_acquisition_failure_is_fail_fast() {
        let source = Arc::new(FakeSource::failing(503));
        let analyzer = Arc::new(FakeAnalyzer::default());
        let store = Arc::new(RecordingStore::default());

        let mut states = Vec::new();
        let err = orchestrator(&source, &analyzer, &store)
            .run_once(ResearchTask::new("climate policy"), |s| states.push(s))
            .await
            .unwrap_err();

        assert_eq!(err.state, RunState::Acquiring);
        assert!(matches!(
            err.cause,
            StageError::Acquisition(AcquisitionError::Status { status: 503, .. })
        ));
        assert_eq!(analyzer.call_count(), 0);
        // Only the close issued by run_once reaches the store
        assert_eq!(store.calls(), vec![StoreCall::Close]);
        assert_eq!(states, vec![RunState::Acquiring, RunState::Failed]);
    }

    #[tokio::test]
    async fn test_analysis_failure_fails_the_run() {
        let (source, _) = climate_fixture();
        let analyzer = Arc::new(FakeAnalyzer::default().failing_on("The IPCC report"));
        let store = Arc::new(RecordingStore::default());

        let err = orchestrator(&source, &analyzer, &store)
            .execute_research(ResearchTask::new("climate policy"))
            .await
            .unwrap_err();

        assert_eq!(err.state, RunState::Analyzing);
        assert!(matches!(
            err.cause,
            StageError::Analysis(AnalysisError::Parse(AnalysisParseError::SchemaMismatch { .. }))
        ));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_graph_failure_reports_graph_building() {
        let (source, analyzer) = climate_fixture();
        let store = Arc::new(RecordingStore::default());
        store.close().await.unwrap();

        let err = orchestrator(&source, &analyzer, &store)
            .execute_research(ResearchTask::new("climate policy"))
            .await
            .unwrap_err();

        assert_eq!(err.state, RunState::GraphBuilding);
        assert!(matches!(err.cause, StageError::GraphStore(GraphStoreError::Closed)));
    }

    #[tokio::test]
    async fn test_invalid_task_never_reaches_collaborators() {
        let source = Arc::new(FakeSource::with_pages(Vec::new()));
        let analyzer = Arc::new(FakeAnalyzer::default());
        let store = Arc::new(RecordingStore::default());

        let err = orchestrator(&source, &analyzer, &store)
            .execute_research(ResearchTask::new("   "))
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(source.tasks().is_empty());
        assert_eq!(analyzer.call_count(), 0);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transitions_follow_the_state_order() {
        let (source, analyzer) = climate_fixture();
        let store = Arc::new(RecordingStore::default());
        let states = Mutex::new(Vec::new());

        orchestrator(&source, &analyzer, &store)
            .run_once(ResearchTask::new("climate policy"), |s| states.lock().unwrap().push(s))
            .await
            .unwrap();

        assert_eq!(
            states.into_inner().unwrap(),
            vec![
                RunState::Acquiring,
                RunState::Analyzing,
                RunState::GraphBuilding,
                RunState::Summarizing,
                RunState::Completed,
            ]
        );
        assert_eq!(store.calls().last(), Some(&StoreCall::Close));
    }

    #[test]
    fn test_run_state_labels() {
        assert_eq!(RunState::GraphBuilding.to_string(), "graph_building");
        assert_eq!(
            serde_json::to_value(RunState::GraphBuilding).unwrap(),
            serde_json::json!("graph_building")
        );
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Summarizing.is_terminal());
    }
}
