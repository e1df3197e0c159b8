//! Recording fakes for orchestrator tests.

use async_trait::async_trait;
use crawl::{AcquisitionError, ContentSource, PageRecord, ResearchTask};
use extract::{
    AnalysisError, AnalysisParseError, Entity, ExtractedEntity, Relationship, Sentiment,
    TextAnalysis, TextAnalyzer,
};
use graph::{GraphSnapshot, GraphStore, GraphStoreError, MemoryGraphStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn page(url: &str, content: &str) -> PageRecord {
    PageRecord::new(url, "", content)
}

pub struct FakeSource {
    pages: Vec<PageRecord>,
    fail_status: Option<u16>,
    tasks: Mutex<Vec<ResearchTask>>,
}

impl FakeSource {
    pub fn with_pages(pages: Vec<PageRecord>) -> Self {
        Self {
            pages,
            fail_status: None,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::with_pages(Vec::new())
        }
    }

    pub fn tasks(&self) -> Vec<ResearchTask> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch(&self, task: &ResearchTask) -> Result<Vec<PageRecord>, AcquisitionError> {
        self.tasks.lock().unwrap().push(task.clone());
        match self.fail_status {
            Some(status) => Err(AcquisitionError::Status {
                status,
                body: "crawler unavailable".to_string(),
            }),
            None => Ok(self.pages.clone()),
        }
    }
}

/// Answers entity extraction from a table keyed by page content. `analyze`
/// echoes the first words of its input as keywords.
#[derive(Default)]
pub struct FakeAnalyzer {
    entities: HashMap<String, Vec<ExtractedEntity>>,
    fail_on: Option<String>,
    analyzed: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeAnalyzer {
    pub fn with_entities(mut self, content: &str, entities: Vec<ExtractedEntity>) -> Self {
        self.entities.insert(content.to_string(), entities);
        self
    }

    pub fn failing_on(mut self, content: &str) -> Self {
        self.fail_on = Some(content.to_string());
        self
    }

    pub fn analyzed(&self) -> Vec<String> {
        self.analyzed.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextAnalyzer for FakeAnalyzer {
    async fn analyze(&self, text: &str) -> Result<TextAnalysis, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.analyzed.lock().unwrap().push(text.to_string());

        Ok(TextAnalysis {
            summary: format!("{} characters analyzed", text.len()),
            sentiment: Sentiment::Neutral,
            keywords: text.split_whitespace().take(5).map(str::to_string).collect(),
        })
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(text) {
            return Err(AnalysisError::Parse(AnalysisParseError::SchemaMismatch {
                field: "relevance".to_string(),
                problem: "is missing".to_string(),
                raw: "[{\"name\": \"IPCC\"}]".to_string(),
            }));
        }
        Ok(self.entities.get(text).cloned().unwrap_or_default())
    }

    async fn generate_questions(&self, _text: &str) -> Result<Vec<String>, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn reason(
        &self,
        query: &str,
        _sources: &str,
        _hypothesis: Option<&str>,
        _depth: u8,
    ) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Conclusion about {query}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Entity(String),
    Relationship(String, String),
    ReadAll,
    Close,
}

/// In-memory store that logs every call it receives.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryGraphStore,
    calls: Mutex<Vec<StoreCall>>,
}

impl RecordingStore {
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GraphStore for RecordingStore {
    async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphStoreError> {
        self.record(StoreCall::Entity(entity.id.clone()));
        self.inner.upsert_entity(entity).await
    }

    async fn upsert_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<(), GraphStoreError> {
        self.record(StoreCall::Relationship(
            relationship.source.clone(),
            relationship.target.clone(),
        ));
        self.inner.upsert_relationship(relationship).await
    }

    async fn read_all(&self) -> Result<GraphSnapshot, GraphStoreError> {
        self.record(StoreCall::ReadAll);
        self.inner.read_all().await
    }

    async fn read_neighborhood(
        &self,
        entity_id: &str,
        depth: u32,
    ) -> Result<GraphSnapshot, GraphStoreError> {
        self.inner.read_neighborhood(entity_id, depth).await
    }

    async fn ping(&self) -> Result<(), GraphStoreError> {
        self.inner.ping().await
    }

    async fn close(&self) -> Result<(), GraphStoreError> {
        self.record(StoreCall::Close);
        self.inner.close().await
    }
}
