//! Staged per-article pipeline and batch orchestrator.
//!
//! Each article runs through an ordered list of stages:
//!   1. Relevance gate
//!   2. Actionability gate
//!   3. Dedup pre-check on the external id
//!   4. Extraction
//!   5. Normalisation
//!   6. Persistence (Study + Insight)
//!
//! A stage either lets the article continue, skips it (a normal outcome), or
//! fails it. Every article runs in its own task, so one article's failure or
//! panic is reported in the batch result and never cancels its siblings.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use psybrief_db::StudyStore;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::capability::Capability;
use crate::error::PipelineError;
use crate::extraction::ExtractionEngine;
use crate::gates::{ActionabilityGate, ActionabilityVerdict, RelevanceGate};
use crate::models::{ExtractionResult, NormalisedExtraction, RawArticle, TrustedMetadata};
use crate::normalise::{normalise, NormalisationRules};
use crate::repository::{IngestionRepository, UpsertOutcome};
use crate::sources::pubmed::parse_articles;

// ── Article state ─────────────────────────────────────────────────────────────

/// Everything known about one article as it moves through the stages.
#[derive(Debug, Clone)]
pub struct ArticleState {
    pub abstract_text: String,
    pub meta: TrustedMetadata,
    pub actionability: Option<ActionabilityVerdict>,
    pub extracted: Option<ExtractionResult>,
    pub normalised: Option<NormalisedExtraction>,
    pub study_id: Option<Uuid>,
}

impl ArticleState {
    pub fn new(abstract_text: impl Into<String>, meta: TrustedMetadata) -> Self {
        Self {
            abstract_text: abstract_text.into(),
            meta,
            actionability: None,
            extracted: None,
            normalised: None,
            study_id: None,
        }
    }

    pub fn from_article(article: RawArticle) -> Self {
        let meta = article.metadata();
        Self::new(article.abstract_text, meta)
    }

    fn pmid(&self) -> &str {
        self.meta.external_id.as_deref().unwrap_or("-")
    }
}

// ── Stage contract ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotRelevant,
    NotActionable,
    /// The actionability answer was malformed.
    ClassifierError,
    DuplicatePmid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub reason: SkipReason,
    pub detail: Option<String>,
    pub existing_study_id: Option<Uuid>,
}

impl Skip {
    fn because(reason: SkipReason) -> Self {
        Self { reason, detail: None, existing_study_id: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    Skip(Skip),
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` fails the article; the batch goes on.
    async fn run(&self, state: &mut ArticleState) -> Result<StageOutcome, PipelineError>;
}

// ── Stages ────────────────────────────────────────────────────────────────────

pub struct RelevanceStage(pub RelevanceGate);

#[async_trait]
impl Stage for RelevanceStage {
    fn name(&self) -> &'static str { "relevance" }

    async fn run(&self, state: &mut ArticleState) -> Result<StageOutcome, PipelineError> {
        let verdict = self.0.judge(state.meta.external_id.as_deref(), &state.abstract_text).await;
        if verdict.relevant {
            Ok(StageOutcome::Continue)
        } else {
            Ok(StageOutcome::Skip(Skip::because(SkipReason::NotRelevant)))
        }
    }
}

pub struct ActionabilityStage(pub ActionabilityGate);

#[async_trait]
impl Stage for ActionabilityStage {
    fn name(&self) -> &'static str { "actionability" }

    async fn run(&self, state: &mut ArticleState) -> Result<StageOutcome, PipelineError> {
        match self.0.judge(state.meta.external_id.as_deref(), &state.abstract_text).await {
            Ok(verdict) if verdict.actionable => {
                state.actionability = Some(verdict);
                Ok(StageOutcome::Continue)
            }
            Ok(verdict) => {
                let detail = (!verdict.reason.is_empty()).then(|| verdict.reason.clone());
                state.actionability = Some(verdict);
                Ok(StageOutcome::Skip(Skip { detail, ..Skip::because(SkipReason::NotActionable) }))
            }
            Err(PipelineError::Classifier { message, .. }) => {
                warn!(pmid = state.pmid(), %message, "Actionability answer malformed; skipping article");
                Ok(StageOutcome::Skip(Skip {
                    detail: Some(message),
                    ..Skip::because(SkipReason::ClassifierError)
                }))
            }
            Err(e) => Err(e),
        }
    }
}

pub struct DedupStage(pub IngestionRepository);

#[async_trait]
impl Stage for DedupStage {
    fn name(&self) -> &'static str { "dedup" }

    async fn run(&self, state: &mut ArticleState) -> Result<StageOutcome, PipelineError> {
        match self.0.find_existing(state.meta.external_id.as_deref()).await {
            Some(study_id) => Ok(StageOutcome::Skip(Skip {
                existing_study_id: Some(study_id),
                ..Skip::because(SkipReason::DuplicatePmid)
            })),
            None => Ok(StageOutcome::Continue),
        }
    }
}

pub struct ExtractionStage(pub ExtractionEngine);

#[async_trait]
impl Stage for ExtractionStage {
    fn name(&self) -> &'static str { "extraction" }

    async fn run(&self, state: &mut ArticleState) -> Result<StageOutcome, PipelineError> {
        let extracted = self.0.extract(&state.abstract_text, &state.meta).await?;
        state.extracted = Some(extracted);
        Ok(StageOutcome::Continue)
    }
}

pub struct NormaliseStage(pub Arc<NormalisationRules>);

#[async_trait]
impl Stage for NormaliseStage {
    fn name(&self) -> &'static str { "normalise" }

    async fn run(&self, state: &mut ArticleState) -> Result<StageOutcome, PipelineError> {
        let extracted = state
            .extracted
            .as_ref()
            .ok_or_else(|| PipelineError::Aborted("normalise ran without an extraction".to_string()))?;
        let record = normalise(extracted, &state.meta, &self.0, Utc::now().date_naive());
        debug!(pmid = state.pmid(), title = %record.title, study_type = %record.study_type, "Normalised");
        state.normalised = Some(record);
        Ok(StageOutcome::Continue)
    }
}

pub struct PersistStage(pub IngestionRepository);

#[async_trait]
impl Stage for PersistStage {
    fn name(&self) -> &'static str { "persist" }

    async fn run(&self, state: &mut ArticleState) -> Result<StageOutcome, PipelineError> {
        let record = state
            .normalised
            .as_ref()
            .ok_or_else(|| PipelineError::Aborted("persist ran without a normalised record".to_string()))?;
        match self.0.upsert_study(record).await? {
            UpsertOutcome::Created { study_id, .. } => {
                state.study_id = Some(study_id);
                Ok(StageOutcome::Continue)
            }
            UpsertOutcome::Existing { study_id } => Ok(StageOutcome::Skip(Skip {
                existing_study_id: Some(study_id),
                ..Skip::because(SkipReason::DuplicatePmid)
            })),
        }
    }
}

// ── Outputs ───────────────────────────────────────────────────────────────────

/// Per-article result, serialised in the shape API callers expect.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ArticleOutcome {
    Ingested {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        pmid: Option<String>,
        study_id: Uuid,
        extracted: NormalisedExtraction,
    },
    Skipped {
        success: bool,
        skipped: bool,
        reason: SkipReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        pmid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        existing_study_id: Option<Uuid>,
    },
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        pmid: Option<String>,
        error: String,
        kind: &'static str,
    },
}

impl ArticleOutcome {
    fn skipped(pmid: Option<String>, skip: Skip) -> Self {
        ArticleOutcome::Skipped {
            success: true,
            skipped: true,
            reason: skip.reason,
            pmid,
            detail: skip.detail,
            existing_study_id: skip.existing_study_id,
        }
    }

    pub fn failed(pmid: Option<String>, err: &PipelineError) -> Self {
        ArticleOutcome::Failed { pmid, error: err.to_string(), kind: err.kind() }
    }

    pub fn is_ingested(&self) -> bool { matches!(self, ArticleOutcome::Ingested { .. }) }
    pub fn is_skipped(&self) -> bool { matches!(self, ArticleOutcome::Skipped { .. }) }
    pub fn is_failed(&self) -> bool { matches!(self, ArticleOutcome::Failed { .. }) }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            ArticleOutcome::Skipped { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Per-batch result. `results` is in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<ArticleOutcome>,
}

impl BatchReport {
    fn from_results(results: Vec<ArticleOutcome>) -> Self {
        Self {
            success: true,
            ingested: results.iter().filter(|r| r.is_ingested()).count(),
            skipped: results.iter().filter(|r| r.is_skipped()).count(),
            failed: results.iter().filter(|r| r.is_failed()).count(),
            results,
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Shared building blocks. Cheap to clone.
#[derive(Clone)]
pub struct PipelineComponents {
    pub relevance: RelevanceGate,
    pub actionability: ActionabilityGate,
    pub extraction: ExtractionEngine,
    pub rules: Arc<NormalisationRules>,
    pub repository: IngestionRepository,
}

impl PipelineComponents {
    pub fn new(
        capability: Capability,
        store: Arc<dyn StudyStore>,
        rules: Arc<NormalisationRules>,
    ) -> Self {
        Self {
            relevance: RelevanceGate::new(capability.clone()),
            actionability: ActionabilityGate::new(capability.clone()),
            extraction: ExtractionEngine::new(capability),
            rules,
            repository: IngestionRepository::new(store),
        }
    }
}

#[derive(Clone)]
pub struct IngestionPipeline {
    stages: Arc<Vec<Box<dyn Stage>>>,
    max_concurrency: usize,
}

impl IngestionPipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages: Arc::new(stages), max_concurrency: 1 }
    }

    /// Gates, dedup, extraction, normalisation, persistence.
    pub fn standard(c: &PipelineComponents) -> Self {
        Self::new(vec![
            Box::new(RelevanceStage(c.relevance.clone())),
            Box::new(ActionabilityStage(c.actionability.clone())),
            Box::new(DedupStage(c.repository.clone())),
            Box::new(ExtractionStage(c.extraction.clone())),
            Box::new(NormaliseStage(c.rules.clone())),
            Box::new(PersistStage(c.repository.clone())),
        ])
    }

    /// Extraction path for a single caller-supplied abstract; no gates.
    pub fn extraction_only(c: &PipelineComponents) -> Self {
        Self::new(vec![
            Box::new(DedupStage(c.repository.clone())),
            Box::new(ExtractionStage(c.extraction.clone())),
            Box::new(NormaliseStage(c.rules.clone())),
            Box::new(PersistStage(c.repository.clone())),
        ])
    }

    /// Articles processed at once. 1 means strictly sequential.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage for one article, in order.
    #[instrument(skip(self, state), fields(pmid = state.pmid()))]
    pub async fn process(&self, mut state: ArticleState) -> ArticleOutcome {
        let pmid = state.meta.external_id.clone();

        for stage in self.stages.iter() {
            match stage.run(&mut state).await {
                Ok(StageOutcome::Continue) => {
                    debug!(stage = stage.name(), "Stage passed");
                }
                Ok(StageOutcome::Skip(skip)) => {
                    info!(stage = stage.name(), reason = ?skip.reason, "Article skipped");
                    return ArticleOutcome::skipped(pmid, skip);
                }
                Err(e) => {
                    warn!(stage = stage.name(), kind = e.kind(), error = %e, "Article failed");
                    return ArticleOutcome::failed(pmid, &e);
                }
            }
        }

        match (state.study_id, state.normalised) {
            (Some(study_id), Some(extracted)) => ArticleOutcome::Ingested {
                success: true,
                pmid,
                study_id,
                extracted,
            },
            _ => ArticleOutcome::failed(
                pmid,
                &PipelineError::Aborted("pipeline finished without persisting".to_string()),
            ),
        }
    }

    /// Process a batch. Order of `results` matches input order.
    pub async fn run_batch(&self, articles: Vec<RawArticle>) -> BatchReport {
        let t0 = Instant::now();
        let total = articles.len();

        let results: Vec<ArticleOutcome> = stream::iter(articles.into_iter().map(|article| {
            let pipeline = self.clone();
            async move {
                let pmid = article.external_id.clone();
                let task = tokio::spawn(async move {
                    pipeline.process(ArticleState::from_article(article)).await
                });
                match task.await {
                    Ok(outcome) => outcome,
                    Err(join_err) => {
                        let err = PipelineError::Aborted(join_err.to_string());
                        warn!(pmid = pmid.as_deref().unwrap_or("-"), error = %err, "Article task aborted");
                        ArticleOutcome::failed(pmid, &err)
                    }
                }
            }
        }))
        .buffered(self.max_concurrency)
        .collect()
        .await;

        let report = BatchReport::from_results(results);
        info!(
            total,
            ingested = report.ingested,
            skipped = report.skipped,
            failed = report.failed,
            duration_ms = t0.elapsed().as_millis() as u64,
            "Batch finished"
        );
        report
    }

    /// Parse PubMed XML and process every article with an abstract.
    pub async fn ingest_xml(&self, xml: &str) -> BatchReport {
        let articles: Vec<RawArticle> = parse_articles(xml).collect();
        info!(articles = articles.len(), "Parsed PubMed articles with abstracts");
        self.run_batch(articles).await
    }
}
