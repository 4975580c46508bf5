//! Shared fixtures for the ingestion integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use psybrief_db::{MemoryStore, StudyStore};
use psybrief_ingestion::{Capability, IngestionPipeline, NormalisationRules, PipelineComponents};
use psybrief_llm::scripted::{system_prompt, user_prompt};
use psybrief_llm::{LlmError, LlmRequest, ScriptedBackend};

pub const SERTRALINE_ABSTRACT: &str = "In this randomized, double-blind trial, adults with major \
depressive disorder received sertraline versus placebo for 8 weeks. Remission was higher with \
sertraline. Nausea was reported in the sertraline group.";

pub const SERTRALINE_EXTRACTION: &str = r#"{
  "title": "Sertraline vs Placebo in mdd",
  "journal": "Made-up Journal",
  "authors": ["Someone X"],
  "sample_size": 240,
  "population": "Adults with major depressive disorder",
  "intervention": "Sertraline versus placebo",
  "arms": "Sertraline vs placebo",
  "key_findings": ["Remission 42% vs 28% at week 8", "Arms: Sertraline vs placebo"],
  "takeaway": "Sertraline is a reasonable first-line option",
  "study_type": "Randomized, double-blind, placebo-controlled trial",
  "safety_notes": "nausea reported in the sertraline group",
  "category": "Depressive disorders"
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Relevance,
    Actionability,
    Extraction,
}

/// Which gate or engine a request came from, read off its system prompt.
pub fn purpose_of(req: &LlmRequest) -> Purpose {
    let system = system_prompt(req);
    if system.contains("extraction engine") {
        Purpose::Extraction
    } else if system.contains("evaluating research relevance") {
        Purpose::Actionability
    } else {
        Purpose::Relevance
    }
}

/// A backend that passes both gates and returns `extraction` for every abstract.
pub fn happy_backend(extraction: &'static str) -> ScriptedBackend {
    ScriptedBackend::new(move |req| {
        Ok(match purpose_of(req) {
            Purpose::Relevance => r#"{"relevant": true}"#.to_string(),
            Purpose::Actionability => r#"{"actionable": true, "reason": "Practice-relevant trial"}"#.to_string(),
            Purpose::Extraction => extraction.to_string(),
        })
    })
}

/// Like `happy_backend`, but every call whose abstract contains `marker` fails
/// at transport level during extraction.
pub fn failing_on(marker: &'static str) -> ScriptedBackend {
    ScriptedBackend::new(move |req| match purpose_of(req) {
        Purpose::Extraction if user_prompt(req).contains(marker) => {
            Err(LlmError::Unavailable("connection reset".to_string()))
        }
        Purpose::Relevance => Ok(r#"{"relevant": true}"#.to_string()),
        Purpose::Actionability => Ok(r#"{"actionable": true, "reason": "ok"}"#.to_string()),
        Purpose::Extraction => Ok(SERTRALINE_EXTRACTION.to_string()),
    })
}

pub struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub store: Arc<MemoryStore>,
    pub components: PipelineComponents,
}

impl Harness {
    pub fn new(backend: ScriptedBackend) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(MemoryStore::new());
        let components = PipelineComponents::new(
            Capability::new(backend.clone()),
            store.clone() as Arc<dyn StudyStore>,
            NormalisationRules::builtin(),
        );
        Self { backend, store, components }
    }

    pub fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::standard(&self.components)
    }
}

/// One `<PubmedArticle>` with the usual MEDLINE nesting.
pub fn pubmed_article(pmid: &str, abstract_text: &str) -> String {
    format!(
        r#"<PubmedArticle>
  <MedlineCitation Status="MEDLINE">
    <PMID Version="1">{pmid}</PMID>
    <Article>
      <Journal>
        <JournalIssue><PubDate><Year>2025</Year><Month>May</Month><Day>14</Day></PubDate></JournalIssue>
        <Title>JAMA psychiatry</Title>
        <ISOAbbreviation>JAMA Psychiatry</ISOAbbreviation>
      </Journal>
      <ArticleTitle>Sertraline for depression: a randomized trial.</ArticleTitle>
      <Abstract><AbstractText>{abstract_text}</AbstractText></Abstract>
      <AuthorList>
        <Author><LastName>Okafor</LastName><Initials>AC</Initials></Author>
        <Author><LastName>Lindqvist</LastName><Initials>E</Initials></Author>
      </AuthorList>
    </Article>
  </MedlineCitation>
  <PubmedData>
    <ArticleIdList>
      <ArticleId IdType="pubmed">{pmid}</ArticleId>
      <ArticleId IdType="doi">10.1001/jamapsychiatry.2025.{pmid}</ArticleId>
    </ArticleIdList>
  </PubmedData>
</PubmedArticle>"#
    )
}

pub fn article_set(articles: &[String]) -> String {
    format!("<?xml version=\"1.0\"?>\n<PubmedArticleSet>\n{}\n</PubmedArticleSet>", articles.join("\n"))
}
