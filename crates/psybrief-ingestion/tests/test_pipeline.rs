//! End-to-end pipeline runs against a scripted backend and the in-memory store.
//!
//! Run with: cargo test --package psybrief-ingestion --test test_pipeline

mod common;

use chrono::NaiveDate;
use psybrief_common::{Category, StudyType};
use psybrief_db::StudyStore;
use psybrief_ingestion::{ArticleOutcome, IngestionPipeline, SkipReason};
use psybrief_llm::ScriptedBackend;

use common::*;

#[tokio::test]
async fn test_sertraline_article_end_to_end() {
    let h = Harness::new(happy_backend(SERTRALINE_EXTRACTION));
    let xml = article_set(&[pubmed_article("40000001", SERTRALINE_ABSTRACT)]);

    let report = h.pipeline().ingest_xml(&xml).await;

    assert!(report.success);
    assert_eq!((report.ingested, report.skipped, report.failed), (1, 0, 0));

    let ArticleOutcome::Ingested { study_id, extracted, pmid, .. } = &report.results[0] else {
        panic!("expected an ingested article, got {:?}", report.results[0]);
    };
    assert_eq!(pmid.as_deref(), Some("40000001"));
    assert_eq!(extracted.title, "Sertraline vs Placebo in MDD");
    assert_eq!(extracted.study_type, StudyType::DbRct);
    assert_eq!(extracted.category, Category::Mood);
    assert_eq!(extracted.journal.as_deref(), Some("JAMA Psychiatry"));
    assert_eq!(extracted.authors, vec!["Okafor AC", "Lindqvist E"]);
    assert_eq!(extracted.doi.as_deref(), Some("10.1001/jamapsychiatry.2025.40000001"));
    assert_eq!(extracted.publication_date, NaiveDate::from_ymd_opt(2025, 5, 14).unwrap());

    let f = &extracted.key_findings;
    assert_eq!(f[0], "Arms: Sertraline vs placebo");
    assert_eq!(f[1], "Remission 42% vs 28% at week 8");
    assert_eq!(f[f.len() - 2], "Safety: Nausea reported in the sertraline group");
    assert_eq!(f[f.len() - 1], "Takeaway: Sertraline is a reasonable first-line option.");
    assert_eq!(f.len(), 4, "the mistagged arms finding is folded into the Arms slot");

    let study = h.store.get_study(*study_id).await.unwrap().expect("study row");
    assert_eq!(study.external_id.as_deref(), Some("40000001"));
    assert!(h.store.get_insight(*study_id).await.unwrap().is_some());
    assert_eq!(h.backend.call_count(), 3);
}

#[tokio::test]
async fn test_reingesting_the_same_xml_is_idempotent() {
    let h = Harness::new(happy_backend(SERTRALINE_EXTRACTION));
    let xml = article_set(&[pubmed_article("40000002", SERTRALINE_ABSTRACT)]);
    let pipeline = h.pipeline();

    let first = pipeline.ingest_xml(&xml).await;
    let second = pipeline.ingest_xml(&xml).await;

    assert_eq!(first.ingested, 1);
    assert_eq!(second.ingested, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.results[0].skip_reason(), Some(SkipReason::DuplicatePmid));

    let json = serde_json::to_value(&second.results[0]).unwrap();
    let ArticleOutcome::Ingested { study_id, .. } = &first.results[0] else { panic!() };
    assert_eq!(json["existing_study_id"], study_id.to_string());

    assert_eq!(h.store.count_by_external_id("40000002").await, 1);
    assert_eq!(h.store.count_insights().await, 1);
    // Gates ran again, extraction did not.
    assert_eq!(h.backend.call_count(), 3 + 2);
}

#[tokio::test]
async fn test_one_failing_article_does_not_stop_the_batch() {
    let h = Harness::new(failing_on("FLAKY"));
    let xml = article_set(&[
        pubmed_article("1", SERTRALINE_ABSTRACT),
        pubmed_article("2", "FLAKY abstract about lithium in bipolar disorder."),
        pubmed_article("3", SERTRALINE_ABSTRACT),
    ]);

    let report = h.pipeline().with_max_concurrency(3).ingest_xml(&xml).await;

    assert_eq!(report.results.len(), 3);
    assert_eq!((report.ingested, report.skipped, report.failed), (2, 0, 1));
    assert!(report.results[1].is_failed());

    let json = serde_json::to_value(&report.results[1]).unwrap();
    assert_eq!(json["pmid"], "2");
    assert_eq!(json["kind"], "capability_error");
    assert!(json["error"].as_str().unwrap().contains("connection reset"));
    assert!(json.get("success").is_none());
}

#[tokio::test]
async fn test_results_keep_input_order_under_concurrency() {
    let h = Harness::new(happy_backend(SERTRALINE_EXTRACTION));
    let ids: Vec<String> = (100..112).map(|i| i.to_string()).collect();
    let articles: Vec<String> = ids.iter().map(|id| pubmed_article(id, SERTRALINE_ABSTRACT)).collect();

    let report = h.pipeline().with_max_concurrency(4).ingest_xml(&article_set(&articles)).await;

    assert_eq!(report.ingested, ids.len());
    let got: Vec<String> = report
        .results
        .iter()
        .map(|r| serde_json::to_value(r).unwrap()["pmid"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(got, ids);
}

#[tokio::test]
async fn test_not_relevant_and_not_actionable_are_skips() {
    let backend = ScriptedBackend::new(|req| {
        let user = psybrief_llm::scripted::user_prompt(req);
        Ok(match purpose_of(req) {
            Purpose::Relevance if user.contains("mice") => r#"{"relevant": false}"#.to_string(),
            Purpose::Relevance => r#"{"relevant": true}"#.to_string(),
            Purpose::Actionability if user.contains("prevalence") => {
                r#"{"actionable": false, "reason": "Prevalence only"}"#.to_string()
            }
            Purpose::Actionability if user.contains("garbled") => "sure, it is actionable".to_string(),
            Purpose::Actionability => r#"{"actionable": true, "reason": "ok"}"#.to_string(),
            Purpose::Extraction => SERTRALINE_EXTRACTION.to_string(),
        })
    });
    let h = Harness::new(backend);
    let xml = article_set(&[
        pubmed_article("11", "Fluoxetine in mice exposed to chronic stress."),
        pubmed_article("12", "National prevalence of anxiety disorders."),
        pubmed_article("13", "A garbled classifier reply is expected here."),
    ]);

    let report = h.pipeline().ingest_xml(&xml).await;

    assert_eq!(report.skipped, 3);
    let reasons: Vec<_> = report.results.iter().map(ArticleOutcome::skip_reason).collect();
    assert_eq!(
        reasons,
        vec![
            Some(SkipReason::NotRelevant),
            Some(SkipReason::NotActionable),
            Some(SkipReason::ClassifierError),
        ]
    );
    let json = serde_json::to_value(&report.results[1]).unwrap();
    assert_eq!(json["reason"], "not_actionable");
    assert_eq!(json["detail"], "Prevalence only");
    assert_eq!(h.store.count_studies().await.unwrap(), 0);
}

#[tokio::test]
async fn test_insight_write_failure_is_reported_and_rolled_back() {
    let h = Harness::new(happy_backend(SERTRALINE_EXTRACTION));
    h.store.fail_insight_writes(true);

    let report = h
        .pipeline()
        .ingest_xml(&article_set(&[pubmed_article("21", SERTRALINE_ABSTRACT)]))
        .await;

    assert_eq!(report.failed, 1);
    let json = serde_json::to_value(&report.results[0]).unwrap();
    assert_eq!(json["kind"], "persistence_error");
    assert_eq!(h.store.count_studies().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_cleanup_reports_orphaned_study() {
    let h = Harness::new(happy_backend(SERTRALINE_EXTRACTION));
    h.store.fail_insight_writes(true);
    h.store.fail_deletes(true);

    let report = h
        .pipeline()
        .ingest_xml(&article_set(&[pubmed_article("22", SERTRALINE_ABSTRACT)]))
        .await;

    let json = serde_json::to_value(&report.results[0]).unwrap();
    assert_eq!(json["kind"], "orphaned_study");
    assert_eq!(h.store.count_by_external_id("22").await, 1);
    assert_eq!(h.store.count_insights().await, 0);
}

#[tokio::test]
async fn test_extraction_schema_error_fails_article() {
    let h = Harness::new(happy_backend(r#"{"title": "x", "key_findings": 7}"#));

    let report = h
        .pipeline()
        .ingest_xml(&article_set(&[pubmed_article("31", SERTRALINE_ABSTRACT)]))
        .await;

    let json = serde_json::to_value(&report.results[0]).unwrap();
    assert_eq!(json["kind"], "extraction_schema_error");
    assert_eq!(h.store.count_studies().await.unwrap(), 0);
}

#[tokio::test]
async fn test_extraction_only_pipeline_skips_gates() {
    let h = Harness::new(happy_backend(SERTRALINE_EXTRACTION));
    let pipeline = IngestionPipeline::extraction_only(&h.components);
    assert_eq!(pipeline.stage_names(), vec!["dedup", "extraction", "normalise", "persist"]);

    let state = psybrief_ingestion::ArticleState::new(SERTRALINE_ABSTRACT, Default::default());
    let out = pipeline.process(state).await;

    assert!(out.is_ingested());
    assert_eq!(h.backend.call_count(), 1);
}

#[tokio::test]
async fn test_xml_without_abstracts_is_an_empty_batch() {
    let h = Harness::new(happy_backend(SERTRALINE_EXTRACTION));
    let report = h.pipeline().ingest_xml("<PubmedArticleSet></PubmedArticleSet>").await;
    assert!(report.success);
    assert!(report.results.is_empty());
    assert_eq!(h.backend.call_count(), 0);
}
