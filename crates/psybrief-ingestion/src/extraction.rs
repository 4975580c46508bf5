//! Extraction engine.
//!
//! Sends the abstract to the capability under a fixed JSON contract and
//! validates the answer into an [`ExtractionResult`]. Validation is strict
//! about shape (a field that is present must have a usable type) and lenient
//! about content: vocabulary fields stay free text for the normalisation
//! engine to collapse.

use psybrief_llm::CallPurpose;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::capability::{parse_json_object, Capability, CapabilityError, JsonShapeError};
use crate::error::{ExtractionSchemaError, PipelineError};
use crate::models::{ExtractionResult, TrustedMetadata};

/// Raw findings kept before normalisation.
pub const MAX_RAW_FINDINGS: usize = 6;

pub const EXTRACTION_PROMPT: &str = r#"You are Psych Brief's AI extraction engine for psychiatry.
Extract the following fields from the abstract. Return valid JSON ONLY.

{
  "title": string,
  "journal": string or null,
  "authors": ["Last F", "Last F", "..."],
  "sample_size": number or null,
  "population": string or null,
  "intervention": string or null,
  "arms": string or null,
  "key_findings": ["...", "..."],
  "takeaway": string or null,
  "study_type": "RCT | DB RCT | SB RCT | Triple-blind RCT | Clinical Trial | Observational | Cohort | Case-Control | Systematic Review | Meta-analysis | Post hoc | Secondary analysis | Protocol | Other",
  "safety_notes": string or null,
  "category": "Mood | Anxiety | Psychosis | Neurodevelopmental | Sleep-Wake | Other"
}

ARMS RULES:
- If the study compares two or more groups, you MUST populate "arms".
- Format: "Intervention A vs Intervention B" (or "Intervention vs placebo"), WITHOUT an "Arms:" prefix.
- If there is only one group or no comparator, return null. Do not guess.

CATEGORY RULES:
- Mood: depression/MDD, bipolar depression, mania, affective disorders.
- Anxiety: GAD, panic, phobias, PTSD-related symptoms/treatments, OCD.
- Psychosis: schizophrenia, schizoaffective, hallucinations, delusions.
- Neurodevelopmental: ADHD, ASD/autism, intellectual disability, learning disorders.
- Sleep-Wake: insomnia, hypersomnia, circadian disorders, melatonin.
- Other: substance use, personality disorders, psychosocial interventions outside above groups.
- If the population is primarily neurodevelopmental, use "Neurodevelopmental" even if the intervention targets sleep.

STUDY_TYPE RULES:
- "DB RCT" = double-blind randomized controlled trial; "SB RCT" = single-blind; "Triple-blind RCT" = triple-blind.
- "RCT" = randomized controlled trial with blinding not specified.
- Use "Post hoc" for post hoc analyses and "Secondary analysis" for secondary/exploratory analyses.
- Prefer the shortest correct label from the allowed list.

TITLE RULES:
- Concise, clinician-friendly, condition-focused; capitalize major words; use "vs" instead of "Versus".
- NEVER include study design, dose, duration, frequency, or sample size. NEVER begin a title with a number.
- Acronyms (ADHD, MDD, GAD, PTSD, OCD, CBT, SSRI) must be ALL CAPS. Never abbreviate bipolar disorder.

ACRONYM EXPANSION RULES:
- Define any acronym outside this list at first mention as "Full Term (ACRONYM)":
  ADHD, ASD, PTSD, MDD, GAD, OCD, SSRI, SNRI, CBT, DBT, RCT, CI, OR, HR, PANSS.

AUTHOR RULES:
- Short-form names only ("Smith J"). If authors cannot be determined, return []. Do not fabricate.

KEY_FINDINGS RULES:
- 2-6 clinician-facing bullets starting with a capital letter.
- Do NOT include bullets starting with "Arms:", "Safety:" or "Takeaway:".

TAKEAWAY RULE:
- One clinician-friendly sentence without a "Takeaway:" prefix, or null if unclear.

JOURNAL RULES:
- If the journal cannot be reliably inferred from the abstract alone, return null.

Return ONLY valid JSON."#;

#[derive(Clone)]
pub struct ExtractionEngine {
    capability: Capability,
}

impl ExtractionEngine {
    pub fn new(capability: Capability) -> Self {
        Self { capability }
    }

    /// Extract and validate. Trusted metadata overrides journal and authors.
    #[instrument(skip(self, abstract_text, meta), fields(pmid = meta.external_id.as_deref().unwrap_or("-")))]
    pub async fn extract(
        &self,
        abstract_text: &str,
        meta: &TrustedMetadata,
    ) -> Result<ExtractionResult, PipelineError> {
        let obj = self
            .capability
            .call_json(
                CallPurpose::Extraction,
                meta.external_id.as_deref(),
                EXTRACTION_PROMPT,
                abstract_text,
            )
            .await
            .map_err(|e| match e {
                CapabilityError::Transport(source) => PipelineError::Capability {
                    purpose: CallPurpose::Extraction.as_str(),
                    source,
                },
                CapabilityError::Malformed(shape) => PipelineError::ExtractionSchema(shape.into()),
            })?;

        let mut result = validate_object(&obj)?;
        apply_trusted(&mut result, meta);
        debug!(findings = result.key_findings.len(), "Extraction validated");
        Ok(result)
    }
}

/// Validate raw extractor text.
pub fn validate_extraction(raw: &str) -> Result<ExtractionResult, ExtractionSchemaError> {
    let obj = parse_json_object(raw)?;
    validate_object(&obj)
}

impl From<JsonShapeError> for ExtractionSchemaError {
    fn from(err: JsonShapeError) -> Self {
        match err {
            JsonShapeError::NotJson(msg)   => ExtractionSchemaError::NotJson(msg),
            JsonShapeError::NotAnObject(_) => ExtractionSchemaError::NotAnObject,
        }
    }
}

fn validate_object(obj: &Map<String, Value>) -> Result<ExtractionResult, ExtractionSchemaError> {
    let mut key_findings = string_list(obj, "key_findings")?;
    key_findings.truncate(MAX_RAW_FINDINGS);

    Ok(ExtractionResult {
        title: text(obj, "title")?,
        journal: text(obj, "journal")?,
        authors: string_list(obj, "authors")?,
        sample_size: sample_size(obj)?,
        population: text(obj, "population")?,
        intervention: text(obj, "intervention")?,
        arms: text(obj, "arms")?.filter(|a| !is_placeholder(a)),
        key_findings,
        takeaway: text(obj, "takeaway")?,
        study_type: text(obj, "study_type")?,
        safety_notes: text(obj, "safety_notes")?,
        category: text(obj, "category")?,
    })
}

fn apply_trusted(result: &mut ExtractionResult, meta: &TrustedMetadata) {
    if let Some(journal) = meta.journal.as_deref().filter(|j| !j.trim().is_empty()) {
        result.journal = Some(journal.to_string());
    }
    if !meta.authors.is_empty() {
        result.authors = meta.authors.clone();
    }
}

/// Model stand-ins for "no value".
fn is_placeholder(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "null" | "none" | "n/a" | "na" | "not applicable" | "not specified"
    )
}

/// Optional trimmed string; `null`, missing and blank are all `None`.
fn text(obj: &Map<String, Value>, field: &'static str) -> Result<Option<String>, ExtractionSchemaError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok((!t.is_empty() && t != "null").then(|| t.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(ExtractionSchemaError::WrongType { field, expected: "string or null" }),
    }
}

/// Array of strings; a bare string counts as a one-element list.
fn string_list(obj: &Map<String, Value>, field: &'static str) -> Result<Vec<String>, ExtractionSchemaError> {
    let wrong = || ExtractionSchemaError::WrongType { field, expected: "array of strings" };
    match obj.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(non_blank(s).into_iter().collect()),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.extend(non_blank(s)),
                    Value::Null => {}
                    _ => return Err(wrong()),
                }
            }
            Ok(out)
        }
        Some(_) => Err(wrong()),
    }
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// Integer, integral float, or a string carrying a count ("N=240", "1,024").
fn sample_size(obj: &Map<String, Value>) -> Result<Option<i64>, ExtractionSchemaError> {
    let n = match obj.get("sample_size") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(Value::String(s)) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit() || *c == ',')
                .filter(char::is_ascii_digit)
                .collect();
            digits.parse::<i64>().ok()
        }
        Some(_) => {
            return Err(ExtractionSchemaError::WrongType {
                field: "sample_size",
                expected: "number, numeric string or null",
            })
        }
    };
    Ok(n.filter(|&n| n > 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_extraction() {
        let raw = r#"{
            "title": "Sertraline vs Placebo in mdd",
            "journal": null,
            "authors": ["Smith J"],
            "sample_size": 240,
            "population": "Adults with major depressive disorder",
            "intervention": "Sertraline vs placebo",
            "arms": "Sertraline vs placebo",
            "key_findings": ["a", "b", "c", "d", "e", "f", "g"],
            "takeaway": null,
            "study_type": "Double-blind, randomized, placebo-controlled trial",
            "safety_notes": "nausea",
            "category": "Mood",
            "unexpected": {"ignored": true}
        }"#;
        let r = validate_extraction(raw).unwrap();
        assert_eq!(r.sample_size, Some(240));
        assert_eq!(r.key_findings.len(), MAX_RAW_FINDINGS);
        assert_eq!(r.journal, None);
        assert_eq!(r.takeaway, None);
        assert_eq!(r.study_type.as_deref(), Some("Double-blind, randomized, placebo-controlled trial"));
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let r = validate_extraction("{}").unwrap();
        assert_eq!(r, ExtractionResult::default());
    }

    #[test]
    fn test_arms_placeholders_become_none() {
        for arms in ["null", "N/A", "none", "  "] {
            let raw = format!(r#"{{"arms": "{arms}"}}"#);
            assert_eq!(validate_extraction(&raw).unwrap().arms, None, "arms = {arms:?}");
        }
    }

    #[test]
    fn test_sample_size_is_lenient() {
        let cases = [
            (r#"{"sample_size": "N=1,024"}"#, Some(1024)),
            (r#"{"sample_size": 88.0}"#, Some(88)),
            (r#"{"sample_size": "not reported"}"#, None),
            (r#"{"sample_size": -3}"#, None),
        ];
        for (raw, expected) in cases {
            assert_eq!(validate_extraction(raw).unwrap().sample_size, expected, "{raw}");
        }
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(
            validate_extraction("I could not find any trial data."),
            Err(ExtractionSchemaError::NotJson(_))
        ));
        assert!(matches!(validate_extraction("[]"), Err(ExtractionSchemaError::NotAnObject)));
        assert!(matches!(
            validate_extraction(r#"{"key_findings": {"a": 1}}"#),
            Err(ExtractionSchemaError::WrongType { field: "key_findings", .. })
        ));
        assert!(matches!(
            validate_extraction(r#"{"population": ["adults"]}"#),
            Err(ExtractionSchemaError::WrongType { field: "population", .. })
        ));
    }

    #[tokio::test]
    async fn test_engine_keeps_shape_error_kinds_apart() {
        use std::sync::Arc;
        use psybrief_llm::ScriptedBackend;

        let engine = |answer: &'static str| {
            ExtractionEngine::new(Capability::new(Arc::new(ScriptedBackend::constant(answer))))
        };
        let meta = TrustedMetadata::default();

        let err = engine("[\"sertraline\"]").extract("abstract", &meta).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionSchema(ExtractionSchemaError::NotAnObject)), "{err:?}");

        let err = engine("No trial data found.").extract("abstract", &meta).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionSchema(ExtractionSchemaError::NotJson(_))), "{err:?}");
        assert_eq!(err.kind(), "extraction_schema_error");
    }

    #[test]
    fn test_trusted_metadata_wins() {
        let mut r = validate_extraction(r#"{"journal": "Made Up J", "authors": ["Doe J"]}"#).unwrap();
        let meta = TrustedMetadata {
            journal: Some("Lancet Psychiatry".to_string()),
            authors: vec!["Okafor C".to_string(), "Lind M".to_string()],
            ..Default::default()
        };
        apply_trusted(&mut r, &meta);
        assert_eq!(r.journal.as_deref(), Some("Lancet Psychiatry"));
        assert_eq!(r.authors, vec!["Okafor C".to_string(), "Lind M".to_string()]);

        let mut r = validate_extraction(r#"{"journal": "Sleep Med", "authors": ["Doe J"]}"#).unwrap();
        apply_trusted(&mut r, &TrustedMetadata::default());
        assert_eq!(r.journal.as_deref(), Some("Sleep Med"));
        assert_eq!(r.authors, vec!["Doe J".to_string()]);
    }
}
