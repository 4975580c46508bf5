//! Relevance and Actionability gates.
//!
//! Each gate asks the capability one yes/no clinical question about an
//! abstract. Relevance always answers: any failure counts as "not relevant".
//! Actionability distinguishes a malformed answer (the article is skipped)
//! from a call that could not complete (the article fails).

use psybrief_llm::CallPurpose;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::capability::{json_kind, Capability, CapabilityError};
use crate::error::PipelineError;

pub const RELEVANCE_PROMPT: &str = "\
You are a senior psychiatrist screening studies for a clinical intelligence platform.

Include ONLY if:
- Human subjects
- Mental health condition
- Clinical intervention, therapy, or treatment
- Findings could reasonably inform clinical practice

Exclude if:
- Animal or preclinical
- Experimental psychology only
- Neuroimaging without clinical application
- Epidemiology, prevalence, validation, or methodology only
- Reviews, protocols, or meta-analyses
- Fringe or implausible interventions

Answer ONLY with valid JSON:
{ \"relevant\": true } or { \"relevant\": false }";

pub const ACTIONABILITY_PROMPT: &str = "\
You are a senior psychiatrist evaluating research relevance.

Question:
Would this study plausibly influence psychiatric clinical decision-making,
treatment discussions, or guideline development within the next 5-10 years?

Rules:
- Focus on human psychiatry.
- Exclude basic science, animal-only studies, prevalence-only studies,
  psychometrics, imaging-only correlates, or speculative mechanisms.
- Include psychotherapy trials, medication trials, and meaningful clinical interventions.
- Be conservative.

Return ONLY valid JSON:

{
  \"actionable\": true | false,
  \"reason\": \"one short sentence\"
}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceVerdict {
    pub relevant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionabilityVerdict {
    pub actionable: bool,
    pub reason: String,
}

// ── Relevance ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RelevanceGate {
    capability: Capability,
}

impl RelevanceGate {
    pub fn new(capability: Capability) -> Self {
        Self { capability }
    }

    /// Fails closed: only an explicit `"relevant": true` passes.
    pub async fn judge(&self, article_id: Option<&str>, abstract_text: &str) -> RelevanceVerdict {
        let relevant = match self
            .capability
            .call_json(CallPurpose::Relevance, article_id, RELEVANCE_PROMPT, abstract_text)
            .await
        {
            Ok(obj) => match obj.get("relevant") {
                Some(Value::Bool(b)) => *b,
                other => {
                    warn!(
                        pmid = article_id.unwrap_or("-"),
                        got = other.map(json_kind).unwrap_or("missing"),
                        "Relevance answer has no boolean `relevant`; treating as not relevant"
                    );
                    false
                }
            },
            Err(e) => {
                warn!(pmid = article_id.unwrap_or("-"), error = %e, "Relevance call failed; treating as not relevant");
                false
            }
        };
        debug!(pmid = article_id.unwrap_or("-"), relevant, "Relevance verdict");
        RelevanceVerdict { relevant }
    }
}

// ── Actionability ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ActionabilityGate {
    capability: Capability,
}

impl ActionabilityGate {
    pub fn new(capability: Capability) -> Self {
        Self { capability }
    }

    /// `Classifier` error on a malformed answer, `Capability` error when the
    /// call itself fails.
    pub async fn judge(
        &self,
        article_id: Option<&str>,
        abstract_text: &str,
    ) -> Result<ActionabilityVerdict, PipelineError> {
        let obj = self
            .capability
            .call_json(CallPurpose::Actionability, article_id, ACTIONABILITY_PROMPT, abstract_text)
            .await
            .map_err(|e| match e {
                CapabilityError::Transport(source) => PipelineError::Capability {
                    purpose: CallPurpose::Actionability.as_str(),
                    source,
                },
                CapabilityError::Malformed(shape) => PipelineError::Classifier {
                    gate: "actionability",
                    message: shape.to_string(),
                },
            })?;

        let actionable = match obj.get("actionable") {
            Some(Value::Bool(b)) => *b,
            other => {
                return Err(PipelineError::Classifier {
                    gate: "actionability",
                    message: format!(
                        "`actionable` must be a boolean, got {}",
                        other.map(json_kind).unwrap_or("nothing")
                    ),
                })
            }
        };
        let reason = obj
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        Ok(ActionabilityVerdict { actionable, reason })
    }
}
