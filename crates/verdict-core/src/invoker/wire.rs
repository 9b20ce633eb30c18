//! Mapping raw agent payloads onto typed results.
//!
//! Agents answer with either a JSON object or a string containing one
//! (often wrapped in a Markdown code fence). Anything that cannot be mapped
//! onto the expected shape becomes [`AgentError::Parsing`].

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::{
    AdversarialResult, Competency, CompetencyResult, CompetencyResultFields, ConfidenceIssue,
    ConfidenceProfile, EvidenceConflict, EvidenceRef, MediationResult,
};

use super::error::{AgentError, AgentResult};

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("fence pattern is valid")
});

/// Extract the JSON document carried by an agent response.
pub fn extract_json(target: &str, raw: serde_json::Value) -> AgentResult<serde_json::Value> {
    let text = match raw {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => {
            return Err(AgentError::parsing(target, "empty response"));
        }
        other => return Ok(other),
    };

    let candidate = match FENCE.captures(&text) {
        Some(caps) => caps[1].to_string(),
        None => match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => text[start..=end].to_string(),
            _ => return Err(AgentError::parsing(target, "no JSON object in response")),
        },
    };

    serde_json::from_str(&candidate)
        .map_err(|e| AgentError::parsing(target, format!("invalid JSON: {e}")))
}

fn decode<T: DeserializeOwned>(target: &str, raw: serde_json::Value) -> AgentResult<T> {
    let value = extract_json(target, raw)?;
    serde_json::from_value(value).map_err(|e| AgentError::parsing(target, e.to_string()))
}

/// Agents may report confidence as a bare number or as a full profile.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfidenceWire {
    Overall(f64),
    Profile(ConfidenceProfile),
}

impl From<ConfidenceWire> for ConfidenceProfile {
    fn from(wire: ConfidenceWire) -> Self {
        match wire {
            ConfidenceWire::Overall(v) => ConfidenceProfile::overall(v),
            ConfidenceWire::Profile(p) => p,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScoringPayload {
    #[serde(default)]
    competency: Option<Competency>,
    score: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    confidence: ConfidenceWire,
    #[serde(default)]
    evidence: Vec<EvidenceRef>,
}

pub fn parse_competency_result(
    target: &str,
    expected: Competency,
    raw: serde_json::Value,
) -> AgentResult<CompetencyResult> {
    let payload: ScoringPayload = decode(target, raw)?;
    if let Some(echoed) = payload.competency {
        if echoed != expected {
            return Err(AgentError::parsing(
                target,
                format!("agent scored {echoed} but {expected} was requested"),
            ));
        }
    }
    CompetencyResult::new(CompetencyResultFields {
        competency: expected,
        score: payload.score,
        reasoning: payload.reasoning,
        strengths: payload.strengths,
        weaknesses: payload.weaknesses,
        confidence: payload.confidence.into(),
        evidence: payload.evidence,
    })
    .map_err(|e| AgentError::parsing(target, e.to_string()))
}

#[derive(Debug, Deserialize)]
struct MediationPayload {
    primary_competency: Competency,
    #[serde(default)]
    justification: String,
    #[serde(default)]
    confidence: Option<f64>,
}

pub fn parse_mediation(
    target: &str,
    conflict: &EvidenceConflict,
    raw: serde_json::Value,
) -> AgentResult<MediationResult> {
    let payload: MediationPayload = decode(target, raw)?;
    if !conflict.competencies().contains(&payload.primary_competency) {
        return Err(AgentError::parsing(
            target,
            format!(
                "{} did not cite segment {}",
                payload.primary_competency, conflict.segment_id
            ),
        ));
    }
    if let Some(c) = payload.confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(AgentError::parsing(
                target,
                format!("mediation confidence {c} is outside 0..=1"),
            ));
        }
    }
    Ok(MediationResult {
        segment_id: conflict.segment_id.clone(),
        primary_competency: payload.primary_competency,
        justification: payload.justification,
        confidence: payload.confidence,
    })
}

#[derive(Debug, Deserialize)]
struct ValidationPayload {
    adjusted_score: f64,
    adjusted_confidence: f64,
    #[serde(default)]
    rationale: String,
}

pub fn parse_adversarial(
    target: &str,
    issue: &ConfidenceIssue,
    original: &CompetencyResult,
    raw: serde_json::Value,
) -> AgentResult<AdversarialResult> {
    let payload: ValidationPayload = decode(target, raw)?;
    // Range-check through the same constructor that guards agent results.
    original
        .with_adjustment(payload.adjusted_score, payload.adjusted_confidence)
        .map_err(|e| AgentError::parsing(target, e.to_string()))?;
    Ok(AdversarialResult {
        competency: issue.competency,
        original_score: original.score(),
        original_confidence: original.confidence().overall,
        adjusted_score: payload.adjusted_score,
        adjusted_confidence: payload.adjusted_confidence,
        rationale: payload.rationale,
    })
}
