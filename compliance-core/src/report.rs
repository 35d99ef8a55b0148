//! Composite compliance report and the fan-out aggregator that builds it.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::completion::CompletionBackend;
use crate::error::{ComplianceError, Result};
use crate::prompts;
use crate::retrieval::GuidanceSource;

/// Fixed list of regulatory themes covered by the annex section of a
/// report. Result ordering in the stored mapping follows this list.
pub const ANNEX_TOPICS: [&str; 12] = [
    "risk management",
    "data governance",
    "technical documentation",
    "logging and record-keeping",
    "transparency to users",
    "human oversight",
    "accuracy and robustness",
    "quality management system",
    "conformity assessment",
    "EU database registration",
    "post-market monitoring",
    "CE marking",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Processing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

/// Structured risk classification produced by the fan-out risk call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub justification: String,
}

/// Composite compliance report.
///
/// While `status` is `processing` every optional field is absent; a
/// completed report carries summary, risk assessment and annex mapping,
/// written in a single store update and immutable afterwards. A failed
/// report carries only the error summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annex_reports: Option<serde_json::Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Report {
    pub fn processing() -> Self {
        Self {
            status: ReportStatus::Processing,
            summary: None,
            risk_assessment: None,
            annex_reports: None,
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: ReportStatus::Failed,
            summary: None,
            risk_assessment: None,
            annex_reports: None,
            error: Some(error),
        }
    }
}

/// Run the full report fan-out: one summary call, one risk-classification
/// call and one guidance call per annex topic, all launched before any is
/// awaited.
///
/// All-or-nothing: the first sub-call failure fails the whole report and
/// nothing partial is ever returned. Guidance results are re-associated
/// with their topic by position in `ANNEX_TOPICS`, never by completion
/// order.
pub async fn generate_report(
    completion: &dyn CompletionBackend,
    retrieval: &dyn GuidanceSource,
    transcript: &str,
) -> Result<Report> {
    debug!(topics = ANNEX_TOPICS.len(), "starting report fan-out");

    let summary_request = prompts::report_summary_prompt(transcript);
    let risk_request = prompts::risk_classification_prompt(transcript);
    let guidance_calls = ANNEX_TOPICS
        .iter()
        .map(|topic| retrieval.guidance(topic, transcript));

    let (summary, risk_raw, passages) = futures::try_join!(
        completion.complete(&summary_request),
        completion.complete(&risk_request),
        try_join_all(guidance_calls),
    )?;

    let risk: RiskAssessment = serde_json::from_str(&risk_raw).map_err(|e| {
        ComplianceError::MalformedResponse(format!("risk classification: {e}"))
    })?;

    let mut annex_reports = serde_json::Map::new();
    for (topic, passage) in ANNEX_TOPICS.iter().zip(passages) {
        annex_reports.insert(topic.to_string(), Value::String(passage));
    }

    info!("report fan-out complete");

    Ok(Report {
        status: ReportStatus::Complete,
        summary: Some(summary),
        risk_assessment: Some(risk),
        annex_reports: Some(annex_reports),
        error: None,
    })
}
