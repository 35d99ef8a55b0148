//! Prompt templates for the three pipeline stages and the fan-out report.
//!
//! Templates are data: given the same input text they produce the same
//! prompt string, and the attached output schemas are passed through to the
//! completion API unaltered.

use serde_json::{Value, json};

use crate::completion::{PromptRequest, ResponseFormat};

/// Shared formatting block prepended to the streamed summary stage.
const MARKDOWN_FORMATTING_RULES: &str = r#"**CRITICAL FORMATTING INSTRUCTIONS:**
- Your entire response MUST be valid, clean, and well-structured markdown.
- Use headings (`##` for main titles, `###` for subtitles) to organize the content logically.
- **Aggressively use bold text (`**text**`) to emphasize all key legal terms, findings, action items, and important phrases to improve scannability.**
- Use bullet points (`- `) for all lists to ensure clarity and scannability.
- Ensure proper spacing between all elements (headings, paragraphs, lists) for maximum readability.
- Do not use any HTML tags or non-standard markdown syntax."#;

/// Build a strict object schema of named string fields, all required,
/// no extra fields permitted.
fn string_object_schema(fields: &[(&str, &str)]) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, description) in fields {
        properties.insert(
            name.to_string(),
            json!({"type": "string", "description": description}),
        );
    }
    let required: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Stage 1: condense the raw transcript into a single summary paragraph.
pub fn summary_prompt(transcript: &str) -> PromptRequest {
    let prompt = format!(
        r#"You are a legal secretary AI. Your task is to summarize the following transcript.

{rules}

**SPECIFIC TASK:**
- Condense the transcript into a **single, well-formed paragraph**.
- **DO NOT** use any headings or lists for this summary.
- **Emphasize** the client's core product function and key compliance claims using **bold text**.

**Intake Call Transcript:**
'{transcript}'

**Summary:**
"#,
        rules = MARKDOWN_FORMATTING_RULES,
        transcript = transcript
    );
    PromptRequest::new(prompt)
}

/// Stage 2: article-by-article legal analysis of the transcript against the
/// hand-authored EU AI Act context block, constrained to a structured JSON
/// report.
pub fn legal_assessment_prompt(transcript: &str) -> PromptRequest {
    let prompt = format!(
        r#"You are a legal analyst specializing in the EU AI Act, focusing on HR Tech. Your task is to analyze the user's AI feature, as described in the conversation transcript, against the provided EU AI Act articles. For each relevant article, provide a brief, structured analysis of how it applies to the user's AI feature, explicitly referencing details from the transcript where applicable.

**Conversation Transcript:**
'{transcript}'

**Provided EU AI Act Articles (relevant to HR Tech):**
- **Article 10 (Data and data governance):** 'Training, validation and testing data sets shall be subject to appropriate data governance and management practices... free of errors and complete... relevant, representative...'
- **Article 14 (Human oversight):** 'High-risk AI systems shall be designed and developed in such a way that they can be effectively overseen by natural persons... to prevent or minimise the risks...'
- **Article 13 (Transparency and provision of information to users):** 'High-risk AI systems shall be designed and developed in such a way to ensure that their operation is sufficiently transparent to enable users to interpret the system's output and use it appropriately.'
- **Annex III, Point 4 (Employment, workers' management and access to self-employment):** This section classifies AI systems used for recruitment, selection, performance management, task allocation, and monitoring of employees as high-risk.

Generate a structured JSON analysis now, with a clear analysis for each article, linking back to the transcript details."#,
        transcript = transcript
    );

    let schema = string_object_schema(&[
        (
            "article_10_analysis",
            "Analysis of how Article 10 (Data and data governance) applies to the AI feature, referencing transcript details.",
        ),
        (
            "article_14_analysis",
            "Analysis of how Article 14 (Human oversight) applies to the AI feature, referencing transcript details.",
        ),
        (
            "article_13_analysis",
            "Analysis of how Article 13 (Transparency and provision of information to users) applies to the AI feature, referencing transcript details.",
        ),
        (
            "annex_iii_point_4_classification",
            "Classification of the AI system as high-risk under Annex III, Point 4, referencing transcript details.",
        ),
    ]);

    PromptRequest::with_schema(prompt, ResponseFormat::json_schema("legal_assessment", schema))
}

/// Stage 3: final triage verdict derived from the stage-2 legal assessment
/// supplied back by the caller.
pub fn risk_assessment_prompt(legal_assessment: &str) -> PromptRequest {
    let prompt = format!(
        r#"You are a senior legal partner specializing in EU AI Act compliance for HR Tech. Your task is to provide a final, conclusive risk assessment based on the detailed legal analysis provided.

**Legal Assessment:**
{legal_assessment}

Based on this legal assessment, determine the appropriate recommendation. Stream a brief, decisive explanation for your choice, directly linking your justification to the findings in the legal assessment. Conclude with either 'Recommendation: Human Lawyer Advised' or 'Recommendation: Standard Compliance Procedure'."#,
        legal_assessment = legal_assessment
    );

    let schema = json!({
        "type": "object",
        "properties": {
            "recommendation": {
                "type": "string",
                "enum": ["Human Lawyer Advised", "Standard Compliance Procedure"],
                "description": "The recommended course of action based on the legal analysis"
            },
            "justification": {
                "type": "string",
                "description": "Brief explanation for the recommendation, directly referencing the legal assessment findings."
            }
        },
        "required": ["recommendation", "justification"],
        "additionalProperties": false
    });

    PromptRequest::with_schema(prompt, ResponseFormat::json_schema("risk_assessment", schema))
}

/// Fan-out report: plain-text compliance summary of the whole conversation.
pub fn report_summary_prompt(transcript: &str) -> PromptRequest {
    let prompt = format!(
        "You are a compliance expert. Summarize the key points from this conversation about an AI feature for HR hiring and its potential impact.\n\nConversation:\n{transcript}"
    );
    PromptRequest::new(prompt)
}

/// Fan-out report: risk classification constrained to a machine-checkable
/// level plus justification.
pub fn risk_classification_prompt(transcript: &str) -> PromptRequest {
    let prompt = format!(
        "Analyze the risk level of this AI feature under the EU AI Act. Return JSON with 'risk_level' (high/medium/low) and 'justification'.\n\nConversation:\n{transcript}"
    );

    let schema = json!({
        "type": "object",
        "properties": {
            "risk_level": {
                "type": "string",
                "enum": ["high", "medium", "low"],
                "description": "Risk level of the AI feature under the EU AI Act"
            },
            "justification": {
                "type": "string",
                "description": "Brief justification for the assigned risk level"
            }
        },
        "required": ["risk_level", "justification"],
        "additionalProperties": false
    });

    PromptRequest::with_schema(prompt, ResponseFormat::json_schema("risk_classification", schema))
}
