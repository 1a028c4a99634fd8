use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

use super::{display_value, references::ScoredReference, ContractRequest};
use crate::{
    openai::{ChatTurn, Completion, CompletionRequest},
    types::ContractType,
};

pub const DRAFT_TEMPERATURE: f32 = 0.7;
pub const DRAFT_MAX_TOKENS: u16 = 2500;

const SYSTEM_PROMPT: &str = "You are a legal expert specializing in contract law.";

const EMPLOYMENT_TEMPLATE: &str = "1. POSITION AND DUTIES
2. COMPENSATION AND BENEFITS
3. WORKING HOURS AND LOCATION
4. PROBATION AND CONFIRMATION
5. LEAVE POLICY
6. STATUTORY BENEFITS
7. TERMINATION
8. CONFIDENTIALITY
9. INTELLECTUAL PROPERTY
10. DISPUTE RESOLUTION";

const NDA_TEMPLATE: &str = "1. PARTIES AND PURPOSE
2. DEFINITION OF CONFIDENTIAL INFORMATION
3. OBLIGATIONS OF RECEIVING PARTY
4. EXCLUSIONS FROM CONFIDENTIAL INFORMATION
5. TERM AND TERMINATION
6. RETURN OF CONFIDENTIAL INFORMATION
7. REMEDIES
8. GENERAL PROVISIONS";

const SERVICE_TEMPLATE: &str = "1. SCOPE OF SERVICES
2. PAYMENT TERMS
3. SERVICE STANDARDS
4. TERM AND TERMINATION
5. INTELLECTUAL PROPERTY
6. CONFIDENTIALITY
7. WARRANTIES AND REPRESENTATIONS
8. LIMITATION OF LIABILITY
9. GENERAL PROVISIONS";

const LEASE_TEMPLATE: &str = "1. PROPERTY DETAILS
2. TERM AND RENT
3. SECURITY DEPOSIT
4. UTILITIES AND MAINTENANCE
5. USE OF PROPERTY
6. TENANT OBLIGATIONS
7. LANDLORD OBLIGATIONS
8. TERMINATION
9. GENERAL PROVISIONS";

/// Signature-block and formatting instructions attached to every request.
pub const STANDARD_INSTRUCTIONS: &str = "Include proper signature blocks for each party: signature line, printed name, title or position, date, company seal placement, beneficiary details, and witness signature and details.
Add a notary section if required by the jurisdiction.
Include all relevant legal citations and references.
Add page numbers in 'Page X of Y' format and include version control.
Use proper legal margins and formatting.";

pub const REFERENCES_HEADING: &str = "LEGAL REFERENCES AND SOURCES";

pub fn default_templates() -> HashMap<ContractType, &'static str> {
    HashMap::from([
        (ContractType::Employment, EMPLOYMENT_TEMPLATE),
        (ContractType::Nda, NDA_TEMPLATE),
        (ContractType::Service, SERVICE_TEMPLATE),
        (ContractType::Lease, LEASE_TEMPLATE),
    ])
}

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("No template found for contract type: {0}")]
    MissingTemplate(ContractType),

    #[error("Draft generation failed: {0}")]
    Generation(String),
}

/// Which sections of the draft cite reference `marker` (`[Ref {marker}]`).
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceUsage {
    pub marker: usize,
    pub source: String,
    pub content: String,
    pub sections: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Draft {
    pub text: String,
    pub references_used: Vec<ReferenceUsage>,
}

pub struct Drafter {
    llm: Arc<dyn Completion>,
    templates: HashMap<ContractType, &'static str>,
}

impl Drafter {
    pub fn new(llm: Arc<dyn Completion>) -> Self {
        Self::with_templates(llm, default_templates())
    }

    pub fn with_templates(
        llm: Arc<dyn Completion>,
        templates: HashMap<ContractType, &'static str>,
    ) -> Self {
        Self { llm, templates }
    }

    pub async fn create_draft(
        &self,
        request: &ContractRequest,
        instructions: &str,
        references: &[ScoredReference],
    ) -> Result<Draft, DraftError> {
        let template = self
            .templates
            .get(&request.contract_type)
            .ok_or(DraftError::MissingTemplate(request.contract_type))?;

        for (i, r) in references.iter().enumerate() {
            tracing::debug!(
                marker = i + 1,
                source = %r.snippet.source,
                score = r.score,
                "Drafting with reference"
            );
        }

        let prompt = build_prompt(request, template, instructions, references);
        let completion = CompletionRequest {
            turns: vec![ChatTurn::system(SYSTEM_PROMPT), ChatTurn::user(prompt)],
            temperature: DRAFT_TEMPERATURE,
            max_tokens: DRAFT_MAX_TOKENS,
        };
        let raw = self
            .llm
            .complete(completion)
            .await
            .map_err(|err| DraftError::Generation(format!("{err:#}")))?;
        let raw = raw.trim();

        let references_used = track_references(raw, references);
        for usage in &references_used {
            tracing::debug!(
                source = %usage.source,
                sections = ?usage.sections,
                "Reference cited in draft"
            );
        }

        let mut text = raw.to_string();
        if !references_used.is_empty() {
            text.push_str("\n\n");
            text.push_str(&references_block(&references_used));
        }
        Ok(Draft {
            text,
            references_used,
        })
    }
}

pub fn build_prompt(
    request: &ContractRequest,
    template: &str,
    instructions: &str,
    references: &[ScoredReference],
) -> String {
    let legal_context = if references.is_empty() {
        "No reference material was retrieved.".to_string()
    } else {
        references
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "Reference {}:\nSource: {}\nContent: {}\n{}",
                    i + 1,
                    r.snippet.source,
                    r.snippet.body,
                    "-".repeat(30)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are drafting a {contract_type} contract governed by the laws of {jurisdiction}.

REQUIREMENTS:
{requirements}

DRAFTING INSTRUCTIONS:
{instructions}

REQUIRED SECTIONS:
{template}

LEGAL REFERENCES:
{legal_context}

FORMAT:
- Center and bold the contract type as the main heading
- Number every section and subsection, following the required sections above
- Separate sections with a blank line and start each section with its numbered heading
- Mark each use of a legal reference inline as [Ref X]
- After each major section add \"[References used: Ref X, Ref Y]\" where references apply
- Use clear, professional language that protects both parties' interests
- Include all statutory requirements of the governing jurisdiction

Present only the final contract text.",
        contract_type = request.contract_type,
        jurisdiction = request.jurisdiction,
        requirements = format_requirements(request),
    )
}

pub fn format_requirements(request: &ContractRequest) -> String {
    let mut lines = vec![
        "BASIC INFORMATION:".to_string(),
        format!("Contract Type: {}", request.contract_type),
        format!("First Party: {}", request.party1),
        format!("Second Party: {}", request.party2),
        format!("Jurisdiction: {}", request.jurisdiction),
    ];
    if !request.additional_jurisdictions.is_empty() {
        lines.push(format!(
            "Additional Jurisdictions: {}",
            request.additional_jurisdictions.join(", ")
        ));
    }

    if !request.details.is_empty() {
        lines.push("\nCONTRACT DETAILS:".to_string());
        for (key, value) in &request.details {
            match value {
                Value::Object(nested) => {
                    lines.push(format!("\n{}:", title_case(key)));
                    for (sub_key, sub_value) in nested {
                        lines.push(format!(
                            "  - {}: {}",
                            title_case(sub_key),
                            display_value(sub_value)
                        ));
                    }
                }
                other => lines.push(format!("- {}: {}", title_case(key), display_value(other))),
            }
        }
    }

    if !request.statutory_compliance.is_empty() {
        lines.push("\nSTATUTORY COMPLIANCE:".to_string());
        for (key, value) in &request.statutory_compliance {
            lines.push(format!("- {}: {}", key.to_uppercase(), display_value(value)));
        }
    }

    if let Some(info) = request.additional_info.as_deref().filter(|i| !i.trim().is_empty()) {
        lines.push("\nADDITIONAL INFORMATION:".to_string());
        lines.push(info.trim().to_string());
    }

    lines.join("\n")
}

/// `notice_period` -> `Notice Period`.
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Finds, for every reference, the titles of the blank-line separated
/// sections that carry its `[Ref N]` marker. Unused references are omitted.
pub fn track_references(draft: &str, references: &[ScoredReference]) -> Vec<ReferenceUsage> {
    let sections: Vec<&str> = draft.split("\n\n").collect();
    let mut usages = Vec::new();

    for (i, reference) in references.iter().enumerate() {
        let marker = i + 1;
        let needle = format!("[Ref {marker}]");
        let mut found: Vec<String> = Vec::new();

        for section in sections.iter().filter(|s| s.contains(&needle)) {
            let title = section.lines().next().unwrap_or_default().trim();
            if !title.is_empty() && !found.iter().any(|t| t == title) {
                found.push(title.to_string());
            }
        }

        if !found.is_empty() {
            usages.push(ReferenceUsage {
                marker,
                source: reference.snippet.source.clone(),
                content: reference.snippet.body.clone(),
                sections: found,
            });
        }
    }
    usages
}

pub fn references_block(usages: &[ReferenceUsage]) -> String {
    let mut block = format!(
        "{REFERENCES_HEADING}\n{}\n\nThe following legal references were used in drafting this contract:",
        "=".repeat(50)
    );
    for usage in usages {
        block.push_str(&format!(
            "\n\nReference {}:\nSource: {}\nUsed in sections:\n",
            usage.marker, usage.source
        ));
        for section in &usage.sections {
            block.push_str(&format!("  • {section}\n"));
        }
        block.push_str(&format!("Content: {}", usage.content));
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{
        fakes::{request, ScriptedCompletion},
        references::ReferenceSnippet,
    };

    fn refs() -> Vec<ScoredReference> {
        ["Employment Act", "Labor Rights Act", "Unused Act"]
            .iter()
            .map(|source| ScoredReference {
                snippet: ReferenceSnippet::new(
                    "title",
                    &format!("{source} text"),
                    source,
                    ContractType::Employment,
                ),
                score: 0.9,
            })
            .collect()
    }

    #[test]
    fn tracks_sections_per_marker() {
        let draft = "1. POSITION\nEngineer [Ref 1]\n\n2. PAY\nMonthly [Ref 1] [Ref 2]\n\n2. PAY\nagain [Ref 2]\n\n3. MISC\nnothing";
        let usages = track_references(draft, &refs());

        assert_eq!(usages.len(), 2);
        assert_eq!(usages[0].marker, 1);
        assert_eq!(usages[0].sections, vec!["1. POSITION", "2. PAY"]);
        assert_eq!(usages[1].source, "Labor Rights Act");
        assert_eq!(usages[1].sections, vec!["2. PAY"]);
    }

    #[test]
    fn references_block_lists_usage() {
        let block = references_block(&[ReferenceUsage {
            marker: 2,
            source: "Labor Rights Act".into(),
            content: "Fair pay.".into(),
            sections: vec!["2. PAY".into(), "7. TERMINATION".into()],
        }]);
        insta::assert_snapshot!(block, @r###"
        LEGAL REFERENCES AND SOURCES
        ==================================================

        The following legal references were used in drafting this contract:

        Reference 2:
        Source: Labor Rights Act
        Used in sections:
          • 2. PAY
          • 7. TERMINATION
        Content: Fair pay.
        "###);
    }

    #[test]
    fn requirements_flatten_nested_details() {
        let mut req = request(ContractType::Employment);
        req.details = serde_json::json!({
            "notice_period": 30,
            "benefits": { "health_insurance": "full family" }
        })
        .as_object()
        .cloned()
        .unwrap();
        req.statutory_compliance.insert("pf".into(), serde_json::json!("enrolled"));
        req.additional_info = Some("Remote first.".into());

        let formatted = format_requirements(&req);
        assert!(formatted.contains("First Party: Acme Corp"));
        assert!(formatted.contains("- Notice Period: 30"));
        assert!(formatted.contains("\nBenefits:\n  - Health Insurance: full family"));
        assert!(formatted.contains("- PF: enrolled"));
        assert!(formatted.ends_with("ADDITIONAL INFORMATION:\nRemote first."));
    }

    #[tokio::test]
    async fn draft_sends_prompt_and_appends_references() {
        let llm = Arc::new(ScriptedCompletion::replying(
            "  EMPLOYMENT AGREEMENT\n\n1. POSITION AND DUTIES\nThe employee is an engineer [Ref 1].  ",
        ));
        let drafter = Drafter::new(llm.clone());
        let req = request(ContractType::Employment);

        let draft = drafter
            .create_draft(&req, STANDARD_INSTRUCTIONS, &refs())
            .await
            .unwrap();

        assert!(draft.text.starts_with("EMPLOYMENT AGREEMENT\n\n1. POSITION AND DUTIES"));
        assert!(draft.text.contains(REFERENCES_HEADING));
        assert!(draft.text.contains("  • 1. POSITION AND DUTIES"));
        assert_eq!(draft.references_used.len(), 1);

        let sent = llm.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].temperature, DRAFT_TEMPERATURE);
        assert_eq!(sent[0].max_tokens, DRAFT_MAX_TOKENS);
        let prompt = &sent[0].turns[1].content;
        assert!(prompt.contains("governed by the laws of Delaware"));
        assert!(prompt.contains("10. DISPUTE RESOLUTION"));
        assert!(prompt.contains("Reference 3:\nSource: Unused Act"));
        assert!(prompt.contains("[Ref X]"));
    }

    #[tokio::test]
    async fn draft_without_citations_has_no_references_block() {
        let llm = Arc::new(ScriptedCompletion::replying("LEASE\n\n1. PROPERTY DETAILS\nFlat 4"));
        let draft = Drafter::new(llm)
            .create_draft(&request(ContractType::Lease), STANDARD_INSTRUCTIONS, &refs())
            .await
            .unwrap();
        assert_eq!(draft.text, "LEASE\n\n1. PROPERTY DETAILS\nFlat 4");
        assert!(draft.references_used.is_empty());
    }

    #[tokio::test]
    async fn missing_template_is_a_configuration_error() {
        let llm = Arc::new(ScriptedCompletion::replying("unused"));
        let mut templates = default_templates();
        templates.remove(&ContractType::Lease);
        let drafter = Drafter::with_templates(llm.clone(), templates);

        let err = drafter
            .create_draft(&request(ContractType::Lease), STANDARD_INSTRUCTIONS, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DraftError::MissingTemplate(ContractType::Lease)));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_is_reported() {
        let llm = Arc::new(ScriptedCompletion::failing("quota exceeded"));
        let err = Drafter::new(llm)
            .create_draft(&request(ContractType::Nda), STANDARD_INSTRUCTIONS, &[])
            .await
            .unwrap_err();
        match err {
            DraftError::Generation(message) => assert!(message.contains("quota exceeded")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
