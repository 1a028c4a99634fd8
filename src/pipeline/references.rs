use serde::Serialize;

use crate::types::ContractType;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceSnippet {
    pub title: String,
    pub body: String,
    pub source: String,
    pub category: ContractType,
}

impl ReferenceSnippet {
    pub fn new(title: &str, body: &str, source: &str, category: ContractType) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            source: source.to_string(),
            category,
        }
    }

    /// Text submitted to the embedding model for this snippet.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

/// A retrieved snippet with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredReference {
    pub snippet: ReferenceSnippet,
    pub score: f32,
}

const CORPUS: &[(&str, &str, &str, ContractType)] = &[
    (
        "Employment Agreement Basics",
        "Employment agreements must specify position, compensation, working hours, and duties. Clear termination clauses and notice periods are required.",
        "Employment Act",
        ContractType::Employment,
    ),
    (
        "Workplace Rights and Obligations",
        "Employees have the right to safe working conditions, fair compensation, and protection from discrimination. Employers must provide statutory benefits.",
        "Labor Rights Act",
        ContractType::Employment,
    ),
    (
        "Confidentiality Requirements",
        "NDAs must clearly define confidential information, specify duration of confidentiality, and outline permitted uses of information.",
        "Trade Secrets Protection Act",
        ContractType::Nda,
    ),
    (
        "NDA Enforcement Guidelines",
        "Non-disclosure agreements must be reasonable in scope and duration. Overly restrictive NDAs may be unenforceable.",
        "Contract Law Handbook",
        ContractType::Nda,
    ),
    (
        "Service Contract Requirements",
        "Service agreements must specify scope of services, payment terms, delivery timeline, and quality standards.",
        "Contract Law",
        ContractType::Service,
    ),
    (
        "Service Provider Obligations",
        "Service providers must deliver services professionally, maintain required licenses, and carry appropriate insurance.",
        "Professional Services Act",
        ContractType::Service,
    ),
    (
        "Residential Lease Requirements",
        "Lease agreements must specify rent amount, payment schedule, security deposit terms, and maintenance responsibilities.",
        "Property Law",
        ContractType::Lease,
    ),
    (
        "Tenant Rights and Obligations",
        "Tenants have rights to habitable premises and proper notice for entry. Maintenance and use restrictions must be clearly stated.",
        "Residential Tenancy Act",
        ContractType::Lease,
    ),
];

/// The built-in reference corpus, two snippets per contract type.
pub fn default_corpus() -> Vec<ReferenceSnippet> {
    CORPUS
        .iter()
        .map(|(title, body, source, category)| {
            ReferenceSnippet::new(title, body, source, *category)
        })
        .collect()
}
