use anyhow::{anyhow, Context};
use std::sync::Arc;

use super::{
    detail_or,
    references::{default_corpus, ReferenceSnippet, ScoredReference},
    ContractRequest,
};
use crate::{embeddings::Embedder, tinyvector::Collection, types::ContractType};

/// At most this many references are returned.
pub const TOP_K: usize = 5;
/// References must score strictly above this cosine similarity.
pub const MIN_SCORE: f32 = 0.3;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    corpus: Vec<ReferenceSnippet>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_corpus(embedder, default_corpus())
    }

    pub fn with_corpus(embedder: Arc<dyn Embedder>, corpus: Vec<ReferenceSnippet>) -> Self {
        Self { embedder, corpus }
    }

    /// Ranks the snippets of the requested category against a query built
    /// from the request. No matching snippet is an empty result, not an error.
    pub async fn search(&self, request: &ContractRequest) -> anyhow::Result<Vec<ScoredReference>> {
        let candidates: Vec<&ReferenceSnippet> = self
            .corpus
            .iter()
            .filter(|s| s.category == request.contract_type)
            .collect();
        if candidates.is_empty() {
            tracing::debug!(contract_type = %request.contract_type, "No reference candidates");
            return Ok(Vec::new());
        }

        let query = build_query(request);
        tracing::debug!(%query, candidates = candidates.len(), "Searching references");

        let mut inputs = Vec::with_capacity(candidates.len() + 1);
        inputs.push(query);
        inputs.extend(candidates.iter().map(|s| s.embedding_text()));

        let mut vectors = self
            .embedder
            .embed(&inputs)
            .await
            .context("Failed to create reference embeddings")?;
        if vectors.len() != inputs.len() {
            return Err(anyhow!(
                "Expected {} embeddings, got {}",
                inputs.len(),
                vectors.len()
            ));
        }
        let query_vector = vectors.remove(0);

        let mut collection = Collection::new(query_vector.len());
        for (index, vector) in vectors.into_iter().enumerate() {
            collection
                .insert(index.to_string(), vector)
                .context("Failed to index reference embedding")?;
        }

        let mut references = Vec::new();
        for hit in collection
            .get_similarity(&query_vector, TOP_K)
            .context("Failed to rank references")?
        {
            if hit.score <= MIN_SCORE {
                continue;
            }
            let index: usize = hit.embedding.id.parse()?;
            references.push(ScoredReference {
                snippet: candidates[index].clone(),
                score: hit.score,
            });
        }
        tracing::debug!(found = references.len(), "Reference search completed");
        Ok(references)
    }
}

/// Natural-language search query for the request, shaped by contract type.
pub fn build_query(request: &ContractRequest) -> String {
    let d = &request.details;
    let jurisdiction = &request.jurisdiction;
    match request.contract_type {
        ContractType::Employment => format!(
            "Employment contract with position {}\nSalary: {}\nLocation: {}\nWorking hours: {}\nJurisdiction: {}",
            detail_or(d, "position"),
            detail_or(d, "salary"),
            detail_or(d, "location"),
            detail_or(d, "working_hours"),
            jurisdiction,
        ),
        ContractType::Nda => format!(
            "Non-disclosure agreement\nParties involved: {} and {}\nJurisdiction: {}\nConfidential information: {}",
            request.party1,
            request.party2,
            jurisdiction,
            detail_or(d, "confidential_info"),
        ),
        ContractType::Service => format!(
            "Service agreement for {}\nService provider: {}\nService recipient: {}\nJurisdiction: {}",
            detail_or(d, "service_type"),
            d.get("provider").map_or(request.party1.clone(), super::display_value),
            d.get("recipient").map_or(request.party2.clone(), super::display_value),
            jurisdiction,
        ),
        ContractType::Lease => format!(
            "Lease agreement for {}\nLandlord: {}\nTenant: {}\nDuration: {}\nJurisdiction: {}",
            detail_or(d, "property_type"),
            d.get("landlord").map_or(request.party1.clone(), super::display_value),
            d.get("tenant").map_or(request.party2.clone(), super::display_value),
            detail_or(d, "duration"),
            jurisdiction,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fakes::{request, FailingEmbedder, FixedEmbedder, KeywordEmbedder};

    #[tokio::test]
    async fn excludes_other_categories_even_when_identical() {
        // Every text embeds to the same vector, so all similarities are 1.0
        let retriever = Retriever::new(Arc::new(FixedEmbedder(vec![0.2, 0.4, 0.1])));
        let found = retriever.search(&request(ContractType::Lease)).await.unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.snippet.category == ContractType::Lease));
        assert!(found.iter().all(|r| (r.score - 1.0).abs() < 1e-5));
    }

    #[tokio::test]
    async fn returns_at_most_five_above_threshold_sorted() {
        let corpus: Vec<_> = (0..8)
            .map(|i| {
                ReferenceSnippet::new(
                    &format!("clause-{i}"),
                    "body",
                    "Act",
                    ContractType::Service,
                )
            })
            .collect();
        // Angles from the query axis grow with the clause number
        let embedder = KeywordEmbedder::new(vec![1.0, 0.0])
            .rule("clause-0", vec![1.0, 0.05])
            .rule("clause-1", vec![1.0, 0.3])
            .rule("clause-2", vec![1.0, 0.6])
            .rule("clause-3", vec![1.0, 1.0])
            .rule("clause-4", vec![1.0, 1.8])
            .rule("clause-5", vec![1.0, 2.8])
            .rule("clause-6", vec![0.1, 1.0])
            .rule("clause-7", vec![0.0, 1.0]);
        let retriever = Retriever::with_corpus(Arc::new(embedder), corpus);

        let found = retriever.search(&request(ContractType::Service)).await.unwrap();
        let titles: Vec<_> = found.iter().map(|r| r.snippet.title.as_str()).collect();

        assert_eq!(titles, vec!["clause-0", "clause-1", "clause-2", "clause-3", "clause-4"]);
        assert!(found.iter().all(|r| r.score > MIN_SCORE));
        assert!(found.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn drops_everything_below_threshold() {
        let embedder = KeywordEmbedder::new(vec![1.0, 0.0])
            .rule("Employment Agreement Basics", vec![0.0, 1.0])
            .rule("Workplace Rights", vec![0.2, 1.0]);
        let retriever = Retriever::new(Arc::new(embedder));

        let found = retriever
            .search(&request(ContractType::Employment))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn empty_category_is_not_an_error() {
        let retriever = Retriever::with_corpus(Arc::new(FailingEmbedder), Vec::new());
        let found = retriever.search(&request(ContractType::Nda)).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_is_reported() {
        let retriever = Retriever::new(Arc::new(FailingEmbedder));
        assert!(retriever.search(&request(ContractType::Nda)).await.is_err());
    }

    #[test]
    fn query_uses_type_specific_template() {
        let mut req = request(ContractType::Employment);
        req.details
            .insert("position".into(), serde_json::json!("Engineer"));
        req.details.insert("salary".into(), serde_json::json!(120000));
        let query = build_query(&req);
        assert!(query.starts_with("Employment contract with position Engineer"));
        assert!(query.contains("Salary: 120000"));
        assert!(query.contains("Location: not specified"));
        assert!(query.ends_with("Jurisdiction: Delaware"));

        let lease = build_query(&request(ContractType::Lease));
        assert!(lease.contains("Landlord: Acme Corp"));
        assert!(lease.contains("Tenant: Jane Doe"));
    }
}
