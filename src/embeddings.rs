use async_trait::async_trait;

/// Turns text into fixed-length vectors. One output vector per input, in
/// input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
