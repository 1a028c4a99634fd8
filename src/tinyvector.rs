use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Embedding already exists")]
    UniqueViolation,

    #[error("The dimension of the vector doesn't match the dimension of the collection")]
    DimensionMismatch,
}

#[derive(Debug, Clone)]
pub struct SimilarityResult {
    pub score: f32,
    pub embedding: Embedding,
}

/// An in-memory set of unit vectors ranked by cosine similarity.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Dimension of the vectors in the collection
    pub dimension: usize,
    embeddings: Vec<Embedding>,
}

impl Collection {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            embeddings: Vec::new(),
        }
    }

    pub fn insert(&mut self, id: String, vector: Vec<f32>) -> Result<(), Error> {
        if self.embeddings.iter().any(|e| e.id == id) {
            return Err(Error::UniqueViolation);
        }

        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch);
        }

        // Normalized on insertion so scoring is a plain dot product
        let vector = normalize(&vector);
        self.embeddings.push(Embedding { id, vector });

        Ok(())
    }

    /// Returns the `k` most similar embeddings, best first.
    pub fn get_similarity(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityResult>, Error> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch);
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = normalize(query);

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (index, embedding) in self.embeddings.iter().enumerate() {
            let score_index = ScoreIndex {
                score: dot_product(&embedding.vector, &query),
                index,
            };
            if heap.len() < k || heap.peek().map_or(true, |worst| score_index < *worst) {
                heap.push(score_index);

                if heap.len() > k {
                    heap.pop();
                }
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|ScoreIndex { score, index }| SimilarityResult {
                score,
                embedding: self.embeddings[index].clone(),
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct Embedding {
    pub id: String,
    vector: Vec<f32>,
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).fold(0.0, |acc, (x, y)| acc + x * y)
}

pub fn normalize(vec: &[f32]) -> Vec<f32> {
    let magnitude = (vec.iter().fold(0.0, |acc, &val| val.mul_add(val, acc))).sqrt();

    if magnitude > std::f32::EPSILON {
        vec.iter().map(|&val| val / magnitude).collect()
    } else {
        vec.to_vec()
    }
}

struct ScoreIndex {
    score: f32,
    index: usize,
}

impl PartialEq for ScoreIndex {
    fn eq(&self, other: &Self) -> bool {
        self.score.eq(&other.score)
    }
}

impl Eq for ScoreIndex {}

impl PartialOrd for ScoreIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the heap is a min-heap; ties keep insertion order
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.index.cmp(&other.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> Collection {
        let mut c = Collection::new(2);
        c.insert("east".into(), vec![1.0, 0.0]).unwrap();
        c.insert("north".into(), vec![0.0, 3.0]).unwrap();
        c.insert("north-east".into(), vec![2.0, 2.0]).unwrap();
        c.insert("west".into(), vec![-1.0, 0.0]).unwrap();
        c
    }

    #[test]
    fn ranks_by_cosine_descending() {
        let results = collection().get_similarity(&[1.0, 0.1], 4).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.embedding.id.as_str()).collect();
        assert_eq!(ids, vec!["east", "north-east", "north", "west"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!((results[3].score + 0.995).abs() < 0.01);
    }

    #[test]
    fn truncates_to_k() {
        let results = collection().get_similarity(&[0.0, 1.0], 2).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.embedding.id.as_str()).collect();
        assert_eq!(ids, vec!["north", "north-east"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn query_magnitude_does_not_change_scores() {
        let small = collection().get_similarity(&[1.0, 1.0], 1).unwrap();
        let large = collection().get_similarity(&[50.0, 50.0], 1).unwrap();
        assert!((small[0].score - large[0].score).abs() < 1e-6);
        assert!((small[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_wrong_dimension_and_duplicates() {
        let mut c = collection();
        assert!(matches!(
            c.insert("z".into(), vec![1.0]),
            Err(Error::DimensionMismatch)
        ));
        assert!(matches!(
            c.insert("east".into(), vec![1.0, 1.0]),
            Err(Error::UniqueViolation)
        ));
        assert!(matches!(
            c.get_similarity(&[1.0, 0.0, 0.0], 1),
            Err(Error::DimensionMismatch)
        ));
    }
}
