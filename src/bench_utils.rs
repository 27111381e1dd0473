use ahash::AHashSet;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::triple::{Pattern, Triple};

/// Synthetic graph used by the benches.
#[derive(Clone, Debug)]
pub struct TripleDataset {
    pub triples: Vec<Triple>,
    /// Distinct subjects across `triples`.
    pub subjects: usize,
    pub predicates: usize,
}

impl TripleDataset {
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Patterns with one, two and three positions bound, taken from the data
    /// so every pattern has at least one match.
    pub fn sample_patterns(&self, count: usize, seed: u64) -> Vec<Pattern> {
        if self.triples.is_empty() {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|i| {
                let triple = &self.triples[rng.gen_range(0..self.triples.len())];
                match i % 4 {
                    0 => Pattern::any().subject(triple.subject().clone()),
                    1 => Pattern::any().predicate(triple.predicate().clone()),
                    2 => Pattern::any()
                        .predicate(triple.predicate().clone())
                        .object(triple.object().clone()),
                    _ => Pattern::from(triple),
                }
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TripleShape {
    /// Subjects, predicates and objects drawn uniformly.
    Uniform,
    /// One hub subject linked to every other node.
    Star,
    /// `node{i} next node{i+1}`.
    Chain,
}

pub fn generate_triples(
    shape: TripleShape,
    count: usize,
    predicates: usize,
    seed: u64,
) -> TripleDataset {
    assert!(predicates > 0, "predicates must be positive");
    let triples = match shape {
        TripleShape::Uniform => generate_uniform(count, predicates, seed),
        TripleShape::Star => (0..count)
            .map(|i| Triple::new(node(0), predicate(i % predicates), node(i + 1)))
            .collect(),
        TripleShape::Chain => (0..count)
            .map(|i| Triple::new(node(i), predicate(i % predicates), node(i + 1)))
            .collect(),
    };
    let subjects = triples
        .iter()
        .map(Triple::subject)
        .collect::<AHashSet<_>>()
        .len();
    TripleDataset {
        triples,
        subjects,
        predicates,
    }
}

fn generate_uniform(count: usize, predicates: usize, seed: u64) -> Vec<Triple> {
    let mut rng = StdRng::seed_from_u64(seed);
    let nodes = (count / 4).max(2);
    (0..count)
        .map(|_| {
            Triple::new(
                node(rng.gen_range(0..nodes)),
                predicate(rng.gen_range(0..predicates)),
                node(rng.gen_range(0..nodes)),
            )
        })
        .collect()
}

fn node(i: usize) -> String {
    format!("http://example.org/node{i}")
}

fn predicate(i: usize) -> String {
    format!("http://example.org/p{i}")
}
