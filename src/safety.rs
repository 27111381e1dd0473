use serde::Serialize;

use crate::{TripleStoreError, dataset::Dataset};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub version: u64,
    pub graphs: usize,
    pub triples: usize,
    pub index_errors: usize,
    pub storage_mismatches: usize,
    pub messages: Vec<String>,
}

impl IntegrityReport {
    pub fn has_issues(&self) -> bool {
        self.index_errors > 0 || self.storage_mismatches > 0
    }
}

/// Checks every committed graph: the three orderings must agree with each
/// other and with the recorded length, and a persistent backend must hold the
/// same number of triples per graph as memory.
pub fn check_integrity(dataset: &Dataset) -> Result<IntegrityReport, TripleStoreError> {
    let (snapshot, persisted) = dataset.persisted_counts()?;
    let mut report = IntegrityReport {
        version: snapshot.version(),
        graphs: snapshot.graph_count(),
        triples: snapshot.triple_count(),
        ..IntegrityReport::default()
    };

    for (name, index) in snapshot.graphs() {
        for problem in index.verify() {
            report.index_errors += 1;
            report.messages.push(format!("graph {name}: {problem}"));
        }
    }

    if let Some(persisted) = persisted {
        for (name, index) in snapshot.graphs() {
            let stored = persisted.get(name).copied().unwrap_or(0);
            if stored != index.len() {
                report.storage_mismatches += 1;
                report.messages.push(format!(
                    "graph {name}: {} triples in memory, {stored} stored",
                    index.len()
                ));
            }
        }
        for name in persisted.keys().filter(|name| !snapshot.contains(name)) {
            report.storage_mismatches += 1;
            report
                .messages
                .push(format!("graph {name}: stored but not loaded"));
        }
    }
    Ok(report)
}
