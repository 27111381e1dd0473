//! Per-graph triple storage.
//!
//! Every triple is kept in three nested orderings (SPO, POS, OSP). For any
//! pattern the bound positions form a prefix of one of them, so a scan only
//! walks the triples that can match:
//!
//! | bound      | ordering | prefix |
//! |------------|----------|--------|
//! | s p o      | SPO      | s p o  |
//! | s p -      | SPO      | s p    |
//! | s - o      | OSP      | o s    |
//! | - p o      | POS      | p o    |
//! | s - -      | SPO      | s      |
//! | - p -      | POS      | p      |
//! | - - o      | OSP      | o      |
//! | - - -      | SPO      | (all)  |
//!
//! Iteration follows `BTreeMap` key order, so results are deterministic for a
//! fixed index state.

use std::collections::{BTreeMap, BTreeSet};

use crate::triple::{Identifier, Pattern, Triple};

type Level = BTreeMap<Identifier, BTreeMap<Identifier, BTreeSet<Identifier>>>;
type Entry<'a> = (&'a Identifier, &'a Identifier, &'a Identifier);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexOrder {
    Spo,
    Pos,
    Osp,
}

impl IndexOrder {
    pub fn all() -> &'static [IndexOrder] {
        &[IndexOrder::Spo, IndexOrder::Pos, IndexOrder::Osp]
    }

    /// Picks the ordering whose prefix covers every bound position.
    pub fn for_pattern(pattern: &Pattern) -> IndexOrder {
        match (
            pattern.subject.is_some(),
            pattern.predicate.is_some(),
            pattern.object.is_some(),
        ) {
            (true, false, true) | (false, false, true) => IndexOrder::Osp,
            (false, true, _) => IndexOrder::Pos,
            _ => IndexOrder::Spo,
        }
    }

    fn key<'a>(self, triple: &'a Triple) -> Entry<'a> {
        let (s, p, o) = (triple.subject(), triple.predicate(), triple.object());
        match self {
            IndexOrder::Spo => (s, p, o),
            IndexOrder::Pos => (p, o, s),
            IndexOrder::Osp => (o, s, p),
        }
    }

    fn prefix(
        self,
        pattern: &Pattern,
    ) -> (
        Option<&Identifier>,
        Option<&Identifier>,
        Option<&Identifier>,
    ) {
        let (s, p, o) = (
            pattern.subject.as_ref(),
            pattern.predicate.as_ref(),
            pattern.object.as_ref(),
        );
        match self {
            IndexOrder::Spo => (s, p, o),
            IndexOrder::Pos => (p, o, s),
            IndexOrder::Osp => (o, s, p),
        }
    }

    fn rebuild(self, (a, b, c): Entry<'_>) -> Triple {
        match self {
            IndexOrder::Spo => Triple::new(a.clone(), b.clone(), c.clone()),
            IndexOrder::Pos => Triple::new(c.clone(), a.clone(), b.clone()),
            IndexOrder::Osp => Triple::new(b.clone(), c.clone(), a.clone()),
        }
    }
}

/// The set of triples of one graph.
#[derive(Clone, Debug, Default)]
pub struct TripleIndex {
    spo: Level,
    pos: Level,
    osp: Level,
    len: usize,
}

impl TripleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        let (s, p, o) = IndexOrder::Spo.key(triple);
        self.spo
            .get(s)
            .and_then(|by_predicate| by_predicate.get(p))
            .is_some_and(|objects| objects.contains(o))
    }

    /// Inserts `triple`; returns `false` if it was already present.
    pub fn add(&mut self, triple: &Triple) -> bool {
        if !insert_entry(&mut self.spo, IndexOrder::Spo.key(triple)) {
            return false;
        }
        insert_entry(&mut self.pos, IndexOrder::Pos.key(triple));
        insert_entry(&mut self.osp, IndexOrder::Osp.key(triple));
        self.len += 1;
        true
    }

    /// Deletes `triple`; returns `false` if it was absent.
    pub fn remove(&mut self, triple: &Triple) -> bool {
        if !remove_entry(&mut self.spo, IndexOrder::Spo.key(triple)) {
            return false;
        }
        remove_entry(&mut self.pos, IndexOrder::Pos.key(triple));
        remove_entry(&mut self.osp, IndexOrder::Osp.key(triple));
        self.len -= 1;
        true
    }

    /// Lazily yields every triple matching `pattern`.
    pub fn scan(&self, pattern: &Pattern) -> Scan<'_> {
        let order = IndexOrder::for_pattern(pattern);
        let (first, second, third) = order.prefix(pattern);
        let entries = lookup(self.level(order), first, second, third);
        Scan {
            order,
            entries: Box::new(entries.map(move |entry| order.rebuild(entry))),
        }
    }

    pub fn iter(&self) -> Scan<'_> {
        self.scan(&Pattern::any())
    }

    /// Cross-checks the three orderings against each other and `len`.
    pub fn verify(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for &order in IndexOrder::all() {
            let count: usize = self
                .level(order)
                .values()
                .flat_map(|seconds| seconds.values())
                .map(BTreeSet::len)
                .sum();
            if count != self.len {
                problems.push(format!(
                    "{order:?} holds {count} entries, expected {}",
                    self.len
                ));
            }
        }
        for triple in self.iter() {
            for &order in &[IndexOrder::Pos, IndexOrder::Osp] {
                if !contains_entry(self.level(order), order.key(&triple)) {
                    problems.push(format!("{triple:?} missing from {order:?}"));
                }
            }
        }
        problems
    }

    fn level(&self, order: IndexOrder) -> &Level {
        match order {
            IndexOrder::Spo => &self.spo,
            IndexOrder::Pos => &self.pos,
            IndexOrder::Osp => &self.osp,
        }
    }
}

impl FromIterator<Triple> for TripleIndex {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut index = TripleIndex::new();
        for triple in iter {
            index.add(&triple);
        }
        index
    }
}

/// Iterator returned by [`TripleIndex::scan`].
pub struct Scan<'a> {
    order: IndexOrder,
    entries: Box<dyn Iterator<Item = Triple> + 'a>,
}

impl Scan<'_> {
    /// The ordering the scan walks.
    pub fn order(&self) -> IndexOrder {
        self.order
    }
}

impl Iterator for Scan<'_> {
    type Item = Triple;

    fn next(&mut self) -> Option<Triple> {
        self.entries.next()
    }
}

fn insert_entry(level: &mut Level, (a, b, c): Entry<'_>) -> bool {
    level
        .entry(a.clone())
        .or_default()
        .entry(b.clone())
        .or_default()
        .insert(c.clone())
}

fn remove_entry(level: &mut Level, (a, b, c): Entry<'_>) -> bool {
    let Some(seconds) = level.get_mut(a) else {
        return false;
    };
    let Some(thirds) = seconds.get_mut(b) else {
        return false;
    };
    if !thirds.remove(c) {
        return false;
    }
    if thirds.is_empty() {
        seconds.remove(b);
    }
    if seconds.is_empty() {
        level.remove(a);
    }
    true
}

fn contains_entry(level: &Level, (a, b, c): Entry<'_>) -> bool {
    level
        .get(a)
        .and_then(|seconds| seconds.get(b))
        .is_some_and(|thirds| thirds.contains(c))
}

fn lookup<'a>(
    level: &'a Level,
    first: Option<&Identifier>,
    second: Option<&Identifier>,
    third: Option<&Identifier>,
) -> Box<dyn Iterator<Item = Entry<'a>> + 'a> {
    match (first, second, third) {
        (None, _, _) => Box::new(level.iter().flat_map(|(a, seconds)| expand(a, seconds))),
        (Some(first), None, _) => Box::new(
            level
                .get_key_value(first)
                .into_iter()
                .flat_map(|(a, seconds)| expand(a, seconds)),
        ),
        (Some(first), Some(second), None) => Box::new(
            level
                .get_key_value(first)
                .and_then(|(a, seconds)| {
                    seconds
                        .get_key_value(second)
                        .map(|(b, thirds)| (a, b, thirds))
                })
                .into_iter()
                .flat_map(|(a, b, thirds)| thirds.iter().map(move |c| (a, b, c))),
        ),
        (Some(first), Some(second), Some(third)) => Box::new(
            level
                .get_key_value(first)
                .and_then(|(a, seconds)| {
                    seconds
                        .get_key_value(second)
                        .map(|(b, thirds)| (a, b, thirds))
                })
                .and_then(|(a, b, thirds)| thirds.get(third).map(|c| (a, b, c)))
                .into_iter(),
        ),
    }
}

fn expand<'a>(
    first: &'a Identifier,
    seconds: &'a BTreeMap<Identifier, BTreeSet<Identifier>>,
) -> impl Iterator<Item = Entry<'a>> + 'a {
    seconds
        .iter()
        .flat_map(move |(b, thirds)| thirds.iter().map(move |c| (first, b, c)))
}
