//! Core RDF value types: identifiers, triples and query patterns.

use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::errors::TripleStoreError;

/// Opaque RDF term: an IRI, a blank node label or a literal lexical form.
///
/// Equality is exact string match. Cloning is a reference-count bump, so
/// identifiers handed out by the [`crate::intern::Interner`] share storage.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(Arc<str>);

impl Identifier {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub(crate) fn shares_storage(&self, other: &Identifier) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True while some handle besides this one points at the same string.
    pub(crate) fn is_shared(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&String> for Identifier {
    fn from(value: &String) -> Self {
        Self(Arc::from(value.as_str()))
    }
}

impl From<Arc<str>> for Identifier {
    fn from(value: Arc<str>) -> Self {
        Self(value)
    }
}

/// An immutable (subject, predicate, object) statement.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    subject: Identifier,
    predicate: Identifier,
    object: Identifier,
}

impl Triple {
    pub fn new(
        subject: impl Into<Identifier>,
        predicate: impl Into<Identifier>,
        object: impl Into<Identifier>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    pub fn subject(&self) -> &Identifier {
        &self.subject
    }

    pub fn predicate(&self) -> &Identifier {
        &self.predicate
    }

    pub fn object(&self) -> &Identifier {
        &self.object
    }

    /// Builds a triple from a pattern whose three positions are all bound.
    pub fn from_pattern(pattern: &Pattern) -> Result<Self, TripleStoreError> {
        match (&pattern.subject, &pattern.predicate, &pattern.object) {
            (Some(s), Some(p), Some(o)) => Ok(Self::new(s.clone(), p.clone(), o.clone())),
            _ => Err(TripleStoreError::invalid_triple(format!(
                "pattern {pattern} has wildcard positions"
            ))),
        }
    }
}

impl fmt::Debug for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?} {:?} {:?})", self.subject, self.predicate, self.object)
    }
}

/// Rejects triples with a blank position. Runs before any mutation.
pub fn validate_triple(triple: &Triple) -> Result<(), TripleStoreError> {
    if triple.subject.is_blank() {
        return Err(TripleStoreError::invalid_triple("subject must be set"));
    }
    if triple.predicate.is_blank() {
        return Err(TripleStoreError::invalid_triple("predicate must be set"));
    }
    if triple.object.is_blank() {
        return Err(TripleStoreError::invalid_triple("object must be set"));
    }
    Ok(())
}

pub fn validate_graph_name(name: &str) -> Result<(), TripleStoreError> {
    if name.trim().is_empty() {
        return Err(TripleStoreError::invalid_input("graph name must be set"));
    }
    Ok(())
}

/// A triple template. `None` positions match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pattern {
    pub subject: Option<Identifier>,
    pub predicate: Option<Identifier>,
    pub object: Option<Identifier>,
}

impl Pattern {
    /// The fully-wildcard pattern.
    pub fn any() -> Self {
        Self::default()
    }

    /// Builds a pattern from optional positions, `None` meaning wildcard.
    pub fn from_parts(subject: Option<&str>, predicate: Option<&str>, object: Option<&str>) -> Self {
        Self {
            subject: subject.map(Identifier::from),
            predicate: predicate.map(Identifier::from),
            object: object.map(Identifier::from),
        }
    }

    pub fn subject(mut self, subject: impl Into<Identifier>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn predicate(mut self, predicate: impl Into<Identifier>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn object(mut self, object: impl Into<Identifier>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Number of concrete positions.
    pub fn bound_positions(&self) -> usize {
        [&self.subject, &self.predicate, &self.object]
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    pub fn is_wildcard(&self) -> bool {
        self.bound_positions() == 0
    }

    pub fn matches(&self, triple: &Triple) -> bool {
        fn slot(bound: &Option<Identifier>, value: &Identifier) -> bool {
            bound.as_ref().is_none_or(|b| b == value)
        }
        slot(&self.subject, &triple.subject)
            && slot(&self.predicate, &triple.predicate)
            && slot(&self.object, &triple.object)
    }
}

impl From<&Triple> for Pattern {
    fn from(triple: &Triple) -> Self {
        Self {
            subject: Some(triple.subject.clone()),
            predicate: Some(triple.predicate.clone()),
            object: Some(triple.object.clone()),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn slot(f: &mut fmt::Formatter<'_>, value: &Option<Identifier>) -> fmt::Result {
            match value {
                Some(id) => write!(f, "<{id}>"),
                None => f.write_str("*"),
            }
        }
        f.write_str("(")?;
        slot(f, &self.subject)?;
        f.write_str(" ")?;
        slot(f, &self.predicate)?;
        f.write_str(" ")?;
        slot(f, &self.object)?;
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches_bound_positions_only() {
        let triple = Triple::new("a", "p", "b");
        assert!(Pattern::any().matches(&triple));
        assert!(Pattern::any().subject("a").matches(&triple));
        assert!(Pattern::any().subject("a").object("b").matches(&triple));
        assert!(!Pattern::any().predicate("q").matches(&triple));
        assert!(Pattern::from(&triple).matches(&triple));
    }

    #[test]
    fn test_from_pattern_rejects_wildcards() {
        let err = Triple::from_pattern(&Pattern::any().subject("a").predicate("p")).unwrap_err();
        assert!(matches!(err, TripleStoreError::InvalidTriple(_)));

        let full = Pattern::from_parts(Some("a"), Some("p"), Some("b"));
        assert_eq!(Triple::from_pattern(&full).unwrap(), Triple::new("a", "p", "b"));
    }

    #[test]
    fn test_validate_triple_rejects_blank_positions() {
        assert!(validate_triple(&Triple::new("a", "p", "b")).is_ok());
        let err = validate_triple(&Triple::new("a", "  ", "b")).unwrap_err();
        assert_eq!(err.to_string(), "invalid triple: predicate must be set");
        assert!(validate_triple(&Triple::new("", "p", "b")).is_err());
        assert!(validate_triple(&Triple::new("a", "p", "")).is_err());
    }

    #[test]
    fn test_pattern_display() {
        let pattern = Pattern::any().subject("a").object("b");
        assert_eq!(pattern.to_string(), "(<a> * <b>)");
        assert_eq!(pattern.bound_positions(), 2);
        assert!(Pattern::any().is_wildcard());
    }

    #[test]
    fn test_triple_serializes_as_plain_strings() {
        let triple = Triple::new("ex:a", "ex:p", "\"literal\"");
        let json = serde_json::to_value(&triple).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"subject": "ex:a", "predicate": "ex:p", "object": "\"literal\""})
        );
    }
}
