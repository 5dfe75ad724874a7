//! Confidence matcher.
//!
//! Pairs named source elements with named target slots by name similarity.
//! Assignment is greedy highest-score-first, not a global optimum: a human
//! reviews the mapping before the geometry gate runs.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::domain::{Mapping, MappingEntry, MatchMethod, SourceElement, TargetSlot};

/// Default minimum acceptance score
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

/// Pairwise name similarity.
///
/// Implementations must return a score in [0, 1] and be deterministic for
/// identical inputs.
pub trait Similarity: Send + Sync {
    fn score(&self, source: &str, target: &str) -> f64;
}

/// Jaro-Winkler over normalized names
#[derive(Debug, Clone, Copy, Default)]
pub struct NameSimilarity;

impl NameSimilarity {
    /// Lowercase, fold separators to single spaces, trim
    pub fn normalize(name: &str) -> String {
        name.to_lowercase()
            .split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Similarity for NameSimilarity {
    fn score(&self, source: &str, target: &str) -> f64 {
        let a = Self::normalize(source);
        let b = Self::normalize(target);
        if a == b {
            return 1.0;
        }
        strsim::jaro_winkler(&a, &b).clamp(0.0, 1.0)
    }
}

/// A scored (source, target) candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub source: String,
    pub target: String,
    pub score: f64,
}

/// Greedy one-to-one matcher
pub struct ConfidenceMatcher {
    min_confidence: f64,
    similarity: Box<dyn Similarity>,
}

impl Default for ConfidenceMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}

impl ConfidenceMatcher {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence: min_confidence.clamp(0.0, 1.0),
            similarity: Box::new(NameSimilarity),
        }
    }

    /// Swap in a different similarity function
    pub fn with_similarity(mut self, similarity: impl Similarity + 'static) -> Self {
        self.similarity = Box::new(similarity);
        self
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Every (source, target) pair at or above the threshold, best first.
    ///
    /// Ties are ordered by source name, then target name.
    pub fn candidates(&self, elements: &[SourceElement], slots: &[TargetSlot]) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = elements
            .iter()
            .flat_map(|e| {
                slots.iter().map(move |s| Candidate {
                    source: e.name.clone(),
                    target: s.name.clone(),
                    score: self.similarity.score(&e.name, &s.name),
                })
            })
            .filter(|c| c.score >= self.min_confidence)
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.target.cmp(&b.target))
        });
        candidates
    }

    /// Resolve a one-to-one mapping. Entries follow the order of `elements`.
    pub fn match_elements(&self, elements: &[SourceElement], slots: &[TargetSlot]) -> Mapping {
        let mut used_sources: HashSet<String> = HashSet::new();
        let mut used_targets: HashSet<String> = HashSet::new();
        let mut accepted: Vec<Candidate> = Vec::new();

        for candidate in self.candidates(elements, slots) {
            if used_sources.contains(&candidate.source) || used_targets.contains(&candidate.target) {
                continue;
            }
            used_sources.insert(candidate.source.clone());
            used_targets.insert(candidate.target.clone());
            accepted.push(candidate);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let entries: Vec<MappingEntry> = elements
            .iter()
            // duplicate element names collapse to their first occurrence
            .filter(|e| seen.insert(e.name.as_str()))
            .map(|e| match accepted.iter().find(|c| c.source == e.name) {
                Some(c) => {
                    let method = if c.score >= 1.0 {
                        MatchMethod::Exact
                    } else {
                        MatchMethod::Fuzzy
                    };
                    MappingEntry::matched(&c.source, &c.target, c.score, method)
                }
                None => MappingEntry::unmatched(&e.name),
            })
            .collect();

        debug!(
            elements = elements.len(),
            slots = slots.len(),
            matched = accepted.len(),
            "Matcher run complete"
        );

        Mapping::new(entries)
    }

    /// Top `limit` slots for one element, for review tooling
    pub fn suggestions(&self, element: &str, slots: &[TargetSlot], limit: usize) -> Vec<Candidate> {
        let mut scored: Vec<Candidate> = slots
            .iter()
            .map(|s| Candidate {
                source: element.to_string(),
                target: s.name.clone(),
                score: self.similarity.score(element, &s.name),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.target.cmp(&b.target))
        });
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements(names: &[&str]) -> Vec<SourceElement> {
        names
            .iter()
            .map(|n| SourceElement::new(*n, 100.0, 100.0))
            .collect()
    }

    fn slots(names: &[&str]) -> Vec<TargetSlot> {
        names.iter().map(|n| TargetSlot::new(*n, 100.0, 100.0)).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(NameSimilarity::normalize("  Hero_Image-01 "), "hero image 01");
        assert_eq!(NameSimilarity::normalize("logo.main"), "logo main");
    }

    #[test]
    fn test_exact_and_fuzzy_methods() {
        let matcher = ConfidenceMatcher::default();
        let mapping = matcher.match_elements(
            &elements(&["hero_image", "Logo Main"]),
            &slots(&["Hero Image", "logo_mark"]),
        );

        let hero = mapping.entry_for("hero_image").unwrap();
        assert_eq!(hero.target.as_deref(), Some("Hero Image"));
        assert_eq!(hero.method, MatchMethod::Exact);
        assert_eq!(hero.confidence, 1.0);

        let logo = mapping.entry_for("Logo Main").unwrap();
        assert_eq!(logo.target.as_deref(), Some("logo_mark"));
        assert_eq!(logo.method, MatchMethod::Fuzzy);
    }

    #[test]
    fn test_below_threshold_is_unmatched() {
        let matcher = ConfidenceMatcher::new(0.95);
        let mapping = matcher.match_elements(&elements(&["background"]), &slots(&["headline"]));

        let entry = &mapping.entries[0];
        assert!(entry.target.is_none());
        assert_eq!(entry.confidence, 0.0);
        assert_eq!(entry.method, MatchMethod::Unmatched);
    }

    #[test]
    fn test_one_to_one_and_bounded() {
        let matcher = ConfidenceMatcher::new(0.0);
        let mapping = matcher.match_elements(
            &elements(&["title", "title_2", "title_3", "subtitle"]),
            &slots(&["Title", "Subtitle"]),
        );

        let targets: Vec<&str> = mapping
            .accepted()
            .filter_map(|e| e.target.as_deref())
            .collect();
        let unique: HashSet<&str> = targets.iter().copied().collect();
        assert_eq!(targets.len(), unique.len());
        assert!(targets.len() <= 2);
        assert_eq!(mapping.entries.len(), 4);
    }

    #[test]
    fn test_ties_break_by_source_name() {
        struct Flat;
        impl Similarity for Flat {
            fn score(&self, _: &str, _: &str) -> f64 {
                0.8
            }
        }

        let matcher = ConfidenceMatcher::default().with_similarity(Flat);
        let mapping = matcher.match_elements(&elements(&["zeta", "alpha"]), &slots(&["only"]));

        assert_eq!(mapping.entry_for("alpha").unwrap().target.as_deref(), Some("only"));
        assert!(mapping.entry_for("zeta").unwrap().target.is_none());
        // output keeps input order
        assert_eq!(mapping.entries[0].source, "zeta");
    }

    #[test]
    fn test_deterministic() {
        let matcher = ConfidenceMatcher::default();
        let e = elements(&["hero", "hero_alt", "cta", "logo"]);
        let s = slots(&["Hero", "CTA Button", "Logo"]);
        assert_eq!(matcher.match_elements(&e, &s), matcher.match_elements(&e, &s));
    }

    #[test]
    fn test_suggestions() {
        let matcher = ConfidenceMatcher::default();
        let s = slots(&["Logo", "Hero", "Headline"]);
        let top = matcher.suggestions("hero", &s, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].target, "Hero");
    }
}
