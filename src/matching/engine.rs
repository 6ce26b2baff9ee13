use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::catalog::index::CandidateFinder;
use crate::catalog::snapshot::CatalogSnapshot;
use crate::catalog::store::StoreError;
use crate::core::normalize::{normalize_abbreviation, normalize_full_name};
use crate::core::record::NameKind;
use crate::core::types::{Confidence, JournalId, MatchStrategy};

use super::scoring::{ScorerKind, SimilarityScorer};

/// Default minimum confidence for a fuzzy match
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.8;

/// Default cap on records scored per query
pub const DEFAULT_MAX_CANDIDATES: usize = 64;

/// Default size above which a signature entry is too common to prefilter on
pub const DEFAULT_MAX_POSTING: usize = 2048;

/// Confidence of a match on the title with its subtitle removed
pub const SUBTITLE_MATCH_CONFIDENCE: f64 = 0.95;

/// Configuration for the resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Fuzzy scores at or above this are matches
    pub min_confidence: f64,

    /// At most this many records are scored per query
    pub max_candidates: usize,

    /// Signature entries shared by more records than this are skipped
    pub max_posting: usize,

    /// Similarity function for fuzzy scoring
    pub scorer: ScorerKind,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            max_posting: DEFAULT_MAX_POSTING,
            scorer: ScorerKind::default(),
        }
    }
}

/// Outcome of resolving one query. "No match" is a result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionResult {
    /// The query as given
    pub query: String,

    /// The matched record, if any
    pub journal_id: Option<JournalId>,

    /// The record key that matched
    pub matched_key: Option<String>,

    /// Match certainty in [0, 1]; for a miss, the best score seen
    pub confidence: f64,

    pub strategy: MatchStrategy,
}

impl ResolutionResult {
    fn hit(query: &str, id: JournalId, key: String, confidence: f64, strategy: MatchStrategy) -> Self {
        Self {
            query: query.to_string(),
            journal_id: Some(id),
            matched_key: Some(key),
            confidence,
            strategy,
        }
    }

    fn miss(query: &str, best: f64) -> Self {
        Self {
            query: query.to_string(),
            journal_id: None,
            matched_key: None,
            confidence: best,
            strategy: MatchStrategy::FuzzyBelowThreshold,
        }
    }

    #[must_use]
    pub fn is_match(&self) -> bool {
        self.journal_id.is_some()
    }

    #[must_use]
    pub fn confidence_level(&self) -> Confidence {
        Confidence::from_score(self.confidence)
    }
}

/// Best fuzzy candidate so far
struct Best<'k> {
    score: f64,
    kind: NameKind,
    id: JournalId,
    key: &'k str,
}

impl Best<'_> {
    /// Higher score first; then a full name over an alias; then the smaller id
    fn beats(&self, other: &Self) -> bool {
        match self.score.total_cmp(&other.score) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => (self.kind, self.id) < (other.kind, other.id),
        }
    }
}

/// Maps free-text journal names to canonical records of one snapshot
pub struct Resolver<'a> {
    snapshot: &'a CatalogSnapshot,
    config: ResolverConfig,
    scorer: Box<dyn SimilarityScorer>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver using the scorer named in `config`
    #[must_use]
    pub fn new(snapshot: &'a CatalogSnapshot, config: ResolverConfig) -> Self {
        let scorer = config.scorer.scorer();
        Self::with_scorer(snapshot, config, scorer)
    }

    /// Create a resolver with a custom similarity function
    #[must_use]
    pub fn with_scorer(
        snapshot: &'a CatalogSnapshot,
        config: ResolverConfig,
        scorer: Box<dyn SimilarityScorer>,
    ) -> Self {
        Self {
            snapshot,
            config,
            scorer,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &'a CatalogSnapshot {
        self.snapshot
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[must_use]
    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// Resolve with the configured minimum confidence
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn resolve_default(&self, query: &str) -> Result<ResolutionResult, StoreError> {
        self.resolve(query, self.config.min_confidence)
    }

    /// Resolve a free-text journal name.
    ///
    /// Tries the full-name key, then the abbreviation key, then the full-name
    /// key of the title with any `: subtitle` removed, then fuzzy scoring over
    /// prefiltered candidates. A fuzzy score equal to `min_confidence` matches.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CorruptIndex` if an index entry points at a record
    /// that does not exist.
    pub fn resolve(&self, query: &str, min_confidence: f64) -> Result<ResolutionResult, StoreError> {
        let text = query.replace(['{', '}'], "");

        let key = normalize_full_name(&text);
        if key.is_empty() {
            debug!("'{query}' has nothing to match on");
            return Ok(ResolutionResult::miss(query, 0.0));
        }

        if let Some(record) = self.snapshot.record_for_name_key(&key)? {
            debug!("'{query}' → {} (exact)", record.id);
            return Ok(ResolutionResult::hit(
                query,
                record.id,
                key,
                1.0,
                MatchStrategy::ExactNormalized,
            ));
        }

        let abbreviation_key = normalize_abbreviation(&text);
        if let Some(record) = self.snapshot.record_for_abbreviation_key(&abbreviation_key)? {
            debug!("'{query}' → {} (abbreviation)", record.id);
            return Ok(ResolutionResult::hit(
                query,
                record.id,
                abbreviation_key,
                1.0,
                MatchStrategy::AliasNormalized,
            ));
        }

        if let Some(title) = title_key(&text).filter(|title| *title != key) {
            if let Some(record) = self.snapshot.record_for_name_key(&title)? {
                debug!("'{query}' → {} (title without subtitle)", record.id);
                return Ok(ResolutionResult::hit(
                    query,
                    record.id,
                    title,
                    SUBTITLE_MATCH_CONFIDENCE,
                    MatchStrategy::TitleNormalized,
                ));
            }
        }

        self.resolve_fuzzy(query, &key, min_confidence)
    }

    fn resolve_fuzzy(
        &self,
        query: &str,
        key: &str,
        min_confidence: f64,
    ) -> Result<ResolutionResult, StoreError> {
        let finder = CandidateFinder::new(
            self.snapshot,
            self.config.max_candidates,
            self.config.max_posting,
        );

        let mut best: Option<Best<'_>> = None;
        for id in finder.find_candidates(key) {
            let record = self.snapshot.get(id).ok_or_else(|| {
                StoreError::CorruptIndex(format!("token index points at missing record {id}"))
            })?;
            for name_key in &record.name_keys {
                let candidate = Best {
                    score: self.scorer.score(key, &name_key.key).clamp(0.0, 1.0),
                    kind: name_key.kind,
                    id,
                    key: &name_key.key,
                };
                if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                    best = Some(candidate);
                }
            }
        }

        match best {
            Some(best) if best.score >= min_confidence => {
                debug!(
                    "'{query}' → {} ({} {:.3})",
                    best.id,
                    self.scorer.name(),
                    best.score
                );
                Ok(ResolutionResult::hit(
                    query,
                    best.id,
                    best.key.to_string(),
                    best.score,
                    MatchStrategy::Fuzzy,
                ))
            }
            best => {
                let score = best.map_or(0.0, |b| b.score);
                debug!("'{query}' unresolved (best {score:.3} < {min_confidence})");
                Ok(ResolutionResult::miss(query, score))
            }
        }
    }
}

/// Full-name key of the part before the first `: ` separator
fn title_key(text: &str) -> Option<String> {
    let (title, subtitle) = text.split_once(':')?;
    if !subtitle.starts_with(char::is_whitespace) {
        return None;
    }
    let key = normalize_full_name(title);
    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::JournalRecord;
    use crate::matching::scoring::Blended;

    fn snapshot() -> CatalogSnapshot {
        let mut snapshot = CatalogSnapshot::new();

        let mut prl = JournalRecord::new(JournalId(0), "Physical Review Letters");
        prl.abbreviation = Some("Phys. Rev. Lett.".to_string());
        snapshot.insert(prl);

        let mut jcp = JournalRecord::new(JournalId(1), "The Journal of Chemical Physics");
        jcp.abbreviation = Some("J. Chem. Phys.".to_string());
        jcp.aliases.insert("Journal of Chemical Physics (AIP)".to_string());
        snapshot.insert(jcp);

        snapshot.insert(JournalRecord::new(JournalId(2), "Annals of Mathematics"));
        snapshot
    }

    fn resolver(snapshot: &CatalogSnapshot) -> Resolver<'_> {
        Resolver::new(snapshot, ResolverConfig::default())
    }

    #[test]
    fn test_exact_normalized() {
        let snapshot = snapshot();
        let result = resolver(&snapshot).resolve("journal of chemical physics", 0.8).unwrap();
        assert_eq!(result.journal_id, Some(JournalId(1)));
        assert_eq!(result.strategy, MatchStrategy::ExactNormalized);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.confidence_level(), Confidence::Exact);
    }

    #[test]
    fn test_braces_are_ignored() {
        let snapshot = snapshot();
        let result = resolver(&snapshot).resolve("{{Annals of Mathematics}}", 0.8).unwrap();
        assert_eq!(result.journal_id, Some(JournalId(2)));
    }

    #[test]
    fn test_abbreviation_round_trip() {
        let snapshot = snapshot();
        let resolver = resolver(&snapshot);
        for record in snapshot.records() {
            let Some(abbreviation) = &record.abbreviation else {
                continue;
            };
            let result = resolver.resolve(abbreviation, 0.8).unwrap();
            assert_eq!(result.journal_id, Some(record.id));
            assert!(matches!(
                result.strategy,
                MatchStrategy::AliasNormalized | MatchStrategy::ExactNormalized
            ));
        }

        let result = resolver.resolve("J.Chem.Phys.", 0.8).unwrap();
        assert_eq!(result.journal_id, Some(JournalId(1)));
        assert_eq!(result.strategy, MatchStrategy::AliasNormalized);
    }

    #[test]
    fn test_subtitle_is_stripped() {
        let mut snapshot = snapshot();
        snapshot.insert(JournalRecord::new(JournalId(3), "Journal of Physics"));
        snapshot.insert(JournalRecord::new(JournalId(4), "Journal of Physics: Condensed Matter"));
        let resolver = resolver(&snapshot);

        let result = resolver.resolve("Journal of Physics: Conference Series", 0.8).unwrap();
        assert_eq!(result.journal_id, Some(JournalId(3)));
        assert_eq!(result.strategy, MatchStrategy::TitleNormalized);
        assert_eq!(result.matched_key.as_deref(), Some("journal physics"));
        assert!((result.confidence - SUBTITLE_MATCH_CONFIDENCE).abs() < f64::EPSILON);

        // A full title that is itself a record wins over its prefix
        let result = resolver.resolve("Journal of Physics: Condensed Matter", 0.8).unwrap();
        assert_eq!(result.journal_id, Some(JournalId(4)));
        assert_eq!(result.strategy, MatchStrategy::ExactNormalized);

        // No space after the colon is not a subtitle
        assert_eq!(title_key("Physics:Letters"), None);
        assert_eq!(title_key(": Letters"), None);
    }

    #[test]
    fn test_series_letter() {
        let mut snapshot = CatalogSnapshot::new();
        snapshot.insert(JournalRecord::new(JournalId(0), "Journal of Physics"));
        snapshot.insert(JournalRecord::new(JournalId(1), "Journal of Physics A"));
        let resolver = resolver(&snapshot);

        let result = resolver.resolve("Journal of Physics Series A", 0.8).unwrap();
        assert_eq!(result.journal_id, Some(JournalId(1)));
        assert_eq!(result.strategy, MatchStrategy::ExactNormalized);

        let result = resolver.resolve("Journal of Physics", 0.8).unwrap();
        assert_eq!(result.journal_id, Some(JournalId(0)));
    }

    #[test]
    fn test_fuzzy_match() {
        let snapshot = snapshot();
        let result = resolver(&snapshot).resolve("Jounral of Chemical Physics", 0.8).unwrap();
        assert_eq!(result.journal_id, Some(JournalId(1)));
        assert_eq!(result.strategy, MatchStrategy::Fuzzy);
        assert!(result.confidence < 1.0);
        assert!(result.confidence >= 0.8);
    }

    #[test]
    fn test_below_threshold_reports_best_score() {
        let snapshot = snapshot();
        let result = resolver(&snapshot).resolve("Physical Chemistry Letters", 0.99).unwrap();
        assert!(!result.is_match());
        assert_eq!(result.strategy, MatchStrategy::FuzzyBelowThreshold);
        assert!(result.confidence > 0.0);
        assert!(result.matched_key.is_none());
    }

    #[test]
    fn test_no_candidates_scores_zero() {
        let snapshot = snapshot();
        let result = resolver(&snapshot).resolve("Zoology Quarterly", 0.8).unwrap();
        assert!(!result.is_match());
        assert!(result.confidence.abs() < f64::EPSILON);

        let result = resolver(&snapshot).resolve("???", 0.8).unwrap();
        assert!(!result.is_match());
    }

    #[test]
    fn test_threshold_boundary() {
        let snapshot = snapshot();
        let resolver = resolver(&snapshot);
        let query = "Jounral of Chemical Physics";
        let exact_score = Blended.score(
            &normalize_full_name(query),
            &normalize_full_name("The Journal of Chemical Physics"),
        );

        let at = resolver.resolve(query, exact_score).unwrap();
        assert_eq!(at.journal_id, Some(JournalId(1)));
        assert!((at.confidence - exact_score).abs() < f64::EPSILON);

        let above = resolver.resolve(query, exact_score + 1e-9).unwrap();
        assert!(!above.is_match());
        assert!((above.confidence - exact_score).abs() < f64::EPSILON);
    }

    #[test]
    fn test_full_name_beats_alias_on_tie() {
        let mut snapshot = CatalogSnapshot::new();
        let mut first = JournalRecord::new(JournalId(0), "Acta Examplia");
        first.aliases.insert("Examples Review".to_string());
        snapshot.insert(first);
        snapshot.insert(JournalRecord::new(JournalId(1), "Examples Review Series"));
        snapshot.insert(JournalRecord::new(JournalId(2), "Examples Reviews"));

        // "examples reviewx" is one edit from alias "examples review" of #0 and
        // one edit from full name "examples reviews" of #2
        let result = Resolver::new(&snapshot, ResolverConfig::default())
            .resolve("Examples Reviewx", 0.5)
            .unwrap();
        assert_eq!(result.journal_id, Some(JournalId(2)));
    }

    #[test]
    fn test_custom_scorer() {
        struct Never;
        impl SimilarityScorer for Never {
            fn score(&self, _: &str, _: &str) -> f64 {
                0.0
            }
            fn name(&self) -> &'static str {
                "never"
            }
        }

        let snapshot = snapshot();
        let resolver = Resolver::with_scorer(&snapshot, ResolverConfig::default(), Box::new(Never));
        assert!(!resolver.resolve("Jounral of Chemical Physics", 0.1).unwrap().is_match());
        // Exact lookups do not depend on the scorer
        assert!(resolver.resolve("Annals of Mathematics", 0.1).unwrap().is_match());
    }
}
