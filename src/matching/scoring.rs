use serde::{Deserialize, Serialize};

/// A bounded string-similarity function.
///
/// Implementations receive normalized keys (lower-case, single-space separated
/// tokens) and must return a value in `[0, 1]`, where 1 means identical.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;

    /// Short name used in logs and settings
    fn name(&self) -> &'static str;
}

/// Edit-distance similarity of two strings; 0 when either is empty
fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

/// Edit-distance similarity after sorting tokens, so word order is ignored
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSortRatio;

impl SimilarityScorer for TokenSortRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        ratio(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
    }

    fn name(&self) -> &'static str {
        "token-sort"
    }
}

/// Similarity of the shared tokens against each side's full token set.
///
/// A name whose tokens are a subset of the other's scores 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSetRatio;

impl SimilarityScorer for TokenSetRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a_tokens = sorted_tokens(a);
        let b_tokens = sorted_tokens(b);
        if a_tokens.is_empty() || b_tokens.is_empty() {
            return 0.0;
        }

        let common: Vec<&str> = a_tokens
            .iter()
            .copied()
            .filter(|t| b_tokens.binary_search(t).is_ok())
            .collect();
        let only_a: Vec<&str> = a_tokens
            .iter()
            .copied()
            .filter(|t| common.binary_search(t).is_err())
            .collect();
        let only_b: Vec<&str> = b_tokens
            .iter()
            .copied()
            .filter(|t| common.binary_search(t).is_err())
            .collect();

        let base = common.join(" ");
        let with_a = join_nonempty(&base, &only_a.join(" "));
        let with_b = join_nonempty(&base, &only_b.join(" "));

        ratio(&base, &with_a)
            .max(ratio(&base, &with_b))
            .max(ratio(&with_a, &with_b))
    }

    fn name(&self) -> &'static str {
        "token-set"
    }
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a} {b}"),
    }
}

/// Jaro-Winkler similarity, favouring shared prefixes
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl SimilarityScorer for JaroWinkler {
    fn score(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        strsim::jaro_winkler(a, b)
    }

    fn name(&self) -> &'static str {
        "jaro-winkler"
    }
}

/// Mean of [`TokenSortRatio`] and [`TokenSetRatio`].
///
/// Token-set alone rates a name equal to any superset of it; averaging with
/// token-sort keeps "Physical Review" below "Physical Review Letters" for a
/// query of the latter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blended;

impl SimilarityScorer for Blended {
    fn score(&self, a: &str, b: &str) -> f64 {
        (TokenSortRatio.score(a, b) + TokenSetRatio.score(a, b)) / 2.0
    }

    fn name(&self) -> &'static str {
        "blended"
    }
}

/// Selectable scorer, as named in settings and on the command line
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ScorerKind {
    #[default]
    Blended,
    TokenSort,
    TokenSet,
    JaroWinkler,
}

impl ScorerKind {
    #[must_use]
    pub fn scorer(self) -> Box<dyn SimilarityScorer> {
        match self {
            Self::Blended => Box::new(Blended),
            Self::TokenSort => Box::new(TokenSortRatio),
            Self::TokenSet => Box::new(TokenSetRatio),
            Self::JaroWinkler => Box::new(JaroWinkler),
        }
    }
}
