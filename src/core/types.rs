use serde::{Deserialize, Serialize};

/// Stable identifier of a canonical journal record.
///
/// Allocated once from the store's monotonic counter and never reused, even
/// after the record is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JournalId(pub u64);

impl JournalId {
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Parse `#42` or `42`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        s.strip_prefix('#').unwrap_or(s).parse().ok().map(Self)
    }
}

impl std::fmt::Display for JournalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Name of the producer that contributed a value (e.g. `registry`, `scraped`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SourceTag(pub String);

impl From<String> for SourceTag {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<SourceTag> for String {
    fn from(tag: SourceTag) -> Self {
        tag.0
    }
}

impl SourceTag {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Record fields that carry their own provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FullName,
    Abbreviation,
    Aliases,
    Coden,
    IssnPrint,
    IssnWeb,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::FullName => "full_name",
            Self::Abbreviation => "abbreviation",
            Self::Aliases => "aliases",
            Self::Coden => "coden",
            Self::IssnPrint => "issn_print",
            Self::IssnWeb => "issn_web",
        };
        write!(f, "{name}")
    }
}

/// How a resolution was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    /// Full-name-mode key matched a full name or alias
    ExactNormalized,
    /// Abbreviation-mode key matched an abbreviation
    AliasNormalized,
    /// Full-name key of the title before a `: subtitle` matched
    TitleNormalized,
    /// Best fuzzy score cleared the threshold
    Fuzzy,
    /// Best fuzzy score fell short; no record is returned
    FuzzyBelowThreshold,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ExactNormalized => "exact-normalized",
            Self::AliasNormalized => "alias-normalized",
            Self::TitleNormalized => "title-normalized",
            Self::Fuzzy => "fuzzy",
            Self::FuzzyBelowThreshold => "fuzzy-below-threshold",
        };
        write!(f, "{name}")
    }
}

/// Which abbreviation a rewrite substitutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AbbreviationStyle {
    /// The preferred (ISO 4) abbreviation
    #[default]
    Iso4,
    /// The CODEN, when known
    Coden,
}

/// Confidence level for a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
    Exact,
}

impl Confidence {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 1.0 {
            Self::Exact
        } else if score >= 0.95 {
            Self::High
        } else if score >= 0.80 {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::None
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Exact => "exact",
        };
        write!(f, "{name}")
    }
}
