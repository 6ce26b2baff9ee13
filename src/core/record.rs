use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::normalize::{normalize_abbreviation, normalize_full_name};
use crate::core::types::{AbbreviationStyle, Field, JournalId, SourceTag};

/// Which source last set a field, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: SourceTag,
    pub updated_at: DateTime<Utc>,
}

impl Provenance {
    #[must_use]
    pub fn new(source: SourceTag, updated_at: DateTime<Utc>) -> Self {
        Self { source, updated_at }
    }
}

/// Whether a name key comes from the canonical full name or an alias.
/// Ordered so that full names win ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    FullName,
    Alias,
}

/// A full-name-mode key owned by a record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameKey {
    pub key: String,
    pub kind: NameKind,
}

/// A canonical journal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Stable identifier
    pub id: JournalId,

    /// Canonical full name
    pub full_name: String,

    /// Preferred (ISO 4) abbreviation
    pub abbreviation: Option<String>,

    /// Other abbreviations seen for this journal; never contains the preferred one
    pub alternate_abbreviations: BTreeSet<String>,

    /// Variant full names
    pub aliases: BTreeSet<String>,

    /// CODEN identifier
    pub coden: Option<String>,

    /// Print ISSN
    pub issn_print: Option<String>,

    /// Electronic ISSN
    pub issn_web: Option<String>,

    /// Source and timestamp of the last change, per field
    pub provenance: BTreeMap<Field, Provenance>,

    // === Derived keys (populated on load) ===
    /// Full-name-mode keys of the full name and every alias, full name first
    #[serde(skip)]
    pub name_keys: Vec<NameKey>,

    /// Abbreviation-mode keys of the preferred and alternate abbreviations and the CODEN
    #[serde(skip)]
    pub abbreviation_keys: BTreeSet<String>,
}

impl JournalRecord {
    pub fn new(id: JournalId, full_name: impl Into<String>) -> Self {
        let mut record = Self {
            id,
            full_name: full_name.into(),
            abbreviation: None,
            alternate_abbreviations: BTreeSet::new(),
            aliases: BTreeSet::new(),
            coden: None,
            issn_print: None,
            issn_web: None,
            provenance: BTreeMap::new(),
            name_keys: Vec::new(),
            abbreviation_keys: BTreeSet::new(),
        };
        record.rebuild_keys();
        record
    }

    /// Recompute the derived keys after modifying names or abbreviations
    pub fn rebuild_keys(&mut self) {
        self.name_keys.clear();
        self.abbreviation_keys.clear();

        let full_key = normalize_full_name(&self.full_name);
        if !full_key.is_empty() {
            self.name_keys.push(NameKey {
                key: full_key,
                kind: NameKind::FullName,
            });
        }

        for alias in &self.aliases {
            let key = normalize_full_name(alias);
            if !key.is_empty() && !self.name_keys.iter().any(|k| k.key == key) {
                self.name_keys.push(NameKey {
                    key,
                    kind: NameKind::Alias,
                });
            }
        }

        // CODENs are looked up like abbreviations
        let keys: Vec<String> = self
            .abbreviations()
            .chain(self.coden.as_deref())
            .map(normalize_abbreviation)
            .filter(|key| !key.is_empty())
            .collect();
        self.abbreviation_keys.extend(keys);
    }

    /// Normalized key of the canonical full name
    #[must_use]
    pub fn full_name_key(&self) -> Option<&str> {
        self.name_keys
            .iter()
            .find(|k| k.kind == NameKind::FullName)
            .map(|k| k.key.as_str())
    }

    /// Whether a full-name-mode key belongs to this record
    #[must_use]
    pub fn owns_name_key(&self, key: &str) -> bool {
        self.name_keys.iter().any(|k| k.key == key)
    }

    /// Preferred abbreviation first, then alternates
    pub fn abbreviations(&self) -> impl Iterator<Item = &str> {
        self.abbreviation
            .iter()
            .map(String::as_str)
            .chain(self.alternate_abbreviations.iter().map(String::as_str))
    }

    /// The abbreviation a rewrite substitutes for the given style
    #[must_use]
    pub fn abbreviation_for(&self, style: AbbreviationStyle) -> Option<&str> {
        match style {
            AbbreviationStyle::Iso4 => self.abbreviation.as_deref(),
            AbbreviationStyle::Coden => self.coden.as_deref(),
        }
    }

    /// Full name followed by aliases
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.full_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Source that last set a field
    #[must_use]
    pub fn source_of(&self, field: Field) -> Option<&SourceTag> {
        self.provenance.get(&field).map(|p| &p.source)
    }

    /// Current text value of a single-valued field
    #[must_use]
    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::FullName => Some(self.full_name.as_str()),
            Field::Abbreviation => self.abbreviation.as_deref(),
            Field::Coden => self.coden.as_deref(),
            Field::IssnPrint => self.issn_print.as_deref(),
            Field::IssnWeb => self.issn_web.as_deref(),
            Field::Aliases => None,
        }
    }

    /// Compare everything except provenance timestamps
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.full_name == other.full_name
            && self.abbreviation == other.abbreviation
            && self.alternate_abbreviations == other.alternate_abbreviations
            && self.aliases == other.aliases
            && self.coden == other.coden
            && self.issn_print == other.issn_print
            && self.issn_web == other.issn_web
            && self.provenance.len() == other.provenance.len()
            && self
                .provenance
                .iter()
                .all(|(field, p)| other.source_of(*field) == Some(&p.source))
    }
}
