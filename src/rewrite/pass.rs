use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::normalize::{strip_braces, wrap_braces};
use crate::core::types::{AbbreviationStyle, JournalId, MatchStrategy};
use crate::matching::engine::Resolver;

/// Default minimum confidence for substituting an abbreviation
pub const DEFAULT_REWRITE_THRESHOLD: f64 = 0.9;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Failed to build rewrite thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Journal-name text of one bibliographic entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldText {
    pub entry_id: String,
    pub text: String,
}

impl FieldText {
    pub fn new(entry_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            text: text.into(),
        }
    }
}

/// Configuration for a rewrite run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Resolutions below this confidence leave the text alone
    pub threshold: f64,

    /// Which abbreviation to substitute
    pub style: AbbreviationStyle,

    /// Worker threads; `None` uses the available parallelism
    pub threads: Option<usize>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_REWRITE_THRESHOLD,
            style: AbbreviationStyle::default(),
            threads: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStatus {
    /// Text replaced by the abbreviation
    Rewritten,
    /// Already the abbreviation
    Unchanged,
    /// No record matched with enough confidence
    Unresolved,
    /// Resolved, but the record has no abbreviation of the requested style
    NoAbbreviation,
    /// Resolution itself failed
    Failed,
}

impl std::fmt::Display for RewriteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rewritten => "rewritten",
            Self::Unchanged => "unchanged",
            Self::Unresolved => "unresolved",
            Self::NoAbbreviation => "no_abbreviation",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Result for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewriteOutcome {
    /// Position in the input
    pub index: usize,
    pub entry_id: String,
    pub original: String,
    /// Rewritten text, or the original when not rewritten
    pub text: String,
    pub resolved: bool,
    pub journal_id: Option<JournalId>,
    pub confidence: f64,
    pub strategy: Option<MatchStrategy>,
    pub status: RewriteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RewriteOutcome {
    fn untouched(index: usize, field: &FieldText, status: RewriteStatus) -> Self {
        Self {
            index,
            entry_id: field.entry_id.clone(),
            original: field.text.clone(),
            text: field.text.clone(),
            resolved: false,
            journal_id: None,
            confidence: 0.0,
            strategy: None,
            status,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub total: usize,
    pub processed: usize,
    pub rewritten: usize,
    pub unchanged: usize,
    pub unresolved: usize,
    pub no_abbreviation: usize,
    pub failed: usize,
    /// Entry ids left unresolved
    pub unresolved_entries: Vec<String>,
    /// Entry ids whose resolution failed
    pub failed_entries: Vec<String>,
    /// The run stopped early; unprocessed fields have no outcome
    pub cancelled: bool,
}

impl RewriteSummary {
    fn from_outcomes(total: usize, outcomes: &[RewriteOutcome], cancelled: bool) -> Self {
        let mut summary = Self {
            total,
            processed: outcomes.len(),
            cancelled,
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.status {
                RewriteStatus::Rewritten => summary.rewritten += 1,
                RewriteStatus::Unchanged => summary.unchanged += 1,
                RewriteStatus::Unresolved => {
                    summary.unresolved += 1;
                    summary.unresolved_entries.push(outcome.entry_id.clone());
                }
                RewriteStatus::NoAbbreviation => summary.no_abbreviation += 1,
                RewriteStatus::Failed => {
                    summary.failed += 1;
                    summary.failed_entries.push(outcome.entry_id.clone());
                }
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewriteReport {
    /// One outcome per processed field, in input order
    pub outcomes: Vec<RewriteOutcome>,
    pub summary: RewriteSummary,
}

/// Applies resolutions to journal-name fields
pub struct RewritePass<'a> {
    resolver: Resolver<'a>,
    config: RewriteConfig,
}

impl<'a> RewritePass<'a> {
    #[must_use]
    pub fn new(resolver: Resolver<'a>, config: RewriteConfig) -> Self {
        Self { resolver, config }
    }

    /// Rewrite every field on a worker pool.
    ///
    /// `cancel` is checked before each field; once set, remaining fields are
    /// skipped and the report is marked cancelled if any field was skipped. Per-field failures are
    /// reported in their outcome and never abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the thread pool cannot be created.
    pub fn run<I>(&self, fields: I, cancel: &AtomicBool) -> Result<RewriteReport, RewriteError>
    where
        I: IntoIterator<Item = FieldText>,
    {
        let fields: Vec<FieldText> = fields.into_iter().collect();
        let threads = self
            .config
            .threads
            .unwrap_or_else(default_threads)
            .max(1);
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        debug!("Rewriting {} fields on {threads} threads", fields.len());

        let mut outcomes: Vec<RewriteOutcome> = pool.install(|| {
            fields
                .par_iter()
                .enumerate()
                .filter_map(|(index, field)| {
                    if cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    Some(self.rewrite_one(index, field))
                })
                .collect()
        });
        outcomes.sort_by_key(|o| o.index);

        // A flag raised while the last field was in flight skipped nothing
        let cancelled = outcomes.len() < fields.len();
        let summary = RewriteSummary::from_outcomes(fields.len(), &outcomes, cancelled);
        info!(
            "Rewrite: {} rewritten, {} unchanged, {} unresolved, {} without abbreviation, {} failed{}",
            summary.rewritten,
            summary.unchanged,
            summary.unresolved,
            summary.no_abbreviation,
            summary.failed,
            if cancelled { " (cancelled)" } else { "" }
        );
        Ok(RewriteReport { outcomes, summary })
    }

    /// Rewrite a single field
    #[must_use]
    pub fn rewrite_one(&self, index: usize, field: &FieldText) -> RewriteOutcome {
        let (content, depth) = strip_braces(field.text.trim());
        if content.trim().is_empty() {
            return RewriteOutcome::untouched(index, field, RewriteStatus::Unresolved);
        }

        let resolution = match self.resolver.resolve_default(content) {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!("Failed to resolve '{}' ({}): {e}", content, field.entry_id);
                return RewriteOutcome {
                    error: Some(e.to_string()),
                    ..RewriteOutcome::untouched(index, field, RewriteStatus::Failed)
                };
            }
        };

        let mut outcome = RewriteOutcome {
            resolved: resolution.is_match(),
            journal_id: resolution.journal_id,
            confidence: resolution.confidence,
            strategy: Some(resolution.strategy),
            ..RewriteOutcome::untouched(index, field, RewriteStatus::Unresolved)
        };

        let Some(id) = resolution.journal_id else {
            return outcome;
        };
        if resolution.confidence < self.config.threshold {
            debug!(
                "'{content}' → {id} at {:.3} is below the rewrite threshold",
                resolution.confidence
            );
            return outcome;
        }

        let Some(record) = self.resolver.snapshot().get(id) else {
            outcome.status = RewriteStatus::Failed;
            outcome.error = Some(format!("resolved to missing record {id}"));
            return outcome;
        };

        match record.abbreviation_for(self.config.style) {
            None => outcome.status = RewriteStatus::NoAbbreviation,
            Some(abbreviation) if abbreviation == content => {
                outcome.status = RewriteStatus::Unchanged;
            }
            Some(abbreviation) => {
                outcome.text = wrap_braces(abbreviation, depth);
                outcome.status = RewriteStatus::Rewritten;
            }
        }
        outcome
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
