use std::collections::{BTreeSet, HashMap};

use crate::core::types::JournalId;

use super::snapshot::CatalogSnapshot;

/// Length of the token prefixes used as a coarse typo-tolerant signature
const PREFIX_LEN: usize = 3;

/// Coarse signature of a normalized key: every whole token, plus the
/// `PREFIX_LEN`-character prefix of each token long enough to have one.
///
/// Prefix entries are marked with a leading `~` so they never collide with a
/// whole token.
#[must_use]
pub fn signature(key: &str) -> BTreeSet<String> {
    let mut sig = BTreeSet::new();
    for token in key.split(' ').filter(|t| !t.is_empty()) {
        sig.insert(token.to_string());
        if token.chars().count() > PREFIX_LEN {
            let prefix: String = token.chars().take(PREFIX_LEN).collect();
            sig.insert(format!("~{prefix}"));
        }
    }
    sig
}

/// Finds candidate records that might fuzzily match a query key
pub struct CandidateFinder<'a> {
    snapshot: &'a CatalogSnapshot,
    max_candidates: usize,
    max_posting: usize,
}

impl<'a> CandidateFinder<'a> {
    pub fn new(snapshot: &'a CatalogSnapshot, max_candidates: usize, max_posting: usize) -> Self {
        Self {
            snapshot,
            max_candidates: max_candidates.max(1),
            max_posting: max_posting.max(1),
        }
    }

    /// Candidate records sharing signature entries with the query key.
    ///
    /// Whole-token hits weigh twice a prefix hit. Signature entries shared by
    /// more than `max_posting` records carry little signal and are skipped,
    /// unless every entry is that common, in which case the rarest one is
    /// sampled. Returns at most `max_candidates` ids, best first, ties by id.
    #[must_use]
    pub fn find_candidates(&self, query_key: &str) -> Vec<JournalId> {
        let mut postings: Vec<(u32, &BTreeSet<JournalId>)> = signature(query_key)
            .iter()
            .filter_map(|entry| {
                let weight = if entry.starts_with('~') { 1 } else { 2 };
                self.snapshot.token_postings(entry).map(|ids| (weight, ids))
            })
            .collect();

        if postings.is_empty() {
            return Vec::new();
        }

        postings.sort_by_key(|(_, ids)| ids.len());

        let selective: Vec<_> = postings
            .iter()
            .filter(|(_, ids)| ids.len() <= self.max_posting)
            .collect();

        let mut scores: HashMap<JournalId, u32> = HashMap::new();
        if selective.is_empty() {
            let (weight, ids) = postings[0];
            for &id in ids.iter().take(self.max_candidates) {
                *scores.entry(id).or_default() += weight;
            }
        } else {
            for (weight, ids) in selective {
                for &id in *ids {
                    *scores.entry(id).or_default() += weight;
                }
            }
        }

        let mut candidates: Vec<(JournalId, u32)> = scores.into_iter().collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        candidates.truncate(self.max_candidates);
        candidates.into_iter().map(|(id, _)| id).collect()
    }
}
