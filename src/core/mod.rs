//! Core data types for journal-name resolution.
//!
//! This module provides the fundamental types used throughout the library:
//!
//! - [`JournalRecord`](record::JournalRecord): A canonical journal with its names, abbreviations and provenance
//! - [`CandidateRecord`](candidate::CandidateRecord): One name observation from a producer
//! - [`JournalId`](types::JournalId), [`SourceTag`](types::SourceTag): Identity and provenance types
//! - [`MatchStrategy`](types::MatchStrategy), [`Confidence`](types::Confidence): Resolution classification types
//! - [`normalize`]: Name → comparison-key reduction
//!
//! ## Name keys
//!
//! Every lookup goes through a normalized key rather than the raw string:
//!
//! | Raw                        | Full-name key        | Abbreviation key |
//! |----------------------------|----------------------|------------------|
//! | The Journal of Examples    | journal examples     | -                |
//! | Zeitschrift für Physik     | zeitschrift fur physik | -              |
//! | J.Phys.A                   | -                    | j phys a         |

pub mod candidate;
pub mod normalize;
pub mod record;
pub mod types;
