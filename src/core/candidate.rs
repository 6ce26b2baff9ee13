use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::core::types::SourceTag;

/// One name observation from a producer (scraper, importer, user).
///
/// Consumed by the merge engine and discarded; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Raw full name
    #[serde(alias = "name")]
    pub full_name: String,

    /// Raw abbreviation
    #[serde(default, alias = "iso4")]
    pub abbreviation: Option<String>,

    /// Other full names the producer knows this journal by
    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default)]
    pub coden: Option<String>,

    #[serde(default)]
    pub issn_print: Option<String>,

    #[serde(default)]
    pub issn_web: Option<String>,

    /// Producer tag used for trust ranking
    #[serde(default = "default_source")]
    pub source: SourceTag,
}

fn default_source() -> SourceTag {
    SourceTag::new("user")
}

impl CandidateRecord {
    pub fn new(full_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            abbreviation: None,
            aliases: Vec::new(),
            coden: None,
            issn_print: None,
            issn_web: None,
            source: SourceTag::new(source),
        }
    }

    #[must_use]
    pub fn with_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.abbreviation = Some(abbreviation.into());
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn with_coden(mut self, coden: impl Into<String>) -> Self {
        self.coden = Some(coden.into());
        self
    }

    #[must_use]
    pub fn with_issn_print(mut self, issn: impl Into<String>) -> Self {
        self.issn_print = Some(issn.into());
        self
    }

    #[must_use]
    pub fn with_issn_web(mut self, issn: impl Into<String>) -> Self {
        self.issn_web = Some(issn.into());
        self
    }
}

/// A JSON value holding either one candidate or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum CandidateInput {
    One(CandidateRecord),
    Many(Vec<CandidateRecord>),
}

/// Stream candidates from JSON text.
///
/// Accepts a single object, an array, or any whitespace-separated sequence of
/// objects and arrays (e.g. JSON lines). Candidates are yielded as they are
/// read; iteration stops after the first malformed value.
pub fn candidates_from_reader<R: Read>(
    reader: R,
) -> impl Iterator<Item = Result<CandidateRecord, serde_json::Error>> {
    let mut failed = false;
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<CandidateInput>()
        .take_while(move |item| {
            let keep = !failed;
            failed |= item.is_err();
            keep
        })
        .flat_map(|item| match item {
            Ok(CandidateInput::One(candidate)) => vec![Ok(candidate)],
            Ok(CandidateInput::Many(candidates)) => candidates.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_aliases() {
        let json = r#"{"name": "Journal of Examples", "iso4": "J. Examp.", "source": "Registry"}"#;
        let candidate: CandidateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.full_name, "Journal of Examples");
        assert_eq!(candidate.abbreviation.as_deref(), Some("J. Examp."));
        assert_eq!(candidate.source, SourceTag::new("registry"));
        assert!(candidate.aliases.is_empty());
    }

    #[test]
    fn test_default_source_is_user() {
        let candidate: CandidateRecord = serde_json::from_str(r#"{"full_name": "Nature"}"#).unwrap();
        assert_eq!(candidate.source.as_str(), "user");
    }

    #[test]
    fn test_stream_objects_and_arrays() {
        let input = r#"
            {"full_name": "Nature", "source": "registry"}
            [{"full_name": "Science"}, {"full_name": "Cell"}]
        "#;
        let names: Vec<String> = candidates_from_reader(input.as_bytes())
            .map(|c| c.unwrap().full_name)
            .collect();
        assert_eq!(names, vec!["Nature", "Science", "Cell"]);
    }

    #[test]
    fn test_stream_stops_after_error() {
        let input = r#"{"full_name": "Nature"} {"full_name": oops} {"full_name": "Cell"}"#;
        let items: Vec<_> = candidates_from_reader(input.as_bytes()).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
