use crate::relevance::{RelevanceClassifier, RelevanceError, Verdict};
use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use std::collections::HashSet;

/// Exact multi-keyword matcher
///
/// Content is relevant when at least one keyword occurs. The score is the
/// fraction of distinct keywords found.
#[derive(Debug)]
pub struct KeywordStrategy {
    keywords: Vec<String>,
    matcher: AhoCorasick,
}

impl KeywordStrategy {
    /// Builds the automaton from a comma-separated keyword list
    ///
    /// Keywords are trimmed, lowercased and de-duplicated; blanks are dropped.
    pub fn from_list(list: &str) -> Result<Self, RelevanceError> {
        Self::new(list.split(','))
    }

    pub fn new<I, S>(keywords: I) -> Result<Self, RelevanceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect();

        if keywords.is_empty() {
            return Err(RelevanceError::NoKeywords);
        }

        let matcher = AhoCorasick::new(&keywords)?;
        Ok(Self { keywords, matcher })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Scores content synchronously
    pub fn score(&self, content: &str) -> Verdict {
        let lowered = content.to_lowercase();
        let matched: HashSet<usize> = self
            .matcher
            .find_overlapping_iter(&lowered)
            .map(|m| m.pattern().as_usize())
            .collect();

        let total = self.keywords.len() as f32;
        Verdict {
            is_relevant: !matched.is_empty(),
            score: matched.len() as f32 / total,
            threshold: 1.0 / total,
            embedding: None,
        }
    }
}

#[async_trait]
impl RelevanceClassifier for KeywordStrategy {
    async fn classify(&self, content: &str) -> Result<Verdict, RelevanceError> {
        Ok(self.score(content))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
