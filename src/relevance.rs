//! Keyword relevance gate and trending score.

use crate::config::KeywordSets;

/// Keyword hit counts for one piece of text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeywordMatches {
    pub coding: usize,
    pub interview: usize,
}

impl KeywordMatches {
    pub fn total(&self) -> usize {
        self.coding + self.interview
    }

    pub fn any(&self) -> bool {
        self.total() > 0
    }
}

/// Decides whether an article is about programming or interview preparation.
///
/// Each keyword counts once no matter how often it occurs, and matching is a
/// plain lower-cased substring test, so `"go"` also hits `"google"`.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    coding: Vec<String>,
    interview: Vec<String>,
}

impl RelevanceFilter {
    pub fn new(keywords: &KeywordSets) -> Self {
        let lower = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            coding: lower(&keywords.coding),
            interview: lower(&keywords.interview),
        }
    }

    pub fn matches(&self, title: &str, body: &str) -> KeywordMatches {
        let text = format!("{title} {body}").to_lowercase();
        let hits = |list: &[String]| list.iter().filter(|k| text.contains(k.as_str())).count();
        KeywordMatches {
            coding: hits(&self.coding),
            interview: hits(&self.interview),
        }
    }

    pub fn is_relevant(&self, title: &str, body: &str) -> bool {
        self.matches(title, body).any()
    }

    /// Number of distinct keywords found, used to rank trending articles.
    pub fn score(&self, title: &str, body: &str) -> usize {
        self.matches(title, body).total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> RelevanceFilter {
        RelevanceFilter::new(&KeywordSets::default())
    }

    #[test]
    fn test_keyword_relevance() {
        let filter = default_filter();
        assert!(filter.is_relevant("New Python framework released", ""));
        assert!(filter.is_relevant("Top 10 coding interview questions for 2024", ""));
        assert!(filter.is_relevant("React vs Angular: Which to choose in 2024", ""));
        assert!(!filter.is_relevant("Latest cooking recipes for beginners", ""));
        assert!(!filter.is_relevant("How to make the perfect pasta", ""));
    }

    #[test]
    fn test_matching_is_case_insensitive_and_uses_body() {
        let filter = default_filter();
        assert!(filter.is_relevant("Weekly roundup", "Notes on KUBERNETES operators"));
        assert!(filter.is_relevant("LEETCODE streak", ""));
    }

    #[test]
    fn test_score_counts_distinct_keywords() {
        let filter = RelevanceFilter::new(&KeywordSets {
            coding: vec!["Rust".to_string(), "tokio".to_string()],
            interview: vec!["interview".to_string()],
        });
        let matches = filter.matches("Rust interview prep", "rust rust tokio");
        assert_eq!(matches, KeywordMatches { coding: 2, interview: 1 });
        assert_eq!(filter.score("Rust interview prep", "rust rust tokio"), 3);
        assert_eq!(filter.score("gardening", ""), 0);
    }

    #[test]
    fn test_empty_keyword_sets_match_nothing() {
        let filter = RelevanceFilter::new(&KeywordSets {
            coding: vec![" ".to_string()],
            interview: Vec::new(),
        });
        assert!(!filter.is_relevant("Python", "Rust"));
    }
}
