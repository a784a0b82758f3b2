//! Merging of per-provider result lists
//!
//! Flatten in input order, drop duplicate URLs (first occurrence wins),
//! stable-sort by provider priority and truncate.

use crate::types::{ProviderId, SearchResult};
use std::collections::{HashMap, HashSet};
use url::Url;

/// Combines per-provider result lists into one ranked list
#[derive(Debug, Clone)]
pub struct ResultMerger {
    priorities: HashMap<ProviderId, u8>,
}

impl Default for ResultMerger {
    fn default() -> Self {
        Self::new(
            ProviderId::ALL
                .iter()
                .map(|id| (*id, id.default_priority()))
                .collect(),
        )
    }
}

impl ResultMerger {
    pub fn new(priorities: HashMap<ProviderId, u8>) -> Self {
        Self { priorities }
    }

    /// Priority of a provider; unlisted providers rank lowest
    pub fn priority(&self, provider: Option<ProviderId>) -> u8 {
        provider
            .and_then(|id| self.priorities.get(&id).copied())
            .unwrap_or(0)
    }

    /// Merge `(provider, results)` pairs into at most `limit` results
    pub fn merge(&self, contributions: &[(ProviderId, Vec<SearchResult>)], limit: usize) -> Vec<SearchResult> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for (provider, results) in contributions {
            for result in results {
                let key = canonical_url(&result.url);
                if key.is_empty() || !seen.insert(key) {
                    continue;
                }

                let mut result = result.clone();
                result.provider.get_or_insert(*provider);
                merged.push(result);
            }
        }

        // sort_by_key is stable, equal priorities keep insertion order
        merged.sort_by_key(|r| std::cmp::Reverse(self.priority(r.provider)));
        merged.truncate(limit);
        merged
    }
}

/// Normalize a URL for duplicate detection.
///
/// Lowercases scheme and host, drops the fragment and a trailing slash.
/// Unparseable URLs are compared by their trimmed text.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            let mut canonical = url.to_string();
            if canonical.ends_with('/') && url.query().is_none() {
                canonical.pop();
            }
            canonical
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str, provider: ProviderId) -> SearchResult {
        SearchResult::new(format!("title {}", url), url, "", provider)
    }

    fn urls(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.url.as_str()).collect()
    }

    #[test]
    fn test_dedup_first_occurrence_wins() {
        let merger = ResultMerger::default();
        let x = "https://x.example/";
        let y = "https://y.example/";

        let merged = merger.merge(
            &[
                (ProviderId::Brave, vec![hit(x, ProviderId::Brave)]),
                (ProviderId::Brave, vec![hit(x, ProviderId::Brave), hit(y, ProviderId::Brave)]),
            ],
            10,
        );

        assert_eq!(urls(&merged), vec![x, y]);
    }

    #[test]
    fn test_priority_ordering() {
        let merger = ResultMerger::default();
        let merged = merger.merge(
            &[
                (ProviderId::Brave, vec![hit("https://b.example/1", ProviderId::Brave)]),
                (ProviderId::Google, vec![hit("https://g.example/1", ProviderId::Google)]),
            ],
            10,
        );

        assert_eq!(merged[0].provider, Some(ProviderId::Google));
        assert_eq!(merged[1].provider, Some(ProviderId::Brave));
    }

    #[test]
    fn test_equal_priority_keeps_input_order() {
        let merger = ResultMerger::default();
        let merged = merger.merge(
            &[(
                ProviderId::Searxng,
                vec![
                    hit("https://c.example/", ProviderId::Searxng),
                    hit("https://a.example/", ProviderId::Searxng),
                    hit("https://b.example/", ProviderId::Searxng),
                ],
            )],
            10,
        );

        assert_eq!(urls(&merged), vec!["https://c.example/", "https://a.example/", "https://b.example/"]);
    }

    #[test]
    fn test_duplicate_across_providers_keeps_first_seen() {
        let merger = ResultMerger::default();
        let shared = "https://shared.example/page";

        let merged = merger.merge(
            &[
                (ProviderId::DuckDuckGo, vec![hit(shared, ProviderId::DuckDuckGo)]),
                (ProviderId::Google, vec![hit(shared, ProviderId::Google)]),
            ],
            10,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].provider, Some(ProviderId::DuckDuckGo));
    }

    #[test]
    fn test_truncate_and_skip_empty_urls() {
        let merger = ResultMerger::default();
        let results: Vec<_> = (0..8)
            .map(|n| hit(&format!("https://n.example/{}", n), ProviderId::Brave))
            .chain(std::iter::once(hit("  ", ProviderId::Brave)))
            .collect();

        let merged = merger.merge(&[(ProviderId::Brave, results)], 5);
        assert_eq!(merged.len(), 5);
        assert!(merged.iter().all(|r| !r.url.trim().is_empty()));
    }

    #[test]
    fn test_stamps_missing_provider() {
        let merger = ResultMerger::default();
        let mut unstamped = hit("https://u.example/", ProviderId::Brave);
        unstamped.provider = None;

        let merged = merger.merge(&[(ProviderId::Searxng, vec![unstamped])], 5);
        assert_eq!(merged[0].provider, Some(ProviderId::Searxng));
    }

    #[test]
    fn test_custom_priorities() {
        let merger = ResultMerger::new(HashMap::from([(ProviderId::DuckDuckGo, 9)]));
        let merged = merger.merge(
            &[
                (ProviderId::Google, vec![hit("https://g.example/", ProviderId::Google)]),
                (ProviderId::DuckDuckGo, vec![hit("https://d.example/", ProviderId::DuckDuckGo)]),
            ],
            5,
        );

        assert_eq!(merged[0].provider, Some(ProviderId::DuckDuckGo));
        assert_eq!(merger.priority(Some(ProviderId::Google)), 0);
    }

    #[test]
    fn test_canonical_url() {
        assert_eq!(canonical_url("HTTPS://Example.COM/a/#frag"), "https://example.com/a");
        assert_eq!(canonical_url("https://example.com"), "https://example.com");
        assert_eq!(canonical_url("https://example.com/?q=1"), "https://example.com/?q=1");
        assert_eq!(canonical_url(""), "");
    }
}
