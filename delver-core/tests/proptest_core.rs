//! Property-based tests for the dedup and normalization invariants.

use proptest::prelude::*;
use std::collections::BTreeSet;

use delver_core::model::{
    Learning, NodeResult, SourceDocument, normalize_learning_text, normalize_url,
};

fn doc(url: &str, score: f64) -> SourceDocument {
    SourceDocument {
        url: url.to_string(),
        title: "t".to_string(),
        raw_content: String::new(),
        score,
    }
}

/// A URL that varies only in host case and trailing slash.
fn url_variant() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["a.com", "b.org", "c.net"]),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(host, upper, slash)| {
            let host = if upper {
                host.to_uppercase()
            } else {
                host.to_string()
            };
            let slash = if slash { "/" } else { "" };
            format!("https://{host}{slash}")
        })
}

proptest! {
    #[test]
    fn normalize_url_is_idempotent(url in url_variant()) {
        let once = normalize_url(&url);
        prop_assert_eq!(normalize_url(&once), once.clone());
    }

    #[test]
    fn url_variants_normalize_identically(
        host in prop::sample::select(vec!["a.com", "b.org", "c.net"]),
        upper in any::<bool>(),
        slash in any::<bool>(),
    ) {
        let plain = format!("https://{host}");
        let host_cased = if upper { host.to_uppercase() } else { host.to_string() };
        let variant = format!("https://{}{}", host_cased, if slash { "/" } else { "" });
        prop_assert_eq!(normalize_url(&variant), normalize_url(&plain));
    }

    #[test]
    fn aggregate_never_holds_duplicate_normalized_urls(
        entries in prop::collection::vec((url_variant(), 0.0f64..1.0), 1..40)
    ) {
        let mut result = NodeResult::empty();
        result.add_sources(entries.iter().map(|(url, score)| doc(url, *score)));

        let mut keys: Vec<String> = result.sources.iter().map(|s| normalize_url(&s.url)).collect();
        keys.sort();
        let before = keys.len();
        keys.dedup();
        prop_assert_eq!(keys.len(), before);
    }

    #[test]
    fn highest_score_survives_per_url(
        entries in prop::collection::vec((url_variant(), 0.0f64..1.0), 1..40)
    ) {
        let mut result = NodeResult::empty();
        result.add_sources(entries.iter().map(|(url, score)| doc(url, *score)));

        for source in &result.sources {
            let key = normalize_url(&source.url);
            let max = entries
                .iter()
                .filter(|(url, _)| normalize_url(url) == key)
                .map(|(_, score)| *score)
                .fold(f64::NEG_INFINITY, f64::max);
            prop_assert_eq!(source.score, max);
        }
    }

    #[test]
    fn source_merge_is_idempotent(
        entries in prop::collection::vec((url_variant(), 0.0f64..1.0), 0..20)
    ) {
        let mut result = NodeResult::empty();
        result.add_sources(entries.iter().map(|(url, score)| doc(url, *score)));

        let urls_before: Vec<String> = result.sources.iter().map(|s| s.url.clone()).collect();
        let copy = result.clone();
        result.merge(copy);
        let urls_after: Vec<String> = result.sources.iter().map(|s| s.url.clone()).collect();
        prop_assert_eq!(urls_before, urls_after);
    }

    #[test]
    fn learning_text_normalization_is_idempotent(text in "[ a-zA-Z0-9\\t]{0,60}") {
        let once = normalize_learning_text(&text);
        prop_assert_eq!(normalize_learning_text(&once), once.clone());
    }

    #[test]
    fn learning_dedup_unions_all_cited_urls(
        texts in prop::collection::vec(
            prop::sample::select(vec!["fact one", "FACT ONE", "fact  one", "another fact"]),
            1..20,
        )
    ) {
        let mut result = NodeResult::empty();
        for (i, text) in texts.iter().enumerate() {
            result.add_learnings([Learning::new(
                text.to_string(),
                [format!("https://s{i}.example")],
            )]);
        }

        // At most two distinct normalized texts exist in the input set
        prop_assert!(result.learnings.len() <= 2);
        let total_urls: usize = result.learnings.iter().map(|l| l.source_urls.len()).sum();
        prop_assert_eq!(total_urls, texts.len());
        for learning in &result.learnings {
            prop_assert!(!learning.source_urls.is_empty());
            let expected: BTreeSet<String> = texts
                .iter()
                .enumerate()
                .filter(|(_, t)| normalize_learning_text(t) == learning.normalized_text())
                .map(|(i, _)| format!("https://s{i}.example"))
                .collect();
            prop_assert_eq!(&learning.source_urls, &expected);
        }
    }
}
