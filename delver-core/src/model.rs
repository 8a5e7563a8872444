//! Core value types for the research tree.
//!
//! Defines `SourceDocument` and `Learning` (the units of gathered
//! knowledge), `ResearchNode` (one node of the exploration tree), and
//! `NodeResult` (the per-node result object that children return upward).
//! All deduplication rules live here: sources dedup by normalized URL with
//! the higher score retained, learnings dedup by normalized text with
//! source-URL sets unioned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;
use uuid::Uuid;

/// A single research query and the query that spawned it.
///
/// The parent text is a back-reference used only for prompting context; it
/// is never traversed for lifecycle decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchQuery {
    /// The query text.
    pub text: String,
    /// Text of the query this one was derived from, if any.
    pub parent_text: Option<String>,
}

impl ResearchQuery {
    /// Create a root query with no parent.
    pub fn root(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parent_text: None,
        }
    }

    /// Create a follow-up query derived from a parent.
    pub fn follow_up(text: impl Into<String>, parent: &ResearchQuery) -> Self {
        Self {
            text: text.into(),
            parent_text: Some(parent.text.clone()),
        }
    }
}

/// A retrieved piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Source URL; the normalized form is the dedup key.
    pub url: String,
    /// Source title.
    pub title: String,
    /// Raw retrieved content.
    pub raw_content: String,
    /// Relevance score (higher is better).
    pub score: f64,
}

impl SourceDocument {
    /// The deduplication key for this document.
    pub fn normalized_url(&self) -> String {
        normalize_url(&self.url)
    }
}

/// Normalize a URL for deduplication: scheme and host lowercased, trailing
/// slash stripped. Unparsable URLs fall back to a lowercased, trimmed
/// string key so they still dedup against byte-identical copies.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        // The url crate lowercases scheme and host during parsing.
        Ok(parsed) => parsed.as_str().trim_end_matches('/').to_string(),
        Err(_) => raw.trim().trim_end_matches('/').to_lowercase(),
    }
}

/// A distilled fact derived from one or more source documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    /// The learning text.
    pub text: String,
    /// URLs of the sources this learning was derived from. Never empty.
    pub source_urls: BTreeSet<String>,
}

impl Learning {
    /// Create a learning citing the given source URLs.
    pub fn new(text: impl Into<String>, source_urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            text: text.into(),
            source_urls: source_urls.into_iter().collect(),
        }
    }

    /// The deduplication key for this learning.
    pub fn normalized_text(&self) -> String {
        normalize_learning_text(&self.text)
    }
}

/// Normalize learning text for deduplication: case-insensitive,
/// whitespace-collapsed exact match. No semantic similarity.
pub fn normalize_learning_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lifecycle status of a research node.
///
/// `Failed` is reserved for contract violations; branches that lose their
/// sources to transport faults still complete (with empty results).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One node in the exploration tree.
///
/// Nodes carry identity and limits only; gathered results travel upward in
/// `NodeResult` values so sibling branches never share mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchNode {
    /// Unique node identifier.
    pub id: Uuid,
    /// The query this node explores.
    pub query: ResearchQuery,
    /// Recursion levels left below this node. Zero means leaf.
    pub depth_remaining: usize,
    /// Maximum number of sub-queries this node may spawn.
    pub breadth_remaining: usize,
    /// Position among siblings (0-based).
    pub breadth_index: usize,
    /// Number of siblings at this node's level.
    pub total_breadth: usize,
    /// Current lifecycle status.
    pub status: NodeStatus,
    /// When this node was created.
    pub created_at: DateTime<Utc>,
}

impl ResearchNode {
    /// Create the root node of a run.
    pub fn root(query: ResearchQuery, depth: usize, breadth: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            query,
            depth_remaining: depth,
            breadth_remaining: breadth,
            breadth_index: 0,
            total_breadth: 1,
            status: NodeStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Create a child node one level below this one.
    ///
    /// Depth decreases by exactly one; breadth resets to the configured
    /// per-level bound rather than decrementing across levels.
    pub fn child(
        &self,
        query: ResearchQuery,
        breadth: usize,
        breadth_index: usize,
        total_breadth: usize,
    ) -> Self {
        debug_assert!(self.depth_remaining > 0, "leaf nodes spawn no children");
        Self {
            id: Uuid::new_v4(),
            query,
            depth_remaining: self.depth_remaining - 1,
            breadth_remaining: breadth,
            breadth_index,
            total_breadth,
            status: NodeStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Depth of this node below the root, given the configured max depth.
    pub fn level(&self, max_depth: usize) -> usize {
        max_depth - self.depth_remaining
    }
}

/// The result of exploring one node (and, after merging, its subtree).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeResult {
    /// Deduplicated sources, in first-seen order.
    pub sources: Vec<SourceDocument>,
    /// Deduplicated learnings, in first-seen order.
    pub learnings: Vec<Learning>,
    /// Follow-up sub-queries proposed for this node, already clamped to the
    /// node's breadth. Consumed by the orchestrator, not merged upward.
    pub suggested_sub_queries: Vec<String>,
    /// Number of nodes that contributed to this result.
    pub nodes_explored: usize,
}

impl NodeResult {
    /// Create an empty result counting a single explored node.
    pub fn empty() -> Self {
        Self {
            nodes_explored: 1,
            ..Default::default()
        }
    }

    /// Add sources, deduplicating by normalized URL.
    ///
    /// On a duplicate the higher-scoring document is retained, in the
    /// position the URL was first seen (keeps merging stable).
    pub fn add_sources(&mut self, incoming: impl IntoIterator<Item = SourceDocument>) {
        for doc in incoming {
            let key = doc.normalized_url();
            match self
                .sources
                .iter_mut()
                .find(|existing| existing.normalized_url() == key)
            {
                Some(existing) => {
                    if doc.score > existing.score {
                        *existing = doc;
                    }
                }
                None => self.sources.push(doc),
            }
        }
    }

    /// Add learnings, deduplicating by normalized text.
    ///
    /// On a duplicate the source-URL sets are unioned; first-seen text and
    /// order are kept.
    pub fn add_learnings(&mut self, incoming: impl IntoIterator<Item = Learning>) {
        for learning in incoming {
            let key = learning.normalized_text();
            match self
                .learnings
                .iter_mut()
                .find(|existing| existing.normalized_text() == key)
            {
                Some(existing) => {
                    existing.source_urls.extend(learning.source_urls);
                }
                None => self.learnings.push(learning),
            }
        }
    }

    /// Merge a child's result into this one.
    ///
    /// The child's suggested sub-queries are deliberately not carried
    /// upward; they only ever drive the child's own expansion.
    pub fn merge(&mut self, child: NodeResult) {
        self.add_sources(child.sources);
        self.add_learnings(child.learnings);
        self.nodes_explored += child.nodes_explored;
    }

    /// All normalized URLs currently in this result.
    pub fn seen_urls(&self) -> BTreeSet<String> {
        self.sources
            .iter()
            .map(|doc| doc.normalized_url())
            .collect()
    }
}

/// The fully merged, deduplicated output of a run, handed to the report
/// writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedContext {
    /// The original research question.
    pub question: String,
    /// Sources ordered by descending score, then first-seen (stable).
    pub sources: Vec<SourceDocument>,
    /// Learnings in first-seen order.
    pub learnings: Vec<Learning>,
    /// Number of tree nodes explored during the run.
    pub nodes_explored: usize,
}

impl AggregatedContext {
    /// Build the final context from the root's merged result.
    ///
    /// Ordering is a presentation concern for the report writer: a stable
    /// sort by descending score keeps ties in first-seen order.
    pub fn from_result(question: impl Into<String>, result: NodeResult) -> Self {
        let mut sources = result.sources;
        sources.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            question: question.into(),
            sources,
            learnings: result.learnings,
            nodes_explored: result.nodes_explored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(url: &str, score: f64) -> SourceDocument {
        SourceDocument {
            url: url.to_string(),
            title: format!("title for {url}"),
            raw_content: "content".to_string(),
            score,
        }
    }

    #[test]
    fn test_normalize_url_lowercases_scheme_and_host() {
        assert_eq!(normalize_url("HTTPS://X.com/"), "https://x.com");
        assert_eq!(
            normalize_url("https://Example.COM/Path/"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn test_normalize_url_preserves_path_case() {
        // Only scheme/host fold; paths stay case-sensitive.
        assert_ne!(
            normalize_url("https://x.com/A"),
            normalize_url("https://x.com/a")
        );
    }

    #[test]
    fn test_normalize_url_unparsable_fallback() {
        assert_eq!(normalize_url("Not A Url/"), "not a url");
    }

    #[test]
    fn test_normalize_learning_text() {
        assert_eq!(
            normalize_learning_text("  Rust is   FAST\n"),
            "rust is fast"
        );
    }

    #[test]
    fn test_add_sources_higher_score_wins() {
        let mut result = NodeResult::empty();
        result.add_sources([doc("https://x.com", 0.5)]);
        result.add_sources([doc("https://X.com/", 0.9)]);

        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].score, 0.9);
        assert_eq!(result.sources[0].url, "https://X.com/");
    }

    #[test]
    fn test_add_sources_lower_score_ignored() {
        let mut result = NodeResult::empty();
        result.add_sources([doc("https://x.com", 0.9)]);
        result.add_sources([doc("https://x.com/", 0.5)]);

        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].score, 0.9);
    }

    #[test]
    fn test_add_learnings_unions_source_urls() {
        let mut result = NodeResult::empty();
        result.add_learnings([Learning::new(
            "Rust is fast",
            ["https://a.com".to_string()],
        )]);
        result.add_learnings([Learning::new(
            "rust IS   fast",
            ["https://b.com".to_string()],
        )]);

        assert_eq!(result.learnings.len(), 1);
        assert_eq!(result.learnings[0].text, "Rust is fast");
        assert_eq!(result.learnings[0].source_urls.len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut result = NodeResult::empty();
        result.add_sources([doc("https://a.com", 0.7), doc("https://b.com", 0.4)]);
        result.add_learnings([Learning::new("fact one", ["https://a.com".to_string()])]);

        let before_sources = result.sources.clone();
        let before_learnings = result.learnings.clone();
        let copy = result.clone();
        result.merge(copy);

        assert_eq!(result.sources.len(), before_sources.len());
        assert_eq!(result.learnings.len(), before_learnings.len());
        for (merged, original) in result.sources.iter().zip(before_sources.iter()) {
            assert_eq!(merged.url, original.url);
            assert_eq!(merged.score, original.score);
        }
        for (merged, original) in result.learnings.iter().zip(before_learnings.iter()) {
            assert_eq!(merged.text, original.text);
            assert_eq!(merged.source_urls, original.source_urls);
        }
    }

    #[test]
    fn test_merge_counts_nodes() {
        let mut parent = NodeResult::empty();
        parent.merge(NodeResult::empty());
        parent.merge(NodeResult::empty());
        assert_eq!(parent.nodes_explored, 3);
    }

    #[test]
    fn test_aggregate_orders_by_score_then_first_seen() {
        let mut result = NodeResult::empty();
        result.add_sources([
            doc("https://low.com", 0.2),
            doc("https://tie-a.com", 0.5),
            doc("https://high.com", 0.9),
            doc("https://tie-b.com", 0.5),
        ]);

        let context = AggregatedContext::from_result("q", result);
        let urls: Vec<&str> = context.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://high.com",
                "https://tie-a.com",
                "https://tie-b.com",
                "https://low.com"
            ]
        );
    }

    #[test]
    fn test_child_node_decrements_depth_and_resets_breadth() {
        let root = ResearchNode::root(ResearchQuery::root("q"), 2, 4);
        let child = root.child(ResearchQuery::root("sub"), 4, 1, 3);
        assert_eq!(child.depth_remaining, 1);
        assert_eq!(child.breadth_remaining, 4);
        assert_eq!(child.breadth_index, 1);
        assert_eq!(child.total_breadth, 3);
        assert_eq!(child.level(2), 1);
    }
}
