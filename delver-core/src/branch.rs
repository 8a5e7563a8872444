//! Branch execution: one research node's unit of work.
//!
//! A branch reserves budget, retrieves sources, deduplicates them against
//! its lineage, extracts learnings and follow-up sub-queries via the LLM,
//! and reports progress along the way. Everything reachable from external
//! I/O is recoverable-to-empty; a branch only carries `Failed` status for
//! contract violations, which are caught before execution ever starts.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::budget::{BudgetCost, BudgetTracker};
use crate::llm::{parse_json_block, CompletionProvider, CompletionRequest, Message};
use crate::model::{Learning, NodeResult, NodeStatus, ResearchNode, SourceDocument};
use crate::progress::{ProgressEvent, ProgressSink, ProgressStage};
use crate::retrieval::Retriever;

/// Output tokens reserved per extraction call on top of the prompt
/// estimate; reconciled against actual usage afterwards.
const EXTRACTION_OUTPUT_ALLOWANCE: u64 = 512;

/// How much raw content per source goes into the extraction prompt.
const PROMPT_CONTENT_LIMIT: usize = 1_500;

/// Executes a single research branch.
pub struct BranchExecutor {
    retriever: Arc<dyn Retriever>,
    provider: Arc<dyn CompletionProvider>,
    sink: Arc<dyn ProgressSink>,
    budget: Arc<BudgetTracker>,
    max_depth: usize,
}

impl BranchExecutor {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        provider: Arc<dyn CompletionProvider>,
        sink: Arc<dyn ProgressSink>,
        budget: Arc<BudgetTracker>,
        max_depth: usize,
    ) -> Self {
        Self {
            retriever,
            provider,
            sink,
            budget,
            max_depth,
        }
    }

    /// Execute one node's unit of work.
    ///
    /// `seen_urls` is the lineage's accumulated set of normalized URLs,
    /// passed down read-only; sources already known there are dropped
    /// before extraction. The returned result contains this node's
    /// deduplicated sources, its learnings, and follow-up sub-queries
    /// already clamped to `breadth_remaining` (empty when the node is a
    /// leaf).
    pub async fn run_node(
        &self,
        node: &mut ResearchNode,
        seen_urls: &BTreeSet<String>,
    ) -> NodeResult {
        node.status = NodeStatus::Running;
        self.emit(node, ProgressStage::Started);

        let mut result = NodeResult::empty();

        // Budget gate for the retrieval query. Exhaustion is a graceful
        // early stop, not a failure.
        let retrieval_cost = BudgetCost::query();
        if !self.budget.reserve(retrieval_cost) {
            debug!(query = %node.query.text, "budget exhausted before retrieval, completing empty");
            node.status = NodeStatus::Completed;
            self.emit(node, ProgressStage::Finished);
            return result;
        }

        let retrieved = match self.retriever.search(&node.query.text).await {
            Ok(sources) => sources,
            Err(err) => {
                // Partial source loss in one branch must not abort siblings
                // or the parent.
                warn!(query = %node.query.text, error = %err, "retrieval failed, continuing with zero sources");
                Vec::new()
            }
        };
        let fresh: Vec<SourceDocument> = retrieved
            .into_iter()
            .filter(|doc| !seen_urls.contains(&doc.normalized_url()))
            .collect();
        result.add_sources(fresh);
        self.emit(node, ProgressStage::Retrieved);

        self.extract(node, &mut result).await;
        self.emit(node, ProgressStage::Extracted);

        node.status = NodeStatus::Completed;
        self.emit(node, ProgressStage::Finished);
        result
    }

    /// Extract learnings and follow-up sub-queries from the retrieved
    /// sources. LLM faults and malformed output both degrade to "nothing
    /// extracted".
    async fn extract(&self, node: &ResearchNode, result: &mut NodeResult) {
        if result.sources.is_empty() {
            debug!(query = %node.query.text, "no sources to extract from");
            return;
        }

        let want_sub_queries = node.depth_remaining > 0;
        let request = build_extraction_request(node, &result.sources, want_sub_queries);

        let estimated = BudgetCost::tokens(request.estimate_tokens() + EXTRACTION_OUTPUT_ALLOWANCE);
        if !self.budget.reserve(estimated) {
            debug!(query = %node.query.text, "budget exhausted before extraction");
            return;
        }

        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(query = %node.query.text, error = %err, "extraction call failed, keeping sources only");
                self.budget.release(estimated, BudgetCost::default());
                return;
            }
        };
        self.budget
            .release(estimated, BudgetCost::tokens(response.usage.total()));

        let extraction = parse_extraction(&response.content);
        let known_urls: BTreeSet<String> = result.sources.iter().map(|d| d.url.clone()).collect();
        let own_urls = known_urls.clone();

        let mut learnings = Vec::new();
        for payload in extraction.learnings {
            let text = payload.text.trim();
            if text.is_empty() {
                continue;
            }
            let cited: BTreeSet<String> = payload
                .source_urls
                .into_iter()
                .filter(|u| known_urls.contains(u))
                .collect();
            // Every learning cites sources known to the run; when the LLM
            // cites nothing recognizable, attribute it to the sources it
            // was extracted from.
            let source_urls = if cited.is_empty() {
                own_urls.clone()
            } else {
                cited
            };
            learnings.push(Learning {
                text: text.to_string(),
                source_urls,
            });
        }
        result.add_learnings(learnings);

        if want_sub_queries {
            result.suggested_sub_queries =
                clamp_sub_queries(extraction.follow_up_queries, node.breadth_remaining);
        }
    }

    fn emit(&self, node: &ResearchNode, stage: ProgressStage) {
        self.sink
            .report(ProgressEvent::for_node(node, self.max_depth, stage, node.status));
    }
}

/// Clamp LLM-proposed sub-queries to the node's breadth: truncate when
/// more are proposed, accept fewer as-is, never pad. Blank proposals are
/// dropped before clamping.
pub fn clamp_sub_queries(proposed: Vec<String>, breadth: usize) -> Vec<String> {
    proposed
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(breadth)
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    learnings: Vec<LearningPayload>,
    #[serde(default, alias = "followUpQueries", alias = "sub_queries")]
    follow_up_queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LearningPayload {
    text: String,
    #[serde(default, alias = "sourceUrls")]
    source_urls: Vec<String>,
}

/// Best-effort parse of the extraction response. Malformed output means
/// zero learnings and zero sub-queries, never an error.
fn parse_extraction(content: &str) -> ExtractionPayload {
    let Some(value) = parse_json_block(content) else {
        debug!("extraction response carried no parsable JSON");
        return ExtractionPayload::default();
    };
    serde_json::from_value(value).unwrap_or_else(|err| {
        debug!(error = %err, "extraction JSON did not match expected shape");
        ExtractionPayload::default()
    })
}

fn build_extraction_request(
    node: &ResearchNode,
    sources: &[SourceDocument],
    want_sub_queries: bool,
) -> CompletionRequest {
    let mut prompt = format!(
        "Research query: {}\n",
        node.query.text
    );
    if let Some(parent) = &node.query.parent_text {
        prompt.push_str(&format!("This refines the broader query: {parent}\n"));
    }
    prompt.push_str("\nRetrieved sources:\n");
    for doc in sources {
        let mut content = doc.raw_content.as_str();
        if content.len() > PROMPT_CONTENT_LIMIT {
            let mut cut = PROMPT_CONTENT_LIMIT;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            content = &content[..cut];
        }
        prompt.push_str(&format!("- URL: {}\n  Title: {}\n  Content: {}\n", doc.url, doc.title, content));
    }
    prompt.push_str(
        "\nRespond with JSON: {\"learnings\": [{\"text\": string, \"source_urls\": [string]}]",
    );
    if want_sub_queries {
        prompt.push_str(&format!(
            ", \"follow_up_queries\": [up to {} strings]",
            node.breadth_remaining
        ));
    }
    prompt.push_str("}\n");

    CompletionRequest::from_messages(vec![
        Message::system(
            "You are a research assistant. Distill factual learnings from sources and \
             propose follow-up queries. Reply with JSON only.",
        ),
        Message::user(prompt),
    ])
}
