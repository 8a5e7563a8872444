//! Deep research orchestration.
//!
//! Owns the recursive expansion policy: run a node's own unit of work,
//! fan its follow-up sub-queries out into child nodes, execute them as a
//! bounded concurrent batch, and merge each child's subtree results upward
//! with deduplication. Children return results to their parent; nothing in
//! the tree shares mutable state, so the per-parent merge needs no locks.
//!
//! Scheduler permits cover a node's own retrieval/extraction only. The
//! recursion into grandchildren happens after the batch task has released
//! its permit, otherwise ancestors waiting on descendants would hold every
//! permit and the run would deadlock.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::branch::BranchExecutor;
use crate::budget::{BudgetTracker, BudgetUsage};
use crate::config::ResearchConfig;
use crate::error::{ConfigError, DelverError};
use crate::llm::CompletionProvider;
use crate::model::{AggregatedContext, NodeResult, ResearchNode, ResearchQuery};
use crate::progress::ProgressSink;
use crate::report::{MarkdownReportWriter, ReportWriter};
use crate::retrieval::Retriever;
use crate::scheduler::{BatchOutcome, BoundedScheduler};

/// Everything a research run produces: the raw aggregate for callers that
/// want to post-process, the written report, and budget accounting.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub context: AggregatedContext,
    pub report: String,
    pub usage: BudgetUsage,
}

/// Per-run state shared by the recursive expansion.
#[derive(Clone)]
struct RunContext {
    config: ResearchConfig,
    executor: Arc<BranchExecutor>,
    scheduler: Arc<BoundedScheduler>,
    budget: Arc<BudgetTracker>,
    cancel: CancellationToken,
}

/// The deep research orchestrator.
///
/// Holds the configuration and the collaborator seams; each call to
/// [`run`](Self::run) is an independent research run with its own budget
/// tracker and scheduler.
pub struct DeepResearchOrchestrator {
    config: ResearchConfig,
    retriever: Arc<dyn Retriever>,
    provider: Arc<dyn CompletionProvider>,
    writer: Arc<dyn ReportWriter>,
    sink: Arc<dyn ProgressSink>,
}

impl DeepResearchOrchestrator {
    pub fn new(
        config: ResearchConfig,
        retriever: Arc<dyn Retriever>,
        provider: Arc<dyn CompletionProvider>,
        writer: Arc<dyn ReportWriter>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            retriever,
            provider,
            writer,
            sink,
        }
    }

    /// Get the research config.
    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Run a full research exploration for `question`.
    pub async fn run(&self, question: &str) -> Result<RunOutput, DelverError> {
        self.run_cancellable(question, CancellationToken::new())
            .await
    }

    /// Run a research exploration that an external caller may cancel.
    ///
    /// Cancellation stops further expansion: queued branches are dropped,
    /// in-flight branches finish naturally, and everything gathered so far
    /// is still merged and reported. It is not an error.
    ///
    /// Returns `Err` only for contract violations (invalid configuration
    /// or an empty question), surfaced before any work starts.
    pub async fn run_cancellable(
        &self,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<RunOutput, DelverError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ConfigError::EmptyQuestion.into());
        }
        self.config.validate().map_err(DelverError::Config)?;

        let budget = Arc::new(BudgetTracker::from_config(&self.config));
        let executor = Arc::new(BranchExecutor::new(
            self.retriever.clone(),
            self.provider.clone(),
            self.sink.clone(),
            budget.clone(),
            self.config.depth,
        ));
        let ctx = RunContext {
            config: self.config.clone(),
            executor,
            scheduler: Arc::new(BoundedScheduler::new(self.config.concurrency_limit)),
            budget: budget.clone(),
            cancel,
        };

        info!(
            question,
            depth = self.config.depth,
            breadth = self.config.breadth,
            concurrency_limit = self.config.concurrency_limit,
            "starting research run"
        );

        let mut root = ResearchNode::root(
            ResearchQuery::root(question),
            self.config.depth,
            self.config.breadth,
        );
        let own = ctx.executor.run_node(&mut root, &BTreeSet::new()).await;
        let merged = expand(ctx, root, own, BTreeSet::new()).await;

        let context = AggregatedContext::from_result(question, merged);
        info!(
            sources = context.sources.len(),
            learnings = context.learnings.len(),
            nodes_explored = context.nodes_explored,
            "research run complete"
        );

        let report = match self.writer.write(&context).await {
            Ok(report) => report,
            Err(err) => {
                // Writer faults degrade to the built-in renderer; a run
                // that gathered context never fails at the reporting step.
                warn!(error = %err, "report writer failed, falling back to markdown renderer");
                MarkdownReportWriter
                    .write(&context)
                    .await
                    .unwrap_or_default()
            }
        };

        Ok(RunOutput {
            context,
            report,
            usage: budget.usage(),
        })
    }
}

/// Fan a node's suggested sub-queries out into child branches and merge
/// their subtree results into `result`.
///
/// Phase 1 submits every child's own unit of work to the scheduler as one
/// order-preserving bounded batch. Phase 2 recurses into the children's
/// own sub-queries concurrently, permit-free. Failed children are logged
/// and skipped; one bad branch never voids its siblings.
fn expand(
    ctx: RunContext,
    node: ResearchNode,
    mut result: NodeResult,
    seen_urls: BTreeSet<String>,
) -> BoxFuture<'static, NodeResult> {
    Box::pin(async move {
        if node.depth_remaining == 0 {
            return result;
        }
        let sub_queries = std::mem::take(&mut result.suggested_sub_queries);
        if sub_queries.is_empty() {
            return result;
        }
        if ctx.cancel.is_cancelled() {
            debug!(query = %node.query.text, "run cancelled, not expanding further");
            return result;
        }
        if ctx.budget.exhausted() {
            debug!(query = %node.query.text, "budget exhausted, not expanding further");
            return result;
        }

        // Children dedup against their full lineage, read-only.
        let mut child_seen = seen_urls;
        child_seen.extend(result.seen_urls());

        let total = sub_queries.len();
        let mut tasks = Vec::with_capacity(total);
        for (index, text) in sub_queries.into_iter().enumerate() {
            let mut child = node.child(
                ResearchQuery::follow_up(text, &node.query),
                ctx.config.breadth,
                index,
                total,
            );
            let ctx = ctx.clone();
            let child_seen = child_seen.clone();
            tasks.push(async move {
                let child_result = ctx.executor.run_node(&mut child, &child_seen).await;
                (child, child_result)
            });
        }
        let outcomes = ctx.scheduler.run_bounded(tasks, &ctx.cancel).await;

        let mut expansions = Vec::new();
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Completed((child, child_result)) => {
                    expansions.push(expand(
                        ctx.clone(),
                        child,
                        child_result,
                        child_seen.clone(),
                    ));
                }
                BatchOutcome::Skipped => {
                    debug!(parent = %node.query.text, "child branch dropped before start");
                }
                BatchOutcome::Failed(message) => {
                    warn!(parent = %node.query.text, %message, "child branch failed, continuing with siblings");
                }
            }
        }
        for child_result in futures::future::join_all(expansions).await {
            result.merge(child_result);
        }
        result
    })
}
