//! # Delver Core
//!
//! Core library for the Delver deep-research engine. Given a research
//! question it plans sub-queries, retrieves sources through an injected
//! retriever, extracts learnings through an injected LLM provider, explores
//! follow-up queries as a bounded concurrent tree, deduplicates sources and
//! learnings across branches, and hands the merged context to a report
//! writer.
//!
//! Retrieval, completion, report writing, and progress transport are all
//! narrow trait seams; this crate ships mock implementations for each so
//! the engine can be exercised without any network dependency.

pub mod branch;
pub mod budget;
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod retrieval;
pub mod scheduler;

// Re-export commonly used types at the crate root.
pub use branch::BranchExecutor;
pub use budget::{BudgetCost, BudgetTracker, BudgetUsage};
pub use config::{ResearchConfig, load_config};
pub use error::{ConfigError, DelverError, LlmError, Result, RetrievalError};
pub use llm::{
    CompletionProvider, CompletionRequest, CompletionResponse, Message, MockCompletionProvider,
    Role, TokenUsage,
};
pub use model::{
    AggregatedContext, Learning, NodeResult, NodeStatus, ResearchNode, ResearchQuery,
    SourceDocument,
};
pub use orchestrator::{DeepResearchOrchestrator, RunOutput};
pub use progress::{
    CollectingProgressSink, NoOpProgressSink, ProgressEvent, ProgressSink, ProgressStage,
    TracingProgressSink,
};
pub use report::{LlmReportWriter, MarkdownReportWriter, ReportWriter};
pub use retrieval::{Retriever, StaticRetriever};
pub use scheduler::{BatchOutcome, BoundedScheduler};
