//! Report writing.
//!
//! The engine hands the aggregated context to a `ReportWriter` and returns
//! whatever it produces alongside the raw aggregate. `MarkdownReportWriter`
//! renders a sectioned report without any LLM; `LlmReportWriter` prompts a
//! completion provider for long-form prose.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{CompletionProvider, CompletionRequest, Message};
use crate::model::AggregatedContext;

/// Turns an aggregated research context into a final report.
#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Write a markdown report from the aggregated context.
    async fn write(&self, context: &AggregatedContext) -> Result<String, LlmError>;
}

/// Renders the aggregate directly as sectioned markdown.
pub struct MarkdownReportWriter;

#[async_trait]
impl ReportWriter for MarkdownReportWriter {
    async fn write(&self, context: &AggregatedContext) -> Result<String, LlmError> {
        let mut out = format!("# Research Report: {}\n\n", context.question);

        out.push_str("## Key Learnings\n\n");
        if context.learnings.is_empty() {
            out.push_str("_No learnings were gathered._\n");
        }
        for (i, learning) in context.learnings.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, learning.text));
            for url in &learning.source_urls {
                out.push_str(&format!("   - {url}\n"));
            }
        }

        out.push_str("\n## Sources\n\n");
        if context.sources.is_empty() {
            out.push_str("_No sources were retrieved._\n");
        }
        for source in &context.sources {
            out.push_str(&format!(
                "- **{}** (score: {:.2})\n  {}\n",
                source.title, source.score, source.url
            ));
        }

        out.push_str(&format!(
            "\n---\n{} sources, {} learnings, {} nodes explored.\n",
            context.sources.len(),
            context.learnings.len(),
            context.nodes_explored,
        ));
        Ok(out)
    }
}

/// Writes the report by prompting a completion provider with the gathered
/// learnings and sources.
pub struct LlmReportWriter {
    provider: Arc<dyn CompletionProvider>,
}

impl LlmReportWriter {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ReportWriter for LlmReportWriter {
    async fn write(&self, context: &AggregatedContext) -> Result<String, LlmError> {
        let mut prompt = format!(
            "Write a structured markdown research report answering: {}\n\nLearnings:\n",
            context.question
        );
        for learning in &context.learnings {
            prompt.push_str(&format!("- {}\n", learning.text));
        }
        prompt.push_str("\nSources:\n");
        for source in &context.sources {
            prompt.push_str(&format!("- {} ({})\n", source.title, source.url));
        }

        let response = self
            .provider
            .complete(CompletionRequest::from_messages(vec![
                Message::system("You are a research report writer. Produce markdown."),
                Message::user(prompt),
            ]))
            .await?;
        Ok(response.content)
    }
}
