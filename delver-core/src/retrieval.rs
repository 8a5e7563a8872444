//! Retriever collaborator seam.
//!
//! The engine consumes retrieval through this narrow trait; web search
//! APIs, document loaders, and vector stores all live behind it, outside
//! this crate. "No results" is an empty list, never an error.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::RetrievalError;
use crate::model::SourceDocument;

/// Trait for source retrieval.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Search for sources matching a query.
    ///
    /// Implementations return `Err` only for genuine transport faults; the
    /// engine contains those as zero sources for the affected branch.
    async fn search(&self, query: &str) -> Result<Vec<SourceDocument>, RetrievalError>;
}

/// A retriever serving canned results, for tests and offline development.
///
/// Results are keyed by query substring; the first registered key
/// contained in the query wins. Queries matching nothing return the
/// fallback set (empty by default).
pub struct StaticRetriever {
    by_substring: Vec<(String, Vec<SourceDocument>)>,
    fallback: Vec<SourceDocument>,
    fail_for: HashMap<String, String>,
}

impl StaticRetriever {
    pub fn new() -> Self {
        Self {
            by_substring: Vec::new(),
            fallback: Vec::new(),
            fail_for: HashMap::new(),
        }
    }

    /// Serve `sources` for any query containing `substring`.
    pub fn with_results(
        mut self,
        substring: impl Into<String>,
        sources: Vec<SourceDocument>,
    ) -> Self {
        self.by_substring.push((substring.into(), sources));
        self
    }

    /// Serve `sources` for queries that match nothing else.
    pub fn with_fallback(mut self, sources: Vec<SourceDocument>) -> Self {
        self.fallback = sources;
        self
    }

    /// Fail with a transport error for any query containing `substring`.
    pub fn failing_for(mut self, substring: impl Into<String>, message: impl Into<String>) -> Self {
        self.fail_for.insert(substring.into(), message.into());
        self
    }
}

impl Default for StaticRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, query: &str) -> Result<Vec<SourceDocument>, RetrievalError> {
        for (substring, message) in &self.fail_for {
            if query.contains(substring.as_str()) {
                return Err(RetrievalError::RequestFailed {
                    message: message.clone(),
                });
            }
        }
        for (substring, sources) in &self.by_substring {
            if query.contains(substring.as_str()) {
                return Ok(sources.clone());
            }
        }
        Ok(self.fallback.clone())
    }
}
