//! Clients for the retrieval backend: grounded answers, listings, stats.
//!
//! The query endpoint answers with an `event:`/`data:` stream which is fed
//! line-by-line through [`docent_core::rag::ResponseParser`]; token deltas
//! are forwarded to the caller while the response is still arriving.

use async_trait::async_trait;
use docent_core::rag::{RagResponse, ResponseParser};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("retrieval request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("retrieval backend returned status {0}")]
    Status(u16),
}

/// Speaker of one history entry sent for conversational context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior exchange included with a query.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CorpusStats {
    pub document_count: u64,
    pub chunk_count: u64,
}

/// The knowledge backend, as seen by the session core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RagBackend: Send + Sync {
    /// Asks the backend; `on_token` receives answer deltas as they stream.
    async fn query(
        &self,
        query: &str,
        history: &[HistoryTurn],
        on_token: mpsc::Sender<String>,
    ) -> Result<RagResponse, RagError>;

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, RagError>;
    async fn list_gaps(&self) -> Result<Vec<String>, RagError>;
    async fn corpus_stats(&self) -> Result<CorpusStats, RagError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    privilege_mode: &'a str,
    max_tier: u8,
    history: &'a [HistoryTurn],
}

#[derive(Deserialize)]
struct DocumentsResponse {
    documents: Vec<DocumentSummary>,
}

#[derive(Deserialize)]
struct GapsResponse {
    gaps: Vec<String>,
}

/// HTTP client for the retrieval backend.
pub struct HttpRagClient {
    base_url: String,
    internal_token: String,
    privilege_mode: String,
    max_tier: u8,
    client: reqwest::Client,
}

impl HttpRagClient {
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        Self {
            base_url: config.rag_base_url.trim_end_matches('/').to_string(),
            internal_token: config.rag_internal_token.clone(),
            privilege_mode: config.rag_privilege_mode.clone(),
            max_tier: config.rag_max_tier,
            client,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("x-internal-auth", &self.internal_token)
    }
}

#[async_trait]
impl RagBackend for HttpRagClient {
    async fn query(
        &self,
        query: &str,
        history: &[HistoryTurn],
        on_token: mpsc::Sender<String>,
    ) -> Result<RagResponse, RagError> {
        let request = QueryRequest {
            query,
            privilege_mode: &self.privilege_mode,
            max_tier: self.max_tier,
            history,
        };

        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .header("x-internal-auth", &self.internal_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Status(status.as_u16()));
        }

        let mut parser = ResponseParser::new();
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            buffer.push_str(&String::from_utf8_lossy(&chunk?));
            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                if let Some(token) = parser.push_line(line.trim_end_matches('\n')) {
                    // The receiver may be gone after a barge-in; the answer
                    // still completes for the caller to discard.
                    let _ = on_token.send(token).await;
                }
            }
        }
        if !buffer.is_empty() {
            if let Some(token) = parser.push_line(&buffer) {
                let _ = on_token.send(token).await;
            }
        }

        Ok(parser.finish())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, RagError> {
        let response = self.get("/documents").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Status(status.as_u16()));
        }
        let payload: DocumentsResponse = response.json().await?;
        Ok(payload.documents)
    }

    async fn list_gaps(&self) -> Result<Vec<String>, RagError> {
        let response = self.get("/gaps").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Status(status.as_u16()));
        }
        let payload: GapsResponse = response.json().await?;
        Ok(payload.gaps)
    }

    async fn corpus_stats(&self) -> Result<CorpusStats, RagError> {
        let response = self.get("/stats").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}
