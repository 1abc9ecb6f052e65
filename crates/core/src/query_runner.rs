use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::plan_render::{render_plan, GraphRenderer};
use crate::statements::QueryRequest;

/// Marker cell the server uses for the row appended after a truncated result.
pub const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct QueryResponse {
    pub columns: Vec<(String, String)>,
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub logical_plan: Option<String>,
    #[serde(default)]
    pub physical_plan: Option<String>,
    #[serde(default)]
    pub graphviz: Option<String>,
    #[serde(skip)]
    pub graph_image: Option<String>,
}

impl QueryResponse {
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }

    #[must_use]
    pub fn logical_plan(&self) -> Option<&str> {
        non_blank(self.logical_plan.as_deref())
    }

    #[must_use]
    pub fn physical_plan(&self) -> Option<&str> {
        non_blank(self.physical_plan.as_deref())
    }

    #[must_use]
    pub fn graph_text(&self) -> Option<&str> {
        non_blank(self.graphviz.as_deref())
    }

    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.rows.last().is_some_and(|row| {
            !row.is_empty() && row.iter().all(|cell| cell == TRUNCATION_MARKER)
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryBackendError {
    #[error("{message}")]
    Rejected { message: String },
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn execute(&self, request: &QueryRequest) -> Result<QueryResponse, QueryBackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryState {
    #[default]
    Idle,
    Pending,
    Failed {
        message: String,
    },
    Succeeded(QueryResponse),
}

impl QueryState {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub fn response(&self) -> Option<&QueryResponse> {
        match self {
            Self::Succeeded(response) => Some(response),
            Self::Idle | Self::Pending | Self::Failed { .. } => None,
        }
    }
}

pub type QueryStateWatch = watch::Receiver<QueryState>;

/// Owns the published state of the most recently submitted request.
///
/// Every call to [`QueryLifecycle::execute`] takes a new ticket; a resolution
/// is published only while its ticket is still the latest one issued, so a
/// slow earlier request can never overwrite a newer result.
pub struct QueryLifecycle<B: QueryBackend> {
    backend: B,
    renderer: Option<Arc<dyn GraphRenderer>>,
    state: watch::Sender<QueryState>,
    latest_ticket: AtomicU64,
}

impl<B: QueryBackend + std::fmt::Debug> std::fmt::Debug for QueryLifecycle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryLifecycle")
            .field("backend", &self.backend)
            .field("has_renderer", &self.renderer.is_some())
            .field("latest_ticket", &self.latest_ticket)
            .finish_non_exhaustive()
    }
}

impl<B: QueryBackend> QueryLifecycle<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        let (state, _) = watch::channel(QueryState::Idle);
        Self {
            backend,
            renderer: None,
            state,
            latest_ticket: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn GraphRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> QueryStateWatch {
        self.state.subscribe()
    }

    /// Runs `request` and returns the state it resolved to.
    ///
    /// The returned state is this call's own outcome; it is only published
    /// when no newer call was issued in the meantime.
    pub async fn execute(&self, request: QueryRequest) -> QueryState {
        let ticket = self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(ticket, QueryState::Pending);
        debug!(
            ticket,
            statements = request.stmts.len(),
            distributed = request.distributed,
            "submitting query"
        );

        let outcome = match self.backend.execute(&request).await {
            Ok(mut response) => {
                if let Some(renderer) = &self.renderer {
                    render_plan(renderer.as_ref(), &mut response).await;
                }
                QueryState::Succeeded(response)
            }
            Err(error) => {
                warn!(ticket, %error, "query failed");
                QueryState::Failed {
                    message: error.to_string(),
                }
            }
        };

        if !self.publish(ticket, outcome.clone()) {
            debug!(ticket, "discarding superseded query result");
        }
        outcome
    }

    fn publish(&self, ticket: u64, next: QueryState) -> bool {
        self.state.send_if_modified(|current| {
            if self.latest_ticket.load(Ordering::SeqCst) != ticket {
                return false;
            }
            *current = next;
            true
        })
    }
}
