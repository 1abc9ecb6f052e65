use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::query_runner::QueryResponse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("graph engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("graph rendering failed: {0}")]
    Render(String),
}

/// A loaded graph layout engine.
#[async_trait]
pub trait GraphEngine: Send + Sync {
    async fn render_svg(&self, dot: &str) -> Result<String, RenderError>;
}

/// Constructs a [`GraphEngine`]; construction may be slow, so it is deferred.
#[async_trait]
pub trait GraphEngineLoader: Send + Sync {
    type Engine: GraphEngine;

    async fn load(&self) -> Result<Self::Engine, RenderError>;
}

/// Object-safe rendering seam used by the query lifecycle.
#[async_trait]
pub trait GraphRenderer: Send + Sync {
    async fn render(&self, dot: &str) -> Result<String, RenderError>;
}

pub struct PlanRenderer<L: GraphEngineLoader> {
    loader: L,
    engine: OnceCell<L::Engine>,
}

impl<L: GraphEngineLoader + std::fmt::Debug> std::fmt::Debug for PlanRenderer<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanRenderer")
            .field("loader", &self.loader)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl<L: GraphEngineLoader> PlanRenderer<L> {
    #[must_use]
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            engine: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.engine.initialized()
    }

    async fn engine(&self) -> Result<&L::Engine, RenderError> {
        self.engine
            .get_or_try_init(|| async {
                debug!("loading graph engine");
                self.loader.load().await
            })
            .await
    }
}

#[async_trait]
impl<L: GraphEngineLoader> GraphRenderer for PlanRenderer<L> {
    async fn render(&self, dot: &str) -> Result<String, RenderError> {
        self.engine().await?.render_svg(dot).await
    }
}

/// Fills in `graph_image` when the response carries graph text.
///
/// Rendering failures are logged and leave the image empty; the rest of the
/// response is never touched.
pub async fn render_plan(renderer: &dyn GraphRenderer, response: &mut QueryResponse) {
    let Some(dot) = response.graph_text() else {
        return;
    };

    let rendered = renderer.render(dot).await;
    match rendered {
        Ok(svg) => response.graph_image = Some(svg),
        Err(error) => {
            warn!(%error, "failed to render graphviz plan");
            response.graph_image = None;
        }
    }
}
