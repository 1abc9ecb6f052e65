use std::process::Stdio;

use async_trait::async_trait;
use sqlpad_core::plan_render::{GraphEngine, GraphEngineLoader, RenderError};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

/// Locates a Graphviz `dot` executable.
#[derive(Debug, Clone)]
pub struct DotCommandLoader {
    binary: String,
}

impl DotCommandLoader {
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for DotCommandLoader {
    fn default() -> Self {
        Self::new("dot")
    }
}

#[async_trait]
impl GraphEngineLoader for DotCommandLoader {
    type Engine = DotCommandEngine;

    async fn load(&self) -> Result<Self::Engine, RenderError> {
        let output = Command::new(&self.binary)
            .arg("-V")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|error| {
                RenderError::EngineUnavailable(format!("failed to run `{}`: {error}", self.binary))
            })?;
        if !output.status.success() {
            return Err(RenderError::EngineUnavailable(format!(
                "`{} -V` exited with {}",
                self.binary, output.status
            )));
        }

        // dot prints its version banner on stderr.
        let version = String::from_utf8_lossy(&output.stderr).trim().to_string();
        info!(binary = self.binary.as_str(), version = version.as_str(), "graphviz engine ready");
        Ok(DotCommandEngine {
            binary: self.binary.clone(),
        })
    }
}

/// Renders DOT text to SVG by piping it through `dot -Tsvg`.
#[derive(Debug, Clone)]
pub struct DotCommandEngine {
    binary: String,
}

#[async_trait]
impl GraphEngine for DotCommandEngine {
    async fn render_svg(&self, dot: &str) -> Result<String, RenderError> {
        let mut child = Command::new(&self.binary)
            .arg("-Tsvg")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| RenderError::Render(format!("failed to spawn `{}`: {error}", self.binary)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::Render("dot stdin unavailable".to_string()))?;
        let source = dot.as_bytes().to_vec();
        let feed = async move {
            let written = stdin.write_all(&source).await;
            drop(stdin);
            written
        };

        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|error| RenderError::Render(error.to_string()))?;
        written.map_err(|error| RenderError::Render(format!("failed to write graph: {error}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Render(stderr.trim().to_string()));
        }
        String::from_utf8(output.stdout).map_err(|error| RenderError::Render(error.to_string()))
    }
}
