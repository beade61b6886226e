//! Asynchronous markdown rendering with a loading/error state machine

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::diagram::{self, DiagramRenderer};
use super::markdown::MarkdownRenderer;
use crate::config::MarkdownConfig;
use crate::error::{Error, Result};
use crate::helpers::html_escape;

/// Full pipeline: parse, transform, serialize, then the diagram pass
#[derive(Clone)]
pub struct MarkdownPipeline {
    renderer: Arc<MarkdownRenderer>,
    diagrams: Arc<dyn DiagramRenderer>,
}

impl MarkdownPipeline {
    /// Pipeline using the process-wide diagram engine
    pub fn new(config: &MarkdownConfig) -> Self {
        Self::with_diagrams(config, diagram::global())
    }

    pub fn with_diagrams(config: &MarkdownConfig, diagrams: Arc<dyn DiagramRenderer>) -> Self {
        Self {
            renderer: Arc::new(MarkdownRenderer::with_config(config)),
            diagrams,
        }
    }

    pub fn renderer(&self) -> &MarkdownRenderer {
        &self.renderer
    }

    /// Render markdown to final HTML
    pub async fn render(&self, markdown: &str) -> Result<String> {
        let document = self.renderer.render(markdown)?;
        if !document.has_diagrams() {
            return Ok(document.to_html());
        }
        let (html, report) = document.resolve_diagrams(&self.diagrams).await;
        tracing::debug!(
            "Rendered {} diagram(s), {} failed",
            report.rendered.len(),
            report.failed.len()
        );
        Ok(html)
    }

    /// Render in its own task so a panic in the first pass fails this document only
    pub async fn render_isolated(&self, markdown: String) -> Result<String> {
        let pipeline = self.clone();
        match tokio::spawn(async move { pipeline.render(&markdown).await }).await {
            Ok(result) => result,
            Err(e) => Err(Error::Render(format!("renderer crashed: {}", e))),
        }
    }
}

/// Where a view is in rendering its current input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    /// No input yet
    Idle,
    Processing,
    Ready(String),
    /// Rendering failed; holds the error message
    Failed(String),
}

/// Result of handing a view new input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The render finished and its result is now the view's state
    Applied(RenderState),
    /// Newer input arrived while rendering; the result was dropped
    Superseded,
    /// Same input as before; nothing was re-rendered
    Unchanged(RenderState),
}

struct ViewState {
    state: RenderState,
    input: Option<String>,
    /// Token of the most recent render request
    latest: u64,
}

/// A region of a page that displays one markdown document.
///
/// Clones share state. When inputs change faster than they render, only the
/// result for the newest input is applied.
#[derive(Clone)]
pub struct MarkdownView {
    pipeline: MarkdownPipeline,
    inner: Arc<Mutex<ViewState>>,
}

impl MarkdownView {
    pub fn new(pipeline: MarkdownPipeline) -> Self {
        Self {
            pipeline,
            inner: Arc::new(Mutex::new(ViewState {
                state: RenderState::Idle,
                input: None,
                latest: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RenderState {
        self.lock().state.clone()
    }

    /// Set the markdown to display and render it
    pub async fn set_input(&self, markdown: impl Into<String>) -> RenderOutcome {
        let markdown = markdown.into();
        let token = {
            let mut view = self.lock();
            if view.input.as_deref() == Some(markdown.as_str()) {
                return RenderOutcome::Unchanged(view.state.clone());
            }
            view.input = Some(markdown.clone());
            begin(&mut view)
        };
        self.run(token, markdown).await
    }

    /// Render the current input again
    pub async fn rerender(&self) -> RenderOutcome {
        let (token, markdown) = {
            let mut view = self.lock();
            let Some(markdown) = view.input.clone() else {
                return RenderOutcome::Unchanged(view.state.clone());
            };
            (begin(&mut view), markdown)
        };
        self.run(token, markdown).await
    }

    async fn run(&self, token: u64, markdown: String) -> RenderOutcome {
        let next = if markdown.trim().is_empty() {
            RenderState::Ready(String::new())
        } else {
            match self.pipeline.render_isolated(markdown).await {
                Ok(html) => RenderState::Ready(html),
                Err(e) => {
                    tracing::error!("Error processing markdown: {}", e);
                    RenderState::Failed(e.to_string())
                }
            }
        };

        let mut view = self.lock();
        if view.latest != token {
            tracing::debug!("Discarding stale render {} (latest is {})", token, view.latest);
            return RenderOutcome::Superseded;
        }
        view.state = next.clone();
        RenderOutcome::Applied(next)
    }

    /// Markup for the view's region in its current state
    pub fn display_html(&self) -> String {
        match self.state() {
            RenderState::Idle => String::new(),
            RenderState::Processing => {
                r#"<div class="markdown-loading">Loading content...</div>"#.to_string()
            }
            RenderState::Ready(html) => format!(r#"<div class="markdown-content">{}</div>"#, html),
            RenderState::Failed(message) => format!(
                r#"<div class="markdown-error">Error rendering content: {}</div>"#,
                html_escape(&message)
            ),
        }
    }
}

fn begin(view: &mut ViewState) -> u64 {
    view.latest += 1;
    view.state = RenderState::Processing;
    view.latest
}
