//! Diagram rendering for fenced diagram blocks
//!
//! Diagram engines need more than a string transform (mermaid measures text
//! in a real browser), so they run as a second pass after the base markup
//! exists. The default engine is the mermaid CLI.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::Command;

use crate::config::MarkdownConfig;
use crate::error::{Error, Result};

/// Turns diagram source into a standalone SVG string
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, language: &str, source: &str) -> Result<String>;
}

/// Renders mermaid diagrams by shelling out to `mmdc`
#[derive(Debug, Clone)]
pub struct MermaidCli {
    program: String,
    timeout: Duration,
}

impl MermaidCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &MarkdownConfig) -> Self {
        Self::new(config.mermaid_cli.clone())
    }
}

impl Default for MermaidCli {
    fn default() -> Self {
        Self::from_config(&MarkdownConfig::default())
    }
}

#[async_trait]
impl DiagramRenderer for MermaidCli {
    async fn render(&self, language: &str, source: &str) -> Result<String> {
        if !language.eq_ignore_ascii_case("mermaid") {
            return Err(Error::Render(format!(
                "unsupported diagram language: {}",
                language
            )));
        }

        let dir = tempfile::tempdir().map_err(render_io)?;
        let input = dir.path().join("diagram.mmd");
        let output = dir.path().join("diagram.svg");
        tokio::fs::write(&input, source).await.map_err(render_io)?;

        let child = Command::new(&self.program)
            .arg("--quiet")
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| Error::Render(format!("{} timed out", self.program)))?
            .map_err(|e| Error::Render(format!("failed to run {}: {}", self.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let reason = stderr
                .lines()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("diagram syntax error");
            return Err(Error::Render(reason.trim().to_string()));
        }

        let svg = tokio::fs::read_to_string(&output).await.map_err(render_io)?;
        if !svg.contains("<svg") {
            return Err(Error::Render("renderer produced no SVG".to_string()));
        }
        Ok(svg)
    }
}

fn render_io(e: std::io::Error) -> Error {
    Error::Render(e.to_string())
}

static GLOBAL: OnceLock<Arc<dyn DiagramRenderer>> = OnceLock::new();

/// Install the process-wide diagram engine.
///
/// Only the first call wins; returns `false` if an engine was already set,
/// either by an earlier `install` or by `global()` initializing the default.
pub fn install(renderer: Arc<dyn DiagramRenderer>) -> bool {
    GLOBAL.set(renderer).is_ok()
}

/// The process-wide diagram engine, initialized to `MermaidCli` on first use
pub fn global() -> Arc<dyn DiagramRenderer> {
    GLOBAL
        .get_or_init(|| {
            tracing::debug!("Initializing default mermaid diagram engine");
            Arc::new(MermaidCli::default())
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_language() {
        let err = MermaidCli::default()
            .render("plantuml", "@startuml\n@enduml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }

    #[tokio::test]
    async fn test_missing_program_is_render_error() {
        let cli = MermaidCli::new("/nonexistent/mmdc-for-tests");
        let err = cli.render("mermaid", "graph TD; A-->B").await.unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }

    #[test]
    fn test_global_is_initialized_once() {
        let first = global();
        let second = global();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!install(Arc::new(MermaidCli::default())));
    }
}
