//! Content module - posts, markdown rendering and diagrams

pub mod diagram;
mod markdown;
mod post;
mod render;

pub use diagram::{DiagramRenderer, MermaidCli};
pub use markdown::{DiagramBlock, DiagramReport, MarkdownRenderer, RenderedDocument};
pub use post::{Post, PostContent, PostId, PostKind, PostType};
pub use render::{MarkdownPipeline, MarkdownView, RenderOutcome, RenderState};
