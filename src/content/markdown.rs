//! Markdown rendering with syntax highlighting and diagram blocks

use std::borrow::Cow;
use std::sync::Arc;

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use super::diagram::DiagramRenderer;
use crate::config::MarkdownConfig;
use crate::error::{Error, Result};
use crate::helpers::html_escape;

/// Separates diagram placeholders in the intermediate HTML. NUL is replaced
/// in the input before parsing, so the marker cannot come from user content.
const MARKER: char = '\0';

/// Markdown renderer with syntax highlighting
pub struct MarkdownRenderer {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    theme_name: String,
    highlight: bool,
    line_numbers: bool,
    allow_raw_html: bool,
    diagram_languages: Vec<String>,
    max_input_bytes: usize,
}

/// A fenced code block that describes a diagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// Position among the document's diagrams, starting at 0
    pub index: usize,
    pub language: String,
    pub source: String,
}

impl DiagramBlock {
    /// The block as it appears before (or instead of) diagram rendering
    pub fn source_html(&self) -> String {
        format!(
            r#"<pre class="diagram-source" data-diagram="{}"><code class="language-{}">{}</code></pre>"#,
            self.index,
            html_escape(&self.language),
            html_escape(&self.source)
        )
    }

    fn rendered_html(&self, svg: &str) -> String {
        format!(
            r#"<figure class="diagram diagram-{}" data-diagram="{}">{}</figure>"#,
            html_escape(&self.language),
            self.index,
            svg.trim()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Html(String),
    Diagram(DiagramBlock),
}

/// Output of the first rendering pass: HTML with diagram blocks kept apart
/// so a second pass can splice rendered images in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    segments: Vec<Segment>,
}

/// What happened to each diagram during the second pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagramReport {
    pub rendered: Vec<usize>,
    pub failed: Vec<(usize, String)>,
}

impl RenderedDocument {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn diagrams(&self) -> impl Iterator<Item = &DiagramBlock> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Diagram(block) => Some(block),
            Segment::Html(_) => None,
        })
    }

    pub fn has_diagrams(&self) -> bool {
        self.diagrams().next().is_some()
    }

    /// Base markup, with every diagram shown as its source code block
    pub fn to_html(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Html(html) => html.clone(),
                Segment::Diagram(block) => block.source_html(),
            })
            .collect()
    }

    /// Second pass: render each diagram in its own task and splice it in.
    ///
    /// A diagram that fails, or whose engine panics, keeps its source block;
    /// the others are unaffected.
    pub async fn resolve_diagrams(
        &self,
        renderer: &Arc<dyn DiagramRenderer>,
    ) -> (String, DiagramReport) {
        let mut pending = self
            .diagrams()
            .map(|block| {
                let renderer = renderer.clone();
                let language = block.language.clone();
                let source = block.source.clone();
                tokio::spawn(async move { renderer.render(&language, &source).await })
            })
            .collect::<Vec<_>>()
            .into_iter();

        let mut output = String::new();
        let mut report = DiagramReport::default();

        for segment in &self.segments {
            match segment {
                Segment::Html(html) => output.push_str(html),
                Segment::Diagram(block) => {
                    let result = match pending.next() {
                        Some(task) => task.await.unwrap_or_else(|e| {
                            Err(Error::Render(format!("diagram engine crashed: {}", e)))
                        }),
                        None => Err(Error::Render("diagram was not scheduled".to_string())),
                    };
                    match result {
                        Ok(svg) => {
                            output.push_str(&block.rendered_html(&svg));
                            report.rendered.push(block.index);
                        }
                        Err(e) => {
                            tracing::warn!("Diagram {} failed to render: {}", block.index, e);
                            output.push_str(&block.source_html());
                            report.failed.push((block.index, e.to_string()));
                        }
                    }
                }
            }
        }

        (output, report)
    }
}

impl MarkdownRenderer {
    /// Create a new markdown renderer
    pub fn new() -> Self {
        Self::with_config(&MarkdownConfig::default())
    }

    /// Create with custom settings
    pub fn with_config(config: &MarkdownConfig) -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            theme_name: config.highlight.theme.clone(),
            highlight: config.highlight.enable,
            line_numbers: config.highlight.line_numbers,
            allow_raw_html: config.allow_raw_html,
            max_input_bytes: config.max_input_bytes,
            diagram_languages: config
                .diagram_languages
                .iter()
                .map(|lang| lang.to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_diagram(&self, lang: &str) -> bool {
        self.diagram_languages
            .iter()
            .any(|known| known.eq_ignore_ascii_case(lang))
    }

    /// Render markdown to a document. Empty input yields an empty document.
    pub fn render(&self, markdown: &str) -> Result<RenderedDocument> {
        if markdown.trim().is_empty() {
            return Ok(RenderedDocument::default());
        }
        if markdown.len() > self.max_input_bytes {
            return Err(Error::Render(format!(
                "document is {} bytes, the limit is {}",
                markdown.len(),
                self.max_input_bytes
            )));
        }

        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_GFM;
        let markdown = if markdown.contains(MARKER) {
            Cow::Owned(markdown.replace(MARKER, "\u{FFFD}"))
        } else {
            Cow::Borrowed(markdown)
        };
        let parser = Parser::new_ext(&markdown, options);

        let mut events: Vec<Event> = Vec::new();
        let mut diagrams: Vec<DiagramBlock> = Vec::new();
        let mut in_code_block = false;
        let mut code_block_lang: Option<String> = None;
        let mut code_block_content = String::new();

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    in_code_block = true;
                    code_block_lang = match kind {
                        CodeBlockKind::Fenced(info) => {
                            info.split_whitespace().next().map(str::to_string)
                        }
                        CodeBlockKind::Indented => None,
                    };
                    code_block_content.clear();
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    let lang = code_block_lang.take();
                    match lang {
                        Some(lang) if self.is_diagram(&lang) => {
                            let index = diagrams.len();
                            diagrams.push(DiagramBlock {
                                index,
                                language: lang.to_ascii_lowercase(),
                                source: code_block_content.clone(),
                            });
                            events.push(Event::Html(CowStr::from(format!(
                                "{}{}{}",
                                MARKER, index, MARKER
                            ))));
                        }
                        lang => {
                            let highlighted =
                                self.highlight_code(&code_block_content, lang.as_deref());
                            events.push(Event::Html(CowStr::from(highlighted)));
                        }
                    }
                }
                Event::Text(text) if in_code_block => {
                    code_block_content.push_str(&text);
                }
                Event::Html(raw) | Event::InlineHtml(raw) if !self.allow_raw_html => {
                    events.push(Event::Text(raw));
                }
                _ => events.push(event),
            }
        }

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());

        Ok(split_markers(&html_output, diagrams))
    }

    /// Highlight a code block
    fn highlight_code(&self, code: &str, lang: Option<&str>) -> String {
        let lang = lang.unwrap_or("text");
        let class = html_escape(lang);

        let plain = || {
            format!(
                r#"<pre><code class="language-{}">{}</code></pre>"#,
                class,
                html_escape(code)
            )
        };

        if !self.highlight {
            return plain();
        }

        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let Some(theme) = self
            .theme_set
            .themes
            .get(&self.theme_name)
            .or_else(|| self.theme_set.themes.values().next())
        else {
            return plain();
        };

        match highlighted_html_for_string(code, &self.syntax_set, syntax, theme) {
            Ok(highlighted) if self.line_numbers => self.add_line_numbers(&highlighted, &class),
            Ok(highlighted) => format!(r#"<figure class="highlight {}">{}</figure>"#, class, highlighted),
            Err(e) => {
                tracing::debug!("Highlighting {} failed: {}", lang, e);
                plain()
            }
        }
    }

    /// Add line numbers to highlighted code
    fn add_line_numbers(&self, code: &str, class: &str) -> String {
        let lines: Vec<&str> = code.lines().collect();

        let gutter = (1..=lines.len())
            .map(|n| format!(r#"<span class="line-number">{}</span>"#, n))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"<figure class="highlight {}"><table><tr><td class="gutter"><pre>{}</pre></td><td class="code">{}</td></tr></table></figure>"#,
            class,
            gutter,
            lines.join("\n")
        )
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Cut the rendered HTML at diagram markers. Markers come in pairs around a
/// diagram index, so odd-numbered pieces are indices.
fn split_markers(html: &str, diagrams: Vec<DiagramBlock>) -> RenderedDocument {
    let mut blocks = diagrams.into_iter();
    let mut segments = Vec::new();

    for (i, piece) in html.split(MARKER).enumerate() {
        if i % 2 == 1 {
            if let Some(block) = blocks.next() {
                debug_assert_eq!(piece, block.index.to_string());
                segments.push(Segment::Diagram(block));
            }
        } else if !piece.is_empty() {
            segments.push(Segment::Html(piece.to_string()));
        }
    }

    RenderedDocument { segments }
}
