//! Builtin document operations: Markdown conversion, docs indexing and audio
//! transcription.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};
use tracing::{info, warn};

use super::{to_pretty_json, write_output};
use crate::operations::{Operation, OperationContext};

/// Placeholder written when no speech-to-text backend is available.
const TRANSCRIPT_PLACEHOLDER: &str = "(Mock transcription)";

/// Renders Markdown into a standalone HTML document.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, parser);

    format!("<html><body>\n{body}</body></html>\n")
}

// ── convert_markdown ─────────────────────────────────────

pub struct ConvertMarkdownOperation {
    input: String,
    output: String,
}

impl ConvertMarkdownOperation {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

#[async_trait]
impl Operation for ConvertMarkdownOperation {
    fn name(&self) -> &str {
        "convert_markdown"
    }

    fn keyword(&self) -> &str {
        "convert markdown"
    }

    fn description(&self) -> &str {
        "Convert the configured Markdown file to HTML."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.input.as_str(), self.output.as_str()])?;

        let markdown = tokio::fs::read_to_string(&self.input)
            .await
            .with_context(|| format!("Markdown conversion failed: cannot read {}", self.input))?;
        write_output(&self.output, render_markdown(&markdown).as_bytes()).await?;

        info!("Converted {} to {}", self.input, self.output);
        Ok("Markdown converted to HTML.".to_string())
    }
}

// ── docs_index ───────────────────────────────────────────

/// First `# ` heading of a Markdown document, if any.
pub fn first_h1(markdown: &str) -> Option<&str> {
    markdown
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
}

/// Maps every `*.md` file name in `dir` to its first H1 title.
async fn index_titles(dir: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let mut index = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Cannot list {}", dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md")
            || !entry.file_type().await?.is_file()
        {
            continue;
        }
        let markdown = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        if let Some(title) = first_h1(&markdown) {
            index.insert(entry.file_name().to_string_lossy().into_owned(), title.to_string());
        }
    }
    Ok(index)
}

pub struct DocsIndexOperation {
    dir: String,
    output: String,
}

impl DocsIndexOperation {
    pub fn new(dir: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            output: output.into(),
        }
    }
}

#[async_trait]
impl Operation for DocsIndexOperation {
    fn name(&self) -> &str {
        "docs_index"
    }

    fn keyword(&self) -> &str {
        "index docs"
    }

    fn description(&self) -> &str {
        "Index the first H1 title of every Markdown file in the docs directory as JSON."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.dir.as_str(), self.output.as_str()])?;

        let index = index_titles(Path::new(&self.dir)).await?;
        write_output(&self.output, &to_pretty_json(&index)?).await?;

        info!("Indexed {} documents from {} into {}", index.len(), self.dir, self.output);
        Ok("Docs index created.".to_string())
    }
}

// ── transcribe_audio ─────────────────────────────────────

/// Writes a transcript for the configured audio file.
///
/// Speech recognition is out of scope for this service; the transcript is a
/// fixed placeholder so the routing and confinement contract can still be
/// exercised end to end.
pub struct TranscribeAudioOperation {
    input: String,
    output: String,
}

impl TranscribeAudioOperation {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

#[async_trait]
impl Operation for TranscribeAudioOperation {
    fn name(&self) -> &str {
        "transcribe_audio"
    }

    fn keyword(&self) -> &str {
        "transcribe audio"
    }

    fn description(&self) -> &str {
        "Transcribe the configured audio file into a text file."
    }

    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String> {
        context.sandbox.validate_all(&[self.input.as_str(), self.output.as_str()])?;

        if !tokio::fs::try_exists(&self.input).await.unwrap_or(false) {
            bail!("Audio file not found: {}", self.input);
        }

        warn!("No transcription backend, writing placeholder for {}", self.input);
        write_output(&self.output, TRANSCRIPT_PLACEHOLDER.as_bytes()).await?;
        Ok("Audio transcribed successfully.".to_string())
    }
}
