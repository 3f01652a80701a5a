//! Script rendering: binds the user's model code and the output path into the
//! engine script template.
//!
//! Templates have exactly two slots, written `{{ .ModelCode }}` and
//! `{{ .Filename }}` (the leading dot and the inner spaces are optional).
//! Slot values are inserted verbatim and are never re-scanned for placeholders.

use std::path::{Path, PathBuf};

pub const MODEL_CODE_SLOT: &str = "ModelCode";
pub const FILENAME_SLOT: &str = "Filename";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template {} could not be read: {source}", .path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template {name}: unknown slot `{slot}`")]
    UnknownSlot { name: String, slot: String },
    #[error("template {name}: unterminated placeholder at byte {offset}")]
    Unterminated { name: String, offset: usize },
}

#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    source: String,
}

impl Template {
    pub fn from_source(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Read `dir/name`. Called per request so edits to the template are picked
    /// up without a restart.
    pub async fn load(dir: &Path, name: &str) -> Result<Self, RenderError> {
        let path = dir.join(name);
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| RenderError::NotFound { path, source })?;
        Ok(Self::from_source(name, source))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Inputs of one render. Built per request and consumed by [`render`].
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub model_code: &'a str,
    pub output_path: &'a Path,
}

/// Complete engine script, ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScript(String);

impl RenderedScript {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<String> for RenderedScript {
    fn from(script: String) -> Self {
        Self(script)
    }
}

pub fn render(template: &Template, ctx: RenderContext<'_>) -> Result<RenderedScript, RenderError> {
    let filename = ctx.output_path.to_string_lossy();
    let source = template.source.as_str();
    let mut out = String::with_capacity(source.len() + ctx.model_code.len() + filename.len());
    let mut rest = source;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(RenderError::Unterminated {
                name: template.name.clone(),
                offset: source.len() - rest.len() + start,
            });
        };

        let slot = after_open[..end].trim();
        let slot = slot.strip_prefix('.').unwrap_or(slot);
        match slot {
            MODEL_CODE_SLOT => out.push_str(ctx.model_code),
            FILENAME_SLOT => out.push_str(&filename),
            other => {
                return Err(RenderError::UnknownSlot {
                    name: template.name.clone(),
                    slot: other.to_string(),
                })
            }
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);

    Ok(RenderedScript(out))
}
