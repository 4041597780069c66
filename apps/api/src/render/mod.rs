//! Template Renderer: fills LaTeX templates with generated content.
//!
//! Templates use `\VAR{...}` for values, `\BLOCK{...}` for statements and
//! `\#{...}` for comments, so LaTeX's own braces and its `%`, `$`, `&`, `#`
//! and `_` pass through untouched. Escaping is off (content is LaTeX-escaped
//! upstream) and undefined variables are errors.
//!
//! Only I/O: reading named template files from the template directory.

use std::io;
use std::path::{Path, PathBuf};

use minijinja::syntax::SyntaxConfig;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const TEMPLATE_EXTENSION: &str = "tex";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid template name '{0}'")]
    InvalidName(String),

    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Failed to read template: {0}")]
    Io(#[from] io::Error),

    #[error("Template rendering failed: {0}")]
    Render(#[from] minijinja::Error),
}

/// Where the template text comes from.
#[derive(Debug, Clone, Copy)]
pub enum TemplateSource<'a> {
    /// A `<name>.tex` file in the template directory (suffix optional).
    Named(&'a str),
    /// Caller-supplied template text, using the same delimiters.
    Inline(&'a str),
}

pub struct TemplateRenderer {
    engine: Environment<'static>,
    template_dir: PathBuf,
}

impl TemplateRenderer {
    pub fn new(template_dir: impl Into<PathBuf>) -> Result<Self, TemplateError> {
        let syntax = SyntaxConfig::builder()
            .block_delimiters("\\BLOCK{", "}")
            .variable_delimiters("\\VAR{", "}")
            .comment_delimiters("\\#{", "}")
            .build()?;

        let mut engine = Environment::new();
        engine.set_syntax(syntax);
        engine.set_trim_blocks(true);
        engine.set_undefined_behavior(UndefinedBehavior::Strict);
        engine.set_auto_escape_callback(|_| AutoEscape::None);

        Ok(Self {
            engine,
            template_dir: template_dir.into(),
        })
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub async fn render(
        &self,
        source: TemplateSource<'_>,
        context: &impl Serialize,
    ) -> Result<String, TemplateError> {
        match source {
            TemplateSource::Inline(text) => Ok(self.engine.render_str(text, context)?),
            TemplateSource::Named(name) => {
                let path = self.template_path(name)?;
                debug!("Rendering template {}", path.display());
                let text = match tokio::fs::read_to_string(&path).await {
                    Ok(text) => text,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        return Err(TemplateError::NotFound(name.to_string()))
                    }
                    Err(e) => return Err(e.into()),
                };
                Ok(self.engine.render_str(&text, context)?)
            }
        }
    }

    /// Resolves a template name to a file inside the template directory.
    /// Names that could escape the directory are rejected.
    fn template_path(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let name = name.trim();
        let invalid = name.is_empty()
            || name.contains("..")
            || name.contains('/')
            || name.contains('\\')
            || name.contains(':');
        if invalid {
            return Err(TemplateError::InvalidName(name.to_string()));
        }

        let file_name = match Path::new(name).extension() {
            Some(ext) if ext == TEMPLATE_EXTENSION => name.to_string(),
            _ => format!("{name}.{TEMPLATE_EXTENSION}"),
        };
        Ok(self.template_dir.join(file_name))
    }
}
