use miette::Diagnostic;
use miette::SourceSpan;
use thiserror::Error;

/// A recoverable problem found while reading a source file.
///
/// Warnings never stop compilation. They are collected by the lexer and the
/// parser and rendered on stderr once the pipeline has finished.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(severity(Warning))]
pub struct Warning {
    pub message: String,
    #[label("ignored")]
    pub span: SourceSpan,
}

impl Warning {
    pub fn new(message: impl Into<String>, span: impl Into<SourceSpan>) -> Self {
        Self {
            message: message.into(),
            span: span.into(),
        }
    }
}
