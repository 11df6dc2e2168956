//! Splits a rendered YAML stream into documents.
//!
//! Boundary detection runs on raw bytes with a small state machine, so it works
//! on text that is not (yet) valid YAML. A boundary is a line made of exactly
//! three dashes, optionally followed by spaces or tabs and an optional `#`
//! comment. `----` or `--- foo` are ordinary content.

use std::borrow::Cow;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One `---`-delimited section of the rendered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Position among the non-empty documents of the stream, from 0.
    pub index: usize,
    /// Line of the stream where the document starts, from 0.
    pub line: usize,
    /// Byte range of the document in the rendered stream.
    pub range: Range<usize>,
    pub content: Vec<u8>,
    /// Where the rendered stream was written, for error messages.
    pub render_file_path: PathBuf,
}

impl Document {
    #[must_use]
    pub fn content_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// `<render file>:<line> (document #<n>)`, both numbers 1-based.
    #[must_use]
    pub fn location(&self) -> String {
        format!(
            "{}:{} (document #{})",
            self.render_file_path.display(),
            self.line + 1,
            self.index + 1
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LineBegin,
    RegularLine,
    DocDash1,
    DocDash2,
    DocDash3,
    DocSpaces,
    DocComment,
}

impl State {
    const fn is_separator_line(self) -> bool {
        matches!(self, Self::DocDash3 | Self::DocSpaces | Self::DocComment)
    }
}

/// Byte ranges of every document in `content`, empty ones included.
///
/// Ranges exclude the separator lines themselves.
#[must_use]
pub fn split_content(content: &[u8]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut state = State::LineBegin;
    let mut doc_start = 0;
    // Bytes of the current line that belong to a candidate separator.
    let mut separator_len = 0;

    for (index, &byte) in content.iter().enumerate() {
        state = match (state, byte) {
            (State::DocComment, b'\n') | (State::DocDash3 | State::DocSpaces, b'\n') => {
                ranges.push(doc_start..index - separator_len);
                doc_start = index + 1;
                separator_len = 0;
                State::LineBegin
            }
            (_, b'\n') => {
                separator_len = 0;
                State::LineBegin
            }
            (State::DocComment, _) => {
                separator_len += 1;
                State::DocComment
            }
            (State::LineBegin, b'-') => {
                separator_len = 1;
                State::DocDash1
            }
            (State::DocDash1, b'-') => {
                separator_len += 1;
                State::DocDash2
            }
            (State::DocDash2, b'-') => {
                separator_len += 1;
                State::DocDash3
            }
            (State::DocDash3 | State::DocSpaces, b' ' | b'\t' | b'\r') => {
                separator_len += 1;
                State::DocSpaces
            }
            (State::DocDash3 | State::DocSpaces, b'#') => {
                separator_len += 1;
                State::DocComment
            }
            _ => State::RegularLine,
        };
    }

    if doc_start < content.len() {
        let end =
            if state.is_separator_line() { content.len() - separator_len } else { content.len() };
        ranges.push(doc_start..end);
    }

    ranges
}

/// Returns `true` if the document holds nothing but blank lines and comments.
#[must_use]
pub fn is_empty_document(content: &[u8]) -> bool {
    content.split(|b| *b == b'\n').all(|line| {
        let trimmed = line.trim_ascii_start();
        trimmed.is_empty() || trimmed.starts_with(b"#")
    })
}

fn line_count(content: &[u8]) -> usize {
    if content.is_empty() {
        return 0;
    }
    let newlines = content.iter().filter(|b| **b == b'\n').count();
    if content.ends_with(b"\n") { newlines } else { newlines + 1 }
}

/// Splits the rendered stream into non-empty documents carrying their start line.
#[must_use]
pub fn split_by_docs(content: &[u8], render_file_path: &Path) -> Vec<Arc<Document>> {
    let mut docs = Vec::new();
    let mut line = 0;

    for range in split_content(content) {
        let doc_content = &content[range.clone()];
        if !is_empty_document(doc_content) {
            docs.push(Arc::new(Document {
                index: docs.len(),
                line,
                range,
                content: doc_content.to_vec(),
                render_file_path: render_file_path.to_path_buf(),
            }));
        }

        // The separator line that follows accounts for the extra line.
        line += line_count(doc_content) + 1;
    }

    docs
}
