use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// A located syntax or semantic error in textual IR.
///
/// `line` and `column` are 1-based; `line_contents` is the full text of the
/// offending line without its line terminator.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(kiln::ir::syntax))]
pub struct ParseDiagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub line_contents: String,
    pub filename: String,
    #[source_code]
    source_code: NamedSource<String>,
    #[label("here")]
    span: SourceSpan,
}

impl ParseDiagnostic {
    /// Builds a diagnostic for the byte range `offset..offset + len` of
    /// `source`. Offsets past the end are clamped to the end of input.
    pub fn new(
        source: &str,
        filename: &str,
        offset: usize,
        len: usize,
        message: impl Into<String>,
    ) -> Self {
        let offset = floor_char_boundary(source, offset.min(source.len()));
        let len = len.min(source.len() - offset);

        let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[offset..]
            .find('\n')
            .map_or(source.len(), |i| offset + i);
        let line = source[..offset].matches('\n').count() + 1;
        let column = source[line_start..offset].chars().count() + 1;
        let line_contents = source[line_start..line_end]
            .trim_end_matches('\r')
            .to_string();

        Self {
            line,
            column,
            message: message.into(),
            line_contents,
            filename: filename.to_string(),
            source_code: NamedSource::new(filename, source.to_string()),
            span: SourceSpan::new(offset.into(), len),
        }
    }

    pub fn span(&self) -> SourceSpan {
        self.span
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_on_second_line() {
        let source = "first line\nsecond bad line\nthird";
        let offset = source.find("bad").unwrap();
        let diag = ParseDiagnostic::new(source, "", offset, 3, "unexpected token");
        assert_eq!(diag.line, 2);
        assert_eq!(diag.column, 8);
        assert_eq!(diag.line_contents, "second bad line");
        assert_eq!(diag.message, "unexpected token");
        assert_eq!(diag.filename, "");
    }

    #[test]
    fn test_offset_past_end_is_clamped() {
        let source = "only\r\nlines";
        let diag = ParseDiagnostic::new(source, "x.ll", 999, 1, "eof");
        assert_eq!(diag.line, 2);
        assert_eq!(diag.column, 6);
        assert_eq!(diag.line_contents, "lines");
        assert_eq!(diag.span().len(), 0);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let source = "a\r\nb";
        let diag = ParseDiagnostic::new(source, "", 0, 1, "x");
        assert_eq!(diag.line_contents, "a");
    }
}
