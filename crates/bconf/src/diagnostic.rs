//! Diagnostic rendering for parse errors.

use ariadne::{Color, Label, Report, ReportKind, Source};
use bconf_parse::ParseError;

/// Render a parse error over its source text with ariadne.
///
/// Returns a string containing the formatted error message with source
/// context.
pub fn render(error: &ParseError, filename: &str, source: &str) -> String {
    let mut output = Vec::new();
    write_report(error, filename, source, &mut output);
    String::from_utf8(output).unwrap_or_else(|_| error.to_string())
}

/// Write the error report to a writer.
pub fn write_report<W: std::io::Write>(
    error: &ParseError,
    filename: &str,
    source: &str,
    writer: W,
) {
    let start = char_offset(source, error.row, error.column);
    let end = (start + 1).min(source.chars().count()).max(start);
    let range = start..end;

    let report = Report::build(ReportKind::Error, (filename, range.clone()))
        .with_message(&error.message)
        .with_label(
            Label::new((filename, range))
                .with_message("here")
                .with_color(Color::Red),
        );
    let _ = report
        .finish()
        .write((filename, Source::from(source)), writer);
}

/// Convert a one-indexed row/column into a character offset.
///
/// Ariadne spans count characters, not bytes. An unpositioned error (row 0)
/// maps to the start of the source.
fn char_offset(source: &str, row: u32, column: u32) -> usize {
    if row == 0 {
        return 0;
    }
    let mut offset = 0;
    for (index, line) in source.split('\n').enumerate() {
        if index as u32 + 1 == row {
            let column = (column.max(1) - 1) as usize;
            return offset + column.min(line.chars().count());
        }
        offset += line.chars().count() + 1;
    }
    offset.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_at(message: &str, row: u32, column: u32) -> ParseError {
        ParseError {
            message: message.to_string(),
            row,
            column,
        }
    }

    #[test]
    fn test_char_offset() {
        let source = "ab\ncdef\ng";
        assert_eq!(char_offset(source, 1, 1), 0);
        assert_eq!(char_offset(source, 2, 1), 3);
        assert_eq!(char_offset(source, 2, 3), 5);
        assert_eq!(char_offset(source, 3, 1), 8);
        // Unpositioned errors point at the start.
        assert_eq!(char_offset(source, 0, 0), 0);
    }

    #[test]
    fn test_render_contains_message_and_filename() {
        let source = "a = 1\nb = [";
        let error = error_at("unexpected end of input, expected ']'", 2, 6);
        let rendered = render(&error, "test.bconf", source);
        assert!(rendered.contains("unexpected end of input"));
        assert!(rendered.contains("test.bconf"));
    }

    #[test]
    fn test_render_empty_source() {
        let error = error_at("expected key", 1, 1);
        let rendered = render(&error, "empty.bconf", "");
        assert!(rendered.contains("expected key"));
    }
}
