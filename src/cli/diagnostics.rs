//! Source-snippet presentation of syntax errors.
//!
//! Each [`ParseDiagnostic`] is printed as a colored header followed by the
//! offending lines with a pointer under the reported span:
//!
//! ```text
//! error: expected RBRACE, got EOF
//!  --> query.flux:1:5
//! 1 | a = {
//!   |     ^ err
//! ```

use std::io::{self, Write};
use termcolor::{Color, ColorSpec, WriteColor};

use crate::diagnostics::ParseDiagnostic;

// === Constants ===

/// Number of lines of context to show before and after the error in code snippets.
const SNIPPET_CONTEXT_LINES: usize = 2;

// === Public API ===

/// Prints every diagnostic of one file to `writer`.
pub fn print_diagnostics(
    writer: &mut impl WriteColor,
    name: &str,
    source: &str,
    diagnostics: &[ParseDiagnostic],
) -> io::Result<()> {
    for diagnostic in diagnostics {
        print_diagnostic(writer, name, source, diagnostic)?;
        writeln!(writer)?;
    }
    Ok(())
}

/// Prints one diagnostic with its header, location, and snippet.
pub fn print_diagnostic(
    writer: &mut impl WriteColor,
    name: &str,
    source: &str,
    diagnostic: &ParseDiagnostic,
) -> io::Result<()> {
    let start = diagnostic.location.start;

    writer.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(writer, "error")?;
    writer.reset()?;
    writer.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(writer, ": {}", diagnostic.message)?;
    writer.reset()?;

    let snippet = generate_code_snippet(source, diagnostic);
    let gutter = snippet.as_ref().map_or(1, |s| s.gutter);
    writer.set_color(ColorSpec::new().set_fg(Some(Color::Blue)).set_bold(true))?;
    write!(writer, "{:width$}--> ", "", width = gutter)?;
    writer.reset()?;
    writeln!(writer, "{}:{}:{}", name, start.line, start.column)?;

    if let Some(snippet) = snippet {
        for line in &snippet.lines {
            writer.set_color(ColorSpec::new().set_fg(Some(Color::Blue)).set_bold(true))?;
            write!(writer, "{:>width$} | ", line.number_label(), width = gutter)?;
            writer.reset()?;
            match line {
                SnippetLine::Source { text, .. } => writeln!(writer, "{}", text)?,
                SnippetLine::Pointer(pointer) => {
                    writer.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
                    writeln!(writer, "{}", pointer)?;
                    writer.reset()?;
                }
            }
        }
    }
    Ok(())
}

// === Snippet Construction ===

struct Snippet {
    gutter: usize,
    lines: Vec<SnippetLine>,
}

enum SnippetLine {
    Source { number: usize, text: String },
    Pointer(String),
}

impl SnippetLine {
    fn number_label(&self) -> String {
        match self {
            SnippetLine::Source { number, .. } => number.to_string(),
            SnippetLine::Pointer(_) => String::new(),
        }
    }
}

/// Builds the lines around a diagnostic. Returns `None` when the location lies
/// outside `source`.
fn generate_code_snippet(source: &str, diagnostic: &ParseDiagnostic) -> Option<Snippet> {
    let lines: Vec<&str> = source.lines().collect();
    let start_line = diagnostic.location.start.line as usize;
    let start_col = diagnostic.location.start.column as usize;
    let end_line = (diagnostic.location.end.line as usize).max(start_line);
    // End positions are exclusive; point at the last character of the span.
    let end_col = if end_line == start_line {
        (diagnostic.location.end.column as usize)
            .saturating_sub(1)
            .max(start_col)
    } else {
        (diagnostic.location.end.column as usize).saturating_sub(1).max(1)
    };

    if start_line == 0 || start_line > lines.len().max(1) {
        return None;
    }

    let display_start = start_line.saturating_sub(SNIPPET_CONTEXT_LINES).max(1);
    let display_end = (end_line + SNIPPET_CONTEXT_LINES).min(lines.len().max(1));
    let gutter = display_end.to_string().len();

    let mut out = Vec::new();
    for number in display_start..=display_end {
        let text = lines.get(number - 1).copied().unwrap_or("");
        out.push(SnippetLine::Source {
            number,
            text: text.to_string(),
        });
        if number < start_line || number > end_line {
            continue;
        }
        out.push(SnippetLine::Pointer(pointer_line(
            number,
            start_line,
            end_line,
            start_col,
            end_col,
            text.chars().count(),
        )));
    }

    Some(Snippet { gutter, lines: out })
}

fn pointer_segment(s: &mut String, start: usize, end: usize, caret_at: usize) {
    for i in start..=end {
        if i == caret_at {
            s.push('^');
            continue;
        }
        s.push('-');
    }
}

fn pointer_line(
    line_num: usize,
    start_line: usize,
    end_line: usize,
    start_col: usize,
    end_col: usize,
    line_len: usize,
) -> String {
    let pointer_start = if line_num == start_line { start_col } else { 1 };
    let pointer_end = if line_num == end_line { end_col } else { line_len + 1 };
    let pointer_start = pointer_start.min(line_len + 1).max(1);
    let pointer_end = pointer_end.min(line_len + 1).max(pointer_start);

    let mut s = " ".repeat(pointer_start - 1);
    match (line_num == start_line, line_num == end_line) {
        (true, true) => {
            pointer_segment(&mut s, pointer_start, pointer_end, pointer_start);
            s.push_str(" err");
        }
        (true, false) => {
            pointer_segment(&mut s, pointer_start, line_len.max(pointer_start), pointer_start);
            s.push_str(" err begins");
        }
        (false, true) => {
            pointer_segment(&mut s, 1, pointer_end, 1);
            s.push_str(" err ends");
        }
        (false, false) => s.push('|'),
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Position, SourceLocation};
    use termcolor::NoColor;

    fn diag(start: (u32, u32), end: (u32, u32), message: &str) -> ParseDiagnostic {
        ParseDiagnostic {
            location: SourceLocation {
                file: None,
                start: Position::new(start.0, start.1),
                end: Position::new(end.0, end.1),
                source: None,
            },
            message: message.to_string(),
        }
    }

    fn render(source: &str, d: &ParseDiagnostic) -> String {
        let mut out = NoColor::new(Vec::new());
        print_diagnostic(&mut out, "q.flux", source, d).unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    #[test]
    fn test_single_line_pointer() {
        let text = render("a = 1\nb = )\nc = 3", &diag((2, 5), (2, 6), "invalid expression"));
        assert_eq!(
            text,
            "error: invalid expression\n --> q.flux:2:5\n1 | a = 1\n2 | b = )\n  |     ^ err\n3 | c = 3\n"
        );
    }

    #[test]
    fn test_multi_line_span() {
        let text = render("x = {\n  a: 1,\n", &diag((1, 5), (2, 7), "expected RBRACE, got EOF"));
        assert!(text.contains("1 | x = {\n  |     ^ err begins\n"), "{}", text);
        assert!(text.contains("2 |   a: 1,\n  | ^----- err ends\n"), "{}", text);
    }

    #[test]
    fn test_location_outside_source() {
        let text = render("a", &diag((9, 1), (9, 2), "late"));
        assert_eq!(text, "error: late\n --> q.flux:9:1\n");
    }
}
