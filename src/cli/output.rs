//! Handles all user-facing output for the CLI.
//!
//! Machine-readable output (JSON) goes to stdout unadorned. Human-readable
//! output (diagnostics, summaries) goes to stderr and is colored only when
//! stderr is a terminal.

use std::io::{self, IsTerminal, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

// ============================================================================
// STREAMS
// ============================================================================

fn color_choice(is_terminal: bool) -> ColorChoice {
    if is_terminal {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// A colored stderr stream for diagnostics and summaries.
pub fn stderr() -> StandardStream {
    StandardStream::stderr(color_choice(io::stderr().is_terminal()))
}

// ============================================================================
// CORE OUTPUT FUNCTIONS
// ============================================================================

/// Writes serialized bytes to stdout, followed by a newline.
pub fn print_bytes(bytes: &[u8]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(bytes)?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}

/// Prints the closing line of a `check` run.
pub fn print_summary(writer: &mut impl WriteColor, files: usize, errors: usize) -> io::Result<()> {
    let color = if errors == 0 { Color::Green } else { Color::Red };
    writer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(writer, "{}", if errors == 0 { "ok" } else { "failed" })?;
    writer.reset()?;
    writeln!(
        writer,
        ": checked {} file{}, found {} syntax error{}",
        files,
        plural(files),
        errors,
        plural(errors)
    )
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::NoColor;

    #[test]
    fn test_summary_wording() {
        let mut out = NoColor::new(Vec::new());
        print_summary(&mut out, 1, 0).unwrap();
        print_summary(&mut out, 3, 2).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(
            text,
            "ok: checked 1 file, found 0 syntax errors\nfailed: checked 3 files, found 2 syntax errors\n"
        );
    }

    #[test]
    fn test_no_color_off_terminal() {
        assert_eq!(color_choice(false), ColorChoice::Never);
    }
}
