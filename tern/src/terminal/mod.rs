pub mod renderer;

use crate::input::editor::{Suffix, SuffixKind};
use crate::input::utils::{display_width, truncate_to_width, underline_match};
use crossterm::cursor::{self, MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::style::{Color, Print, Stylize};
use crossterm::terminal::{Clear, ClearType};
use renderer::TerminalRenderer;
use std::io::{self, Stdout, Write};

pub const SEARCH_LABEL: &str = "(reverse-i-search): ";

/// What the input line should look like.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub prefix: &'a str,
    /// Buffer text after highlighting.
    pub highlighted: &'a str,
    /// Plain buffer text up to the cursor.
    pub before_cursor: &'a str,
    pub suffix: Option<&'a Suffix>,
}

/// Owns the terminal output and remembers where the cursor was left so the
/// next repaint can start from the first row of the input.
#[derive(Debug)]
pub struct Screen<W: Write = Stdout> {
    renderer: TerminalRenderer<W>,
    columns: usize,
    /// Rows between the first row of the input and the cursor.
    cursor_row: usize,
    ghost_color: Color,
    match_color: Color,
}

impl Screen {
    pub fn stdout(columns: usize) -> Self {
        Self::with_writer(io::stdout(), columns)
    }
}

impl<W: Write> Screen<W> {
    pub fn with_writer(out: W, columns: usize) -> Self {
        Self {
            renderer: TerminalRenderer::with_writer(out),
            columns: columns.max(1),
            cursor_row: 0,
            ghost_color: Color::DarkGrey,
            match_color: Color::Reset,
        }
    }

    pub fn set_colors(&mut self, ghost: Color, matched: Color) {
        self.ghost_color = ghost;
        self.match_color = matched;
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn set_columns(&mut self, columns: usize) {
        self.columns = columns.max(1);
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.renderer.flush()
    }

    fn begin(&mut self) -> io::Result<()> {
        queue!(self.renderer, cursor::Hide)?;
        if self.cursor_row > 0 {
            queue!(self.renderer, MoveUp(self.cursor_row as u16))?;
        }
        queue!(self.renderer, MoveToColumn(0), Clear(ClearType::FromCursorDown))?;
        Ok(())
    }

    /// Terminals leave the cursor on the last column after filling a row.
    /// Force the wrap so row arithmetic stays `width / columns`.
    fn settle(&mut self, width: usize) -> io::Result<()> {
        if width > 0 && width % self.columns == 0 {
            queue!(self.renderer, Print("\r\n"))?;
        }
        Ok(())
    }

    /// Repaint the input line and place the cursor.
    pub fn render(&mut self, frame: &Frame<'_>) -> io::Result<()> {
        self.begin()?;
        let prefix_width = display_width(frame.prefix);
        let line_width = prefix_width + display_width(frame.highlighted);
        queue!(
            self.renderer,
            Print(frame.prefix),
            Print(frame.highlighted)
        )?;

        let mut end_row = line_width / self.columns;
        match frame.suffix {
            Some(Suffix {
                text,
                kind: SuffixKind::Preview,
            }) => {
                self.settle(line_width)?;
                let preview = truncate_to_width(text, self.columns.saturating_sub(1));
                queue!(
                    self.renderer,
                    Print("\r\n"),
                    Print(preview.as_str().with(self.ghost_color))
                )?;
                end_row += 1;
            }
            Some(Suffix { text, .. }) => {
                let end = line_width + display_width(text);
                queue!(self.renderer, Print(text.as_str().with(self.ghost_color)))?;
                self.settle(end)?;
                end_row = end / self.columns;
            }
            None => self.settle(line_width)?,
        }

        let target = prefix_width + display_width(frame.before_cursor);
        let target_row = target / self.columns;
        if end_row > target_row {
            queue!(self.renderer, MoveUp((end_row - target_row) as u16))?;
        }
        queue!(
            self.renderer,
            MoveToColumn((target % self.columns) as u16),
            cursor::Show
        )?;
        self.cursor_row = target_row;
        Ok(())
    }

    /// Show the history line matching `query` above the search prompt.
    pub fn render_search(&mut self, matched: Option<&str>, query: &str) -> io::Result<()> {
        self.begin()?;
        let line = matched
            .map(|line| underline_match(line, query))
            .unwrap_or_default();
        let line_width = display_width(&line);
        queue!(self.renderer, Print(line.as_str().with(self.match_color)))?;
        self.settle(line_width)?;
        let label = format!("{SEARCH_LABEL}{query}");
        let label_width = display_width(&label);
        queue!(self.renderer, Print("\r\n"), Print(label), cursor::Show)?;
        self.settle(label_width)?;
        self.cursor_row = line_width / self.columns + 1 + label_width / self.columns;
        Ok(())
    }

    /// Leave the input behind: the next output starts on a fresh row.
    pub fn newline(&mut self) -> io::Result<()> {
        queue!(self.renderer, Print("\r\n"))?;
        self.cursor_row = 0;
        Ok(())
    }

    /// Write program output. Bare line feeds become CRLF for raw mode.
    pub fn print(&mut self, text: &str) -> io::Result<()> {
        let mut out = String::with_capacity(text.len() + 8);
        let mut previous = '\0';
        for ch in text.chars() {
            if ch == '\n' && previous != '\r' {
                out.push('\r');
            }
            out.push(ch);
            previous = ch;
        }
        queue!(self.renderer, Print(out))?;
        self.cursor_row = 0;
        Ok(())
    }

    pub fn clear_screen(&mut self) -> io::Result<()> {
        queue!(
            self.renderer,
            Clear(ClearType::All),
            Clear(ClearType::Purge),
            cursor::MoveTo(0, 0)
        )?;
        self.cursor_row = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::utils::strip_ansi;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn take(&self) -> String {
            String::from_utf8(std::mem::take(&mut *self.0.lock())).unwrap()
        }
    }

    fn frame<'a>(text: &'a str, cursor: usize, suffix: Option<&'a Suffix>) -> Frame<'a> {
        Frame {
            prefix: "> ",
            highlighted: text,
            before_cursor: &text[..cursor],
            suffix,
        }
    }

    #[test]
    fn test_render_places_cursor() -> io::Result<()> {
        let capture = Capture::default();
        let mut screen = Screen::with_writer(capture.clone(), 80);
        screen.render(&frame("abc", 1, None))?;
        screen.flush()?;
        let out = capture.take();
        assert!(out.starts_with("\x1b[?25l"));
        assert!(strip_ansi(&out).contains("> abc"));
        // MoveToColumn is 1-based on the wire
        assert!(out.ends_with("\x1b[4G\x1b[?25h"));
        Ok(())
    }

    #[test]
    fn test_render_wide_text() -> io::Result<()> {
        let capture = Capture::default();
        let mut screen = Screen::with_writer(capture.clone(), 80);
        screen.render(&frame("ああ", 6, None))?;
        screen.flush()?;
        assert!(capture.take().ends_with("\x1b[7G\x1b[?25h"));
        Ok(())
    }

    #[test]
    fn test_ghost_suffix_does_not_move_cursor() -> io::Result<()> {
        let capture = Capture::default();
        let mut screen = Screen::with_writer(capture.clone(), 80);
        let suffix = Suffix {
            text: "x".to_string(),
            kind: SuffixKind::Completion,
        };
        screen.render(&frame("Math.ma", 7, Some(&suffix)))?;
        screen.flush()?;
        let out = capture.take();
        assert!(strip_ansi(&out).contains("> Math.max"));
        assert!(out.ends_with("\x1b[10G\x1b[?25h"));
        Ok(())
    }

    #[test]
    fn test_preview_goes_below_and_cursor_returns() -> io::Result<()> {
        let capture = Capture::default();
        let mut screen = Screen::with_writer(capture.clone(), 80);
        let suffix = Suffix {
            text: "2".to_string(),
            kind: SuffixKind::Preview,
        };
        screen.render(&frame("1 + 1", 5, Some(&suffix)))?;
        screen.flush()?;
        let out = capture.take();
        assert!(strip_ansi(&out).contains("> 1 + 1\r\n2"));
        // back up one row to the input
        assert!(out.contains("\x1b[1A"));
        Ok(())
    }

    #[test]
    fn test_repaint_starts_from_first_input_row() -> io::Result<()> {
        let capture = Capture::default();
        let mut screen = Screen::with_writer(capture.clone(), 10);
        let text = "0123456789abc";
        screen.render(&frame(text, text.len(), None))?;
        screen.flush()?;
        capture.take();
        screen.render(&frame(text, text.len(), None))?;
        screen.flush()?;
        assert!(capture.take().starts_with("\x1b[?25l\x1b[1A\x1b[1G"));
        Ok(())
    }

    #[test]
    fn test_search_underlines_match() -> io::Result<()> {
        let capture = Capture::default();
        let mut screen = Screen::with_writer(capture.clone(), 80);
        screen.render_search(Some("let alpha = 1"), "alp")?;
        screen.flush()?;
        let out = capture.take();
        assert!(out.contains("\x1b[4malp\x1b[24m"));
        assert!(strip_ansi(&out).ends_with("let alpha = 1\r\n(reverse-i-search): alp"));
        Ok(())
    }

    #[test]
    fn test_print_converts_line_feeds() -> io::Result<()> {
        let capture = Capture::default();
        let mut screen = Screen::with_writer(capture.clone(), 80);
        screen.print("a\nb\r\nc")?;
        screen.flush()?;
        assert_eq!(capture.take(), "a\r\nb\r\nc");
        Ok(())
    }
}
