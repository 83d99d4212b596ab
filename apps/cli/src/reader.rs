//! Paged terminal reader.
//!
//! Renders one page at a time in the alternate screen and drives the core
//! navigation controller from key input. Page capacity is probed against the
//! live terminal size; a resize recomputes the whole page sequence and clamps
//! the current position.

use std::io::{Write, stdout};
use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute, queue};
use tracing::debug;

use storyloom_core::{
    CapacityProbe, Chapter, NavCommand, Navigator, Page, PageContent, paginate,
};

/// Rows reserved below the text: one blank, one status line.
const CHROME_ROWS: usize = 2;

/// Rows a chapter heading block occupies: the heading line and a blank line.
const HEADING_ROWS: usize = 2;

// ---------------------------------------------------------------------------
// Terminal capacity probe
// ---------------------------------------------------------------------------

/// Capacity probe bound to a terminal size. Counts greedily-wrapped lines,
/// which is monotonic in appended words.
#[derive(Debug, Clone, Copy)]
struct TerminalProbe {
    cols: u16,
    rows: u16,
}

impl TerminalProbe {
    fn text_rows(&self) -> usize {
        (self.rows as usize).saturating_sub(CHROME_ROWS)
    }
}

impl CapacityProbe for TerminalProbe {
    fn fits(&self, content: &PageContent<'_>) -> bool {
        let width = (self.cols as usize).max(1);
        let heading_rows = if content.heading.is_some() {
            HEADING_ROWS
        } else {
            0
        };
        heading_rows + wrap_lines(content.body, width).len() <= self.text_rows()
    }
}

/// Greedy word wrap at `width` columns. A word wider than the terminal is
/// split into width-sized chunks so it still occupies a bounded number of
/// rows.
fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > width {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(width) {
                lines.push(chunk.iter().collect());
            }
            continue;
        }

        let line_len = line.chars().count();
        if line.is_empty() {
            line.push_str(word);
        } else if line_len + 1 + word_len <= width {
            line.push(' ');
            line.push_str(word);
        } else {
            lines.push(std::mem::take(&mut line));
            line.push_str(word);
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

// ---------------------------------------------------------------------------
// Reader loop
// ---------------------------------------------------------------------------

/// Read a book's chapters in a raw-mode paged view. Blocks until the user
/// quits.
pub(crate) async fn read_book(title: &str, chapters: &[Chapter], page_turn_ms: u64) -> Result<()> {
    terminal::enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen, cursor::Hide)?;

    let result = reader_loop(title, chapters, page_turn_ms).await;

    execute!(out, cursor::Show, LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    result
}

async fn reader_loop(title: &str, chapters: &[Chapter], page_turn_ms: u64) -> Result<()> {
    let (cols, rows) = terminal::size()?;
    let mut probe = TerminalProbe { cols, rows };
    let mut pages = paginate(chapters, &probe);
    let mut nav = Navigator::new(pages.len(), Duration::from_millis(page_turn_ms));

    debug!(pages = pages.len(), cols, rows, "reader opened");
    draw(title, &pages, &nav, probe)?;

    loop {
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                let command = match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Right | KeyCode::Char('n') | KeyCode::Char(' ') => {
                        Some(NavCommand::Next)
                    }
                    KeyCode::Left | KeyCode::Char('p') => Some(NavCommand::Prev),
                    KeyCode::Char('g') => Some(NavCommand::First),
                    KeyCode::Char('G') => Some(NavCommand::Last),
                    _ => None,
                };

                if let Some(command) = command {
                    if nav.apply(command).await {
                        // Keys pressed while the turn was in flight are
                        // dropped, not queued.
                        drain_pending_input()?;
                        draw(title, &pages, &nav, probe)?;
                    }
                }
            }
            Event::Resize(new_cols, new_rows) => {
                probe = TerminalProbe {
                    cols: new_cols,
                    rows: new_rows,
                };
                pages = paginate(chapters, &probe);
                nav.set_page_count(pages.len());
                debug!(pages = pages.len(), cols = new_cols, rows = new_rows, "repaginated");
                draw(title, &pages, &nav, probe)?;
            }
            _ => {}
        }
    }

    Ok(())
}

fn drain_pending_input() -> Result<()> {
    while event::poll(Duration::ZERO)? {
        let _ = event::read()?;
    }
    Ok(())
}

fn draw(title: &str, pages: &[Page], nav: &Navigator, probe: TerminalProbe) -> Result<()> {
    let mut out = stdout();
    queue!(out, Clear(ClearType::All), cursor::MoveTo(0, 0))?;

    let mut row: u16 = 0;
    if let Some(page) = pages.get(nav.current_page()) {
        if page.is_chapter_start {
            queue!(out, cursor::MoveTo(0, row))?;
            write!(out, "Chapter {} — {}", page.chapter_no, page.title)?;
            row += HEADING_ROWS as u16;
        }
        for line in wrap_lines(&page.text, (probe.cols as usize).max(1)) {
            queue!(out, cursor::MoveTo(0, row))?;
            write!(out, "{line}")?;
            row += 1;
        }
    }

    let status = format!(
        "{title} — page {}/{}  [n/→] next  [p/←] prev  [g/G] first/last  [q] quit",
        nav.current_page() + 1,
        nav.page_count().max(1)
    );
    queue!(out, cursor::MoveTo(0, probe.rows.saturating_sub(1)))?;
    write!(out, "{status}")?;

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_lines("the quick brown fox jumps over", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        let rejoined: Vec<&str> = lines.iter().flat_map(|l| l.split_whitespace()).collect();
        assert_eq!(rejoined, vec!["the", "quick", "brown", "fox", "jumps", "over"]);
    }

    #[test]
    fn wrap_of_empty_text_is_no_lines() {
        assert!(wrap_lines("", 40).is_empty());
        assert!(wrap_lines("   ", 40).is_empty());
    }

    #[test]
    fn oversized_word_is_chunked() {
        let lines = wrap_lines("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn adding_words_never_shrinks_line_count() {
        let mut text = String::new();
        let mut last = 0;
        for word in ["pages", "grow", "monotonically", "with", "appended", "words"] {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
            let count = wrap_lines(&text, 8).len();
            assert!(count >= last);
            last = count;
        }
    }

    #[test]
    fn heading_reduces_page_capacity() {
        let probe = TerminalProbe { cols: 20, rows: 6 };
        // 6 rows - 2 chrome = 4 text rows; the heading takes 2 of them.
        let body = "word ".repeat(10);
        let body = body.trim();

        let without_heading = PageContent {
            heading: None,
            body,
        };
        let with_heading = PageContent {
            heading: Some(storyloom_core::ChapterHeading {
                chapter_no: 1,
                title: "Chapter 1",
            }),
            body,
        };

        assert!(probe.fits(&without_heading));
        assert!(!probe.fits(&with_heading));
    }

    #[test]
    fn probe_rejects_overflowing_body() {
        let probe = TerminalProbe { cols: 10, rows: 5 };
        let body = "word ".repeat(30);
        assert!(!probe.fits(&PageContent {
            heading: None,
            body: body.trim(),
        }));
    }
}
