//! Line cursor with one-line pushback.
//!
//! The source text is split into [`Line`]s once. Sub-parsers consume lines
//! with [`LineCursor::next_line`] and hand a line back to their caller with
//! [`LineCursor::unread`]; positions are line indices, never byte offsets.

/// One physical line of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// 1-based line number.
    pub number: usize,
    /// Leading whitespace width, tabs weighted by the cursor's tab width.
    pub indent: usize,
    /// Line content with surrounding whitespace removed.
    pub text: &'a str,
}

impl Line<'_> {
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_comment(&self) -> bool {
        self.text.starts_with('#')
    }

    /// `- item` or a bare `-`.
    pub fn is_item(&self) -> bool {
        self.text == "-" || self.text.starts_with("- ") || self.text.starts_with("-\t")
    }
}

pub(crate) fn indent_width(raw: &str, tab_width: usize) -> usize {
    raw.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { tab_width } else { 1 })
        .sum()
}

#[derive(Debug)]
pub struct LineCursor<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
    /// Position before the most recent read; target of `unread`.
    mark: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(source: &'a str, tab_width: usize) -> Self {
        let lines = source
            .lines()
            .enumerate()
            .map(|(i, raw)| Line {
                number: i + 1,
                indent: indent_width(raw, tab_width),
                text: raw.trim(),
            })
            .collect();
        Self {
            lines,
            pos: 0,
            mark: 0,
        }
    }

    /// Next line that is neither blank nor a comment.
    pub fn next_line(&mut self) -> Option<Line<'a>> {
        self.mark = self.pos;
        while let Some(line) = self.lines.get(self.pos).copied() {
            self.pos += 1;
            if !line.is_blank() && !line.is_comment() {
                return Some(line);
            }
        }
        None
    }

    /// Next physical line, blank and comment lines included.
    pub fn next_raw(&mut self) -> Option<Line<'a>> {
        self.mark = self.pos;
        let line = self.lines.get(self.pos).copied()?;
        self.pos += 1;
        Some(line)
    }

    /// Push back the line returned by the last read. A second `unread`
    /// without an intervening read is a no-op.
    pub fn unread(&mut self) {
        self.pos = self.mark;
    }

    /// Look at the next significant line without consuming it.
    pub fn peek(&mut self) -> Option<Line<'a>> {
        let line = self.next_line();
        self.unread();
        line
    }
}
