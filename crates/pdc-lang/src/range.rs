use std::fmt::{self, Display, Formatter};

use nom_locate::LocatedSpan;

pub type Span<'a> = LocatedSpan<&'a str>;

/// A 1-based line and column.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash)]
pub struct Position {
    pub line: u32,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Position {
    pub fn new(line: u32, column: usize) -> Self {
        Position { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source region. `end` is exclusive.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Default, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }

    pub fn contains(&self, position: &Position) -> bool {
        (self.start.line < position.line
            || (self.start.line == position.line && self.start.column <= position.column))
            && (self.end.line > position.line
                || (self.end.line == position.line && self.end.column >= position.column))
    }

    /// The smallest range covering both `self` and `other`.
    pub fn cover(&self, other: &Range) -> Range {
        Range {
            start: std::cmp::min(self.start, other.start),
            end: std::cmp::max(self.end, other.end),
        }
    }

    /// Zero-based indentation of the first line.
    pub fn indent(&self) -> usize {
        self.start.column.saturating_sub(1)
    }

    /// Shifts the range down by `lines` lines.
    pub fn offset_lines(&self, lines: u32) -> Range {
        Range {
            start: Position::new(self.start.line + lines, self.start.column),
            end: Position::new(self.end.line + lines, self.end.column),
        }
    }
}

impl<'a> From<Span<'a>> for Range {
    fn from(span: Span<'a>) -> Self {
        let fragment = span.fragment();
        let start = Position {
            line: span.location_line(),
            column: span.get_utf8_column(),
        };
        let end = match fragment.rfind('\n') {
            Some(last_newline) => Position {
                line: start.line + fragment.matches('\n').count() as u32,
                column: fragment[last_newline + 1..].chars().count() + 1,
            },
            None => Position {
                line: start.line,
                column: start.column + fragment.chars().count(),
            },
        };

        Range { start, end }
    }
}

impl<'a> From<Span<'a>> for Position {
    fn from(span: Span<'a>) -> Self {
        Position {
            line: span.location_line(),
            column: span.get_utf8_column(),
        }
    }
}

/// Returns the exact source text spanned by `range`.
///
/// The first line starts at the range's start column, intermediate lines are
/// taken whole and the last line stops at the end column.
pub fn source_segment(source: &str, range: &Range) -> Option<String> {
    let lines: Vec<&str> = source.split('\n').collect();
    let first = range.start.line.checked_sub(1)? as usize;
    let last = range.end.line.checked_sub(1)? as usize;

    if first > last || last >= lines.len() {
        return None;
    }

    let char_slice = |line: &str, from: usize, to: Option<usize>| -> String {
        let chars = line.chars().skip(from);
        match to {
            Some(to) => chars.take(to.saturating_sub(from)).collect(),
            None => chars.collect(),
        }
    };

    let start_col = range.start.column.saturating_sub(1);
    let end_col = range.end.column.saturating_sub(1);

    if first == last {
        return Some(char_slice(lines[first], start_col, Some(end_col)));
    }

    let mut segment = char_slice(lines[first], start_col, None);
    for line in &lines[first + 1..last] {
        segment.push('\n');
        segment.push_str(line);
    }
    segment.push('\n');
    segment.push_str(&char_slice(lines[last], 0, Some(end_col)));

    Some(segment)
}
