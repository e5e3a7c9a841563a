//! Shared error utilities used across the compilation pipeline.
//!
//! Every error is fatal: the first one raised travels up through `?` and ends
//! the compilation. Source-anchored errors carry a [`Location`] so they can be
//! rendered as a single caret-pointing diagnostic in the style of chibicc.

use std::fmt;
use std::io;
use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Coarse classification of a [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Syntax,
  Type,
  Internal,
  Io,
}

/// Position of a diagnostic inside the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
  /// 1-based line number.
  pub line: usize,
  /// 1-based character column within the line.
  pub column: usize,
  pub line_text: String,
}

impl Location {
  /// Resolve a byte offset into line/column form.
  pub fn from_offset(source: &str, loc: usize) -> Self {
    let safe_loc = char_boundary(source, loc);
    let line = source[..safe_loc].matches('\n').count() + 1;
    Self::on_line(source, loc, line)
  }

  /// Like [`Location::from_offset`] for a position whose line number the
  /// tokenizer has already counted.
  pub fn on_line(source: &str, loc: usize, line: usize) -> Self {
    let safe_loc = char_boundary(source, loc);
    let line_start = source[..safe_loc].rfind('\n').map_or(0, |idx| idx + 1);
    let line_end = source[safe_loc..]
      .find('\n')
      .map_or(source.len(), |idx| safe_loc + idx);
    let column = source[line_start..safe_loc].chars().count() + 1;

    Self {
      line,
      column,
      line_text: source[line_start..line_end].to_string(),
    }
  }

  /// The offending line followed by a caret under the reported column.
  pub fn snippet(&self) -> String {
    let marker = format!("{}^", " ".repeat(self.column - 1));
    format!("{}\n{marker}", self.line_text)
  }
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

fn char_boundary(source: &str, loc: usize) -> usize {
  let mut loc = loc.min(source.len());
  while !source.is_char_boundary(loc) {
    loc -= 1;
  }
  loc
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CompileError {
  #[snafu(display("{pos}: syntax error: {message}\n{}", pos.snippet()))]
  Syntax { pos: Location, message: String },

  #[snafu(display("{pos}: type error: {message}\n{}", pos.snippet()))]
  Type { pos: Location, message: String },

  #[snafu(display("internal error: {message}"))]
  Internal { message: String },

  #[snafu(display("failed to read {}: {source}", path.display()))]
  ReadSource { path: PathBuf, source: io::Error },

  #[snafu(display("failed to write {}: {source}", path.display()))]
  WriteOutput { path: PathBuf, source: io::Error },
}

impl CompileError {
  /// A grammar mismatch anchored at a byte offset in the source.
  pub fn syntax(source: &str, loc: usize, message: impl Into<String>) -> Self {
    Self::Syntax {
      pos: Location::from_offset(source, loc),
      message: message.into(),
    }
  }

  /// A broken contract between the parser and the generator.
  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Syntax { .. } => ErrorKind::Syntax,
      Self::Type { .. } => ErrorKind::Type,
      Self::Internal { .. } => ErrorKind::Internal,
      Self::ReadSource { .. } | Self::WriteOutput { .. } => ErrorKind::Io,
    }
  }

  pub fn location(&self) -> Option<&Location> {
    match self {
      Self::Syntax { pos, .. } | Self::Type { pos, .. } => Some(pos),
      _ => None,
    }
  }

  /// The bare message without location or snippet.
  pub fn message(&self) -> String {
    match self {
      Self::Syntax { message, .. } | Self::Type { message, .. } | Self::Internal { message } => {
        message.clone()
      }
      other => other.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn location_tracks_line_and_column() {
    let source = "int main() {\n  return x;\n}\n";
    let offset = source.find('x').unwrap();
    let loc = Location::from_offset(source, offset);
    assert_eq!(loc.line, 2);
    assert_eq!(loc.column, 10);
    assert_eq!(loc.line_text, "  return x;");
  }

  #[test]
  fn display_points_a_caret_at_the_column() {
    let err = CompileError::syntax("a + ;", 4, "expected an expression");
    let rendered = err.to_string();
    assert!(rendered.starts_with("1:5: syntax error: expected an expression"));
    assert!(rendered.ends_with("a + ;\n    ^"));
    assert_eq!(err.kind(), ErrorKind::Syntax);
  }

  #[test]
  fn known_line_numbers_are_kept() {
    let loc = Location::on_line("a\nbc\n", 4, 2);
    assert_eq!((loc.line, loc.column), (2, 3));
    assert_eq!(loc.line_text, "bc");
    assert_eq!(loc, Location::from_offset("a\nbc\n", 4));
  }

  #[test]
  fn offset_past_the_end_is_clamped() {
    let loc = Location::from_offset("abc", 99);
    assert_eq!(loc.line, 1);
    assert_eq!(loc.column, 4);
  }
}
