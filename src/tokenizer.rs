//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about semantics beyond recognising keywords,
//! punctuators and literals. Multi-character punctuators are matched before
//! single-character ones to avoid ambiguity. Escape sequences are decoded
//! here so the parser only ever sees finished literal values.

use crate::error::{CompileError, CompileResult};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Punctuator,
  Keyword,
  Str,
  Num,
  Eof,
}

/// Lexical information needed by later stages.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  /// Integer value for `Num` tokens (character literals included).
  pub value: Option<i64>,
  /// Decoded bytes of a string literal, without the terminating NUL.
  pub str: Option<Vec<u8>>,
  pub loc: usize,
  pub len: usize,
  pub line: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, loc: usize, len: usize, line: usize) -> Self {
    Self {
      kind,
      value: None,
      str: None,
      loc,
      len,
      line,
    }
  }
}

const KEYWORDS: &[&str] = &[
  "return", "if", "else", "for", "while", "int", "long", "short", "char", "void", "_Bool",
  "struct", "union", "enum", "typedef", "static", "sizeof", "break", "continue",
];

const PUNCTUATORS: &[&str] = &[
  "<<=", ">>=", "...", "==", "!=", "<=", ">=", "->", "++", "--", "+=", "-=", "*=", "/=", "%=",
  "&=", "|=", "^=", "&&", "||", "<<", ">>",
];

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut lexer = Lexer {
    input,
    bytes: input.as_bytes(),
    pos: 0,
    line: 1,
  };
  let mut tokens = Vec::new();

  while lexer.pos < lexer.bytes.len() {
    let c = lexer.bytes[lexer.pos];

    if input[lexer.pos..].starts_with("//") {
      while lexer.pos < lexer.bytes.len() && lexer.bytes[lexer.pos] != b'\n' {
        lexer.pos += 1;
      }
      continue;
    }

    if input[lexer.pos..].starts_with("/*") {
      let Some(end) = input[lexer.pos + 2..].find("*/") else {
        return Err(CompileError::syntax(
          input,
          lexer.pos,
          "unclosed block comment",
        ));
      };
      let close = lexer.pos + 2 + end + 2;
      lexer.line += input[lexer.pos..close].matches('\n').count();
      lexer.pos = close;
      continue;
    }

    if c == b'\n' {
      lexer.line += 1;
      lexer.pos += 1;
      continue;
    }

    if c.is_ascii_whitespace() {
      lexer.pos += 1;
      continue;
    }

    if c.is_ascii_digit() {
      tokens.push(lexer.number()?);
      continue;
    }

    if c == b'"' {
      tokens.push(lexer.string_literal()?);
      continue;
    }

    if c == b'\'' {
      tokens.push(lexer.char_literal()?);
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = lexer.pos;
      while lexer.pos < lexer.bytes.len()
        && (lexer.bytes[lexer.pos].is_ascii_alphanumeric() || lexer.bytes[lexer.pos] == b'_')
      {
        lexer.pos += 1;
      }
      let text = &input[start..lexer.pos];
      let kind = if KEYWORDS.contains(&text) {
        TokenKind::Keyword
      } else {
        TokenKind::Ident
      };
      tokens.push(Token::new(kind, start, lexer.pos - start, lexer.line));
      continue;
    }

    if let Some(op) = PUNCTUATORS
      .iter()
      .find(|op| input[lexer.pos..].starts_with(**op))
    {
      tokens.push(Token::new(
        TokenKind::Punctuator,
        lexer.pos,
        op.len(),
        lexer.line,
      ));
      lexer.pos += op.len();
      continue;
    }

    if c.is_ascii_punctuation() {
      tokens.push(Token::new(TokenKind::Punctuator, lexer.pos, 1, lexer.line));
      lexer.pos += 1;
      continue;
    }

    let invalid_char = input[lexer.pos..].chars().next().unwrap_or('\0');
    return Err(CompileError::syntax(
      input,
      lexer.pos,
      format!("invalid token: '{invalid_char}'"),
    ));
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0, lexer.line));
  tracing::trace!(count = tokens.len(), "tokenized input");
  Ok(tokens)
}

struct Lexer<'a> {
  input: &'a str,
  bytes: &'a [u8],
  pos: usize,
  line: usize,
}

impl Lexer<'_> {
  fn peek_byte(&self) -> Option<u8> {
    self.bytes.get(self.pos).copied()
  }

  fn number(&mut self) -> CompileResult<Token> {
    let start = self.pos;
    let rest = &self.input[start..];
    let (radix, prefix) = if rest.starts_with("0x") || rest.starts_with("0X") {
      (16, 2)
    } else if rest.starts_with("0b") || rest.starts_with("0B") {
      (2, 2)
    } else if rest.starts_with('0') && rest.len() > 1 && rest.as_bytes()[1].is_ascii_digit() {
      (8, 1)
    } else {
      (10, 0)
    };

    self.pos += prefix;
    let digits_start = self.pos;
    while self
      .peek_byte()
      .is_some_and(|b| (b as char).is_digit(radix))
    {
      self.pos += 1;
    }
    let digits = &self.input[digits_start..self.pos];

    while self.peek_byte().is_some_and(|b| matches!(b, b'l' | b'L' | b'u' | b'U')) {
      self.pos += 1;
    }
    if digits.is_empty() || self.peek_byte().is_some_and(|b| b.is_ascii_alphanumeric()) {
      return Err(CompileError::syntax(
        self.input,
        start,
        "invalid numeric literal",
      ));
    }

    let value = u64::from_str_radix(digits, radix)
      .map_err(|err| CompileError::syntax(self.input, start, format!("invalid number: {err}")))?;
    let mut token = Token::new(TokenKind::Num, start, self.pos - start, self.line);
    token.value = Some(value as i64);
    Ok(token)
  }

  fn string_literal(&mut self) -> CompileResult<Token> {
    let start = self.pos;
    self.pos += 1;
    let mut buf = Vec::new();

    loop {
      match self.peek_byte() {
        None | Some(b'\n') => {
          return Err(CompileError::syntax(
            self.input,
            start,
            "unclosed string literal",
          ));
        }
        Some(b'"') => break,
        Some(b'\\') => {
          self.pos += 1;
          buf.push(self.escape()?);
        }
        Some(b) => {
          buf.push(b);
          self.pos += 1;
        }
      }
    }
    self.pos += 1;

    let mut token = Token::new(TokenKind::Str, start, self.pos - start, self.line);
    token.str = Some(buf);
    Ok(token)
  }

  fn char_literal(&mut self) -> CompileResult<Token> {
    let start = self.pos;
    self.pos += 1;

    let value = match self.peek_byte() {
      None | Some(b'\n') | Some(b'\'') => {
        return Err(CompileError::syntax(
          self.input,
          start,
          "unclosed char literal",
        ));
      }
      Some(b'\\') => {
        self.pos += 1;
        self.escape()?
      }
      Some(b) => {
        self.pos += 1;
        b
      }
    };

    if self.peek_byte() != Some(b'\'') {
      return Err(CompileError::syntax(
        self.input,
        start,
        "unclosed char literal",
      ));
    }
    self.pos += 1;

    let mut token = Token::new(TokenKind::Num, start, self.pos - start, self.line);
    token.value = Some(value as i8 as i64);
    Ok(token)
  }

  /// Decode one escape sequence; `pos` sits just past the backslash.
  fn escape(&mut self) -> CompileResult<u8> {
    let Some(c) = self.peek_byte() else {
      return Err(CompileError::syntax(
        self.input,
        self.pos,
        "unterminated escape sequence",
      ));
    };

    if (b'0'..=b'7').contains(&c) {
      let mut value: u32 = 0;
      for _ in 0..3 {
        match self.peek_byte() {
          Some(d @ b'0'..=b'7') => {
            value = value * 8 + u32::from(d - b'0');
            self.pos += 1;
          }
          _ => break,
        }
      }
      return Ok(value as u8);
    }

    if c == b'x' {
      self.pos += 1;
      let start = self.pos;
      let mut value: u32 = 0;
      while let Some(d) = self.peek_byte().and_then(|b| (b as char).to_digit(16)) {
        value = value.wrapping_mul(16).wrapping_add(d);
        self.pos += 1;
      }
      if self.pos == start {
        return Err(CompileError::syntax(
          self.input,
          start,
          "invalid hex escape sequence",
        ));
      }
      return Ok(value as u8);
    }

    self.pos += 1;
    Ok(match c {
      b'a' => 7,
      b'b' => 8,
      b't' => b'\t',
      b'n' => b'\n',
      b'v' => 11,
      b'f' => 12,
      b'r' => b'\r',
      b'e' => 27,
      other => other,
    })
  }
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source)
      .unwrap()
      .into_iter()
      .map(|t| t.kind)
      .collect()
  }

  #[test]
  fn recognises_keywords_idents_and_punctuators() {
    let source = "int x_1 = y->z <<= 3;";
    let tokens = tokenize(source).unwrap();
    let texts: Vec<_> = tokens.iter().map(|t| token_text(t, source)).collect();
    assert_eq!(texts, ["int", "x_1", "=", "y", "->", "z", "<<=", "3", ";", ""]);
    assert_eq!(tokens[0].kind, TokenKind::Keyword);
    assert_eq!(tokens[1].kind, TokenKind::Ident);
    assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
  }

  #[test]
  fn numeric_literals_in_every_radix() {
    let tokens = tokenize("10 0x1f 017 0b101 42L").unwrap();
    let values: Vec<_> = tokens.iter().filter_map(|t| t.value).collect();
    assert_eq!(values, [10, 31, 15, 5, 42]);
  }

  #[test]
  fn decodes_escapes_in_strings_and_chars() {
    let tokens = tokenize(r#""a\n\x41\101\"" '\0' '\n' 'z'"#).unwrap();
    assert_eq!(tokens[0].str.as_deref(), Some(&b"a\nAA\""[..]));
    assert_eq!(tokens[1].value, Some(0));
    assert_eq!(tokens[2].value, Some(10));
    assert_eq!(tokens[3].value, Some(122));
  }

  #[test]
  fn comments_are_skipped_and_lines_counted() {
    let tokens = tokenize("a // one\n/* two\nthree */ b").unwrap();
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens[0].line, 1);
    assert_eq!(tokens[1].line, 3);
  }

  #[test]
  fn rejects_unterminated_literals() {
    assert!(tokenize("\"abc").is_err());
    assert!(tokenize("'a").is_err());
    assert!(tokenize("/* open").is_err());
    assert!(tokenize("12abc").is_err());
  }

  #[test]
  fn empty_input_is_just_eof() {
    assert_eq!(kinds(""), [TokenKind::Eof]);
  }
}
