//! Lightweight cursor over the token vector.
//!
//! Positions are plain indices, so saving and restoring the cursor is how the
//! declarator parser looks ahead.

use crate::error::{CompileError, CompileResult, Location};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};

pub(crate) struct TokenStream<'a> {
  tokens: Vec<Token>,
  pub(crate) source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser advances `pos` as it consumes input.
  pub(crate) fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  pub(crate) fn pos(&self) -> usize {
    self.pos
  }

  pub(crate) fn set_pos(&mut self, pos: usize) {
    self.pos = pos;
  }

  pub(crate) fn advance(&mut self) {
    if !self.is_eof() {
      self.pos += 1;
    }
  }

  pub(crate) fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  pub(crate) fn peek_at(&self, offset: usize) -> Option<&Token> {
    self.tokens.get(self.pos + offset)
  }

  pub(crate) fn token(&self, idx: usize) -> Option<&Token> {
    self.tokens.get(idx)
  }

  pub(crate) fn text(&self, idx: usize) -> &'a str {
    match self.tokens.get(idx) {
      Some(token) => token_text(token, self.source),
      None => "",
    }
  }

  fn matches(token: Option<&Token>, source: &str, op: &str) -> bool {
    token.is_some_and(|token| {
      matches!(token.kind, TokenKind::Punctuator | TokenKind::Keyword)
        && token.len == op.len()
        && token_text(token, source) == op
    })
  }

  /// Whether the current token is the given punctuator or keyword.
  pub(crate) fn is(&self, op: &str) -> bool {
    Self::matches(self.peek(), self.source, op)
  }

  pub(crate) fn is_at(&self, offset: usize, op: &str) -> bool {
    Self::matches(self.peek_at(offset), self.source, op)
  }

  /// Consume the current token if it matches the provided punctuator or keyword.
  pub(crate) fn equal(&mut self, op: &str) -> bool {
    if self.is(op) {
      self.pos += 1;
      return true;
    }
    false
  }

  pub(crate) fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      let got = describe_token(self.peek(), self.source);
      Err(self.error_here(format!("expected \"{s}\", but got \"{got}\"")))
    }
  }

  /// Parse the current token as an integer literal returning its value and index.
  pub(crate) fn get_number(&mut self) -> CompileResult<(i64, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Num
    {
      let idx = self.pos;
      let value = token.value.ok_or_else(|| {
        CompileError::internal(format!("numeric token {idx} is missing its value"))
      })?;
      self.pos += 1;
      return Ok((value, idx));
    }

    let got = describe_token(self.peek(), self.source);
    Err(self.error_here(format!("expected a number, but got \"{got}\"")))
  }

  /// Parse the current token as an identifier returning its text and index.
  pub(crate) fn get_ident(&mut self) -> CompileResult<(&'a str, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let idx = self.pos;
      self.pos += 1;
      return Ok((self.text(idx), idx));
    }

    let got = describe_token(self.peek(), self.source);
    Err(self.error_here(format!("expected an identifier, but got \"{got}\"")))
  }

  pub(crate) fn is_kind(&self, kind: TokenKind) -> bool {
    self.peek().is_some_and(|token| token.kind == kind)
  }

  pub(crate) fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Eof) | None)
  }

  /// Where a diagnostic about token `idx` points. Past the end means the
  /// final `Eof` token.
  fn location(&self, idx: usize) -> Location {
    match self.tokens.get(idx).or_else(|| self.tokens.last()) {
      Some(token) => Location::on_line(self.source, token.loc, token.line),
      None => Location::from_offset(self.source, self.source.len()),
    }
  }

  /// A syntax error pointing at the current token.
  pub(crate) fn error_here(&self, message: impl Into<String>) -> CompileError {
    self.syntax_error(self.pos, message)
  }

  pub(crate) fn syntax_error(&self, idx: usize, message: impl Into<String>) -> CompileError {
    CompileError::Syntax {
      pos: self.location(idx),
      message: message.into(),
    }
  }

  pub(crate) fn type_error(&self, idx: usize, message: impl Into<String>) -> CompileError {
    CompileError::Type {
      pos: self.location(idx),
      message: message.into(),
    }
  }
}
