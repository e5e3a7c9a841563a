//! Crate root: wires together the compilation pipeline.
//!
//! The stages stay small and composable:
//! - `tokenizer` performs lexical analysis and produces a flat token vector.
//! - `parser` resolves names through `scope` and builds a typed `ast`.
//! - `codegen` lowers the translation unit into x86-64 AT&T assembly.
//! - `session` carries the counters both phases draw labels from.
//! - `error` centralises the diagnostics shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod scope;
pub mod session;
pub mod tokenizer;
pub mod ty;

pub use error::{CompileError, CompileResult, ErrorKind};
pub use session::Session;

/// Tokenize and parse a source string into a typed translation unit.
pub fn parse_program(source: &str, session: &mut Session) -> CompileResult<ast::Program> {
  let tokens = tokenizer::tokenize(source)?;
  tracing::debug!(tokens = tokens.len(), "tokenized source");
  parser::parse(tokens, source, session)
}

/// Compile a source string into AT&T assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let mut session = Session::new();
  let program = parse_program(source, &mut session)?;
  codegen::generate(&program, &mut session)
}
