//! Recursive-descent parser producing a fully typed translation unit.
//!
//! The parser mirrors the classic chibicc structure: declarations build
//! [`Type`]s, identifiers are resolved through the [`Scope`] stack while
//! parsing, and every expression node is typed the moment it is built.
//! Statements live in `stmt.rs` and expressions in `expr.rs`.

mod expr;
mod stmt;
mod stream;

use crate::ast::{BinaryOp, Function, Node, NodeKind, Obj, Program, Stmt, VarRef};
use crate::error::{CompileError, CompileResult};
use crate::scope::{Binding, Scope};
use crate::session::Session;
use crate::tokenizer::{Token, TokenKind};
use crate::ty::{Type, TypeKind, align_to, struct_layout, union_layout};

use stream::TokenStream;

/// Integer registers available for arguments; more parameters are rejected.
pub const MAX_ARGS: usize = 6;

/// Locals are addressed with 32-bit displacements from `%rbp`.
const MAX_FRAME_SIZE: i64 = i32::MAX as i64 - 16;

/// Parse a whole translation unit.
pub fn parse(tokens: Vec<Token>, source: &str, session: &mut Session) -> CompileResult<Program> {
  let parser = Parser {
    stream: TokenStream::new(tokens, source),
    session,
    scope: Scope::new(),
    program: Program::default(),
    locals: Vec::new(),
    frame_size: 0,
    ret_ty: None,
    loop_depth: 0,
  };
  parser.translation_unit()
}

/// Storage-class markers collected by `declspec`.
#[derive(Debug, Default)]
struct VarAttr {
  is_typedef: bool,
  is_static: bool,
}

// Each base-type keyword bumps a counter; the sum identifies the combination
// so that `long int` and `int long` resolve alike.
const VOID: u32 = 1 << 0;
const BOOL: u32 = 1 << 2;
const CHAR: u32 = 1 << 4;
const SHORT: u32 = 1 << 6;
const INT: u32 = 1 << 8;
const LONG: u32 = 1 << 10;
const OTHER: u32 = 1 << 12;

const TYPE_KEYWORDS: &[&str] = &[
  "void", "_Bool", "char", "short", "int", "long", "struct", "union", "enum", "typedef", "static",
];

struct Parser<'a, 's> {
  stream: TokenStream<'a>,
  session: &'s mut Session,
  scope: Scope,
  program: Program,
  /// Locals of the function being parsed, in declaration order.
  locals: Vec<Obj>,
  /// Bytes used by `locals` so far, checked against `MAX_FRAME_SIZE`.
  frame_size: i64,
  ret_ty: Option<Type>,
  loop_depth: usize,
}

impl<'a> Parser<'a, '_> {
  // program = (typedef | function-definition | global-variable)*
  fn translation_unit(mut self) -> CompileResult<Program> {
    while !self.stream.is_eof() {
      let mut attr = VarAttr::default();
      let base = self.declspec(Some(&mut attr))?;

      if attr.is_typedef {
        self.parse_typedef(base)?;
        continue;
      }

      if self.is_function(&base)? {
        self.function(base, &attr)?;
        continue;
      }

      self.global_variable(base, &attr)?;
    }

    tracing::debug!(
      functions = self.program.functions.len(),
      globals = self.program.globals.len(),
      "parsed translation unit"
    );
    Ok(self.program)
  }

  fn is_typename_token(&self, idx: usize) -> bool {
    let Some(token) = self.stream.token(idx) else {
      return false;
    };
    let text = self.stream.text(idx);
    match token.kind {
      TokenKind::Keyword => TYPE_KEYWORDS.contains(&text),
      TokenKind::Ident => self.scope.lookup_typedef(text).is_some(),
      _ => false,
    }
  }

  fn is_typename(&self) -> bool {
    self.is_typename_token(self.stream.pos())
  }

  fn is_typename_at(&self, offset: usize) -> bool {
    self.is_typename_token(self.stream.pos() + offset)
  }

  // declspec = ("void" | "_Bool" | "char" | "short" | "int" | "long"
  //             | "typedef" | "static"
  //             | struct-decl | union-decl | enum-specifier | typedef-name)+
  fn declspec(&mut self, mut attr: Option<&mut VarAttr>) -> CompileResult<Type> {
    let mut ty = Type::int();
    let mut counter = 0;

    while self.is_typename() {
      let idx = self.stream.pos();

      if self.stream.is("typedef") || self.stream.is("static") {
        let Some(attr) = attr.as_deref_mut() else {
          return Err(self.stream.syntax_error(
            idx,
            "storage class specifier is not allowed in this context",
          ));
        };
        if self.stream.equal("typedef") {
          attr.is_typedef = true;
        } else {
          self.stream.advance();
          attr.is_static = true;
        }
        if attr.is_typedef && attr.is_static {
          return Err(
            self
              .stream
              .syntax_error(idx, "typedef and static may not be used together"),
          );
        }
        continue;
      }

      let typedef = self.scope.lookup_typedef(self.stream.text(idx)).cloned();
      if self.stream.is("struct") || self.stream.is("union") || self.stream.is("enum") || typedef.is_some()
      {
        if counter != 0 {
          break;
        }
        ty = if self.stream.equal("struct") {
          self.struct_union_decl(false)?
        } else if self.stream.equal("union") {
          self.struct_union_decl(true)?
        } else if self.stream.equal("enum") {
          self.enum_specifier()?
        } else {
          self.stream.advance();
          let mut ty = typedef.unwrap_or_else(Type::int);
          ty.decl_token = None;
          ty
        };
        counter += OTHER;
        continue;
      }

      counter += match self.stream.text(idx) {
        "void" => VOID,
        "_Bool" => BOOL,
        "char" => CHAR,
        "short" => SHORT,
        "int" => INT,
        "long" => LONG,
        _ => return Err(self.stream.syntax_error(idx, "invalid type")),
      };
      self.stream.advance();

      ty = match counter {
        VOID => Type::void(),
        BOOL => Type::boolean(),
        CHAR => Type::char(),
        c if c == SHORT || c == SHORT + INT => Type::short(),
        INT => Type::int(),
        c if c == LONG || c == LONG + INT || c == LONG + LONG || c == LONG + LONG + INT => {
          Type::long()
        }
        _ => return Err(self.stream.syntax_error(idx, "invalid type")),
      };
    }

    Ok(ty)
  }

  // declarator = "*"* ("(" declarator ")" | ident?) type-suffix
  //
  // For a parenthesized declarator the inner part is parsed once against a
  // placeholder to find where it ends, the suffix after the ")" is applied to
  // the real base type, and the inner part is parsed again on top of that.
  fn declarator(&mut self, mut ty: Type) -> CompileResult<Type> {
    while self.stream.equal("*") {
      ty = Type::pointer_to(ty);
    }

    if self.stream.is("(") && !self.is_typename_at(1) && !self.stream.is_at(1, ")") {
      let start = self.stream.pos();
      self.stream.advance();
      self.declarator(Type::int())?;
      self.stream.skip(")")?;
      let ty = self.type_suffix(ty)?;
      let end = self.stream.pos();

      self.stream.set_pos(start + 1);
      let ty = self.declarator(ty)?;
      self.stream.set_pos(end);
      return Ok(ty);
    }

    let name = if self.stream.is_kind(TokenKind::Ident) {
      let idx = self.stream.pos();
      self.stream.advance();
      Some(idx)
    } else {
      None
    };

    let ty = self.type_suffix(ty)?;
    Ok(match name {
      Some(idx) => ty.with_decl_token(idx),
      None => ty,
    })
  }

  // type-suffix = "(" func-params | "[" array-dimensions | ε
  fn type_suffix(&mut self, ty: Type) -> CompileResult<Type> {
    if self.stream.equal("(") {
      return self.func_params(ty);
    }
    if self.stream.equal("[") {
      return self.array_dimensions(ty);
    }
    Ok(ty)
  }

  // array-dimensions = const-expr? "]" type-suffix
  fn array_dimensions(&mut self, ty: Type) -> CompileResult<Type> {
    let idx = self.stream.pos();
    let len = if self.stream.equal("]") {
      None
    } else {
      let len = self.const_expr()?;
      self.stream.skip("]")?;
      if len < 0 {
        return Err(self.stream.type_error(idx, "array size is negative"));
      }
      Some(len)
    };

    let elem = self.type_suffix(ty)?;
    if !elem.is_complete() {
      return Err(self.stream.type_error(idx, "array has incomplete element type"));
    }
    if len.is_some_and(|len| elem.size().checked_mul(len).is_none()) {
      return Err(self.stream.type_error(idx, "array is too large"));
    }
    Ok(Type::array_of(elem, len))
  }

  // func-params = ("void" | param ("," param)*)? ")"
  // param       = declspec declarator
  fn func_params(&mut self, ret: Type) -> CompileResult<Type> {
    let idx = self.stream.pos() - 1;
    if ret.is_struct_or_union() {
      return Err(self.stream.type_error(
        idx,
        "returning a struct or union by value is not supported",
      ));
    }
    if ret.is_array() || ret.is_func() {
      return Err(
        self
          .stream
          .type_error(idx, "function cannot return an array or a function"),
      );
    }

    let mut params = Vec::new();
    if self.stream.is("void") && self.stream.is_at(1, ")") {
      self.stream.advance();
      self.stream.advance();
      return Ok(Type::func(ret, params));
    }

    while !self.stream.equal(")") {
      if !params.is_empty() {
        self.stream.skip(",")?;
      }
      let param_idx = self.stream.pos();
      let base = self.declspec(None)?;
      let ty = self.declarator(base)?;
      let name = ty.decl_token;

      // arrays and functions in parameter position are adjusted to pointers
      let ty = match &ty.kind {
        TypeKind::Array { base, .. } => Type::pointer_to(base.as_ref().clone()),
        TypeKind::Func { .. } => Type::pointer_to(ty),
        _ => ty,
      };
      let ty = match name {
        Some(name) => ty.with_decl_token(name),
        None => ty,
      };

      if ty.is_struct_or_union() {
        return Err(self.stream.type_error(
          param_idx,
          "passing a struct or union by value is not supported",
        ));
      }
      if ty.is_void() {
        return Err(self.stream.type_error(param_idx, "parameter has void type"));
      }
      params.push(ty);
    }

    Ok(Type::func(ret, params))
  }

  // type-name = declspec abstract-declarator
  fn typename(&mut self) -> CompileResult<Type> {
    let base = self.declspec(None)?;
    let ty = self.declarator(base)?;
    if let Some(idx) = ty.decl_token {
      return Err(
        self
          .stream
          .syntax_error(idx, "unexpected identifier in type name"),
      );
    }
    Ok(ty)
  }

  // struct-decl = ident? ("{" (declspec declarator ("," declarator)* ";")* "}")?
  //
  // A tag seen without a body names an incomplete type. The body, when it
  // arrives in the same frame, completes that very type in place.
  fn struct_union_decl(&mut self, is_union: bool) -> CompileResult<Type> {
    let keyword = if is_union { "union" } else { "struct" };
    let tag = if self.stream.is_kind(TokenKind::Ident) {
      Some(self.stream.get_ident()?)
    } else {
      None
    };

    if let Some((name, idx)) = tag
      && !self.stream.is("{")
    {
      return match self.scope.lookup_tag(name) {
        Some(ty) => {
          self.check_tag_kind(ty, is_union, name, idx)?;
          Ok(ty.clone())
        }
        None => {
          let ty = Type::aggregate(is_union);
          self.scope.declare_tag(name, ty.clone());
          Ok(ty)
        }
      };
    }

    let ty = match tag {
      Some((name, idx)) => match self.scope.lookup_tag_current(name) {
        Some(ty) if !ty.is_complete() => {
          self.check_tag_kind(ty, is_union, name, idx)?;
          ty.clone()
        }
        _ => {
          let ty = Type::aggregate(is_union);
          self.scope.declare_tag(name, ty.clone());
          ty
        }
      },
      None => Type::aggregate(is_union),
    };

    let body_idx = self.stream.pos();
    self.stream.skip("{")?;
    let mut fields: Vec<(String, Type)> = Vec::new();
    while !self.stream.equal("}") {
      if self.stream.is_eof() {
        return Err(self.stream.error_here(format!("unterminated {keyword} definition")));
      }
      let base = self.declspec(None)?;
      let mut first = true;
      while !self.stream.equal(";") {
        if !first {
          self.stream.skip(",")?;
        }
        first = false;

        let ty = self.declarator(base.clone())?;
        let Some(idx) = ty.decl_token else {
          return Err(self.stream.error_here("expected a member name"));
        };
        let name = self.stream.text(idx);
        if !ty.is_complete() {
          return Err(
            self
              .stream
              .type_error(idx, format!("member '{name}' has incomplete type")),
          );
        }
        if fields.iter().any(|(existing, _)| existing == name) {
          return Err(
            self
              .stream
              .type_error(idx, format!("duplicate member '{name}'")),
          );
        }
        fields.push((name.to_string(), ty.without_name()));
      }
    }

    let layout = if is_union {
      union_layout(fields)
    } else {
      struct_layout(fields)
    };
    let Some(layout) = layout else {
      return Err(
        self
          .stream
          .type_error(body_idx, format!("{keyword} is too large")),
      );
    };
    ty.complete(layout);
    Ok(ty)
  }

  fn check_tag_kind(&self, ty: &Type, is_union: bool, name: &str, idx: usize) -> CompileResult<()> {
    if ty.is_struct_or_union() && ty.is_union() == is_union {
      return Ok(());
    }
    Err(
      self
        .stream
        .type_error(idx, format!("'{name}' defined as wrong kind of tag")),
    )
  }

  // enum-specifier = ident? "{" enum-list? "}"
  //                | ident
  // enum-list      = ident ("=" const-expr)? ("," ident ("=" const-expr)?)* ","?
  fn enum_specifier(&mut self) -> CompileResult<Type> {
    let tag = if self.stream.is_kind(TokenKind::Ident) {
      Some(self.stream.get_ident()?)
    } else {
      None
    };

    if let Some((name, idx)) = tag
      && !self.stream.is("{")
    {
      return match self.scope.lookup_tag(name) {
        Some(ty) if matches!(ty.kind, TypeKind::Enum) => Ok(ty.clone()),
        Some(_) => Err(
          self
            .stream
            .type_error(idx, format!("'{name}' defined as wrong kind of tag")),
        ),
        None => Err(
          self
            .stream
            .type_error(idx, format!("unknown enum type '{name}'")),
        ),
      };
    }

    self.stream.skip("{")?;
    // `None` once the previous enumerator was the largest representable value
    let mut next = Some(0);
    let mut first = true;
    while !self.stream.equal("}") {
      if !first {
        self.stream.skip(",")?;
        if self.stream.equal("}") {
          break;
        }
      }
      first = false;

      let (name, idx) = self.stream.get_ident()?;
      let value = if self.stream.equal("=") {
        self.const_expr()?
      } else {
        next.ok_or_else(|| {
          self
            .stream
            .type_error(idx, format!("enumerator value for '{name}' overflows"))
        })?
      };
      self.check_redeclaration(name, idx, |prev| matches!(prev, Binding::EnumConst(_)))?;
      self.scope.declare(name, Binding::EnumConst(value));
      next = value.checked_add(1);
    }

    let ty = Type::enumeration();
    if let Some((name, _)) = tag {
      self.scope.declare_tag(name, ty.clone());
    }
    Ok(ty)
  }

  // typedef = declarator ("," declarator)* ";"
  fn parse_typedef(&mut self, base: Type) -> CompileResult<()> {
    let mut first = true;
    while !self.stream.equal(";") {
      if !first {
        self.stream.skip(",")?;
      }
      first = false;

      let ty = self.declarator(base.clone())?;
      let Some(idx) = ty.decl_token else {
        return Err(self.stream.error_here("typedef name omitted"));
      };
      let name = self.stream.text(idx);
      let ty = ty.without_name();
      self.check_redeclaration(name, idx, |prev| matches!(prev, Binding::Typedef(_)))?;
      self.scope.declare_typedef(name, ty);
    }
    Ok(())
  }

  /// Look ahead to tell a function declaration from a variable declaration.
  /// Objects created while scanning, such as string literals in array
  /// dimensions, are discarded again.
  fn is_function(&mut self, base: &Type) -> CompileResult<bool> {
    if self.stream.is(";") {
      return Ok(false);
    }
    let start = self.stream.pos();
    let globals = self.program.globals.len();
    let locals = self.locals.len();
    let ty = self.declarator(base.clone());
    self.stream.set_pos(start);
    self.program.globals.truncate(globals);
    self.locals.truncate(locals);
    Ok(ty?.is_func())
  }

  // function-definition = declarator ("{" compound-stmt | ";")
  fn function(&mut self, base: Type, attr: &VarAttr) -> CompileResult<()> {
    let ty = self.declarator(base)?;
    let Some(name_idx) = ty.decl_token else {
      return Err(self.stream.error_here("function name omitted"));
    };
    let name = self.stream.text(name_idx);
    self.declare_function(name, name_idx, &ty)?;

    let existing = self
      .program
      .functions
      .iter()
      .position(|func| func.name == name);

    if self.stream.equal(";") {
      if existing.is_none() {
        self.program.functions.push(Function {
          name: name.to_string(),
          ty,
          is_static: attr.is_static,
          param_count: 0,
          locals: Vec::new(),
          body: None,
        });
      }
      return Ok(());
    }

    if let Some(pos) = existing
      && self.program.functions[pos].is_definition()
    {
      return Err(
        self
          .stream
          .type_error(name_idx, format!("redefinition of '{name}'")),
      );
    }

    // `static` on any declaration gives the function internal linkage
    let is_static =
      attr.is_static || existing.is_some_and(|pos| self.program.functions[pos].is_static);

    let params = ty.params();
    if params.len() > MAX_ARGS {
      return Err(self.stream.syntax_error(
        name_idx,
        format!("functions with more than {MAX_ARGS} parameters are not supported"),
      ));
    }

    self.locals.clear();
    self.frame_size = 0;
    self.ret_ty = ty.return_type().cloned();
    self.scope.enter();
    for param in params {
      let Some(idx) = param.decl_token else {
        return Err(self.stream.syntax_error(name_idx, "parameter name omitted"));
      };
      let param_name = self.stream.text(idx);
      let var = self.new_local(param_name, param.clone().without_name(), idx)?;
      self.scope.declare_var(param_name, var);
    }
    let param_count = params.len();

    self.stream.skip("{")?;
    let body = self.compound_block()?;
    self.scope.leave();
    self.ret_ty = None;

    let function = Function {
      name: name.to_string(),
      ty,
      is_static,
      param_count,
      locals: std::mem::take(&mut self.locals),
      body: Some(Stmt::Block(body)),
    };
    tracing::trace!(name = %function.name, locals = function.locals.len(), "parsed function");

    match existing {
      Some(pos) => self.program.functions[pos] = function,
      None => self.program.functions.push(function),
    }
    Ok(())
  }

  /// Bind a function name, checking it against any earlier declaration.
  fn declare_function(&mut self, name: &str, idx: usize, ty: &Type) -> CompileResult<()> {
    self.check_redeclaration(name, idx, |prev| matches!(prev, Binding::Func(_)))?;
    if let Some(Binding::Func(prev)) = self.scope.lookup(name) {
      let same_return = match (prev.return_type(), ty.return_type()) {
        (Some(a), Some(b)) => a.is_compatible(b),
        _ => false,
      };
      let unprototyped = prev.params().is_empty() || ty.params().is_empty();
      if !same_return || (!unprototyped && !prev.is_compatible(ty)) {
        return Err(
          self
            .stream
            .type_error(idx, format!("conflicting types for '{name}'")),
        );
      }
    }
    self.scope.declare(name, Binding::Func(ty.clone()));
    Ok(())
  }

  /// Reject reusing a name in the current frame for a different kind of
  /// symbol. Redeclaring the same kind is left to the caller.
  fn check_redeclaration(
    &self,
    name: &str,
    idx: usize,
    same_kind: impl Fn(&Binding) -> bool,
  ) -> CompileResult<()> {
    match self.scope.lookup_current(name) {
      Some(prev) if !same_kind(prev) => Err(
        self
          .stream
          .type_error(idx, format!("'{name}' redeclared as a different kind of symbol")),
      ),
      _ => Ok(()),
    }
  }

  // global-variable = (declarator ("=" initializer)? ("," declarator ("=" initializer)?)*)? ";"
  fn global_variable(&mut self, base: Type, attr: &VarAttr) -> CompileResult<()> {
    let mut first = true;
    while !self.stream.equal(";") {
      if !first {
        self.stream.skip(",")?;
      }
      first = false;

      let ty = self.declarator(base.clone())?;
      let Some(idx) = ty.decl_token else {
        return Err(self.stream.error_here("variable name omitted"));
      };
      let name = self.stream.text(idx);

      if ty.is_func() {
        self.declare_function(name, idx, &ty)?;
        continue;
      }
      self.check_object_type(&ty, idx)?;
      self.check_redeclaration(name, idx, |prev| matches!(prev, Binding::Var(_)))?;

      let init_data = if self.stream.equal("=") {
        Some(self.global_initializer(&ty, idx)?)
      } else {
        None
      };

      let existing = self.program.globals.iter().position(|var| var.name == name);
      if let Some(pos) = existing {
        let var = &mut self.program.globals[pos];
        if !var.ty.is_compatible(&ty) || (init_data.is_some() && var.init_data.is_some()) {
          return Err(
            self
              .stream
              .type_error(idx, format!("redefinition of '{name}'")),
          );
        }
        if init_data.is_some() {
          var.init_data = init_data;
        }
        self.scope.declare_var(name, VarRef::Global(pos));
        continue;
      }

      let mut obj = Obj::new(name, ty.without_name());
      obj.is_static = attr.is_static;
      obj.init_data = init_data;
      let var = self.new_global(obj);
      self.scope.declare_var(name, var);
    }
    Ok(())
  }

  // initializer = const-expr | string-literal   (for char arrays)
  //
  // The bytes may be shorter than the object; the rest is zero-filled when
  // the data section is emitted.
  fn global_initializer(&mut self, ty: &Type, idx: usize) -> CompileResult<Vec<u8>> {
    if let Some(base) = ty.base()
      && ty.is_array()
      && matches!(base.kind, TypeKind::Char)
      && self.stream.is_kind(TokenKind::Str)
    {
      let mut data = self.string_bytes()?;
      data.truncate(usize::try_from(ty.size()).unwrap_or(usize::MAX));
      return Ok(data);
    }

    if !ty.is_scalar() {
      return Err(self.stream.type_error(
        idx,
        "only integer constants and strings for char arrays can initialize a global",
      ));
    }
    let value = self.const_expr()?;
    let bytes = value.to_le_bytes();
    Ok(bytes[..bytes.len().min(ty.size() as usize)].to_vec())
  }

  fn check_object_type(&self, ty: &Type, idx: usize) -> CompileResult<()> {
    let name = self.stream.text(idx);
    if ty.is_void() {
      return Err(
        self
          .stream
          .type_error(idx, format!("variable '{name}' declared void")),
      );
    }
    if !ty.is_complete() {
      return Err(
        self
          .stream
          .type_error(idx, format!("variable '{name}' has incomplete type")),
      );
    }
    Ok(())
  }

  fn new_local(&mut self, name: &str, ty: Type, idx: usize) -> CompileResult<VarRef> {
    let frame_size = self
      .frame_size
      .checked_add(ty.size())
      .filter(|&size| size <= MAX_FRAME_SIZE)
      .and_then(|size| align_to(size, ty.align()));
    let Some(frame_size) = frame_size else {
      return Err(self.stream.type_error(idx, "stack frame is too large"));
    };
    self.frame_size = frame_size;
    self.locals.push(Obj::new(name, ty));
    Ok(VarRef::Local(self.locals.len() - 1))
  }

  fn new_global(&mut self, obj: Obj) -> VarRef {
    self.program.globals.push(obj);
    VarRef::Global(self.program.globals.len() - 1)
  }

  fn var_type(&self, var: VarRef) -> CompileResult<Type> {
    let obj = match var {
      VarRef::Local(idx) => self.locals.get(idx),
      VarRef::Global(idx) => self.program.globals.get(idx),
    };
    obj
      .map(|obj| obj.ty.clone())
      .ok_or_else(|| CompileError::internal(format!("dangling variable reference {var:?}")))
  }

  fn const_expr(&mut self) -> CompileResult<i64> {
    let node = self.conditional()?;
    self.eval(&node)
  }

  /// Fold an expression that must be known at compile time.
  fn eval(&self, node: &Node) -> CompileResult<i64> {
    let value = match &node.kind {
      NodeKind::Num(value) => *value,
      NodeKind::Neg(operand) => self.eval(operand)?.wrapping_neg(),
      NodeKind::Not(operand) => i64::from(self.eval(operand)? == 0),
      NodeKind::BitNot(operand) => !self.eval(operand)?,
      NodeKind::Cast(operand) => self.eval(operand)?,
      NodeKind::LogAnd(lhs, rhs) => i64::from(self.eval(lhs)? != 0 && self.eval(rhs)? != 0),
      NodeKind::LogOr(lhs, rhs) => i64::from(self.eval(lhs)? != 0 || self.eval(rhs)? != 0),
      NodeKind::Cond { cond, then, els } => {
        if self.eval(cond)? != 0 {
          self.eval(then)?
        } else {
          self.eval(els)?
        }
      }
      NodeKind::Binary { op, lhs, rhs } => {
        let l = self.eval(lhs)?;
        let r = self.eval(rhs)?;
        match op {
          BinaryOp::Add => l.wrapping_add(r),
          BinaryOp::Sub => l.wrapping_sub(r),
          BinaryOp::Mul => l.wrapping_mul(r),
          BinaryOp::Div | BinaryOp::Mod if r == 0 => {
            return Err(
              self
                .stream
                .type_error(node.tok, "division by zero in constant expression"),
            );
          }
          BinaryOp::Div => l.wrapping_div(r),
          BinaryOp::Mod => l.wrapping_rem(r),
          BinaryOp::BitAnd => l & r,
          BinaryOp::BitOr => l | r,
          BinaryOp::BitXor => l ^ r,
          BinaryOp::Shl => l.wrapping_shl(r as u32),
          BinaryOp::Shr => l.wrapping_shr(r as u32),
          BinaryOp::Eq => i64::from(l == r),
          BinaryOp::Ne => i64::from(l != r),
          BinaryOp::Lt => i64::from(l < r),
          BinaryOp::Le => i64::from(l <= r),
        }
      }
      _ => {
        return Err(
          self
            .stream
            .type_error(node.tok, "not a compile-time constant"),
        );
      }
    };
    Ok(truncate(value, &node.ty))
  }
}

/// Wrap a folded value to the width of its type.
fn truncate(value: i64, ty: &Type) -> i64 {
  match ty.kind {
    TypeKind::Bool => i64::from(value != 0),
    _ => match ty.size() {
      1 => i64::from(value as i8),
      2 => i64::from(value as i16),
      4 => i64::from(value as i32),
      _ => value,
    },
  }
}
