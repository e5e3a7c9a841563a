//! Expression grammar, from the comma operator down to primaries.
//!
//! Each helper returns a node whose type is already known. Implicit
//! conversions are explicit cast nodes, and pointer arithmetic is rewritten
//! here so the generator never has to scale anything itself.

use crate::ast::{BinaryOp, Node, NodeKind, Obj, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::scope::Binding;
use crate::tokenizer::TokenKind;
use crate::ty::{Type, common_type};

use super::{MAX_ARGS, Parser};

/// Arrays decay to pointers, so they are usable wherever a scalar is.
fn is_value(ty: &Type) -> bool {
  ty.is_scalar() || ty.is_array()
}

fn binary(op: BinaryOp, lhs: Node, rhs: Node, ty: Type, tok: usize) -> Node {
  Node::new(
    NodeKind::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    },
    ty,
    tok,
  )
}

/// Cast both operands to their common type.
fn usual_arith(lhs: Node, rhs: Node) -> (Node, Node, Type) {
  let ty = common_type(&lhs.ty, &rhs.ty);
  (Node::cast(lhs, ty.clone()), Node::cast(rhs, ty.clone()), ty)
}

/// Integer promotion: anything narrower than `long` computes as `int`.
fn promoted(ty: &Type) -> Type {
  common_type(ty, &Type::int())
}

const ASSIGN_OPS: &[(&str, BinaryOp)] = &[
  ("+=", BinaryOp::Add),
  ("-=", BinaryOp::Sub),
  ("*=", BinaryOp::Mul),
  ("/=", BinaryOp::Div),
  ("%=", BinaryOp::Mod),
  ("&=", BinaryOp::BitAnd),
  ("|=", BinaryOp::BitOr),
  ("^=", BinaryOp::BitXor),
  ("<<=", BinaryOp::Shl),
  (">>=", BinaryOp::Shr),
];

impl Parser<'_, '_> {
  // expr = assign ("," expr)?
  pub(super) fn expr(&mut self) -> CompileResult<Node> {
    let node = self.assign()?;
    if self.stream.equal(",") {
      let rhs = self.expr()?;
      return Ok(Node::comma(node, rhs));
    }
    Ok(node)
  }

  // assign    = conditional (assign-op assign)?
  // assign-op = "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^="
  //           | "<<=" | ">>="
  pub(super) fn assign(&mut self) -> CompileResult<Node> {
    let node = self.conditional()?;
    let tok = self.stream.pos();

    if self.stream.equal("=") {
      let rhs = self.assign()?;
      return self.new_assign(node, rhs, tok);
    }

    if let Some((_, op)) = ASSIGN_OPS.iter().find(|(text, _)| self.stream.is(text)) {
      self.stream.advance();
      let rhs = self.assign()?;
      return self.compound_assign(*op, node, rhs, tok);
    }

    Ok(node)
  }

  // conditional = logor ("?" expr ":" conditional)?
  pub(super) fn conditional(&mut self) -> CompileResult<Node> {
    let cond = self.logor()?;
    if !self.stream.is("?") {
      return Ok(cond);
    }
    let tok = self.stream.pos();
    self.stream.advance();
    self.expect_condition(&cond)?;

    let then = self.expr()?;
    self.stream.skip(":")?;
    let els = self.conditional()?;

    let (then, els, ty) = if then.ty.is_void() || els.ty.is_void() {
      (then, els, Type::void())
    } else if then.ty.is_struct_or_union() || els.ty.is_struct_or_union() {
      if !then.ty.is_compatible(&els.ty) {
        return Err(
          self
            .stream
            .type_error(tok, "mismatched operand types in conditional expression"),
        );
      }
      let ty = then.ty.clone();
      (then, els, ty)
    } else {
      usual_arith(then, els)
    };

    Ok(Node::new(
      NodeKind::Cond {
        cond: Box::new(cond),
        then: Box::new(then),
        els: Box::new(els),
      },
      ty,
      tok,
    ))
  }

  // logor = logand ("||" logand)*
  fn logor(&mut self) -> CompileResult<Node> {
    let mut node = self.logand()?;
    loop {
      let tok = self.stream.pos();
      if !self.stream.equal("||") {
        return Ok(node);
      }
      let rhs = self.logand()?;
      self.expect_condition(&node)?;
      self.expect_condition(&rhs)?;
      node = Node::new(
        NodeKind::LogOr(Box::new(node), Box::new(rhs)),
        Type::int(),
        tok,
      );
    }
  }

  // logand = bitor ("&&" bitor)*
  fn logand(&mut self) -> CompileResult<Node> {
    let mut node = self.bitor()?;
    loop {
      let tok = self.stream.pos();
      if !self.stream.equal("&&") {
        return Ok(node);
      }
      let rhs = self.bitor()?;
      self.expect_condition(&node)?;
      self.expect_condition(&rhs)?;
      node = Node::new(
        NodeKind::LogAnd(Box::new(node), Box::new(rhs)),
        Type::int(),
        tok,
      );
    }
  }

  // bitor = bitxor ("|" bitxor)*
  fn bitor(&mut self) -> CompileResult<Node> {
    let mut node = self.bitxor()?;
    loop {
      let tok = self.stream.pos();
      if !self.stream.equal("|") {
        return Ok(node);
      }
      let rhs = self.bitxor()?;
      node = self.new_binary_op(BinaryOp::BitOr, node, rhs, tok)?;
    }
  }

  // bitxor = bitand ("^" bitand)*
  fn bitxor(&mut self) -> CompileResult<Node> {
    let mut node = self.bitand()?;
    loop {
      let tok = self.stream.pos();
      if !self.stream.equal("^") {
        return Ok(node);
      }
      let rhs = self.bitand()?;
      node = self.new_binary_op(BinaryOp::BitXor, node, rhs, tok)?;
    }
  }

  // bitand = equality ("&" equality)*
  fn bitand(&mut self) -> CompileResult<Node> {
    let mut node = self.equality()?;
    loop {
      let tok = self.stream.pos();
      if !self.stream.equal("&") {
        return Ok(node);
      }
      let rhs = self.equality()?;
      node = self.new_binary_op(BinaryOp::BitAnd, node, rhs, tok)?;
    }
  }

  // equality = relational ("==" relational | "!=" relational)*
  fn equality(&mut self) -> CompileResult<Node> {
    let mut node = self.relational()?;
    loop {
      let tok = self.stream.pos();
      let op = if self.stream.equal("==") {
        BinaryOp::Eq
      } else if self.stream.equal("!=") {
        BinaryOp::Ne
      } else {
        return Ok(node);
      };
      let rhs = self.relational()?;
      node = self.new_binary_op(op, node, rhs, tok)?;
    }
  }

  // relational = shift ("<" shift | "<=" shift | ">" shift | ">=" shift)*
  fn relational(&mut self) -> CompileResult<Node> {
    let mut node = self.shift()?;
    loop {
      let tok = self.stream.pos();
      if self.stream.equal("<") {
        let rhs = self.shift()?;
        node = self.new_binary_op(BinaryOp::Lt, node, rhs, tok)?;
      } else if self.stream.equal("<=") {
        let rhs = self.shift()?;
        node = self.new_binary_op(BinaryOp::Le, node, rhs, tok)?;
      } else if self.stream.equal(">") {
        let rhs = self.shift()?;
        node = self.new_binary_op(BinaryOp::Lt, rhs, node, tok)?;
      } else if self.stream.equal(">=") {
        let rhs = self.shift()?;
        node = self.new_binary_op(BinaryOp::Le, rhs, node, tok)?;
      } else {
        return Ok(node);
      }
    }
  }

  // shift = add ("<<" add | ">>" add)*
  fn shift(&mut self) -> CompileResult<Node> {
    let mut node = self.add()?;
    loop {
      let tok = self.stream.pos();
      let op = if self.stream.equal("<<") {
        BinaryOp::Shl
      } else if self.stream.equal(">>") {
        BinaryOp::Shr
      } else {
        return Ok(node);
      };
      let rhs = self.add()?;
      node = self.new_binary_op(op, node, rhs, tok)?;
    }
  }

  // add = mul ("+" mul | "-" mul)*
  fn add(&mut self) -> CompileResult<Node> {
    let mut node = self.mul()?;
    loop {
      let tok = self.stream.pos();
      let op = if self.stream.equal("+") {
        BinaryOp::Add
      } else if self.stream.equal("-") {
        BinaryOp::Sub
      } else {
        return Ok(node);
      };
      let rhs = self.mul()?;
      node = self.new_binary_op(op, node, rhs, tok)?;
    }
  }

  // mul = cast ("*" cast | "/" cast | "%" cast)*
  fn mul(&mut self) -> CompileResult<Node> {
    let mut node = self.cast()?;
    loop {
      let tok = self.stream.pos();
      let op = if self.stream.equal("*") {
        BinaryOp::Mul
      } else if self.stream.equal("/") {
        BinaryOp::Div
      } else if self.stream.equal("%") {
        BinaryOp::Mod
      } else {
        return Ok(node);
      };
      let rhs = self.cast()?;
      node = self.new_binary_op(op, node, rhs, tok)?;
    }
  }

  // cast = "(" type-name ")" cast | unary
  fn cast(&mut self) -> CompileResult<Node> {
    if !(self.stream.is("(") && self.is_typename_at(1)) {
      return self.unary();
    }

    let tok = self.stream.pos();
    self.stream.advance();
    let ty = self.typename()?;
    self.stream.skip(")")?;
    let expr = self.cast()?;

    if ty.is_struct_or_union() || ty.is_array() || ty.is_func() {
      return Err(self.stream.type_error(tok, "invalid cast target type"));
    }
    if !ty.is_void() && !is_value(&expr.ty) {
      return Err(self.stream.type_error(tok, "invalid operand for cast"));
    }
    Ok(Node::new(NodeKind::Cast(Box::new(expr)), ty, tok))
  }

  // unary = ("+" | "-" | "*" | "&" | "!" | "~") cast
  //       | ("++" | "--") unary
  //       | postfix
  fn unary(&mut self) -> CompileResult<Node> {
    let tok = self.stream.pos();

    if self.stream.equal("+") {
      let operand = self.cast()?;
      self.expect_integer(&operand, tok)?;
      return Ok(operand);
    }

    if self.stream.equal("-") {
      let operand = self.cast()?;
      self.expect_integer(&operand, tok)?;
      let ty = promoted(&operand.ty);
      let operand = Node::cast(operand, ty.clone());
      return Ok(Node::new(NodeKind::Neg(Box::new(operand)), ty, tok));
    }

    if self.stream.equal("&") {
      let operand = self.cast()?;
      return self.new_addr(operand, tok);
    }

    if self.stream.equal("*") {
      let operand = self.cast()?;
      return self.new_deref(operand, tok);
    }

    if self.stream.equal("!") {
      let operand = self.cast()?;
      self.expect_condition(&operand)?;
      return Ok(Node::new(
        NodeKind::Not(Box::new(operand)),
        Type::int(),
        tok,
      ));
    }

    if self.stream.equal("~") {
      let operand = self.cast()?;
      self.expect_integer(&operand, tok)?;
      let ty = promoted(&operand.ty);
      let operand = Node::cast(operand, ty.clone());
      return Ok(Node::new(NodeKind::BitNot(Box::new(operand)), ty, tok));
    }

    // ++x is x += 1
    if self.stream.equal("++") {
      let operand = self.unary()?;
      return self.compound_assign(BinaryOp::Add, operand, Node::number(1, tok), tok);
    }

    if self.stream.equal("--") {
      let operand = self.unary()?;
      return self.compound_assign(BinaryOp::Sub, operand, Node::number(1, tok), tok);
    }

    self.postfix()
  }

  // postfix = primary ("[" expr "]" | "." ident | "->" ident | "++" | "--")*
  fn postfix(&mut self) -> CompileResult<Node> {
    let mut node = self.primary()?;

    loop {
      let tok = self.stream.pos();

      // x[y] is *(x+y)
      if self.stream.equal("[") {
        let index = self.expr()?;
        self.stream.skip("]")?;
        let sum = self.new_binary_op(BinaryOp::Add, node, index, tok)?;
        node = self.new_deref(sum, tok)?;
        continue;
      }

      if self.stream.equal(".") {
        let (_, name) = self.stream.get_ident()?;
        node = self.new_member(node, name, tok)?;
        continue;
      }

      // x->y is (*x).y
      if self.stream.equal("->") {
        let base = self.new_deref(node, tok)?;
        let (_, name) = self.stream.get_ident()?;
        node = self.new_member(base, name, tok)?;
        continue;
      }

      if self.stream.equal("++") {
        node = self.post_increment(node, 1, tok)?;
        continue;
      }

      if self.stream.equal("--") {
        node = self.post_increment(node, -1, tok)?;
        continue;
      }

      return Ok(node);
    }
  }

  // primary = "(" "{" stmt+ "}" ")"
  //         | "(" expr ")"
  //         | "sizeof" "(" type-name ")"
  //         | "sizeof" unary
  //         | ident func-args?
  //         | str
  //         | num
  fn primary(&mut self) -> CompileResult<Node> {
    let tok = self.stream.pos();

    // GNU statement expression
    if self.stream.is("(") && self.stream.is_at(1, "{") {
      self.stream.advance();
      self.stream.advance();
      let body = self.compound_block()?;
      self.stream.skip(")")?;
      let ty = match body.last() {
        Some(Stmt::Expr(node)) => node.ty.clone(),
        _ => {
          return Err(self.stream.type_error(
            tok,
            "statement expression must end with an expression statement",
          ));
        }
      };
      return Ok(Node::new(NodeKind::StmtExpr(body), ty, tok));
    }

    if self.stream.equal("(") {
      let node = self.expr()?;
      self.stream.skip(")")?;
      return Ok(node);
    }

    if self.stream.equal("sizeof") {
      let ty = if self.stream.is("(") && self.is_typename_at(1) {
        self.stream.advance();
        let ty = self.typename()?;
        self.stream.skip(")")?;
        ty
      } else {
        self.unary()?.ty
      };
      if !ty.is_complete() {
        return Err(self.stream.type_error(
          tok,
          "invalid application of 'sizeof' to an incomplete type",
        ));
      }
      return Ok(Node::long(ty.size(), tok));
    }

    if self.stream.is_kind(TokenKind::Ident) {
      let (name, idx) = self.stream.get_ident()?;
      if self.stream.is("(") {
        return self.funcall(name, idx);
      }

      return match self.scope.lookup(name).cloned() {
        Some(Binding::Var(var)) => Ok(Node::var(var, self.var_type(var)?, idx)),
        Some(Binding::EnumConst(value)) => Ok(Node::number(value, idx)),
        Some(Binding::Func(_)) => Err(self.stream.type_error(
          idx,
          format!("function '{name}' can only be used in a call"),
        )),
        Some(Binding::Typedef(_)) => Err(
          self
            .stream
            .syntax_error(idx, format!("unexpected type name '{name}'")),
        ),
        None => Err(
          self
            .stream
            .syntax_error(idx, format!("undefined variable '{name}'")),
        ),
      };
    }

    if self.stream.is_kind(TokenKind::Str) {
      let data = self.string_bytes()?;
      let ty = Type::array_of(Type::char(), Some(data.len() as i64));
      let mut obj = Obj::new(self.session.unique_name(), ty.clone());
      obj.is_static = true;
      obj.init_data = Some(data);
      let var = self.new_global(obj);
      return Ok(Node::var(var, ty, tok));
    }

    if self.stream.is_kind(TokenKind::Num) {
      let (value, idx) = self.stream.get_number()?;
      return Ok(Node::number(value, idx));
    }

    Err(self.stream.error_here("expected an expression"))
  }

  /// Bytes of one or more adjacent string literals, NUL-terminated.
  pub(super) fn string_bytes(&mut self) -> CompileResult<Vec<u8>> {
    let mut data = Vec::new();
    while self.stream.is_kind(TokenKind::Str) {
      let idx = self.stream.pos();
      let bytes = self
        .stream
        .token(idx)
        .and_then(|token| token.str.as_ref())
        .ok_or_else(|| CompileError::internal(format!("string token {idx} has no contents")))?;
      data.extend_from_slice(bytes);
      self.stream.advance();
    }
    data.push(0);
    Ok(data)
  }

  // func-args = "(" (assign ("," assign)*)? ")"
  fn funcall(&mut self, name: &str, idx: usize) -> CompileResult<Node> {
    self.stream.skip("(")?;

    let func_ty = match self.scope.lookup(name).cloned() {
      Some(Binding::Func(ty)) => Some(ty),
      // implicitly declared
      None => None,
      Some(_) => {
        return Err(
          self
            .stream
            .type_error(idx, format!("called object '{name}' is not a function")),
        );
      }
    };
    let params = func_ty
      .as_ref()
      .map(|ty| ty.params().to_vec())
      .unwrap_or_default();

    let mut args = Vec::new();
    while !self.stream.equal(")") {
      if !args.is_empty() {
        self.stream.skip(",")?;
      }
      let arg = self.assign()?;
      if arg.ty.is_struct_or_union() {
        return Err(self.stream.type_error(
          arg.tok,
          "passing a struct or union by value is not supported",
        ));
      }
      if !is_value(&arg.ty) {
        return Err(self.stream.type_error(arg.tok, "invalid argument type"));
      }

      let arg = match params.get(args.len()) {
        Some(param) => Node::cast(arg, param.clone().without_name()),
        None if !params.is_empty() => {
          return Err(
            self
              .stream
              .type_error(arg.tok, format!("too many arguments to '{name}'")),
          );
        }
        None => arg,
      };
      args.push(arg);
    }

    if args.len() < params.len() {
      return Err(
        self
          .stream
          .type_error(idx, format!("too few arguments to '{name}'")),
      );
    }
    if args.len() > MAX_ARGS {
      return Err(self.stream.syntax_error(
        idx,
        format!("calls with more than {MAX_ARGS} arguments are not supported"),
      ));
    }

    let ret = func_ty
      .as_ref()
      .and_then(|ty| ty.return_type())
      .cloned()
      .unwrap_or_else(Type::int);
    Ok(Node::new(
      NodeKind::FunCall {
        name: name.to_string(),
        args,
      },
      ret,
      idx,
    ))
  }

  fn expect_integer(&self, node: &Node, tok: usize) -> CompileResult<()> {
    if node.ty.is_integer() {
      Ok(())
    } else {
      Err(self.stream.type_error(tok, "invalid operand: expected an integer"))
    }
  }

  /// Operands tested against zero: conditions and logical operators.
  pub(super) fn expect_condition(&self, node: &Node) -> CompileResult<()> {
    if is_value(&node.ty) {
      Ok(())
    } else {
      Err(
        self
          .stream
          .type_error(node.tok, "expected a scalar value in condition"),
      )
    }
  }

  /// Build `lhs op rhs`, applying conversions and pointer scaling.
  pub(super) fn new_binary_op(
    &self,
    op: BinaryOp,
    lhs: Node,
    rhs: Node,
    tok: usize,
  ) -> CompileResult<Node> {
    match op {
      BinaryOp::Add => self.new_add(lhs, rhs, tok),
      BinaryOp::Sub => self.new_sub(lhs, rhs, tok),
      BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le => {
        if !is_value(&lhs.ty) || !is_value(&rhs.ty) {
          return Err(self.stream.type_error(tok, "invalid operands to comparison"));
        }
        let (lhs, rhs, _) = usual_arith(lhs, rhs);
        Ok(binary(op, lhs, rhs, Type::int(), tok))
      }
      BinaryOp::Shl | BinaryOp::Shr => {
        self.expect_integer(&lhs, tok)?;
        self.expect_integer(&rhs, tok)?;
        let ty = promoted(&lhs.ty);
        Ok(binary(op, Node::cast(lhs, ty.clone()), rhs, ty, tok))
      }
      BinaryOp::Mul
      | BinaryOp::Div
      | BinaryOp::Mod
      | BinaryOp::BitAnd
      | BinaryOp::BitOr
      | BinaryOp::BitXor => {
        self.expect_integer(&lhs, tok)?;
        self.expect_integer(&rhs, tok)?;
        let (lhs, rhs, ty) = usual_arith(lhs, rhs);
        Ok(binary(op, lhs, rhs, ty, tok))
      }
    }
  }

  /// `index * sizeof(*ptr)`, computed as a `long`.
  fn scale(&self, index: Node, ptr: &Type, tok: usize) -> CompileResult<Node> {
    let size = match ptr.base() {
      Some(base) if base.is_complete() => base.size(),
      _ => {
        return Err(self.stream.type_error(
          tok,
          "arithmetic on a pointer to an incomplete type",
        ));
      }
    };
    Ok(binary(
      BinaryOp::Mul,
      Node::cast(index, Type::long()),
      Node::long(size, tok),
      Type::long(),
      tok,
    ))
  }

  // Pointer + integer is scaled by the pointee size; integer + pointer is
  // normalized to pointer + integer first.
  fn new_add(&self, lhs: Node, rhs: Node, tok: usize) -> CompileResult<Node> {
    match (lhs.ty.base().is_some(), rhs.ty.base().is_some()) {
      (false, false) => {
        self.expect_integer(&lhs, tok)?;
        self.expect_integer(&rhs, tok)?;
        let (lhs, rhs, ty) = usual_arith(lhs, rhs);
        Ok(binary(BinaryOp::Add, lhs, rhs, ty, tok))
      }
      (true, true) => Err(self.stream.type_error(tok, "invalid operands: cannot add two pointers")),
      (false, true) => self.new_add(rhs, lhs, tok),
      (true, false) => {
        self.expect_integer(&rhs, tok)?;
        let offset = self.scale(rhs, &lhs.ty, tok)?;
        let ty = lhs.ty.decayed();
        Ok(binary(BinaryOp::Add, lhs, offset, ty, tok))
      }
    }
  }

  // Pointer - integer scales like addition; pointer - pointer yields the
  // element distance.
  fn new_sub(&self, lhs: Node, rhs: Node, tok: usize) -> CompileResult<Node> {
    match (lhs.ty.base(), rhs.ty.base()) {
      (None, None) => {
        self.expect_integer(&lhs, tok)?;
        self.expect_integer(&rhs, tok)?;
        let (lhs, rhs, ty) = usual_arith(lhs, rhs);
        Ok(binary(BinaryOp::Sub, lhs, rhs, ty, tok))
      }
      (Some(_), None) => {
        self.expect_integer(&rhs, tok)?;
        let offset = self.scale(rhs, &lhs.ty, tok)?;
        let ty = lhs.ty.decayed();
        Ok(binary(BinaryOp::Sub, lhs, offset, ty, tok))
      }
      (Some(a), Some(b)) => {
        if !a.is_compatible(b) {
          return Err(self.stream.type_error(
            tok,
            "invalid operands: subtracting pointers to different types",
          ));
        }
        if !a.is_complete() {
          return Err(self.stream.type_error(
            tok,
            "arithmetic on a pointer to an incomplete type",
          ));
        }
        let size = a.size();
        let diff = binary(BinaryOp::Sub, lhs, rhs, Type::long(), tok);
        Ok(binary(
          BinaryOp::Div,
          diff,
          Node::long(size, tok),
          Type::long(),
          tok,
        ))
      }
      (None, Some(_)) => Err(
        self
          .stream
          .type_error(tok, "invalid operands: cannot subtract a pointer from an integer"),
      ),
    }
  }

  pub(super) fn new_assign(&self, lhs: Node, rhs: Node, tok: usize) -> CompileResult<Node> {
    if lhs.ty.is_array() {
      return Err(self.stream.type_error(tok, "assignment to an array"));
    }
    if !lhs.is_lvalue() {
      return Err(self.stream.type_error(tok, "assignment to a non-lvalue"));
    }

    let ty = lhs.ty.clone();
    let rhs = if ty.is_struct_or_union() {
      if !ty.is_complete() {
        return Err(self.stream.type_error(tok, "assignment to an incomplete type"));
      }
      if !ty.is_compatible(&rhs.ty) {
        return Err(
          self
            .stream
            .type_error(tok, "incompatible types in struct or union assignment"),
        );
      }
      rhs
    } else {
      if !is_value(&rhs.ty) {
        return Err(self.stream.type_error(tok, "invalid value in assignment"));
      }
      Node::cast(rhs, ty.clone())
    };

    Ok(Node::new(
      NodeKind::Assign {
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      ty,
      tok,
    ))
  }

  // `A op= B` becomes `tmp = &A, *tmp = *tmp op B`, so the address of `A`
  // is computed exactly once.
  fn compound_assign(&mut self, op: BinaryOp, lhs: Node, rhs: Node, tok: usize) -> CompileResult<Node> {
    if lhs.ty.is_array() {
      return Err(self.stream.type_error(tok, "assignment to an array"));
    }
    if !lhs.is_lvalue() {
      return Err(self.stream.type_error(tok, "assignment to a non-lvalue"));
    }

    let ptr_ty = Type::pointer_to(lhs.ty.clone());
    let name = self.session.unique_name();
    let tmp = self.new_local(&name, ptr_ty.clone(), tok)?;

    let addr = self.new_addr(lhs, tok)?;
    let init = self.new_assign(Node::var(tmp, ptr_ty.clone(), tok), addr, tok)?;

    let current = self.new_deref(Node::var(tmp, ptr_ty.clone(), tok), tok)?;
    let value = self.new_binary_op(op, current, rhs, tok)?;
    let target = self.new_deref(Node::var(tmp, ptr_ty, tok), tok)?;
    let update = self.new_assign(target, value, tok)?;

    Ok(Node::comma(init, update))
  }

  // x++ is (typeof x)((x += 1) - 1)
  fn post_increment(&mut self, node: Node, delta: i64, tok: usize) -> CompileResult<Node> {
    let ty = node.ty.clone();
    let updated = self.compound_assign(BinaryOp::Add, node, Node::number(delta, tok), tok)?;
    let restored = self.new_add(updated, Node::number(-delta, tok), tok)?;
    Ok(Node::new(NodeKind::Cast(Box::new(restored)), ty, tok))
  }

  fn new_addr(&self, operand: Node, tok: usize) -> CompileResult<Node> {
    if !operand.is_lvalue() {
      return Err(
        self
          .stream
          .type_error(tok, "cannot take the address of an rvalue"),
      );
    }
    let ty = match operand.ty.base() {
      Some(base) if operand.ty.is_array() => Type::pointer_to(base.clone()),
      _ => Type::pointer_to(operand.ty.clone()),
    };
    Ok(Node::new(NodeKind::Addr(Box::new(operand)), ty, tok))
  }

  fn new_deref(&self, operand: Node, tok: usize) -> CompileResult<Node> {
    let ty = match operand.ty.base() {
      Some(base) if base.is_void() => {
        return Err(self.stream.type_error(tok, "dereferencing a void pointer"));
      }
      Some(base) => base.clone(),
      None => {
        return Err(self.stream.type_error(tok, "invalid pointer dereference"));
      }
    };
    Ok(Node::new(NodeKind::Deref(Box::new(operand)), ty, tok))
  }

  fn new_member(&self, base: Node, name_idx: usize, tok: usize) -> CompileResult<Node> {
    if !base.ty.is_struct_or_union() {
      return Err(self.stream.type_error(tok, "not a struct nor a union"));
    }
    if !base.is_lvalue() {
      return Err(self.stream.type_error(
        tok,
        "member access on a non-lvalue struct is not supported",
      ));
    }

    if !base.ty.is_complete() {
      return Err(self.stream.type_error(tok, "member access on an incomplete type"));
    }

    let name = self.stream.text(name_idx);
    let Some(member) = base.ty.find_member(name) else {
      return Err(
        self
          .stream
          .type_error(name_idx, format!("no such member '{name}'")),
      );
    };
    let ty = member.ty.clone();
    Ok(Node::new(
      NodeKind::Member {
        base: Box::new(base),
        member,
      },
      ty,
      name_idx,
    ))
  }
}
