//! Statements and block-scope declarations.

use crate::ast::{Node, Obj, Stmt};
use crate::error::CompileResult;
use crate::scope::Binding;

use super::{Parser, VarAttr};

impl Parser<'_, '_> {
  // stmt = "return" expr? ";"
  //      | "if" "(" expr ")" stmt ("else" stmt)?
  //      | "for" "(" (declaration | expr-stmt) expr? ";" expr? ")" stmt
  //      | "while" "(" expr ")" stmt
  //      | "break" ";"
  //      | "continue" ";"
  //      | "{" compound-stmt
  //      | expr-stmt
  fn stmt(&mut self) -> CompileResult<Stmt> {
    let tok = self.stream.pos();

    if self.stream.equal("return") {
      let value = if self.stream.equal(";") {
        None
      } else {
        let value = self.expr()?;
        self.stream.skip(";")?;
        Some(value)
      };
      return self.return_stmt(value, tok);
    }

    if self.stream.equal("if") {
      self.stream.skip("(")?;
      let cond = self.expr()?;
      self.expect_condition(&cond)?;
      self.stream.skip(")")?;
      let then = Box::new(self.stmt()?);
      let els = if self.stream.equal("else") {
        Some(Box::new(self.stmt()?))
      } else {
        None
      };
      return Ok(Stmt::If { cond, then, els });
    }

    if self.stream.equal("for") {
      self.stream.skip("(")?;
      self.scope.enter();

      let init = if self.is_typename() {
        self.declaration()?
      } else {
        self.expr_stmt()?
      };
      let cond = self.optional_expr(";")?;
      let inc = self.optional_expr(")")?;
      let body = self.loop_body()?;

      self.scope.leave();
      return Ok(Stmt::For {
        init: Some(Box::new(init)),
        cond,
        inc,
        body: Box::new(body),
      });
    }

    if self.stream.equal("while") {
      self.stream.skip("(")?;
      let cond = self.expr()?;
      self.expect_condition(&cond)?;
      self.stream.skip(")")?;
      let body = self.loop_body()?;
      return Ok(Stmt::For {
        init: None,
        cond: Some(cond),
        inc: None,
        body: Box::new(body),
      });
    }

    if self.stream.equal("break") {
      if self.loop_depth == 0 {
        return Err(self.stream.syntax_error(tok, "'break' outside of a loop"));
      }
      self.stream.skip(";")?;
      return Ok(Stmt::Break);
    }

    if self.stream.equal("continue") {
      if self.loop_depth == 0 {
        return Err(self.stream.syntax_error(tok, "'continue' outside of a loop"));
      }
      self.stream.skip(";")?;
      return Ok(Stmt::Continue);
    }

    if self.stream.equal("{") {
      return Ok(Stmt::Block(self.compound_block()?));
    }

    self.expr_stmt()
  }

  fn return_stmt(&mut self, value: Option<Node>, tok: usize) -> CompileResult<Stmt> {
    let Some(ret) = self.ret_ty.clone() else {
      return Err(self.stream.syntax_error(tok, "'return' outside of a function"));
    };

    match value {
      None if ret.is_void() => Ok(Stmt::Return(None)),
      None => Err(
        self
          .stream
          .type_error(tok, "non-void function should return a value"),
      ),
      Some(_) if ret.is_void() => Err(
        self
          .stream
          .type_error(tok, "void function should not return a value"),
      ),
      Some(value) => {
        if !value.ty.is_scalar() && !value.ty.is_array() {
          return Err(self.stream.type_error(value.tok, "invalid return value"));
        }
        Ok(Stmt::Return(Some(Node::cast(value, ret.without_name()))))
      }
    }
  }

  /// Expression up to `end`, or nothing if `end` comes first.
  fn optional_expr(&mut self, end: &str) -> CompileResult<Option<Node>> {
    if self.stream.equal(end) {
      return Ok(None);
    }
    let node = self.expr()?;
    self.stream.skip(end)?;
    Ok(Some(node))
  }

  fn loop_body(&mut self) -> CompileResult<Stmt> {
    self.loop_depth += 1;
    let body = self.stmt();
    self.loop_depth -= 1;
    body
  }

  // compound-stmt = (declaration | stmt)* "}"
  pub(super) fn compound_block(&mut self) -> CompileResult<Vec<Stmt>> {
    self.scope.enter();
    let mut body = Vec::new();

    while !self.stream.equal("}") {
      if self.stream.is_eof() {
        return Err(self.stream.error_here("expected \"}\" before end of input"));
      }
      let stmt = if self.is_typename() {
        self.declaration()?
      } else {
        self.stmt()?
      };
      body.push(stmt);
    }

    self.scope.leave();
    Ok(body)
  }

  // expr-stmt = expr? ";"
  fn expr_stmt(&mut self) -> CompileResult<Stmt> {
    if self.stream.equal(";") {
      return Ok(Stmt::Null);
    }
    let node = self.expr()?;
    self.stream.skip(";")?;
    Ok(Stmt::Expr(node))
  }

  // declaration = declspec (declarator ("=" assign)? ("," declarator ("=" assign)?)*)? ";"
  fn declaration(&mut self) -> CompileResult<Stmt> {
    let mut attr = VarAttr::default();
    let base = self.declspec(Some(&mut attr))?;

    if attr.is_typedef {
      self.parse_typedef(base)?;
      return Ok(Stmt::Null);
    }

    let mut stmts = Vec::new();
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

      // a static local is a uniquely named global visible only in this block
      if attr.is_static {
        let mut obj = Obj::new(self.session.unique_name(), ty.clone().without_name());
        obj.is_static = true;
        if self.stream.equal("=") {
          obj.init_data = Some(self.global_initializer(&ty, idx)?);
        }
        let var = self.new_global(obj);
        self.scope.declare_var(name, var);
        continue;
      }

      let ty = ty.without_name();
      let var = self.new_local(name, ty.clone(), idx)?;
      self.scope.declare_var(name, var);

      if self.stream.is("=") {
        let tok = self.stream.pos();
        self.stream.advance();
        let rhs = self.assign()?;
        let lhs = Node::var(var, ty, idx);
        stmts.push(Stmt::Expr(self.new_assign(lhs, rhs, tok)?));
      }
    }

    Ok(Stmt::Block(stmts))
  }
}
