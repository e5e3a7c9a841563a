//! Typed syntax tree handed from the parser to the code generator.
//!
//! Every expression [`Node`] receives its type when it is built; there is no
//! later inference pass. A node that needs a different type is wrapped in a
//! cast instead of being retyped.

use crate::ty::{Member, Type};

/// Binary operators that survive parsing. `>` and `>=` are rewritten into
/// `<` and `<=` with swapped operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  BitAnd,
  BitOr,
  BitXor,
  Shl,
  Shr,
  Eq,
  Ne,
  Lt,
  Le,
}

/// Where a variable lives. Locals index the enclosing function's `locals`,
/// globals index [`Program::globals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRef {
  Local(usize),
  Global(usize),
}

#[derive(Debug, Clone)]
pub struct Node {
  pub kind: NodeKind,
  pub ty: Type,
  /// Index of the token the node was built from.
  pub tok: usize,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
  Num(i64),
  Var(VarRef),
  Neg(Box<Node>),
  Not(Box<Node>),
  BitNot(Box<Node>),
  Addr(Box<Node>),
  Deref(Box<Node>),
  Cast(Box<Node>),
  Binary {
    op: BinaryOp,
    lhs: Box<Node>,
    rhs: Box<Node>,
  },
  LogAnd(Box<Node>, Box<Node>),
  LogOr(Box<Node>, Box<Node>),
  Cond {
    cond: Box<Node>,
    then: Box<Node>,
    els: Box<Node>,
  },
  Assign {
    lhs: Box<Node>,
    rhs: Box<Node>,
  },
  Comma(Box<Node>, Box<Node>),
  Member {
    base: Box<Node>,
    member: Member,
  },
  FunCall {
    name: String,
    args: Vec<Node>,
  },
  StmtExpr(Vec<Stmt>),
}

impl Node {
  pub fn new(kind: NodeKind, ty: Type, tok: usize) -> Self {
    Self { kind, ty, tok }
  }

  /// Integer literal typed `int` when it fits, `long` otherwise.
  pub fn number(value: i64, tok: usize) -> Self {
    let ty = if i32::try_from(value).is_ok() {
      Type::int()
    } else {
      Type::long()
    };
    Self::new(NodeKind::Num(value), ty, tok)
  }

  pub fn long(value: i64, tok: usize) -> Self {
    Self::new(NodeKind::Num(value), Type::long(), tok)
  }

  pub fn var(var: VarRef, ty: Type, tok: usize) -> Self {
    Self::new(NodeKind::Var(var), ty, tok)
  }

  /// Wrap `expr` in a conversion to `ty`.
  pub fn cast(expr: Node, ty: Type) -> Self {
    let tok = expr.tok;
    Self::new(NodeKind::Cast(Box::new(expr)), ty, tok)
  }

  pub fn comma(lhs: Node, rhs: Node) -> Self {
    let ty = rhs.ty.clone();
    let tok = lhs.tok;
    Self::new(NodeKind::Comma(Box::new(lhs), Box::new(rhs)), ty, tok)
  }

  /// Whether the node designates an object whose address can be taken.
  pub fn is_lvalue(&self) -> bool {
    match &self.kind {
      NodeKind::Var(_) | NodeKind::Deref(_) | NodeKind::Member { .. } => true,
      NodeKind::Comma(_, rhs) => rhs.is_lvalue(),
      _ => false,
    }
  }
}

#[derive(Debug, Clone)]
pub enum Stmt {
  Expr(Node),
  Null,
  Block(Vec<Stmt>),
  If {
    cond: Node,
    then: Box<Stmt>,
    els: Option<Box<Stmt>>,
  },
  /// Both `for` and `while`; a `while` has no init or increment.
  For {
    init: Option<Box<Stmt>>,
    cond: Option<Node>,
    inc: Option<Node>,
    body: Box<Stmt>,
  },
  Return(Option<Node>),
  Break,
  Continue,
}

/// A variable: a local of some function, or a global of the translation unit.
#[derive(Debug, Clone)]
pub struct Obj {
  pub name: String,
  pub ty: Type,
  pub is_static: bool,
  /// Initial bytes of a global; zero-filled when absent.
  pub init_data: Option<Vec<u8>>,
}

impl Obj {
  pub fn new(name: impl Into<String>, ty: Type) -> Self {
    Self {
      name: name.into(),
      ty,
      is_static: false,
      init_data: None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Function {
  pub name: String,
  pub ty: Type,
  pub is_static: bool,
  /// Parameters are the first `param_count` entries of `locals`.
  pub param_count: usize,
  pub locals: Vec<Obj>,
  /// `None` for a prototype.
  pub body: Option<Stmt>,
}

impl Function {
  pub fn params(&self) -> &[Obj] {
    &self.locals[..self.param_count]
  }

  pub fn is_definition(&self) -> bool {
    self.body.is_some()
  }
}

/// A parsed translation unit.
#[derive(Debug, Clone, Default)]
pub struct Program {
  pub globals: Vec<Obj>,
  pub functions: Vec<Function>,
}

