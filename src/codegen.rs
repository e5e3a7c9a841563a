//! Code generation: lower the typed translation unit into AT&T x86-64 assembly.
//!
//! The emitter is a stack machine with a single accumulator: every expression
//! leaves its value in `%rax`, and binary operators park the right operand on
//! the hardware stack while the left one is evaluated. `depth` mirrors the
//! pushes and pops so statement boundaries can be checked for balance and
//! calls can keep `%rsp` 16-byte aligned.

use crate::ast::{BinaryOp, Function, Node, NodeKind, Obj, Program, Stmt, VarRef};
use crate::error::{CompileError, CompileResult};
use crate::session::Session;
use crate::ty::{Type, TypeKind, align_to};

const ARGREG8: [&str; 6] = ["%dil", "%sil", "%dl", "%cl", "%r8b", "%r9b"];
const ARGREG16: [&str; 6] = ["%di", "%si", "%dx", "%cx", "%r8w", "%r9w"];
const ARGREG32: [&str; 6] = ["%edi", "%esi", "%edx", "%ecx", "%r8d", "%r9d"];
const ARGREG64: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// Stack placement of one function's locals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
  /// `%rbp`-relative offset of each local, indexed like `Function::locals`.
  pub offsets: Vec<i64>,
  /// Bytes reserved below `%rbp`, a multiple of 16.
  pub stack_size: i64,
}

/// Assign frame offsets. Locals are packed from the most recently declared
/// one downwards, so the first declared local sits deepest in the frame.
pub fn layout_frame(locals: &[Obj]) -> CompileResult<FrameLayout> {
  let overflow = || CompileError::internal("stack frame size overflows");

  let mut offsets = vec![0; locals.len()];
  let mut offset: i64 = 0;
  for (idx, var) in locals.iter().enumerate().rev() {
    offset = offset
      .checked_add(var.ty.size())
      .and_then(|end| align_to(end, var.ty.align()))
      .ok_or_else(overflow)?;
    offsets[idx] = -offset;
  }
  Ok(FrameLayout {
    offsets,
    stack_size: align_to(offset, 16).ok_or_else(overflow)?,
  })
}

/// Emit assembly for a whole translation unit.
pub fn generate(program: &Program, session: &mut Session) -> CompileResult<String> {
  let mut codegen = Codegen {
    program,
    session,
    asm: String::new(),
    depth: 0,
    frame: None,
    loops: Vec::new(),
  };

  codegen.emit_data();
  for func in &program.functions {
    if func.is_definition() {
      codegen.emit_function(func)?;
    }
  }

  tracing::debug!(bytes = codegen.asm.len(), "generated assembly");
  Ok(codegen.asm)
}

/// State of the function currently being emitted.
struct Frame<'p> {
  func: &'p Function,
  layout: FrameLayout,
}

struct Codegen<'p, 's> {
  program: &'p Program,
  session: &'s mut Session,
  asm: String,
  depth: usize,
  frame: Option<Frame<'p>>,
  /// Label suffixes of the enclosing loops, innermost last.
  loops: Vec<usize>,
}

/// Width class used by the integer cast table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
  I8,
  I16,
  I32,
  I64,
}

fn width_of(ty: &Type) -> Width {
  match ty.kind {
    TypeKind::Bool | TypeKind::Char => Width::I8,
    TypeKind::Short => Width::I16,
    TypeKind::Int | TypeKind::Enum => Width::I32,
    _ => Width::I64,
  }
}

// Narrow values are kept sign-extended to 32 bits in the accumulator, so
// only narrowing and widening to 64 bits need an instruction.
fn cast_instruction(from: Width, to: Width) -> Option<&'static str> {
  const I32I8: &str = "movsbl %al, %eax";
  const I32I16: &str = "movswl %ax, %eax";
  const I32I64: &str = "movsxd %eax, %rax";

  match (from, to) {
    (Width::I8, Width::I64) | (Width::I16, Width::I64) | (Width::I32, Width::I64) => Some(I32I64),
    (Width::I16, Width::I8) | (Width::I32, Width::I8) | (Width::I64, Width::I8) => Some(I32I8),
    (Width::I32, Width::I16) | (Width::I64, Width::I16) => Some(I32I16),
    _ => None,
  }
}

/// Operate on the full register for longs and pointers, the low half otherwise.
fn uses_wide_registers(ty: &Type) -> bool {
  ty.size() == 8 || ty.base().is_some()
}

impl<'p> Codegen<'p, '_> {
  fn emit(&mut self, line: impl AsRef<str>) {
    self.asm.push_str(line.as_ref());
    self.asm.push('\n');
  }

  fn push(&mut self) {
    self.emit("    push %rax");
    self.depth += 1;
  }

  fn pop(&mut self, reg: &str) -> CompileResult<()> {
    self.depth = self
      .depth
      .checked_sub(1)
      .ok_or_else(|| CompileError::internal("operand stack underflow"))?;
    self.emit(format!("    pop {reg}"));
    Ok(())
  }

  fn frame(&self) -> CompileResult<&Frame<'p>> {
    self
      .frame
      .as_ref()
      .ok_or_else(|| CompileError::internal("code emitted outside of a function"))
  }

  fn emit_data(&mut self) {
    let program = self.program;
    for var in &program.globals {
      let visibility = if var.is_static { ".local" } else { ".globl" };
      self.emit(format!("    {visibility} {}", var.name));
      self.emit("    .data");
      self.emit(format!("    .align {}", var.ty.align()));
      self.emit(format!("{}:", var.name));

      let data = var.init_data.as_deref().unwrap_or_default();
      for byte in data {
        self.emit(format!("    .byte {byte}"));
      }
      let rest = var.ty.size() - data.len() as i64;
      if rest > 0 {
        self.emit(format!("    .zero {rest}"));
      }
    }
  }

  fn emit_function(&mut self, func: &'p Function) -> CompileResult<()> {
    let layout = layout_frame(&func.locals)?;
    tracing::debug!(name = %func.name, stack_size = layout.stack_size, "laid out frame");

    let visibility = if func.is_static { ".local" } else { ".globl" };
    self.emit(format!("    {visibility} {}", func.name));
    self.emit("    .text");
    self.emit(format!("{}:", func.name));

    // prologue
    self.emit("    push %rbp");
    self.emit("    mov %rsp, %rbp");
    self.emit(format!("    sub ${}, %rsp", layout.stack_size));

    // spill register arguments into their stack slots
    for (idx, param) in func.params().iter().enumerate() {
      let offset = layout.offsets[idx];
      let reg = match param.ty.size() {
        1 => ARGREG8[idx],
        2 => ARGREG16[idx],
        4 => ARGREG32[idx],
        _ => ARGREG64[idx],
      };
      self.emit(format!("    mov {reg}, {offset}(%rbp)"));
    }

    self.frame = Some(Frame { func, layout });
    if let Some(body) = &func.body {
      self.gen_stmt(body)?;
    }
    if self.depth != 0 {
      return Err(CompileError::internal(format!(
        "operand stack depth is {} at the end of '{}'",
        self.depth, func.name
      )));
    }

    // falling off the end of main returns 0
    if func.name == "main" {
      self.emit("    mov $0, %rax");
    }

    self.emit(format!(".L.return.{}:", func.name));
    self.emit("    mov %rbp, %rsp");
    self.emit("    pop %rbp");
    self.emit("    ret");
    self.frame = None;
    Ok(())
  }

  fn gen_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    let depth = self.depth;
    self.gen_stmt_inner(stmt)?;
    if self.depth != depth {
      return Err(CompileError::internal(format!(
        "unbalanced operand stack after statement: {} before, {} after",
        depth, self.depth
      )));
    }
    Ok(())
  }

  fn gen_stmt_inner(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::Null => Ok(()),
      Stmt::Expr(node) => self.gen_expr(node),
      Stmt::Block(body) => {
        for stmt in body {
          self.gen_stmt(stmt)?;
        }
        Ok(())
      }
      Stmt::If { cond, then, els } => {
        let c = self.session.next_label();
        self.gen_expr(cond)?;
        self.cmp_zero(&cond.ty);
        self.emit(format!("    je .L.else.{c}"));
        self.gen_stmt(then)?;
        self.emit(format!("    jmp .L.end.{c}"));
        self.emit(format!(".L.else.{c}:"));
        if let Some(els) = els {
          self.gen_stmt(els)?;
        }
        self.emit(format!(".L.end.{c}:"));
        Ok(())
      }
      Stmt::For {
        init,
        cond,
        inc,
        body,
      } => {
        let c = self.session.next_label();
        if let Some(init) = init {
          self.gen_stmt(init)?;
        }
        self.emit(format!(".L.begin.{c}:"));
        if let Some(cond) = cond {
          self.gen_expr(cond)?;
          self.cmp_zero(&cond.ty);
          self.emit(format!("    je .L.end.{c}"));
        }

        self.loops.push(c);
        let body = self.gen_stmt(body);
        self.loops.pop();
        body?;

        self.emit(format!(".L.continue.{c}:"));
        if let Some(inc) = inc {
          self.gen_expr(inc)?;
        }
        self.emit(format!("    jmp .L.begin.{c}"));
        self.emit(format!(".L.end.{c}:"));
        Ok(())
      }
      Stmt::Return(value) => {
        if let Some(value) = value {
          self.gen_expr(value)?;
        }
        let name = &self.frame()?.func.name;
        let line = format!("    jmp .L.return.{name}");
        self.emit(line);
        Ok(())
      }
      Stmt::Break => {
        let c = self.innermost_loop()?;
        self.emit(format!("    jmp .L.end.{c}"));
        Ok(())
      }
      Stmt::Continue => {
        let c = self.innermost_loop()?;
        self.emit(format!("    jmp .L.continue.{c}"));
        Ok(())
      }
    }
  }

  fn innermost_loop(&self) -> CompileResult<usize> {
    self
      .loops
      .last()
      .copied()
      .ok_or_else(|| CompileError::internal("loop control outside of a loop"))
  }

  /// Compute the address of an lvalue into `%rax`.
  fn gen_addr(&mut self, node: &Node) -> CompileResult<()> {
    match &node.kind {
      NodeKind::Var(VarRef::Local(idx)) => {
        let offset = self
          .frame()?
          .layout
          .offsets
          .get(*idx)
          .copied()
          .ok_or_else(|| CompileError::internal(format!("unknown local #{idx}")))?;
        self.emit(format!("    lea {offset}(%rbp), %rax"));
        Ok(())
      }
      NodeKind::Var(VarRef::Global(idx)) => {
        let program = self.program;
        let var = program
          .globals
          .get(*idx)
          .ok_or_else(|| CompileError::internal(format!("unknown global #{idx}")))?;
        self.emit(format!("    lea {}(%rip), %rax", var.name));
        Ok(())
      }
      NodeKind::Deref(operand) => self.gen_expr(operand),
      NodeKind::Comma(lhs, rhs) => {
        self.gen_expr(lhs)?;
        self.gen_addr(rhs)
      }
      NodeKind::Member { base, member } => {
        self.gen_addr(base)?;
        self.emit(format!("    add ${}, %rax", member.offset));
        Ok(())
      }
      _ => Err(CompileError::internal(format!(
        "expression at token {} is not addressable",
        node.tok
      ))),
    }
  }

  /// Replace the address in `%rax` with the value it points to.
  fn load(&mut self, ty: &Type) {
    // an aggregate evaluates to its own address
    if ty.is_array() || ty.is_struct_or_union() {
      return;
    }
    match (&ty.kind, ty.size()) {
      (TypeKind::Bool, _) => self.emit("    movzbl (%rax), %eax"),
      (_, 1) => self.emit("    movsbl (%rax), %eax"),
      (_, 2) => self.emit("    movswl (%rax), %eax"),
      (_, 4) => self.emit("    movsxd (%rax), %rax"),
      _ => self.emit("    mov (%rax), %rax"),
    }
  }

  /// Store `%rax` at the address on top of the operand stack.
  fn store(&mut self, ty: &Type) -> CompileResult<()> {
    self.pop("%rdi")?;

    if ty.is_struct_or_union() {
      for i in 0..ty.size() {
        self.emit(format!("    mov {i}(%rax), %r8b"));
        self.emit(format!("    mov %r8b, {i}(%rdi)"));
      }
      return Ok(());
    }

    match ty.size() {
      1 => self.emit("    mov %al, (%rdi)"),
      2 => self.emit("    mov %ax, (%rdi)"),
      4 => self.emit("    mov %eax, (%rdi)"),
      _ => self.emit("    mov %rax, (%rdi)"),
    }
    Ok(())
  }

  fn cmp_zero(&mut self, ty: &Type) {
    if ty.is_integer() && ty.size() <= 4 {
      self.emit("    cmp $0, %eax");
    } else {
      self.emit("    cmp $0, %rax");
    }
  }

  fn cast(&mut self, from: &Type, to: &Type) {
    if to.is_void() {
      return;
    }
    if matches!(to.kind, TypeKind::Bool) {
      self.cmp_zero(from);
      self.emit("    setne %al");
      self.emit("    movzx %al, %eax");
      return;
    }
    if let Some(insn) = cast_instruction(width_of(from), width_of(to)) {
      self.emit(format!("    {insn}"));
    }
  }

  fn gen_expr(&mut self, node: &Node) -> CompileResult<()> {
    match &node.kind {
      NodeKind::Num(value) => {
        self.emit(format!("    mov ${value}, %rax"));
        Ok(())
      }
      NodeKind::Neg(operand) => {
        self.gen_expr(operand)?;
        self.emit("    neg %rax");
        Ok(())
      }
      NodeKind::BitNot(operand) => {
        self.gen_expr(operand)?;
        self.emit("    not %rax");
        Ok(())
      }
      NodeKind::Not(operand) => {
        self.gen_expr(operand)?;
        self.cmp_zero(&operand.ty);
        self.emit("    sete %al");
        self.emit("    movzb %al, %rax");
        Ok(())
      }
      NodeKind::Var(_) | NodeKind::Member { .. } => {
        self.gen_addr(node)?;
        self.load(&node.ty);
        Ok(())
      }
      NodeKind::Deref(operand) => {
        self.gen_expr(operand)?;
        self.load(&node.ty);
        Ok(())
      }
      NodeKind::Addr(operand) => self.gen_addr(operand),
      NodeKind::Assign { lhs, rhs } => {
        self.gen_addr(lhs)?;
        self.push();
        self.gen_expr(rhs)?;
        self.store(&node.ty)
      }
      NodeKind::StmtExpr(body) => {
        for stmt in body {
          self.gen_stmt(stmt)?;
        }
        Ok(())
      }
      NodeKind::Comma(lhs, rhs) => {
        self.gen_expr(lhs)?;
        self.gen_expr(rhs)
      }
      NodeKind::Cast(operand) => {
        self.gen_expr(operand)?;
        self.cast(&operand.ty, &node.ty);
        Ok(())
      }
      NodeKind::Cond { cond, then, els } => {
        let c = self.session.next_label();
        self.gen_expr(cond)?;
        self.cmp_zero(&cond.ty);
        self.emit(format!("    je .L.else.{c}"));
        self.gen_expr(then)?;
        self.emit(format!("    jmp .L.end.{c}"));
        self.emit(format!(".L.else.{c}:"));
        self.gen_expr(els)?;
        self.emit(format!(".L.end.{c}:"));
        Ok(())
      }
      NodeKind::LogAnd(lhs, rhs) => {
        let c = self.session.next_label();
        self.gen_expr(lhs)?;
        self.cmp_zero(&lhs.ty);
        self.emit(format!("    je .L.false.{c}"));
        self.gen_expr(rhs)?;
        self.cmp_zero(&rhs.ty);
        self.emit(format!("    je .L.false.{c}"));
        self.emit("    mov $1, %rax");
        self.emit(format!("    jmp .L.end.{c}"));
        self.emit(format!(".L.false.{c}:"));
        self.emit("    mov $0, %rax");
        self.emit(format!(".L.end.{c}:"));
        Ok(())
      }
      NodeKind::LogOr(lhs, rhs) => {
        let c = self.session.next_label();
        self.gen_expr(lhs)?;
        self.cmp_zero(&lhs.ty);
        self.emit(format!("    jne .L.true.{c}"));
        self.gen_expr(rhs)?;
        self.cmp_zero(&rhs.ty);
        self.emit(format!("    jne .L.true.{c}"));
        self.emit("    mov $0, %rax");
        self.emit(format!("    jmp .L.end.{c}"));
        self.emit(format!(".L.true.{c}:"));
        self.emit("    mov $1, %rax");
        self.emit(format!(".L.end.{c}:"));
        Ok(())
      }
      NodeKind::FunCall { name, args } => self.gen_funcall(name, args, &node.ty),
      NodeKind::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs),
    }
  }

  fn gen_funcall(&mut self, name: &str, args: &[Node], ret: &Type) -> CompileResult<()> {
    if args.len() > ARGREG64.len() {
      return Err(CompileError::internal(format!(
        "call to '{name}' passes {} arguments",
        args.len()
      )));
    }

    for arg in args {
      self.gen_expr(arg)?;
      self.push();
    }
    for reg in ARGREG64[..args.len()].iter().rev() {
      self.pop(reg)?;
    }

    // %rsp must be 16-byte aligned at the call instruction
    let misaligned = self.depth % 2 == 1;
    if misaligned {
      self.emit("    sub $8, %rsp");
    }
    self.emit("    mov $0, %rax");
    self.emit(format!("    call {name}"));
    if misaligned {
      self.emit("    add $8, %rsp");
    }

    // the callee leaves the upper bits of narrow return values undefined
    match ret.kind {
      TypeKind::Bool => self.emit("    movzbl %al, %eax"),
      TypeKind::Char => self.emit("    movsbl %al, %eax"),
      TypeKind::Short => self.emit("    movswl %ax, %eax"),
      _ => {}
    }
    Ok(())
  }

  fn gen_binary(&mut self, op: BinaryOp, lhs: &Node, rhs: &Node) -> CompileResult<()> {
    self.gen_expr(rhs)?;
    self.push();
    self.gen_expr(lhs)?;
    self.pop("%rdi")?;

    let (ax, di, dx) = if uses_wide_registers(&lhs.ty) {
      ("%rax", "%rdi", "%rdx")
    } else {
      ("%eax", "%edi", "%edx")
    };

    match op {
      BinaryOp::Add => self.emit(format!("    add {di}, {ax}")),
      BinaryOp::Sub => self.emit(format!("    sub {di}, {ax}")),
      BinaryOp::Mul => self.emit(format!("    imul {di}, {ax}")),
      BinaryOp::Div | BinaryOp::Mod => {
        if lhs.ty.size() == 8 {
          self.emit("    cqo");
        } else {
          self.emit("    cdq");
        }
        self.emit(format!("    idiv {di}"));
        if op == BinaryOp::Mod {
          self.emit(format!("    mov {dx}, {ax}"));
        }
      }
      BinaryOp::BitAnd => self.emit(format!("    and {di}, {ax}")),
      BinaryOp::BitOr => self.emit(format!("    or {di}, {ax}")),
      BinaryOp::BitXor => self.emit(format!("    xor {di}, {ax}")),
      BinaryOp::Shl | BinaryOp::Shr => {
        let insn = if op == BinaryOp::Shl { "shl" } else { "sar" };
        self.emit("    mov %rdi, %rcx");
        self.emit(format!("    {insn} %cl, {ax}"));
      }
      BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le => {
        self.emit(format!("    cmp {di}, {ax}"));
        let set = match op {
          BinaryOp::Eq => "sete",
          BinaryOp::Ne => "setne",
          BinaryOp::Lt => "setl",
          _ => "setle",
        };
        self.emit(format!("    {set} %al"));
        self.emit("    movzb %al, %rax");
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn compile(source: &str) -> String {
    crate::generate_assembly(source).unwrap()
  }

  fn local(name: &str, ty: Type) -> Obj {
    Obj::new(name, ty)
  }

  #[test]
  fn frame_packs_later_locals_nearer_the_base() {
    let layout = layout_frame(&[
      local("a", Type::int()),
      local("b", Type::char()),
      local("c", Type::long()),
    ])
    .unwrap();
    assert_eq!(layout.offsets, [-16, -9, -8]);
    assert_eq!(layout.stack_size, 16);
  }

  #[test]
  fn frame_keeps_declaration_adjacency() {
    // int x; int y; char z: &z - &y counts bytes between slots
    let layout = layout_frame(&[
      local("x", Type::int()),
      local("y", Type::int()),
      local("z", Type::char()),
    ])
    .unwrap();
    assert_eq!(layout.offsets[2] - layout.offsets[1], 7);
    assert_eq!(layout.stack_size % 16, 0);
  }

  #[test]
  fn empty_frame_reserves_nothing() {
    let layout = layout_frame(&[]).unwrap();
    assert!(layout.offsets.is_empty());
    assert_eq!(layout.stack_size, 0);
  }

  #[test]
  fn oversized_frames_are_errors_not_panics() {
    let huge = Type::array_of(Type::char(), Some(0x4000_0000_0000_0000));
    let err = layout_frame(&[
      local("a", huge.clone()),
      local("b", huge.clone()),
      local("c", huge),
    ])
    .unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Internal);
  }

  #[test]
  fn short_initializers_are_zero_padded() {
    let asm = compile("char s[8] = \"hi\"; int main() { return s[0]; }");
    assert!(asm.contains("s:\n    .byte 104\n    .byte 105\n    .byte 0\n    .zero 5"));
  }

  #[test]
  fn pointer_arithmetic_is_scaled_by_pointee_size() {
    let asm = compile("int main() { int a[4]; int *p = a; return *(p + 3); }");
    assert!(asm.contains("    mov $4, %rax"));

    let asm = compile("int main() { long a[4]; long *p = a; return *(p + 3); }");
    assert!(asm.contains("    mov $8, %rax"));
  }

  #[test]
  fn compound_assignment_computes_the_target_once() {
    let asm = compile("int main() { int a[2]; a[1] = 5; a[1] += 2; return a[1]; }");
    // one scaled index for the store, one for the `+=`, one for the return
    assert_eq!(asm.matches("imul").count(), 3);
  }

  #[test]
  fn every_function_has_a_single_epilogue() {
    let asm = compile("int f(int x) { if (x) return 1; return 2; } int main() { return f(0); }");
    assert_eq!(asm.matches("    ret").count(), 2);
    assert_eq!(asm.matches("jmp .L.return.f").count(), 2);
  }

  #[test]
  fn static_symbols_are_local() {
    let asm = compile("static int helper() { return 1; } int main() { return helper(); }");
    assert!(asm.contains(".local helper"));
    assert!(asm.contains(".globl main"));
  }

  #[test]
  fn parameters_spill_through_sized_registers() {
    let asm = compile("int f(char a, short b, int c, long d) { return c; }");
    for reg in ["%dil", "%si,", "%edx", "%rcx"] {
      assert!(asm.contains(reg), "missing {reg}");
    }
  }

  #[test]
  fn globals_are_zero_filled_or_initialized() {
    let asm = compile("int g; char s[3] = \"hi\"; int main() { return g; }");
    assert!(asm.contains("g:\n    .zero 4"));
    assert!(asm.contains("s:\n    .byte 104\n    .byte 105\n    .byte 0"));
    assert!(asm.contains("lea g(%rip), %rax"));
  }

  #[test]
  fn calls_align_the_stack() {
    let asm = compile("int f(int x) { return x; } int main() { return 1 + f(2); }");
    // `1 + f(2)` holds nothing on the stack at the call since rhs goes first
    assert!(asm.contains("call f"));
    let asm = compile("int f(int x) { return x; } int main() { return f(2) + 1; }");
    // `1` is pushed before `f(2)` is evaluated
    assert!(asm.contains("    sub $8, %rsp\n    mov $0, %rax\n    call f\n    add $8, %rsp"));
  }

  #[test]
  fn loops_emit_continue_labels() {
    let asm = compile(
      "int main() { int i; int n = 0; for (i = 0; i < 10; i++) { if (i == 3) continue; if (i == 6) break; n += i; } return n; }",
    );
    assert!(asm.contains(".L.continue."));
    assert!(asm.contains("jmp .L.continue."));
  }
}
