//! Nested lexical scopes.
//!
//! Each frame holds two namespaces: ordinary identifiers (variables,
//! functions, typedefs and enum constants) and struct/union/enum tags.
//! Lookups walk the frames innermost first. Declaring a name twice in the
//! same frame replaces the earlier binding.

use std::collections::HashMap;

use crate::ast::VarRef;
use crate::ty::Type;

/// What an ordinary identifier refers to.
#[derive(Debug, Clone)]
pub enum Binding {
  Var(VarRef),
  Func(Type),
  Typedef(Type),
  EnumConst(i64),
}

#[derive(Debug, Default)]
struct Frame {
  vars: HashMap<String, Binding>,
  tags: HashMap<String, Type>,
}

#[derive(Debug)]
pub struct Scope {
  frames: Vec<Frame>,
}

impl Default for Scope {
  fn default() -> Self {
    Self::new()
  }
}

impl Scope {
  /// A scope stack holding only the file-level frame.
  pub fn new() -> Self {
    Self {
      frames: vec![Frame::default()],
    }
  }

  pub fn enter(&mut self) {
    self.frames.push(Frame::default());
  }

  pub fn leave(&mut self) {
    // the file-level frame is never popped
    if self.frames.len() > 1 {
      self.frames.pop();
    }
  }

  fn current(&mut self) -> &mut Frame {
    let last = self.frames.len() - 1;
    &mut self.frames[last]
  }

  pub fn declare(&mut self, name: impl Into<String>, binding: Binding) {
    self.current().vars.insert(name.into(), binding);
  }

  pub fn declare_var(&mut self, name: impl Into<String>, var: VarRef) {
    self.declare(name, Binding::Var(var));
  }

  pub fn declare_typedef(&mut self, name: impl Into<String>, ty: Type) {
    self.declare(name, Binding::Typedef(ty));
  }

  pub fn declare_tag(&mut self, name: impl Into<String>, ty: Type) {
    self.current().tags.insert(name.into(), ty);
  }

  /// Innermost binding of an ordinary identifier, whatever its kind.
  pub fn lookup(&self, name: &str) -> Option<&Binding> {
    self.frames.iter().rev().find_map(|frame| frame.vars.get(name))
  }

  /// Binding of `name` in the innermost frame only.
  pub fn lookup_current(&self, name: &str) -> Option<&Binding> {
    self.frames.last()?.vars.get(name)
  }

  pub fn lookup_typedef(&self, name: &str) -> Option<&Type> {
    match self.lookup(name)? {
      Binding::Typedef(ty) => Some(ty),
      _ => None,
    }
  }

  pub fn lookup_tag(&self, name: &str) -> Option<&Type> {
    self.frames.iter().rev().find_map(|frame| frame.tags.get(name))
  }

  pub fn lookup_tag_current(&self, name: &str) -> Option<&Type> {
    self.frames.last()?.tags.get(name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn var_of(binding: Option<&Binding>) -> Option<VarRef> {
    match binding {
      Some(Binding::Var(var)) => Some(*var),
      _ => None,
    }
  }

  #[test]
  fn inner_binding_shadows_outer_until_leave() {
    let mut scope = Scope::new();
    scope.declare_var("x", VarRef::Local(0));
    scope.enter();
    scope.declare_var("x", VarRef::Local(1));
    assert_eq!(var_of(scope.lookup("x")), Some(VarRef::Local(1)));
    scope.leave();
    assert_eq!(var_of(scope.lookup("x")), Some(VarRef::Local(0)));
  }

  #[test]
  fn redeclaring_in_the_same_frame_is_last_wins() {
    let mut scope = Scope::new();
    scope.declare_var("x", VarRef::Local(0));
    scope.declare_var("x", VarRef::Local(1));
    assert_eq!(var_of(scope.lookup("x")), Some(VarRef::Local(1)));
  }

  #[test]
  fn a_variable_hides_an_outer_typedef() {
    let mut scope = Scope::new();
    scope.declare_typedef("T", Type::int());
    assert!(scope.lookup_typedef("T").is_some());
    assert_eq!(var_of(scope.lookup("T")), None);

    scope.enter();
    scope.declare_var("T", VarRef::Local(0));
    assert!(scope.lookup_typedef("T").is_none());
    assert_eq!(var_of(scope.lookup("T")), Some(VarRef::Local(0)));
    scope.leave();
    assert!(scope.lookup_typedef("T").is_some());
  }

  #[test]
  fn tags_live_in_their_own_namespace() {
    let mut scope = Scope::new();
    scope.declare_var("point", VarRef::Global(0));
    scope.enter();
    scope.declare_tag("point", Type::aggregate(false));
    assert!(scope.lookup_tag("point").is_some());
    assert!(scope.lookup_tag_current("point").is_some());
    assert!(scope.lookup("point").is_some());
    scope.leave();
    assert!(scope.lookup_tag("point").is_none());
  }

  #[test]
  fn current_frame_lookups_ignore_outer_frames() {
    let mut scope = Scope::new();
    scope.declare_var("x", VarRef::Global(0));
    scope.declare_tag("node", Type::aggregate(false));
    scope.enter();
    assert!(scope.lookup_current("x").is_none());
    assert!(scope.lookup_tag_current("node").is_none());
    assert!(scope.lookup("x").is_some());
  }

  #[test]
  fn file_frame_survives_extra_leaves() {
    let mut scope = Scope::new();
    scope.declare_var("g", VarRef::Global(0));
    scope.leave();
    assert_eq!(scope.frames.len(), 1);
    assert!(scope.lookup("g").is_some());
  }
}
