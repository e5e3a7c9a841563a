//! Storage shapes of the language and the arithmetic rules built on them.
//!
//! Sizes follow the LP64 model: `int` is 4 bytes, `long` and pointers are 8.
//! Pointers and arrays are distinct variants that share a `base` accessor so
//! array-to-pointer decay never has to guess whether a length is meaningful.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Width of a pointer on the target.
pub const POINTER_SIZE: i64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
  pub name: String,
  pub ty: Type,
  pub offset: i64,
}

/// Members of a struct or union and the storage they add up to.
pub struct Layout {
  pub members: Vec<Member>,
  pub size: i64,
  pub align: i64,
}

/// One struct or union definition. Every type naming it shares the cell, so
/// filling in the body completes pointers that were formed before it.
#[derive(Clone, Default)]
pub struct Aggregate(Rc<RefCell<Option<Rc<Layout>>>>);

impl Aggregate {
  /// `None` until the closing brace of the body has been seen.
  pub fn layout(&self) -> Option<Rc<Layout>> {
    self.0.borrow().clone()
  }

  fn complete(&self, layout: Layout) {
    *self.0.borrow_mut() = Some(Rc::new(layout));
  }
}

impl PartialEq for Aggregate {
  fn eq(&self, other: &Self) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }
}

impl Eq for Aggregate {}

// Member types may point back at the aggregate itself, so only names are shown.
impl fmt::Debug for Aggregate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.layout() {
      Some(layout) => f
        .debug_struct("Aggregate")
        .field("size", &layout.size)
        .field(
          "members",
          &layout
            .members
            .iter()
            .map(|member| member.name.as_str())
            .collect::<Vec<_>>(),
        )
        .finish(),
      None => f.write_str("Aggregate(incomplete)"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
  Void,
  Bool,
  Char,
  Short,
  Int,
  Long,
  /// Enumerations live in the `int` domain; their constants are folded by the parser.
  Enum,
  Ptr(Rc<Type>),
  /// `len` is `None` only for the `T[]` placeholder of a parameter.
  Array {
    base: Rc<Type>,
    len: Option<i64>,
  },
  Func {
    ret: Rc<Type>,
    params: Vec<Type>,
  },
  Struct(Aggregate),
  Union(Aggregate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
  pub kind: TypeKind,
  // aggregates read these from their layout instead
  size: i64,
  align: i64,
  /// Token naming the declarator this type was built for.
  pub decl_token: Option<usize>,
}

impl Type {
  fn new(kind: TypeKind, size: i64, align: i64) -> Self {
    Self {
      kind,
      size,
      align,
      decl_token: None,
    }
  }

  pub fn void() -> Self {
    Self::new(TypeKind::Void, 0, 1)
  }

  pub fn boolean() -> Self {
    Self::new(TypeKind::Bool, 1, 1)
  }

  pub fn char() -> Self {
    Self::new(TypeKind::Char, 1, 1)
  }

  pub fn short() -> Self {
    Self::new(TypeKind::Short, 2, 2)
  }

  pub fn int() -> Self {
    Self::new(TypeKind::Int, 4, 4)
  }

  pub fn long() -> Self {
    Self::new(TypeKind::Long, 8, 8)
  }

  pub fn enumeration() -> Self {
    Self::new(TypeKind::Enum, 4, 4)
  }

  pub fn pointer_to(base: Type) -> Self {
    Self::new(TypeKind::Ptr(Rc::new(base)), POINTER_SIZE, POINTER_SIZE)
  }

  /// Callers check that the total size fits; an oversized array saturates.
  pub fn array_of(base: Type, len: Option<i64>) -> Self {
    let size = base.size().saturating_mul(len.unwrap_or(0));
    let align = base.align();
    Self::new(
      TypeKind::Array {
        base: Rc::new(base),
        len,
      },
      size,
      align,
    )
  }

  pub fn func(ret: Type, params: Vec<Type>) -> Self {
    Self::new(
      TypeKind::Func {
        ret: Rc::new(ret),
        params,
      },
      0,
      1,
    )
  }

  /// A struct or union with no body yet. It stays incomplete until
  /// [`Type::complete`] is called on it or on any clone of it.
  pub fn aggregate(is_union: bool) -> Self {
    let agg = Aggregate::default();
    let kind = if is_union {
      TypeKind::Union(agg)
    } else {
      TypeKind::Struct(agg)
    };
    Self::new(kind, 0, 1)
  }

  /// Attach a body to an aggregate. Has no effect on other types.
  pub fn complete(&self, layout: Layout) {
    if let TypeKind::Struct(agg) | TypeKind::Union(agg) = &self.kind {
      agg.complete(layout);
    }
  }

  pub fn with_decl_token(mut self, token: usize) -> Self {
    self.decl_token = Some(token);
    self
  }

  pub fn without_name(mut self) -> Self {
    self.decl_token = None;
    self
  }

  pub fn is_integer(&self) -> bool {
    matches!(
      self.kind,
      TypeKind::Bool
        | TypeKind::Char
        | TypeKind::Short
        | TypeKind::Int
        | TypeKind::Long
        | TypeKind::Enum
    )
  }

  pub fn is_pointer(&self) -> bool {
    matches!(self.kind, TypeKind::Ptr(_))
  }

  pub fn is_array(&self) -> bool {
    matches!(self.kind, TypeKind::Array { .. })
  }

  pub fn is_void(&self) -> bool {
    matches!(self.kind, TypeKind::Void)
  }

  pub fn is_func(&self) -> bool {
    matches!(self.kind, TypeKind::Func { .. })
  }

  pub fn is_struct_or_union(&self) -> bool {
    matches!(self.kind, TypeKind::Struct(_) | TypeKind::Union(_))
  }

  pub fn is_union(&self) -> bool {
    matches!(self.kind, TypeKind::Union(_))
  }

  /// Scalars are the values that fit the accumulator register.
  pub fn is_scalar(&self) -> bool {
    self.is_integer() || self.is_pointer()
  }

  /// Whether the type has a known size usable for objects and `sizeof`.
  pub fn is_complete(&self) -> bool {
    match &self.kind {
      TypeKind::Void | TypeKind::Func { .. } => false,
      TypeKind::Array { base, len } => len.is_some() && base.is_complete(),
      TypeKind::Struct(agg) | TypeKind::Union(agg) => agg.layout().is_some(),
      _ => true,
    }
  }

  pub fn size(&self) -> i64 {
    match &self.kind {
      TypeKind::Struct(agg) | TypeKind::Union(agg) => {
        agg.layout().map_or(0, |layout| layout.size)
      }
      _ => self.size,
    }
  }

  pub fn align(&self) -> i64 {
    match &self.kind {
      TypeKind::Struct(agg) | TypeKind::Union(agg) => {
        agg.layout().map_or(1, |layout| layout.align)
      }
      _ => self.align,
    }
  }

  /// Pointee of a pointer or element of an array.
  pub fn base(&self) -> Option<&Type> {
    match &self.kind {
      TypeKind::Ptr(base) | TypeKind::Array { base, .. } => Some(base.as_ref()),
      _ => None,
    }
  }

  pub fn members(&self) -> Vec<Member> {
    match &self.kind {
      TypeKind::Struct(agg) | TypeKind::Union(agg) => agg
        .layout()
        .map(|layout| layout.members.clone())
        .unwrap_or_default(),
      _ => Vec::new(),
    }
  }

  pub fn find_member(&self, name: &str) -> Option<Member> {
    self.members().into_iter().find(|member| member.name == name)
  }

  pub fn return_type(&self) -> Option<&Type> {
    match &self.kind {
      TypeKind::Func { ret, .. } => Some(ret.as_ref()),
      _ => None,
    }
  }

  pub fn params(&self) -> &[Type] {
    match &self.kind {
      TypeKind::Func { params, .. } => params.as_slice(),
      _ => &[],
    }
  }

  /// An array used as a value is a pointer to its first element.
  pub fn decayed(&self) -> Type {
    match &self.kind {
      TypeKind::Array { base, .. } => Type::pointer_to(base.as_ref().clone()),
      _ => self.clone(),
    }
  }

  /// Structural equality that ignores declarator names.
  pub fn is_compatible(&self, other: &Type) -> bool {
    match (&self.kind, &other.kind) {
      (TypeKind::Ptr(a), TypeKind::Ptr(b)) => a.is_compatible(b),
      (TypeKind::Array { base: a, len: la }, TypeKind::Array { base: b, len: lb }) => {
        la == lb && a.is_compatible(b)
      }
      (TypeKind::Func { ret: ra, params: pa }, TypeKind::Func { ret: rb, params: pb }) => {
        ra.is_compatible(rb)
          && pa.len() == pb.len()
          && pa.iter().zip(pb).all(|(a, b)| a.is_compatible(b))
      }
      (a, b) => a == b,
    }
  }
}

/// Total order over the integer types, widest last.
pub fn integer_rank(ty: &Type) -> Option<u8> {
  match ty.kind {
    TypeKind::Bool => Some(0),
    TypeKind::Char => Some(1),
    TypeKind::Short => Some(2),
    TypeKind::Int | TypeKind::Enum => Some(3),
    TypeKind::Long => Some(4),
    _ => None,
  }
}

/// The type both operands of a binary arithmetic or comparison operator are
/// converted to before the operation.
pub fn common_type(lhs: &Type, rhs: &Type) -> Type {
  if let Some(base) = lhs.base().or_else(|| rhs.base()) {
    return Type::pointer_to(base.clone());
  }
  // everything narrower than `long` computes as `int`
  if integer_rank(lhs).max(integer_rank(rhs)) == integer_rank(&Type::long()) {
    Type::long()
  } else {
    Type::int()
  }
}

/// Round up `n` to the nearest multiple of `align`. For example,
/// `align_to(5, 8)` is `Some(8)` and `align_to(11, 8)` is `Some(16)`.
/// `None` when the result does not fit.
pub fn align_to(n: i64, align: i64) -> Option<i64> {
  Some(n.checked_add(align - 1)? / align * align)
}

/// Lay members out in declaration order, padding each to its alignment.
/// `None` when the struct would be too large to address.
pub fn struct_layout(fields: Vec<(String, Type)>) -> Option<Layout> {
  let mut offset = 0;
  let mut align = 1;
  let mut members = Vec::with_capacity(fields.len());

  for (name, ty) in fields {
    offset = align_to(offset, ty.align())?;
    align = align.max(ty.align());
    let size = ty.size();
    members.push(Member { name, ty, offset });
    offset = offset.checked_add(size)?;
  }

  Some(Layout {
    members,
    size: align_to(offset, align)?,
    align,
  })
}

/// Every member starts at offset 0; the union is as large as its widest member.
pub fn union_layout(fields: Vec<(String, Type)>) -> Option<Layout> {
  let mut size = 0;
  let mut align = 1;
  let members: Vec<_> = fields
    .into_iter()
    .map(|(name, ty)| {
      size = size.max(ty.size());
      align = align.max(ty.align());
      Member { name, ty, offset: 0 }
    })
    .collect();

  Some(Layout {
    members,
    size: align_to(size, align)?,
    align,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn struct_of(fields: Vec<(String, Type)>) -> Type {
    let ty = Type::aggregate(false);
    ty.complete(struct_layout(fields).unwrap());
    ty
  }

  #[test]
  fn primitive_sizes() {
    assert_eq!(Type::int().size(), 4);
    assert_eq!(Type::long().size(), 8);
    assert_eq!(Type::pointer_to(Type::int()).size(), 8);
    assert_eq!(Type::array_of(Type::char(), Some(10)).size(), 10);
  }

  #[test]
  fn nested_arrays_multiply_out() {
    let row = Type::array_of(Type::int(), Some(4));
    let grid = Type::array_of(row.clone(), Some(3));
    assert_eq!(grid.size(), 48);
    assert_eq!(grid.base().unwrap().size(), 16);

    let wide = Type::array_of(Type::array_of(Type::long(), Some(4)), Some(3));
    assert_eq!(wide.size(), 96);
    assert_eq!(wide.base().unwrap().size(), 32);
  }

  #[test]
  fn struct_layout_pads_to_member_alignment() {
    let ty = struct_of(vec![
      ("a".to_string(), Type::int()),
      ("b".to_string(), Type::char()),
      ("c".to_string(), Type::long()),
    ]);
    let offsets: Vec<_> = ty.members().iter().map(|m| m.offset).collect();
    assert_eq!(offsets, [0, 4, 8]);
    assert_eq!(ty.size(), 16);
    assert_eq!(ty.align(), 8);
  }

  #[test]
  fn struct_tail_padding() {
    let ty = struct_of(vec![
      ("x".to_string(), Type::int()),
      ("c".to_string(), Type::char()),
    ]);
    assert_eq!(ty.size(), 8);
    assert_eq!(ty.find_member("c").unwrap().offset, 4);
  }

  #[test]
  fn union_takes_the_widest_member() {
    let ty = Type::aggregate(true);
    ty.complete(
      union_layout(vec![
        ("c".to_string(), Type::array_of(Type::char(), Some(5))),
        ("i".to_string(), Type::int()),
      ])
      .unwrap(),
    );
    assert!(ty.members().iter().all(|m| m.offset == 0));
    assert_eq!(ty.size(), 8);
    assert_eq!(ty.align(), 4);
  }

  #[test]
  fn common_type_prefers_pointers_then_width() {
    let p = Type::pointer_to(Type::char());
    assert!(common_type(&p, &Type::int()).is_pointer());
    assert!(common_type(&Type::long(), &p).is_pointer());
    assert_eq!(common_type(&Type::char(), &Type::short()).kind, TypeKind::Int);
    assert_eq!(common_type(&Type::int(), &Type::long()).kind, TypeKind::Long);
  }

  #[test]
  fn unsized_types_are_incomplete() {
    assert!(!Type::void().is_complete());
    assert!(!Type::array_of(Type::int(), None).is_complete());
    assert!(Type::array_of(Type::int(), Some(0)).is_complete());
  }

  #[test]
  fn ranks_are_ordered() {
    assert!(integer_rank(&Type::boolean()) < integer_rank(&Type::char()));
    assert!(integer_rank(&Type::int()) < integer_rank(&Type::long()));
    assert_eq!(integer_rank(&Type::enumeration()), integer_rank(&Type::int()));
    assert_eq!(integer_rank(&Type::pointer_to(Type::int())), None);
  }

  #[test]
  fn aggregates_complete_in_place() {
    let node = Type::aggregate(false);
    let link = Type::pointer_to(node.clone());
    assert!(!node.is_complete());
    assert_eq!(link.size(), 8);

    node.complete(
      struct_layout(vec![
        ("v".to_string(), Type::int()),
        ("next".to_string(), link.clone()),
      ])
      .unwrap(),
    );
    let pointee = link.base().unwrap();
    assert!(pointee.is_complete());
    assert_eq!(pointee.size(), 16);
    assert_eq!(pointee.find_member("next").unwrap().offset, 8);
    assert!(pointee.is_compatible(&node));
    assert!(!node.is_compatible(&Type::aggregate(false)));
  }

  #[test]
  fn oversized_layouts_are_rejected() {
    let huge = Type::array_of(Type::char(), Some(i64::MAX - 2));
    assert!(struct_layout(vec![("a".into(), huge.clone()), ("b".into(), huge.clone())]).is_none());
    assert!(union_layout(vec![("a".into(), huge.clone()), ("b".into(), Type::long())]).is_none());
    assert_eq!(align_to(i64::MAX - 1, 8), None);
    assert_eq!(align_to(11, 8), Some(16));
  }

  #[test]
  fn compatibility_ignores_declarator_names() {
    let a = Type::pointer_to(Type::int()).with_decl_token(3);
    let b = Type::pointer_to(Type::int());
    assert!(a.is_compatible(&b));
    assert!(!a.is_compatible(&Type::pointer_to(Type::char())));
  }
}
