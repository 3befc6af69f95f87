//! Binding identity: a type plus an optional qualifier.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A value-semantics qualifier payload.
///
/// Implemented automatically for every `Eq + Hash + Debug` type, so a custom
/// qualifier is just a plain struct:
///
/// ```
/// #[derive(Debug, PartialEq, Eq, Hash)]
/// struct Port(u16);
/// ```
///
/// Equality is structural (member values), never identity: two separately
/// constructed payloads with equal members compare equal.
pub trait QualifierValue: Any + Send + Sync + fmt::Debug {
  fn dyn_eq(&self, other: &dyn Any) -> bool;
  fn dyn_hash(&self, state: &mut dyn Hasher);
  fn as_any(&self) -> &dyn Any;
}

impl<T> QualifierValue for T
where
  T: Any + Send + Sync + Eq + Hash + fmt::Debug,
{
  fn dyn_eq(&self, other: &dyn Any) -> bool {
    other.downcast_ref::<T>().is_some_and(|o| self == o)
  }

  fn dyn_hash(&self, mut state: &mut dyn Hasher) {
    TypeId::of::<T>().hash(&mut state);
    self.hash(&mut state);
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

/// The qualifier portion of a [`Key`], disambiguating multiple bindings of
/// the same type.
///
/// This is a closed set of qualifier kinds with structural equality:
///
/// - `None`: the unqualified slot for a type.
/// - `Marker`: a marker type used purely as a tag (`struct Blue;`).
/// - `Named`: a string-valued qualifier. Two `Named` qualifiers with equal
///   strings are always equal, no matter how or where they were constructed.
/// - `Value`: an arbitrary user payload compared by member values.
#[derive(Clone)]
pub enum Qualifier {
  None,
  Marker { id: TypeId, name: &'static str },
  Named(Arc<str>),
  Value(Arc<dyn QualifierValue>),
}

impl Qualifier {
  /// Marker qualifier for the tag type `Q`.
  pub fn marker<Q: Any>() -> Self {
    Qualifier::Marker {
      id: TypeId::of::<Q>(),
      name: std::any::type_name::<Q>(),
    }
  }

  /// String-valued qualifier.
  pub fn named(name: impl Into<Arc<str>>) -> Self {
    Qualifier::Named(name.into())
  }

  /// Custom value qualifier compared structurally.
  pub fn value(v: impl QualifierValue) -> Self {
    Qualifier::Value(Arc::new(v))
  }

  pub fn is_none(&self) -> bool {
    matches!(self, Qualifier::None)
  }
}

impl PartialEq for Qualifier {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Qualifier::None, Qualifier::None) => true,
      (Qualifier::Marker { id: a, .. }, Qualifier::Marker { id: b, .. }) => a == b,
      (Qualifier::Named(a), Qualifier::Named(b)) => a == b,
      (Qualifier::Value(a), Qualifier::Value(b)) => a.dyn_eq(b.as_any()),
      _ => false,
    }
  }
}

impl Eq for Qualifier {}

impl Hash for Qualifier {
  fn hash<H: Hasher>(&self, state: &mut H) {
    match self {
      Qualifier::None => state.write_u8(0),
      Qualifier::Marker { id, .. } => {
        state.write_u8(1);
        id.hash(state);
      }
      Qualifier::Named(name) => {
        state.write_u8(2);
        name.hash(state);
      }
      Qualifier::Value(v) => {
        state.write_u8(3);
        v.dyn_hash(state);
      }
    }
  }
}

impl fmt::Debug for Qualifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Qualifier::None => write!(f, "None"),
      Qualifier::Marker { name, .. } => write!(f, "Marker({name})"),
      Qualifier::Named(name) => write!(f, "Named({name:?})"),
      Qualifier::Value(v) => write!(f, "Value({v:?})"),
    }
  }
}

/// The identity of one injectable dependency slot: a type plus an optional
/// [`Qualifier`].
///
/// Keys have value equality and are used as map keys throughout the
/// container. Generic types are distinct keys (`Vec<String>` vs `Vec<i64>`),
/// and trait-object types (`dyn Service`) are first class.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
  type_id: TypeId,
  type_name: &'static str,
  qualifier: Qualifier,
}

impl Key {
  /// Key for the unqualified slot of `T`.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self::with_qualifier::<T>(Qualifier::None)
  }

  /// Key for `T` qualified by a name.
  pub fn named<T: ?Sized + Any>(name: impl Into<Arc<str>>) -> Self {
    Self::with_qualifier::<T>(Qualifier::named(name))
  }

  /// Key for `T` qualified by the marker type `Q`.
  pub fn qualified<T: ?Sized + Any, Q: Any>() -> Self {
    Self::with_qualifier::<T>(Qualifier::marker::<Q>())
  }

  /// Key for `T` qualified by a structural value.
  pub fn with_value<T: ?Sized + Any>(value: impl QualifierValue) -> Self {
    Self::with_qualifier::<T>(Qualifier::value(value))
  }

  /// Key for `T` with an explicit qualifier.
  pub fn with_qualifier<T: ?Sized + Any>(qualifier: Qualifier) -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      qualifier,
    }
  }

  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  pub fn qualifier(&self) -> &Qualifier {
    &self.qualifier
  }
}

impl fmt::Debug for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.qualifier {
      Qualifier::None => write!(f, "Key({})", self.type_name),
      q => write!(f, "Key({}, {:?})", self.type_name, q),
    }
  }
}

impl fmt::Display for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.qualifier {
      Qualifier::None => write!(f, "`{}`", self.type_name),
      Qualifier::Marker { name, .. } => write!(f, "`{}` qualified by `{}`", self.type_name, name),
      Qualifier::Named(name) => write!(f, "`{}` named {:?}", self.type_name, name),
      Qualifier::Value(v) => write!(f, "`{}` qualified by {:?}", self.type_name, v),
    }
  }
}
