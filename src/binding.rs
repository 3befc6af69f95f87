//! The binding data model: declarations, targets and provenance.

use std::any::Any;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::construct::Provision;
use crate::error::ProvisionError;
use crate::key::Key;
use crate::matcher::{Interceptor, Matcher};
use crate::scope::Scoping;

/// A type-erased, shareable instance: an `Arc<dyn Any>` holding an `Arc<T>`.
///
/// Storing the inner `Arc<T>` (rather than `T` itself) is what lets unsized
/// targets such as `Arc<dyn Service>` travel through the container and be
/// recovered with `downcast_ref::<Arc<T>>()`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A linked factory: produces one instance for a key within a provision.
pub type ProvisionFn = Arc<dyn Fn(&mut Provision) -> Result<Instance, ProvisionError> + Send + Sync>;

/// Packs an `Arc<T>` into a type-erased [`Instance`].
pub(crate) fn pack<T: ?Sized + Any + Send + Sync>(value: Arc<T>) -> Instance {
  Arc::new(value)
}

/// Recovers an `Arc<T>` from a type-erased [`Instance`].
pub(crate) fn unpack<T: ?Sized + Any + Send + Sync>(instance: &Instance) -> Option<Arc<T>> {
  instance.downcast_ref::<Arc<T>>().cloned()
}

/// Provenance of a declaration, used in every configuration error.
#[derive(Clone, Copy)]
pub struct Source {
  location: &'static Location<'static>,
  module: Option<&'static str>,
}

impl Source {
  /// Captures the caller's location. Attribute the installing module with
  /// [`Source::in_module`].
  #[track_caller]
  pub(crate) fn capture() -> Self {
    Self {
      location: Location::caller(),
      module: None,
    }
  }

  pub(crate) fn in_module(mut self, module: Option<&'static str>) -> Self {
    self.module = module;
    self
  }

  pub fn module(&self) -> Option<&'static str> {
    self.module
  }

  pub fn location(&self) -> &'static Location<'static> {
    self.location
  }
}

impl fmt::Display for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.module {
      Some(m) => write!(f, "{}:{} (module `{}`)", self.location.file(), self.location.line(), m),
      None => write!(f, "{}:{}", self.location.file(), self.location.line()),
    }
  }
}

impl fmt::Debug for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Source({self})")
  }
}

/// A recipe for synthesizing a just-in-time binding: the raw factory plus the
/// scope the type declared for itself.
#[derive(Clone)]
pub(crate) struct JitSpec {
  pub recipe: ProvisionFn,
  pub scope: Scoping,
}

/// How a declared binding produces its value. Closed sum; `Unset` only exists
/// while a builder is still chaining and is a configuration error if it
/// survives to injector creation.
pub(crate) enum TargetDecl {
  Unset,
  /// A pre-built value.
  Instance(Instance),
  /// A user factory closure.
  ProviderFn(ProvisionFn),
  /// A provider resolved by its own key, then asked to provide the value.
  ProviderKey {
    provider_key: Key,
    jit: JitSpec,
    call: Arc<dyn Fn(&Instance, &mut Provision) -> Result<Instance, ProvisionError> + Send + Sync>,
  },
  /// An alias for another key, with the unsizing cast captured at the bind
  /// site and a recipe to synthesize the target if it has no binding.
  Linked {
    target: Key,
    jit: JitSpec,
    cast: Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>,
  },
  /// Construct the bound type itself (untargeted binding).
  Constructor { recipe: ProvisionFn },
}

/// One binding declaration as collected by the binder.
pub(crate) struct BindingDecl {
  pub key: Key,
  pub target: TargetDecl,
  pub scope: Option<Scoping>,
  pub source: Source,
}

/// An interceptor registration: every binding whose key matches is woven.
pub(crate) struct InterceptorDecl {
  pub matcher: Arc<dyn Matcher>,
  pub interceptor: Arc<dyn Interceptor>,
  #[allow(dead_code)]
  pub source: Source,
}

/// A private environment recorded during configuration. Its elements are
/// collected up front; the child injector itself is built after the parent.
pub(crate) struct PrivateDecl {
  pub module_name: &'static str,
  pub elements: Vec<Element>,
  pub exposes: Vec<(Key, Source)>,
  #[allow(dead_code)]
  pub source: Source,
}

/// The ordered stream of configuration commands produced by modules.
pub(crate) enum Element {
  Binding(BindingDecl),
  Interceptor(InterceptorDecl),
  Private(PrivateDecl),
}

/// The shape of a binding, for introspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingKind {
  /// Bound to a pre-built value.
  Instance,
  /// Bound to a factory closure.
  Provider,
  /// Bound through a provider resolved by its own key.
  ProviderKey { provider: Key },
  /// Aliased to another key.
  Linked { target: Key },
  /// Constructs the bound type itself.
  Constructor,
  /// Exposed from a private child environment.
  Exposed,
  /// Synthesized on demand rather than explicitly declared.
  JustInTime,
}

/// The scope of a binding, for introspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeInfo {
  Unscoped,
  Singleton { eager: bool },
  Custom(String),
}

/// An immutable description of one resolved binding, as reported by
/// [`Injector::bindings`](crate::Injector::bindings) and friends.
#[derive(Clone, Debug)]
pub struct BindingInfo {
  pub(crate) key: Key,
  pub(crate) kind: BindingKind,
  pub(crate) scope: ScopeInfo,
  pub(crate) source: Option<Source>,
}

impl BindingInfo {
  pub fn key(&self) -> &Key {
    &self.key
  }

  pub fn kind(&self) -> &BindingKind {
    &self.kind
  }

  pub fn scope(&self) -> &ScopeInfo {
    &self.scope
  }

  /// Where the binding was declared. `None` for just-in-time bindings.
  pub fn source(&self) -> Option<&Source> {
    self.source.as_ref()
  }
}
