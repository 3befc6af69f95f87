//! Scopes: lifecycle policies wrapping unscoped factories.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::binding::{Instance, ProvisionFn, ScopeInfo};
use crate::key::Key;

/// A strategy that wraps an unscoped factory to control instance lifecycle.
///
/// The returned factory is cached per binding, so whatever state the scope
/// needs (a memoized slot, a per-request table, ...) should live inside the
/// closure it returns.
pub trait Scope: Send + Sync + fmt::Debug {
  fn scope(&self, key: &Key, unscoped: ProvisionFn) -> ProvisionFn;
}

/// The scope requested for a binding.
#[derive(Clone)]
pub enum Scoping {
  /// A fresh instance per provision (the default).
  Unscoped,
  /// One memoized instance per injector environment. `eager` forces
  /// construction during injector creation.
  Singleton { eager: bool },
  /// A user-defined policy.
  Custom(Arc<dyn Scope>),
}

impl Scoping {
  pub fn singleton() -> Self {
    Scoping::Singleton { eager: false }
  }

  pub fn eager_singleton() -> Self {
    Scoping::Singleton { eager: true }
  }

  pub(crate) fn info(&self) -> ScopeInfo {
    match self {
      Scoping::Unscoped => ScopeInfo::Unscoped,
      Scoping::Singleton { eager } => ScopeInfo::Singleton { eager: *eager },
      Scoping::Custom(s) => ScopeInfo::Custom(format!("{s:?}")),
    }
  }

  /// Wraps a raw factory according to this scoping.
  pub(crate) fn apply(&self, key: &Key, raw: ProvisionFn) -> ProvisionFn {
    match self {
      Scoping::Unscoped => raw,
      Scoping::Singleton { .. } => memoize(raw),
      Scoping::Custom(scope) => scope.scope(key, raw),
    }
  }
}

impl fmt::Debug for Scoping {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scoping::Unscoped => write!(f, "Unscoped"),
      Scoping::Singleton { eager: false } => write!(f, "Singleton"),
      Scoping::Singleton { eager: true } => write!(f, "EagerSingleton"),
      Scoping::Custom(s) => write!(f, "Custom({s:?})"),
    }
  }
}

/// Singleton memoization.
///
/// The fast path reads the cell without synchronization. On the slow path,
/// concurrent first callers block on the cell while exactly one of them runs
/// the factory. A failed construction leaves the cell empty, so a later call
/// retries instead of observing a poisoned slot.
fn memoize(raw: ProvisionFn) -> ProvisionFn {
  let cell: Arc<OnceCell<Instance>> = Arc::new(OnceCell::new());
  Arc::new(move |cx| {
    if let Some(v) = cell.get() {
      return Ok(v.clone());
    }
    cell.get_or_try_init(|| raw(cx)).cloned()
  })
}
