//! Modules: units of binding configuration.

use crate::binder::{Binder, PrivateBinder};

/// A unit of configuration: declares bindings against a [`Binder`].
///
/// Modules are visited exactly once per distinct module instance per
/// injector-creation pass: installing the same `Arc` twice (directly or
/// through transitive installs) configures it only once, while two separate
/// instances of the same module type each configure.
pub trait Module: Send + Sync {
  fn configure(&self, binder: &mut Binder);
}

/// A module whose bindings are private to a child environment.
///
/// Everything bound here is invisible to the enclosing injector except the
/// keys explicitly exposed through
/// [`PrivateBinder::expose`](crate::PrivateBinder::expose).
pub trait PrivateModule: Send + Sync {
  fn configure(&self, binder: &mut PrivateBinder);
}

impl<F> Module for F
where
  F: Fn(&mut Binder) + Send + Sync,
{
  fn configure(&self, binder: &mut Binder) {
    self(binder)
  }
}
