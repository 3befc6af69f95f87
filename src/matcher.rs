//! Interception: key matchers and instance-enhancing interceptors.
//!
//! The container's responsibility is purely the matching: every binding is
//! tested against the registered `(matcher, interceptor)` pairs at link time,
//! and matched interceptors wrap the binding's output with the first-bound
//! interceptor outermost. How an instance is enhanced (wrapped, decorated,
//! proxied) is the interceptor's own business.

use std::any::Any;
use std::sync::Arc;

use crate::binding::{pack, unpack, Instance};
use crate::key::{Key, Qualifier};

/// A predicate over binding keys.
pub trait Matcher: Send + Sync {
  fn matches(&self, key: &Key) -> bool;
}

impl<F> Matcher for F
where
  F: Fn(&Key) -> bool + Send + Sync,
{
  fn matches(&self, key: &Key) -> bool {
    self(key)
  }
}

/// Enhances instances produced by matched bindings.
///
/// `enhance` receives the freshly produced (type-erased) instance and returns
/// the instance to hand out instead. Returning the input unchanged leaves the
/// binding unintercepted for that shape.
pub trait Interceptor: Send + Sync {
  fn enhance(&self, key: &Key, instance: Instance) -> Instance;
}

/// Matcher combinators.
pub mod matchers {
  use super::*;

  /// Matches every key.
  pub fn any() -> Arc<dyn Matcher> {
    Arc::new(|_: &Key| true)
  }

  /// Matches exactly one key.
  pub fn key(key: Key) -> Arc<dyn Matcher> {
    Arc::new(move |k: &Key| *k == key)
  }

  /// Matches any key whose qualifier is `Named(name)`.
  pub fn named(name: &str) -> Arc<dyn Matcher> {
    let name = name.to_owned();
    Arc::new(move |k: &Key| matches!(k.qualifier(), Qualifier::Named(n) if **n == *name))
  }

  /// Matches any key whose type name contains `fragment`.
  pub fn type_name_contains(fragment: &str) -> Arc<dyn Matcher> {
    let fragment = fragment.to_owned();
    Arc::new(move |k: &Key| k.type_name().contains(&fragment))
  }

  /// Matches when both matchers match.
  pub fn all_of(a: Arc<dyn Matcher>, b: Arc<dyn Matcher>) -> Arc<dyn Matcher> {
    Arc::new(move |k: &Key| a.matches(k) && b.matches(k))
  }

  /// Inverts a matcher.
  pub fn not(m: Arc<dyn Matcher>) -> Arc<dyn Matcher> {
    Arc::new(move |k: &Key| !m.matches(k))
  }
}

/// Adapts a typed decorator function into an [`Interceptor`].
///
/// The decorator sees the produced `Arc<T>` and returns the replacement,
/// typically a wrapper implementing the same trait:
///
/// ```
/// use std::sync::Arc;
/// use weft::decorate;
///
/// trait Audit: Send + Sync { fn log(&self) -> String; }
/// struct Real;
/// impl Audit for Real { fn log(&self) -> String { "real".into() } }
/// struct Traced(Arc<dyn Audit>);
/// impl Audit for Traced {
///   fn log(&self) -> String { format!("traced:{}", self.0.log()) }
/// }
///
/// let interceptor = decorate::<dyn Audit>(|inner| Arc::new(Traced(inner)));
/// ```
pub fn decorate<T>(f: impl Fn(Arc<T>) -> Arc<T> + Send + Sync + 'static) -> Arc<dyn Interceptor>
where
  T: ?Sized + Any + Send + Sync,
{
  struct Decorate<T: ?Sized, F> {
    f: F,
    _marker: std::marker::PhantomData<fn() -> Box<T>>,
  }

  impl<T, F> Interceptor for Decorate<T, F>
  where
    T: ?Sized + Any + Send + Sync,
    F: Fn(Arc<T>) -> Arc<T> + Send + Sync,
  {
    fn enhance(&self, _key: &Key, instance: Instance) -> Instance {
      match unpack::<T>(&instance) {
        Some(value) => pack((self.f)(value)),
        // A shape this decorator does not understand passes through.
        None => instance,
      }
    }
  }

  Arc::new(Decorate {
    f,
    _marker: std::marker::PhantomData,
  })
}
