//! The construction protocol and the per-request provision context.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::binding::{pack, unpack, Instance, JitSpec};
use crate::error::ProvisionError;
use crate::injector::{resolve, InjectorCore, Provider};
use crate::key::{Key, Qualifier};
use crate::scope::Scoping;

/// The constructor-injection protocol for a concrete type.
///
/// `construct` plays the role of an injectable constructor: it requests its
/// dependencies from the provision context in declaration order. `inject` is
/// the optional member-injection phase; it runs after `construct` returns,
/// on the shared (`Arc`ed) value, which is what makes circular references
/// resolvable through interior-mutability fields.
///
/// ```
/// use std::sync::Arc;
/// use weft::{Construct, Provision, ProvisionError};
///
/// struct Config { url: String }
/// # impl Construct for Config {
/// #   fn construct(_: &mut Provision) -> Result<Self, ProvisionError> {
/// #     Ok(Config { url: "mem://".into() })
/// #   }
/// # }
/// struct Repo { config: Arc<Config> }
///
/// impl Construct for Repo {
///   fn construct(cx: &mut Provision) -> Result<Self, ProvisionError> {
///     Ok(Repo { config: cx.instance::<Config>()? })
///   }
/// }
/// ```
pub trait Construct: Sized + Send + Sync + 'static {
  fn construct(cx: &mut Provision) -> Result<Self, ProvisionError>;

  /// Member-injection phase. Runs once per constructed value, after
  /// `construct`, in whatever order the implementation chooses (that order
  /// is deterministic by construction).
  fn inject(&self, cx: &mut Provision) -> Result<(), ProvisionError> {
    let _ = cx;
    Ok(())
  }

  /// The scope applied when this type is synthesized just in time. An
  /// explicit binding's scope always wins over this.
  fn default_scope() -> Scoping {
    Scoping::Unscoped
  }
}

/// A default provision recipe for a type, usable when no explicit binding
/// exists.
///
/// Every [`Construct`] type gets this via a blanket impl. Implementing it
/// directly for a trait object declares the trait's default implementation,
/// the equivalent of an `@ImplementedBy`/`@ProvidedBy` meta-binding:
///
/// ```
/// use std::sync::Arc;
/// use weft::{Construct, ProvideDefault, Provision, ProvisionError, Scoping};
///
/// trait Mailer: Send + Sync {}
/// struct Smtp;
/// # impl Construct for Smtp {
/// #   fn construct(_: &mut Provision) -> Result<Self, ProvisionError> { Ok(Smtp) }
/// # }
/// impl Mailer for Smtp {}
///
/// impl ProvideDefault for dyn Mailer {
///   fn provide_default(cx: &mut Provision) -> Result<Arc<Self>, ProvisionError> {
///     Ok(cx.instance::<Smtp>()?)
///   }
///   fn default_scope() -> Scoping {
///     Scoping::Unscoped
///   }
/// }
/// ```
pub trait ProvideDefault: Any + Send + Sync {
  fn provide_default(cx: &mut Provision) -> Result<Arc<Self>, ProvisionError>;

  fn default_scope() -> Scoping {
    Scoping::Unscoped
  }
}

impl<T: Construct> ProvideDefault for T {
  fn provide_default(cx: &mut Provision) -> Result<Arc<Self>, ProvisionError> {
    let key = Key::of::<T>();
    let tag = cx.env_tag();
    let value = Arc::new(T::construct(cx)?);
    // The constructed-but-not-yet-injected value is visible to re-entrant
    // requests within this provision and environment; that is how
    // field-level cycles close.
    cx.partial.insert((tag, key.clone()), pack(value.clone()));
    let injected = value.inject(cx);
    cx.partial.remove(&(tag, key));
    injected?;
    Ok(value)
  }

  fn default_scope() -> Scoping {
    <T as Construct>::default_scope()
  }
}

/// A provider type bound with `to_provider_of`: resolved by its own key,
/// then asked to produce the bound value.
pub trait ProvideFor<T: ?Sized + Any + Send + Sync>: Send + Sync {
  fn provide(&self, cx: &mut Provision) -> Result<Arc<T>, ProvisionError>;
}

/// Builds the just-in-time spec for a type from its `ProvideDefault` impl.
pub(crate) fn jit_spec<T: ?Sized + ProvideDefault>() -> JitSpec {
  JitSpec {
    recipe: Arc::new(|cx| Ok(pack(T::provide_default(cx)?))),
    scope: T::default_scope(),
  }
}

/// One logical top-level provision: a single `get`/`instance`/member-injection
/// request and everything it transitively constructs.
///
/// The context is passed explicitly through every factory and `Construct`
/// impl; there is no ambient or thread-global state, so independent
/// provisions (on any thread) can never interfere with each other.
pub struct Provision {
  /// Stack of injector environments; the top is the environment owning the
  /// binding currently being provisioned.
  pub(crate) envs: Vec<Arc<InjectorCore>>,
  /// Keys currently being provisioned, outermost first, tagged with the
  /// environment owning the binding. Re-entry of the same (environment, key)
  /// pair means a constructor-level cycle; the same key in a different
  /// environment (an exposure stub delegating into its child) is not one.
  pub(crate) path: Vec<(usize, Key)>,
  /// Values that finished `construct` but not yet `inject`, tagged with the
  /// environment whose binding is producing them. A re-entrant request for
  /// one of these in the same environment receives the
  /// partially-initialized value instead of a cycle error; other
  /// environments never see it.
  pub(crate) partial: HashMap<(usize, Key), Instance>,
}

impl Provision {
  pub(crate) fn new(env: Arc<InjectorCore>) -> Self {
    Self {
      envs: vec![env],
      path: Vec::new(),
      partial: HashMap::new(),
    }
  }

  #[cfg(test)]
  pub(crate) fn detached() -> Self {
    Self {
      envs: Vec::new(),
      path: Vec::new(),
      partial: HashMap::new(),
    }
  }

  // --- PUBLIC RESOLUTION API (used inside `Construct` impls) ---

  /// Resolves the unqualified binding for `T`. Explicit bindings only.
  pub fn get<T: ?Sized + Any + Send + Sync>(&mut self) -> Result<Arc<T>, ProvisionError> {
    self.resolve_typed::<T>(Key::of::<T>(), None)
  }

  /// Resolves the binding for `T` named `name`. Explicit bindings only.
  pub fn get_named<T: ?Sized + Any + Send + Sync>(&mut self, name: &str) -> Result<Arc<T>, ProvisionError> {
    self.resolve_typed::<T>(Key::named::<T>(name), None)
  }

  /// Resolves the binding for `T` with an explicit qualifier.
  pub fn get_with<T: ?Sized + Any + Send + Sync>(&mut self, qualifier: Qualifier) -> Result<Arc<T>, ProvisionError> {
    self.resolve_typed::<T>(Key::with_qualifier::<T>(qualifier), None)
  }

  /// Resolves the unqualified binding for `T`, synthesizing a just-in-time
  /// binding from `T`'s [`ProvideDefault`] impl when nothing is bound.
  pub fn instance<T: ?Sized + ProvideDefault>(&mut self) -> Result<Arc<T>, ProvisionError> {
    self.resolve_typed::<T>(Key::of::<T>(), Some(jit_spec::<T>()))
  }

  /// A lazy handle for `T` against the current environment. Never resolves
  /// eagerly, so it is safe to hold through a construction cycle and use
  /// after the provision completes.
  pub fn provider<T: ?Sized + Any + Send + Sync>(&self) -> Provider<T> {
    Provider::new(self.current_env(), Key::of::<T>())
  }

  /// Like [`Provision::provider`], for a named binding.
  pub fn provider_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Provider<T> {
    Provider::new(self.current_env(), Key::named::<T>(name))
  }

  // --- INTERNALS ---

  pub(crate) fn current_env(&self) -> Option<Arc<InjectorCore>> {
    self.envs.last().cloned()
  }

  /// Pointer tag of the environment currently producing a value, used to
  /// scope `partial` entries.
  pub(crate) fn env_tag(&self) -> usize {
    self.envs.last().map_or(0, |e| Arc::as_ptr(e) as usize)
  }

  pub(crate) fn resolve_typed<T: ?Sized + Any + Send + Sync>(
    &mut self,
    key: Key,
    jit: Option<JitSpec>,
  ) -> Result<Arc<T>, ProvisionError> {
    let instance = self.resolve_dynamic(&key, jit)?;
    unpack::<T>(&instance).ok_or(ProvisionError::TypeMismatch { key })
  }

  pub(crate) fn resolve_dynamic(&mut self, key: &Key, jit: Option<JitSpec>) -> Result<Instance, ProvisionError> {
    let env = match self.current_env() {
      Some(env) => env,
      None => return Err(ProvisionError::MissingBinding { key: key.clone() }),
    };
    resolve(&env, key, jit.as_ref(), self)
  }

  /// Marks `key` as being provisioned by a binding owned by `env`. Re-entry
  /// for a key still in its construct phase is a constructor-level cycle.
  pub(crate) fn enter(&mut self, env: &Arc<InjectorCore>, key: &Key) -> Result<(), ProvisionError> {
    let tag = Arc::as_ptr(env) as usize;
    if let Some(pos) = self.path.iter().position(|(t, k)| *t == tag && k == key) {
      return Err(ProvisionError::CircularDependency {
        cycle: self.path[pos..].iter().map(|(_, k)| k.clone()).collect(),
      });
    }
    self.path.push((tag, key.clone()));
    Ok(())
  }

  pub(crate) fn exit(&mut self) {
    self.path.pop();
  }
}
