//! The injector: the resolved, queryable object graph for a set of modules.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;

use crate::binding::{BindingInfo, BindingKind, Instance, JitSpec, ProvisionFn};
use crate::construct::{Construct, Provision, ProvideDefault};
use crate::error::{CreationError, ProvisionError};
use crate::key::{Key, Qualifier};
use crate::linker::build_injector;
use crate::module::Module;

/// Which construction strategy an injector runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Stage {
  /// Singletons are constructed lazily, at first use.
  #[default]
  Development,
  /// Every singleton is constructed during injector creation, so
  /// configuration and construction failures surface up front.
  Production,
}

/// A cast captured at a bind site, recovering `Arc<T>` from the target's
/// instance.
pub(crate) type CastFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

/// One fully linked binding: its introspection record plus the scoped,
/// interceptor-woven factory.
#[derive(Clone)]
pub(crate) struct LinkedBinding {
  pub info: BindingInfo,
  pub factory: ProvisionFn,
  /// For linked bindings: the target key and cast, so a re-entrant request
  /// during the target's member-injection phase can be satisfied from the
  /// partially-constructed value instead of failing as a cycle.
  pub alias: Option<(Key, CastFn)>,
}

/// One injector environment: a frozen binding registry plus the parent chain.
///
/// Everything here is immutable after creation except the root's
/// just-in-time caches (concurrent maps) and the singleton memoization slots
/// hidden inside factories.
pub(crate) struct InjectorCore {
  pub registry: HashMap<Key, LinkedBinding>,
  /// Declaration order of the local registry, for introspection and the
  /// eager pass.
  pub order: Vec<Key>,
  pub parent: Option<Arc<InjectorCore>>,
  pub stage: Stage,
  pub explicit_only: bool,
  /// The full interceptor chain for this environment (ancestors' pairs
  /// first, then locally registered ones).
  pub interceptors: crate::linker::InterceptorChain,
  /// Just-in-time bindings, root environment only. Kept at the root so the
  /// whole injector tree (including sibling private environments) shares one
  /// synthesized binding per key.
  pub jit: DashMap<Key, LinkedBinding>,
  /// Keys whose just-in-time resolution already failed; repeated lookups
  /// return the identical cached error.
  pub jit_failures: DashMap<Key, ProvisionError>,
}

impl InjectorCore {
  pub fn root(self: &Arc<Self>) -> Arc<InjectorCore> {
    let mut env = self.clone();
    loop {
      let parent = env.parent.clone();
      match parent {
        Some(p) => env = p,
        None => return env,
      }
    }
  }

  /// Finds the binding for `key` in this environment or the closest
  /// ancestor that has one.
  pub fn find(self: &Arc<Self>, key: &Key) -> Option<(Arc<InjectorCore>, LinkedBinding)> {
    let mut env = self.clone();
    loop {
      if let Some(binding) = env.registry.get(key) {
        let binding = binding.clone();
        return Some((env, binding));
      }
      let parent = env.parent.clone();
      match parent {
        Some(p) => env = p,
        None => return None,
      }
    }
  }

  /// True if `key` is explicitly bound in this environment or any ancestor.
  pub fn bound_in_chain(self: &Arc<Self>, key: &Key) -> Option<BindingInfo> {
    self.find(key).map(|(_, b)| b.info)
  }
}

/// Resolves one key against an environment within a provision.
///
/// This is the single resolution walk everything funnels through: partial
/// (mid-injection) values, cycle detection, explicit bindings up the parent
/// chain, and just-in-time synthesis at the root.
pub(crate) fn resolve(
  env: &Arc<InjectorCore>,
  key: &Key,
  jit: Option<&JitSpec>,
  cx: &mut Provision,
) -> Result<Instance, ProvisionError> {
  let (owner, binding) = match env.find(key) {
    Some(found) => found,
    None => lookup_jit(env, key, jit)?,
  };
  // Just-in-time bindings are stored at the root for tree-wide sharing, but
  // their dependencies resolve against the environment that requested them.
  let context = if matches!(binding.info.kind, BindingKind::JustInTime) {
    env.clone()
  } else {
    owner.clone()
  };

  // A value that finished construct but not inject satisfies re-entrant
  // requests within the same environment; this is what closes field-level
  // cycles. The tag keeps a sibling environment's mid-injection value from
  // leaking across the boundary.
  if let Some(partial) = cx.partial.get(&(Arc::as_ptr(&context) as usize, key.clone())) {
    return Ok(partial.clone());
  }

  if let Err(cycle) = cx.enter(&owner, key) {
    // A linked key re-entered while its target is mid-injection resolves
    // from the partial value; anything else is a real cycle.
    if let Some((target, cast)) = &binding.alias {
      let tag = Arc::as_ptr(env) as usize;
      if let Some(partial) = cx.partial.get(&(tag, target.clone())) {
        return cast(partial).ok_or(ProvisionError::TypeMismatch { key: key.clone() });
      }
    }
    return Err(cycle);
  }
  cx.envs.push(context);
  let result = (binding.factory)(cx);
  cx.envs.pop();
  cx.exit();
  result.map_err(|e| e.for_key(key))
}

/// Just-in-time lookup and synthesis, always against the root environment.
fn lookup_jit(
  env: &Arc<InjectorCore>,
  key: &Key,
  jit: Option<&JitSpec>,
) -> Result<(Arc<InjectorCore>, LinkedBinding), ProvisionError> {
  let root = env.root();
  if let Some(existing) = root.jit.get(key) {
    return Ok((root.clone(), existing.clone()));
  }
  if let Some(cached) = root.jit_failures.get(key) {
    return Err(cached.clone());
  }
  match jit {
    // Just-in-time bindings are synthesized for unqualified keys only; a
    // qualified key always requires an explicit binding.
    Some(spec) if !root.explicit_only && key.qualifier().is_none() => {
      let binding = root
        .jit
        .entry(key.clone())
        .or_insert_with(|| {
          tracing::trace!(key = %key, "synthesizing just-in-time binding");
          // Woven before scoping, so a singleton caches the enhanced value.
          let woven = crate::linker::weave(&root.interceptors, key, spec.recipe.clone());
          let factory = spec.scope.apply(key, woven);
          LinkedBinding {
            info: BindingInfo {
              key: key.clone(),
              kind: BindingKind::JustInTime,
              scope: spec.scope.info(),
              source: None,
            },
            factory,
            alias: None,
          }
        })
        .clone();
      Ok((root, binding))
    }
    Some(_) => {
      let err = ProvisionError::MissingBinding { key: key.clone() };
      root.jit_failures.insert(key.clone(), err.clone());
      Err(err)
    }
    None => Err(ProvisionError::MissingBinding { key: key.clone() }),
  }
}

/// A lazy handle to the binding for `T` against one environment.
///
/// Obtaining a provider never resolves anything; every failure is deferred
/// to [`Provider::get`]. Providers are the safe way to hold a dependency
/// through a construction cycle and use it afterwards.
pub struct Provider<T: ?Sized> {
  env: Option<Arc<InjectorCore>>,
  key: Key,
  _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Any + Send + Sync> Provider<T> {
  pub(crate) fn new(env: Option<Arc<InjectorCore>>, key: Key) -> Self {
    Self {
      env,
      key,
      _marker: PhantomData,
    }
  }

  /// Resolves the value. Each call is an independent provision.
  pub fn get(&self) -> Result<Arc<T>, ProvisionError> {
    let env = self.env.clone().ok_or(ProvisionError::MissingBinding {
      key: self.key.clone(),
    })?;
    let mut cx = Provision::new(env);
    cx.resolve_typed::<T>(self.key.clone(), None)
  }

  pub fn key(&self) -> &Key {
    &self.key
  }
}

impl<T: ?Sized> Clone for Provider<T> {
  fn clone(&self) -> Self {
    Self {
      env: self.env.clone(),
      key: self.key.clone(),
      _marker: PhantomData,
    }
  }
}

impl<T: ?Sized> fmt::Debug for Provider<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Provider({:?})", self.key)
  }
}

/// Configures and creates an [`Injector`].
pub struct InjectorBuilder {
  stage: Stage,
  explicit_only: bool,
  modules: Vec<Arc<dyn Module>>,
}

impl InjectorBuilder {
  /// See [`Stage`].
  pub fn stage(mut self, stage: Stage) -> Self {
    self.stage = stage;
    self
  }

  /// Disables just-in-time bindings: every key must be explicitly bound.
  pub fn require_explicit_bindings(mut self) -> Self {
    self.explicit_only = true;
    self
  }

  /// Adds a module. Closures taking `&mut Binder` are modules too.
  pub fn module(mut self, module: impl Module + 'static) -> Self {
    self.modules.push(Arc::new(module));
    self
  }

  /// Adds an already-shared module, preserving its identity for
  /// install-dedup.
  pub fn module_arc(mut self, module: Arc<dyn Module>) -> Self {
    self.modules.push(module);
    self
  }

  /// Creates the injector. Either every declaration is valid and every
  /// eager singleton constructs, or this returns the aggregate
  /// [`CreationError`] listing all problems.
  pub fn build(self) -> Result<Injector, CreationError> {
    let core = build_injector(self.modules, None, self.stage, self.explicit_only)?;
    Ok(Injector { core })
  }
}

/// The façade over a fully linked binding registry. Cheap to clone,
/// immutable, and safe for concurrent use from any number of threads.
#[derive(Clone)]
pub struct Injector {
  core: Arc<InjectorCore>,
}

impl Injector {
  pub fn builder() -> InjectorBuilder {
    InjectorBuilder {
      stage: Stage::Development,
      explicit_only: false,
      modules: Vec::new(),
    }
  }

  /// Creates an injector from a single module in [`Stage::Development`].
  pub fn create(module: impl Module + 'static) -> Result<Injector, CreationError> {
    Self::builder().module(module).build()
  }

  pub fn stage(&self) -> Stage {
    self.core.stage
  }

  // --- RESOLUTION ---

  /// Resolves the unqualified binding for `T`. Explicit bindings only; see
  /// [`Injector::instance`] for just-in-time resolution.
  pub fn get<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>, ProvisionError> {
    Provision::new(self.core.clone()).get::<T>()
  }

  /// Resolves the binding for `T` named `name`.
  pub fn get_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ProvisionError> {
    Provision::new(self.core.clone()).get_named::<T>(name)
  }

  /// Resolves the binding for `T` with an explicit qualifier.
  pub fn get_with<T: ?Sized + Any + Send + Sync>(&self, qualifier: Qualifier) -> Result<Arc<T>, ProvisionError> {
    Provision::new(self.core.clone()).get_with::<T>(qualifier)
  }

  /// Resolves the unqualified binding for `T`, synthesizing a just-in-time
  /// binding from `T`'s [`ProvideDefault`] impl when nothing is bound.
  pub fn instance<T: ?Sized + ProvideDefault>(&self) -> Result<Arc<T>, ProvisionError> {
    Provision::new(self.core.clone()).instance::<T>()
  }

  /// A lazy handle for `T`. Never fails eagerly; all failures are deferred
  /// to [`Provider::get`].
  pub fn provider<T: ?Sized + Any + Send + Sync>(&self) -> Provider<T> {
    Provider::new(Some(self.core.clone()), Key::of::<T>())
  }

  /// Like [`Injector::provider`], for a named binding.
  pub fn provider_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Provider<T> {
    Provider::new(Some(self.core.clone()), Key::named::<T>(name))
  }

  /// Runs the member-injection phase on an externally created value.
  pub fn inject_members<T: Construct>(&self, value: &T) -> Result<(), ProvisionError> {
    let mut cx = Provision::new(self.core.clone());
    value.inject(&mut cx)
  }

  // --- CHILD ENVIRONMENTS ---

  /// Creates a child injector: it sees every binding of this injector, may
  /// add non-conflicting bindings of its own, and shares the root's
  /// just-in-time and singleton state.
  pub fn child(&self, module: impl Module + 'static) -> Result<Injector, CreationError> {
    self.child_arc(vec![Arc::new(module)])
  }

  /// Like [`Injector::child`], with shared module instances.
  pub fn child_arc(&self, modules: Vec<Arc<dyn Module>>) -> Result<Injector, CreationError> {
    let core = build_injector(modules, Some(self.core.clone()), self.core.stage, self.core.explicit_only)?;
    Ok(Injector { core })
  }

  // --- INTROSPECTION ---

  /// The explicit bindings of this environment, in declaration order.
  pub fn bindings(&self) -> Vec<BindingInfo> {
    self
      .core
      .order
      .iter()
      .filter_map(|key| self.core.registry.get(key))
      .map(|b| b.info.clone())
      .collect()
  }

  /// Every binding reachable from this environment: its own, its ancestors'
  /// (nearest environment wins), and the just-in-time bindings that have
  /// been materialized so far.
  pub fn all_bindings(&self) -> Vec<BindingInfo> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut env = Some(self.core.clone());
    while let Some(e) = env {
      for key in &e.order {
        if seen.insert(key.clone()) {
          if let Some(b) = e.registry.get(key) {
            out.push(b.info.clone());
          }
        }
      }
      env = e.parent.clone();
    }
    for entry in self.core.root().jit.iter() {
      if seen.insert(entry.key().clone()) {
        out.push(entry.value().info.clone());
      }
    }
    out
  }

  /// The binding for `key` if one already exists (explicitly, or as an
  /// already-materialized just-in-time binding). Never synthesizes.
  pub fn existing_binding(&self, key: &Key) -> Option<BindingInfo> {
    if let Some(info) = self.core.bound_in_chain(key) {
      return Some(info);
    }
    self.core.root().jit.get(key).map(|b| b.info.clone())
  }
}

impl fmt::Debug for Injector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Injector")
      .field("stage", &self.core.stage)
      .field("bindings", &self.core.order.len())
      .field("has_parent", &self.core.parent.is_some())
      .finish()
  }
}
