//! Linking: turns the element stream into a frozen injector environment.
//!
//! The pipeline is: run modules to collect elements, detect conflicts, link
//! every declaration into a scoped and interceptor-woven factory, freeze the
//! environment, build private child environments and open their gates, then
//! force eager singletons. Any issue found anywhere aborts the whole
//! creation with one aggregate error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::binder::Binder;
use crate::binding::{
  BindingDecl, BindingInfo, BindingKind, Element, PrivateDecl, ProvisionFn, ScopeInfo, Source, TargetDecl,
};
use crate::construct::Provision;
use crate::error::{ConfigIssue, CreationError, ProvisionError};
use crate::injector::{resolve, CastFn, InjectorCore, LinkedBinding, Stage};
use crate::key::Key;
use crate::matcher::{Interceptor, Matcher};
use crate::module::Module;
use crate::scope::Scoping;

pub(crate) type InterceptorChain = Vec<(Arc<dyn Matcher>, Arc<dyn Interceptor>)>;

/// Runs the modules, links the environment tree and forces eager singletons.
pub(crate) fn build_injector(
  modules: Vec<Arc<dyn Module>>,
  parent: Option<Arc<InjectorCore>>,
  stage: Stage,
  explicit_only: bool,
) -> Result<Arc<InjectorCore>, CreationError> {
  let mut binder = Binder::new();
  for module in modules {
    binder.install(module);
  }
  let elements = std::mem::take(&mut binder.elements);
  let mut issues = std::mem::take(&mut binder.issues);
  tracing::debug!(elements = elements.len(), ?stage, "linking injector environment");

  let (core, eager) = link_env(elements, parent, stage, explicit_only, &HashSet::new(), &mut issues);
  if !issues.is_empty() {
    return Err(CreationError::new(issues));
  }

  for (env, key) in eager {
    tracing::trace!(key = %key, "forcing eager singleton");
    let mut cx = Provision::new(env.clone());
    if let Err(cause) = resolve(&env, &key, None, &mut cx) {
      issues.push(ConfigIssue::EagerFailure {
        key,
        cause: Arc::new(cause),
      });
    }
  }
  if !issues.is_empty() {
    tracing::warn!(count = issues.len(), "eager singleton construction failed");
    return Err(CreationError::new(issues));
  }
  Ok(core)
}

/// Order-preserving record of where declarations and private installs sit,
/// so the eager pass runs in declaration order across the whole tree.
enum Slot {
  Decl { key: Key, eager: bool },
  Private(usize),
}

fn link_env(
  elements: Vec<Element>,
  parent: Option<Arc<InjectorCore>>,
  stage: Stage,
  explicit_only: bool,
  exposed_here: &HashSet<Key>,
  issues: &mut Vec<ConfigIssue>,
) -> (Arc<InjectorCore>, Vec<(Arc<InjectorCore>, Key)>) {
  // Interceptors apply environment-wide regardless of registration position,
  // so the full chain is collected before any declaration is linked.
  // Ancestors' interceptors come first and therefore weave outermost.
  let mut chain: InterceptorChain = parent.as_ref().map(|p| p.interceptors.clone()).unwrap_or_default();
  let mut decls: Vec<BindingDecl> = Vec::new();
  let mut privates: Vec<PrivateDecl> = Vec::new();
  let mut slots: Vec<Slot> = Vec::new();

  for element in elements {
    match element {
      Element::Binding(decl) => decls.push(decl),
      Element::Interceptor(decl) => chain.push((decl.matcher, decl.interceptor)),
      Element::Private(decl) => {
        slots.push(Slot::Private(privates.len()));
        privates.push(decl);
      }
    }
  }

  let mut registry: HashMap<Key, LinkedBinding> = HashMap::new();
  let mut order: Vec<Key> = Vec::new();
  let mut first_sources: HashMap<Key, Source> = HashMap::new();
  // With just-in-time bindings disabled, every key a declaration refers to
  // must itself be explicitly bound; checked once the registry is complete.
  let mut require_explicit: Vec<(Key, Source)> = Vec::new();

  for decl in decls {
    if let TargetDecl::Linked { target, .. } = &decl.target {
      if *target == decl.key {
        issues.push(ConfigIssue::RecursiveLink {
          key: decl.key,
          declared_at: decl.source,
        });
        continue;
      }
    }
    if explicit_only {
      match &decl.target {
        TargetDecl::Linked { target, .. } => require_explicit.push((target.clone(), decl.source)),
        TargetDecl::ProviderKey { provider_key, .. } => require_explicit.push((provider_key.clone(), decl.source)),
        _ => {}
      }
    }
    if let Some(first) = first_sources.get(&decl.key) {
      issues.push(ConfigIssue::DuplicateBinding {
        key: decl.key,
        first: *first,
        second: decl.source,
      });
      continue;
    }
    if let Some(ancestor) = parent.as_ref().and_then(|p| p.bound_in_chain(&decl.key)) {
      // A key this environment exposes already sits in the parent as this
      // environment's own stub; that is the same declaration seen from
      // outside, not a conflict. Genuine conflicts on exposed keys (another
      // sibling, an ancestor binding) are reported at stub insertion.
      if !exposed_here.contains(&decl.key) {
        issues.push(ConfigIssue::DuplicateBinding {
          key: decl.key,
          first: ancestor.source().copied().unwrap_or(decl.source),
          second: decl.source,
        });
        continue;
      }
    }

    let (kind, raw, alias) = link_target(decl.target);
    let woven = weave(&chain, &decl.key, raw);
    let scoping = decl.scope.unwrap_or(Scoping::Unscoped);
    let factory = scoping.apply(&decl.key, woven);
    let eager = is_eager(&scoping, stage);

    first_sources.insert(decl.key.clone(), decl.source);
    order.push(decl.key.clone());
    slots.push(Slot::Decl {
      key: decl.key.clone(),
      eager,
    });
    registry.insert(
      decl.key.clone(),
      LinkedBinding {
        info: BindingInfo {
          key: decl.key,
          kind,
          scope: scoping.info(),
          source: Some(decl.source),
        },
        factory,
        alias,
      },
    );
  }

  // Exposure stubs: recorded against the parent now, resolved through a
  // one-time gate that opens when the child environment finishes building.
  let mut pending: Vec<(PrivateDecl, Arc<OnceCell<Arc<InjectorCore>>>)> = Vec::new();
  for private in privates {
    let gate: Arc<OnceCell<Arc<InjectorCore>>> = Arc::new(OnceCell::new());
    let child_keys = declared_keys(&private.elements);

    for (key, source) in &private.exposes {
      if !child_keys.contains(key) {
        issues.push(ConfigIssue::ExposedButUnbound {
          key: key.clone(),
          declared_at: *source,
        });
        continue;
      }
      let already = first_sources
        .get(key)
        .copied()
        .or_else(|| parent.as_ref().and_then(|p| p.bound_in_chain(key)).and_then(|b| b.source().copied()));
      if let Some(first) = already {
        issues.push(ConfigIssue::DuplicateBinding {
          key: key.clone(),
          first,
          second: *source,
        });
        continue;
      }

      let factory: ProvisionFn = {
        let gate = gate.clone();
        let key = key.clone();
        Arc::new(move |cx| match gate.get() {
          Some(child) => resolve(child, &key, None, cx),
          None => Err(ProvisionError::EnvironmentNotReady { key: key.clone() }),
        })
      };
      first_sources.insert(key.clone(), *source);
      order.push(key.clone());
      registry.insert(
        key.clone(),
        LinkedBinding {
          info: BindingInfo {
            key: key.clone(),
            kind: BindingKind::Exposed,
            scope: ScopeInfo::Unscoped,
            source: Some(*source),
          },
          factory,
          alias: None,
        },
      );
    }
    pending.push((private, gate));
  }

  for (key, source) in require_explicit {
    let bound_locally = first_sources.contains_key(&key);
    let bound_above = parent.as_ref().is_some_and(|p| p.bound_in_chain(&key).is_some());
    if !bound_locally && !bound_above {
      issues.push(ConfigIssue::MissingBinding { key, declared_at: source });
    }
  }

  let core = Arc::new(InjectorCore {
    registry,
    order,
    parent,
    stage,
    explicit_only,
    interceptors: chain,
    jit: dashmap::DashMap::new(),
    jit_failures: dashmap::DashMap::new(),
  });

  // Children link against the frozen parent; opening the gate is the last
  // step, so a stub can never observe a half-built child.
  let mut children_eager: Vec<Vec<(Arc<InjectorCore>, Key)>> = Vec::new();
  for (private, gate) in pending {
    tracing::debug!(module = private.module_name, "building private child environment");
    let child_exposes: HashSet<Key> = private.exposes.iter().map(|(k, _)| k.clone()).collect();
    let (child, child_eager) = link_env(
      private.elements,
      Some(core.clone()),
      stage,
      explicit_only,
      &child_exposes,
      issues,
    );
    let _ = gate.set(child);
    children_eager.push(child_eager);
  }

  let mut eager: Vec<(Arc<InjectorCore>, Key)> = Vec::new();
  for slot in slots {
    match slot {
      Slot::Decl { key, eager: true } => eager.push((core.clone(), key)),
      Slot::Decl { .. } => {}
      Slot::Private(i) => eager.extend(children_eager[i].drain(..)),
    }
  }

  (core, eager)
}

fn is_eager(scoping: &Scoping, stage: Stage) -> bool {
  match scoping {
    Scoping::Singleton { eager } => *eager || stage == Stage::Production,
    _ => false,
  }
}

/// The keys a private module binds itself, including what its own nested
/// private modules expose to it.
fn declared_keys(elements: &[Element]) -> HashSet<Key> {
  let mut keys = HashSet::new();
  for element in elements {
    match element {
      Element::Binding(decl) => {
        keys.insert(decl.key.clone());
      }
      Element::Private(decl) => {
        for (key, _) in &decl.exposes {
          keys.insert(key.clone());
        }
      }
      Element::Interceptor(_) => {}
    }
  }
  keys
}

/// Links one target declaration into an unscoped factory.
fn link_target(target: TargetDecl) -> (BindingKind, ProvisionFn, Option<(Key, CastFn)>) {
  match target {
    // `Unset` declarations were already reported by the binder and the
    // binder never emits them as elements.
    TargetDecl::Unset => unreachable!("unset target survived collection"),
    TargetDecl::Instance(instance) => (
      BindingKind::Instance,
      Arc::new(move |_cx: &mut Provision| Ok(instance.clone())),
      None,
    ),
    TargetDecl::ProviderFn(factory) => (BindingKind::Provider, factory, None),
    TargetDecl::ProviderKey {
      provider_key,
      jit,
      call,
    } => {
      let kind = BindingKind::ProviderKey {
        provider: provider_key.clone(),
      };
      let factory: ProvisionFn = Arc::new(move |cx| {
        let env = cx.current_env().ok_or_else(|| ProvisionError::MissingBinding {
          key: provider_key.clone(),
        })?;
        let provider = resolve(&env, &provider_key, Some(&jit), cx)?;
        call(&provider, cx)
      });
      (kind, factory, None)
    }
    TargetDecl::Linked { target, jit, cast } => {
      let kind = BindingKind::Linked {
        target: target.clone(),
      };
      let alias = Some((target.clone(), cast.clone()));
      let factory: ProvisionFn = Arc::new(move |cx| {
        let env = cx.current_env().ok_or_else(|| ProvisionError::MissingBinding {
          key: target.clone(),
        })?;
        let instance = resolve(&env, &target, Some(&jit), cx)?;
        cast(&instance).ok_or_else(|| ProvisionError::TypeMismatch { key: target.clone() })
      });
      (kind, factory, alias)
    }
    TargetDecl::Constructor { recipe } => (BindingKind::Constructor, recipe, None),
  }
}

/// Wraps a factory so matched interceptors enhance every produced instance,
/// first-registered interceptor outermost.
pub(crate) fn weave(chain: &InterceptorChain, key: &Key, raw: ProvisionFn) -> ProvisionFn {
  let matched: Vec<Arc<dyn Interceptor>> = chain
    .iter()
    .filter(|(matcher, _)| matcher.matches(key))
    .map(|(_, interceptor)| interceptor.clone())
    .collect();
  if matched.is_empty() {
    return raw;
  }
  let key = key.clone();
  Arc::new(move |cx| {
    let mut instance = raw(cx)?;
    // Applying in reverse registration order leaves the first-registered
    // interceptor as the outermost wrapper.
    for interceptor in matched.iter().rev() {
      instance = interceptor.enhance(&key, instance);
    }
    Ok(instance)
  })
}
