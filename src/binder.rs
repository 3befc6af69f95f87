//! The binder: collects binding declarations from modules.

use std::any::Any;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::binding::{
  pack, unpack, BindingDecl, Element, Instance, InterceptorDecl, PrivateDecl, Source, TargetDecl,
};
use crate::construct::{jit_spec, Construct, Provision, ProvideDefault, ProvideFor};
use crate::error::{ConfigIssue, ProvisionError};
use crate::key::{Key, Qualifier};
use crate::matcher::{Interceptor, Matcher};
use crate::module::{Module, PrivateModule};
use crate::scope::Scoping;

/// Collects the ordered stream of configuration commands while modules run.
///
/// A binder is handed to each [`Module::configure`] call; it is never global
/// or thread-ambient state. Misuse (a second target, scope or qualifier on
/// one binding) is recorded immediately as a configuration issue; all issues
/// are reported together when injector creation finishes.
pub struct Binder {
  pub(crate) elements: Vec<Element>,
  pub(crate) issues: Vec<ConfigIssue>,
  current_module: Option<&'static str>,
  /// Module instances already configured in this creation pass, by pointer
  /// identity. Shared across private environments.
  visited: HashSet<usize>,
  /// Keeps every installed module alive for the whole pass, so a dropped
  /// module's address can never be reused by a later install and mistaken
  /// for an already-visited one.
  retained: Vec<Box<dyn Any>>,
}

impl Binder {
  pub(crate) fn new() -> Self {
    Self {
      elements: Vec::new(),
      issues: Vec::new(),
      current_module: None,
      visited: HashSet::new(),
      retained: Vec::new(),
    }
  }

  /// Starts a binding for `T`.
  #[track_caller]
  pub fn bind<T: ?Sized + Any + Send + Sync>(&mut self) -> BindingBuilder<'_, T> {
    let source = Source::capture().in_module(self.current_module);
    BindingBuilder {
      binder: self,
      qualifier: None,
      target: TargetDecl::Unset,
      scope: None,
      implicit_scope: None,
      source,
      _marker: PhantomData,
    }
  }

  /// Starts a constant binding. The bound type is inferred from the value
  /// handed to [`ConstantBuilder::to`]; a qualifier is mandatory.
  #[track_caller]
  pub fn bind_constant(&mut self) -> ConstantBuilder<'_> {
    let source = Source::capture().in_module(self.current_module);
    ConstantBuilder {
      binder: self,
      qualifier: None,
      source,
    }
  }

  /// Installs a module. The same `Arc` installed twice configures once.
  pub fn install<M: ?Sized + Module + 'static>(&mut self, module: Arc<M>) {
    if !self.visited.insert(Arc::as_ptr(&module) as *const () as usize) {
      return;
    }
    self.retained.push(Box::new(module.clone()));
    let previous = self.current_module.replace(std::any::type_name::<M>());
    module.configure(self);
    self.current_module = previous;
  }

  /// Installs a private module: its bindings live in a child environment and
  /// only exposed keys become visible here.
  #[track_caller]
  pub fn install_private<M: ?Sized + PrivateModule + 'static>(&mut self, module: Arc<M>) {
    if !self.visited.insert(Arc::as_ptr(&module) as *const () as usize) {
      return;
    }
    self.retained.push(Box::new(module.clone()));
    let source = Source::capture().in_module(self.current_module);
    let module_name = std::any::type_name::<M>();

    let inner = Binder {
      elements: Vec::new(),
      issues: Vec::new(),
      current_module: Some(module_name),
      visited: std::mem::take(&mut self.visited),
      retained: std::mem::take(&mut self.retained),
    };
    let mut private = PrivateBinder {
      binder: inner,
      exposes: Vec::new(),
    };
    module.configure(&mut private);
    let PrivateBinder { binder: inner, exposes } = private;

    self.visited = inner.visited;
    self.retained = inner.retained;
    self.issues.extend(inner.issues);
    self.elements.push(Element::Private(PrivateDecl {
      module_name,
      elements: inner.elements,
      exposes,
      source,
    }));
  }

  /// Registers an interceptor for every binding whose key matches.
  ///
  /// Interceptors weave in registration order, first-registered outermost.
  #[track_caller]
  pub fn intercept(&mut self, matcher: Arc<dyn Matcher>, interceptor: Arc<dyn Interceptor>) {
    let source = Source::capture().in_module(self.current_module);
    self.elements.push(Element::Interceptor(InterceptorDecl {
      matcher,
      interceptor,
      source,
    }));
  }

  pub(crate) fn misuse(&mut self, source: Source, message: impl Into<String>) {
    self.issues.push(ConfigIssue::BuilderMisuse {
      message: message.into(),
      declared_at: source,
    });
  }
}

/// Fluent builder for one binding. The declaration commits when the builder
/// drops at the end of the statement.
pub struct BindingBuilder<'a, T: ?Sized + Any + Send + Sync> {
  binder: &'a mut Binder,
  qualifier: Option<Qualifier>,
  target: TargetDecl,
  scope: Option<Scoping>,
  /// Scope the target type declared for itself; explicit `in_scope` wins.
  implicit_scope: Option<Scoping>,
  source: Source,
  _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Any + Send + Sync> BindingBuilder<'_, T> {
  // --- QUALIFIERS ---

  /// Qualifies this binding with a name.
  pub fn named(self, name: &str) -> Self {
    self.with_qualifier(Qualifier::named(name))
  }

  /// Qualifies this binding with the marker type `Q`.
  pub fn qualified<Q: Any>(self) -> Self {
    self.with_qualifier(Qualifier::marker::<Q>())
  }

  /// Qualifies this binding with an explicit qualifier value.
  pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
    if self.qualifier.is_some() {
      let source = self.source;
      self.binder.misuse(
        source,
        format!("binding for `{}` declares more than one qualifier", std::any::type_name::<T>()),
      );
      return self;
    }
    self.qualifier = Some(qualifier);
    self
  }

  // --- TARGETS ---

  /// Links this key to the implementation type `U`.
  ///
  /// The cast argument captures the `Arc<U>` to `Arc<T>` conversion at the
  /// bind site, which is where the compiler can still see both types; for a
  /// trait key it is simply `|it| it`:
  ///
  /// ```ignore
  /// binder.bind::<dyn Service>().to::<ServiceImpl>(|it| it);
  /// ```
  ///
  /// If `U` has its own explicit binding (with any scope), that binding is
  /// used; otherwise a just-in-time binding for `U` is synthesized in the
  /// root injector.
  pub fn to<U: ?Sized + ProvideDefault>(mut self, cast: fn(Arc<U>) -> Arc<T>) -> Self {
    if self.reject_second_target() {
      return self;
    }
    self.target = TargetDecl::Linked {
      target: Key::of::<U>(),
      jit: jit_spec::<U>(),
      cast: Arc::new(move |instance: &Instance| unpack::<U>(instance).map(|u| pack(cast(u)))),
    };
    self
  }

  /// Binds this key to a pre-built value.
  pub fn to_instance(self, value: T) -> Self
  where
    T: Sized,
  {
    self.to_arc(Arc::new(value))
  }

  /// Binds this key to a pre-built shared value (usable for trait objects).
  pub fn to_arc(mut self, value: Arc<T>) -> Self {
    if self.reject_second_target() {
      return self;
    }
    self.target = TargetDecl::Instance(pack(value));
    self
  }

  /// Binds this key to a factory closure.
  pub fn to_provider<F>(mut self, provider: F) -> Self
  where
    F: Fn(&mut Provision) -> Result<Arc<T>, ProvisionError> + Send + Sync + 'static,
  {
    if self.reject_second_target() {
      return self;
    }
    self.target = TargetDecl::ProviderFn(Arc::new(move |cx| Ok(pack(provider(cx)?))));
    self
  }

  /// Binds this key through a provider type: `P` is resolved by its own key
  /// (or synthesized just in time), then asked to provide the value.
  pub fn to_provider_of<P>(mut self) -> Self
  where
    P: Construct + ProvideFor<T>,
  {
    if self.reject_second_target() {
      return self;
    }
    self.target = TargetDecl::ProviderKey {
      provider_key: Key::of::<P>(),
      jit: jit_spec::<P>(),
      call: Arc::new(|instance, cx| {
        let provider = unpack::<P>(instance).ok_or(ProvisionError::TypeMismatch {
          key: Key::of::<P>(),
        })?;
        Ok(pack(provider.provide(cx)?))
      }),
    };
    self
  }

  /// Untargeted binding: constructs the bound type itself. Only available
  /// for concrete constructible types.
  pub fn to_self(mut self) -> Self
  where
    T: Construct,
  {
    if self.reject_second_target() {
      return self;
    }
    let spec = jit_spec::<T>();
    self.target = TargetDecl::Constructor { recipe: spec.recipe };
    self.implicit_scope = Some(spec.scope);
    self
  }

  // --- SCOPES ---

  /// Applies a scope to this binding.
  pub fn in_scope(mut self, scope: Scoping) -> Self {
    if self.scope.is_some() {
      let source = self.source;
      self.binder.misuse(
        source,
        format!("binding for `{}` declares more than one scope", std::any::type_name::<T>()),
      );
      return self;
    }
    self.scope = Some(scope);
    self
  }

  /// One memoized instance per injector environment.
  pub fn singleton(self) -> Self {
    self.in_scope(Scoping::singleton())
  }

  /// Singleton, constructed during injector creation so failures surface
  /// there instead of at first use.
  pub fn eager_singleton(self) -> Self {
    self.in_scope(Scoping::eager_singleton())
  }

  fn reject_second_target(&mut self) -> bool {
    if !matches!(self.target, TargetDecl::Unset) {
      let source = self.source;
      self.binder.misuse(
        source,
        format!("binding for `{}` declares more than one target", std::any::type_name::<T>()),
      );
      return true;
    }
    false
  }
}

impl<T: ?Sized + Any + Send + Sync> Drop for BindingBuilder<'_, T> {
  fn drop(&mut self) {
    let target = std::mem::replace(&mut self.target, TargetDecl::Unset);
    if matches!(target, TargetDecl::Unset) {
      let source = self.source;
      self.binder.misuse(
        source,
        format!(
          "binding for `{}` declares no target; use `to_self()` for an untargeted concrete binding",
          std::any::type_name::<T>()
        ),
      );
      return;
    }
    let qualifier = self.qualifier.take().unwrap_or(Qualifier::None);
    self.binder.elements.push(Element::Binding(BindingDecl {
      key: Key::with_qualifier::<T>(qualifier),
      target,
      scope: self.scope.take().or_else(|| self.implicit_scope.take()),
      source: self.source,
    }));
  }
}

/// Builder for constant bindings. The target type is inferred from the value.
pub struct ConstantBuilder<'a> {
  binder: &'a mut Binder,
  qualifier: Option<Qualifier>,
  source: Source,
}

impl ConstantBuilder<'_> {
  pub fn named(mut self, name: &str) -> Self {
    if self.qualifier.is_some() {
      let source = self.source;
      self.binder.misuse(source, "constant binding declares more than one qualifier");
      return self;
    }
    self.qualifier = Some(Qualifier::named(name));
    self
  }

  pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
    if self.qualifier.is_some() {
      let source = self.source;
      self.binder.misuse(source, "constant binding declares more than one qualifier");
      return self;
    }
    self.qualifier = Some(qualifier);
    self
  }

  /// Commits the constant. Constants are always qualified; an unqualified
  /// constant is a configuration error.
  pub fn to<V: Any + Send + Sync>(self, value: V) {
    let Some(qualifier) = self.qualifier else {
      let source = self.source;
      self.binder.misuse(
        source,
        format!("constant binding for `{}` has no qualifier", std::any::type_name::<V>()),
      );
      return;
    };
    self.binder.elements.push(Element::Binding(BindingDecl {
      key: Key::with_qualifier::<V>(qualifier),
      target: TargetDecl::Instance(pack(Arc::new(value))),
      scope: None,
      source: self.source,
    }));
  }
}

/// The binder handed to [`PrivateModule::configure`]: a regular [`Binder`]
/// plus the ability to expose keys to the enclosing environment.
pub struct PrivateBinder {
  binder: Binder,
  exposes: Vec<(Key, Source)>,
}

impl PrivateBinder {
  /// Makes the unqualified binding for `T` visible to the enclosing
  /// injector. The binding itself (and its singleton state) stays in this
  /// private environment.
  #[track_caller]
  pub fn expose<T: ?Sized + Any + Send + Sync>(&mut self) {
    let source = Source::capture().in_module(self.binder.current_module);
    self.exposes.push((Key::of::<T>(), source));
  }

  /// Like [`PrivateBinder::expose`], for a named binding.
  #[track_caller]
  pub fn expose_named<T: ?Sized + Any + Send + Sync>(&mut self, name: &str) {
    let source = Source::capture().in_module(self.binder.current_module);
    self.exposes.push((Key::named::<T>(name), source));
  }
}

impl Deref for PrivateBinder {
  type Target = Binder;

  fn deref(&self) -> &Binder {
    &self.binder
  }
}

impl DerefMut for PrivateBinder {
  fn deref_mut(&mut self) -> &mut Binder {
    &mut self.binder
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn decl_keys(binder: &Binder) -> Vec<Key> {
    binder
      .elements
      .iter()
      .filter_map(|e| match e {
        Element::Binding(d) => Some(d.key.clone()),
        _ => None,
      })
      .collect()
  }

  #[test]
  fn builder_commits_on_drop_with_inferred_key() {
    let mut binder = Binder::new();
    binder.bind::<String>().named("greeting").to_instance("hi".to_string());

    assert!(binder.issues.is_empty());
    assert_eq!(decl_keys(&binder), vec![Key::named::<String>("greeting")]);
  }

  #[test]
  fn second_target_is_an_immediate_misuse_issue() {
    let mut binder = Binder::new();
    binder
      .bind::<String>()
      .to_instance("a".to_string())
      .to_instance("b".to_string());

    assert_eq!(binder.issues.len(), 1);
    assert!(binder.issues[0].to_string().contains("more than one target"));
    // The first target still commits, so the batch reports only the misuse.
    assert_eq!(decl_keys(&binder).len(), 1);
  }

  #[test]
  fn second_scope_and_second_qualifier_are_misuse_issues() {
    let mut binder = Binder::new();
    binder
      .bind::<String>()
      .named("a")
      .named("b")
      .to_instance("x".to_string())
      .singleton()
      .eager_singleton();

    let messages: Vec<String> = binder.issues.iter().map(|i| i.to_string()).collect();
    assert_eq!(messages.len(), 2, "{messages:?}");
    assert!(messages.iter().any(|m| m.contains("more than one qualifier")));
    assert!(messages.iter().any(|m| m.contains("more than one scope")));
  }

  #[test]
  fn missing_target_is_reported() {
    let mut binder = Binder::new();
    binder.bind::<String>().named("dangling");

    assert_eq!(binder.issues.len(), 1);
    assert!(binder.issues[0].to_string().contains("declares no target"));
    assert!(decl_keys(&binder).is_empty());
  }

  #[test]
  fn unqualified_constant_is_reported() {
    let mut binder = Binder::new();
    binder.bind_constant().to(8080u16);

    assert_eq!(binder.issues.len(), 1);
    assert!(binder.issues[0].to_string().contains("no qualifier"));
  }

  #[test]
  fn installing_the_same_arc_twice_configures_once() {
    struct CountingModule;
    impl Module for CountingModule {
      fn configure(&self, binder: &mut Binder) {
        binder.bind_constant().named("n").to(1u8);
      }
    }

    let module: Arc<dyn Module> = Arc::new(CountingModule);
    let mut binder = Binder::new();
    binder.install(module.clone());
    binder.install(module);

    assert_eq!(binder.elements.len(), 1);
    assert!(binder.issues.is_empty());
  }

  #[test]
  fn distinct_instances_of_the_same_module_type_each_configure() {
    struct M(u8);
    impl Module for M {
      fn configure(&self, binder: &mut Binder) {
        binder.bind_constant().named(&format!("m{}", self.0)).to(self.0);
      }
    }

    let mut binder = Binder::new();
    binder.install(Arc::new(M(1)));
    binder.install(Arc::new(M(2)));

    assert_eq!(binder.elements.len(), 2);
  }

  #[test]
  fn consecutive_short_lived_module_instances_all_configure() {
    struct M(usize);
    impl Module for M {
      fn configure(&self, binder: &mut Binder) {
        binder.bind_constant().named(&format!("k{}", self.0)).to(self.0);
      }
    }

    // Each Arc is dropped by the caller right after install; the binder must
    // keep it alive so the allocation's address cannot be reused and
    // mistaken for an already-visited module.
    let mut binder = Binder::new();
    for i in 0..16 {
      binder.install(Arc::new(M(i)));
    }

    assert_eq!(binder.elements.len(), 16);
    assert!(binder.issues.is_empty());
  }
}
