use std::sync::Arc;

use weft::{Binder, ConfigIssue, Injector, Key, ProvisionError};

#[test]
fn test_duplicate_bindings_fail_creation_with_both_locations() {
  let err = Injector::create(|binder: &mut Binder| {
    binder.bind::<String>().to_instance("first".to_string());
    binder.bind::<String>().to_instance("second".to_string());
  })
  .unwrap_err();

  assert_eq!(err.issues().len(), 1);
  match &err.issues()[0] {
    ConfigIssue::DuplicateBinding { key, first, second } => {
      assert_eq!(key, &Key::of::<String>());
      assert_ne!(first.location().line(), second.location().line());
    }
    other => panic!("unexpected issue: {other}"),
  }
}

#[test]
fn test_all_configuration_problems_are_reported_in_one_batch() {
  let err = Injector::create(|binder: &mut Binder| {
    // Duplicate.
    binder.bind::<String>().to_instance("a".to_string());
    binder.bind::<String>().to_instance("b".to_string());
    // Missing target.
    binder.bind::<u32>();
    // Unqualified constant.
    binder.bind_constant().to(1u8);
  })
  .unwrap_err();

  assert_eq!(err.issues().len(), 3, "{err}");
  let text = err.to_string();
  assert!(text.contains("3 error(s)"), "{text}");
  assert!(text.contains("duplicate binding"), "{text}");
  assert!(text.contains("declares no target"), "{text}");
  assert!(text.contains("no qualifier"), "{text}");
}

#[test]
fn test_binding_linked_to_itself_fails_creation() {
  trait Svc: Send + Sync {}

  impl weft::ProvideDefault for dyn Svc {
    fn provide_default(_cx: &mut weft::Provision) -> Result<Arc<Self>, ProvisionError> {
      struct Stub;
      impl Svc for Stub {}
      Ok(Arc::new(Stub))
    }
  }

  let err = Injector::create(|binder: &mut Binder| {
    binder.bind::<dyn Svc>().to::<dyn Svc>(|it| it);
  })
  .unwrap_err();

  assert!(matches!(err.issues()[0], ConfigIssue::RecursiveLink { .. }));
}

#[test]
fn test_eager_singleton_failures_abort_creation() {
  let err = Injector::create(|binder: &mut Binder| {
    binder
      .bind::<String>()
      .to_provider(|_cx| Err(ProvisionError::custom("backend unreachable")))
      .eager_singleton();
  })
  .unwrap_err();

  assert_eq!(err.issues().len(), 1);
  match &err.issues()[0] {
    ConfigIssue::EagerFailure { key, cause } => {
      assert_eq!(key, &Key::of::<String>());
      assert!(cause.to_string().contains("backend unreachable"));
    }
    other => panic!("unexpected issue: {other}"),
  }
}

#[test]
fn test_every_failing_eager_singleton_is_listed() {
  let err = Injector::create(|binder: &mut Binder| {
    binder
      .bind::<String>()
      .to_provider(|_cx| Err(ProvisionError::custom("one")))
      .eager_singleton();
    binder
      .bind::<u64>()
      .to_provider(|_cx| Err(ProvisionError::custom("two")))
      .eager_singleton();
  })
  .unwrap_err();

  assert_eq!(err.issues().len(), 2);
}

#[test]
fn test_explicit_bindings_required_checks_linked_targets_at_creation() {
  trait Svc: Send + Sync {}
  struct Impl;
  impl Svc for Impl {}
  impl weft::Construct for Impl {
    fn construct(_cx: &mut weft::Provision) -> Result<Self, ProvisionError> {
      Ok(Impl)
    }
  }

  let err = Injector::builder()
    .require_explicit_bindings()
    .module(|binder: &mut Binder| {
      binder.bind::<dyn Svc>().to::<Impl>(|it| it);
    })
    .build()
    .unwrap_err();

  assert!(matches!(err.issues()[0], ConfigIssue::MissingBinding { .. }));

  // Binding the target explicitly satisfies the check.
  let injector = Injector::builder()
    .require_explicit_bindings()
    .module(|binder: &mut Binder| {
      binder.bind::<Impl>().to_self();
      binder.bind::<dyn Svc>().to::<Impl>(|it| it);
    })
    .build()
    .unwrap();
  assert!(injector.get::<dyn Svc>().is_ok());
}

#[test]
fn test_provision_failures_carry_the_key_path() {
  #[derive(Debug)]
  struct Outer;
  impl weft::Construct for Outer {
    fn construct(cx: &mut weft::Provision) -> Result<Self, ProvisionError> {
      cx.get::<String>()?;
      Ok(Outer)
    }
  }

  let injector = Injector::create(|binder: &mut Binder| {
    binder.bind::<Outer>().to_self();
    binder
      .bind::<String>()
      .to_provider(|_cx| Err(ProvisionError::custom("disk full")));
  })
  .unwrap();

  let err = injector.get::<Outer>().unwrap_err();
  let text = err.to_string();
  assert!(text.contains("Outer"), "{text}");
  assert!(text.contains("String"), "{text}");
  assert!(text.contains("disk full"), "{text}");
  assert!(matches!(err.root_cause(), ProvisionError::Custom(_)));
}
