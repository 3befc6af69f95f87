use std::sync::Arc;

use once_cell::sync::OnceCell;
use weft::{Binder, Construct, Injector, Provision, ProvisionError};

// --- Fixtures ---

// Alpha takes Beta during member injection; Beta takes Alpha in its
// constructor. The loop closes through Alpha's partially-initialized value.
struct Alpha {
  beta: OnceCell<Arc<Beta>>,
}

impl Construct for Alpha {
  fn construct(_cx: &mut Provision) -> Result<Self, ProvisionError> {
    Ok(Alpha { beta: OnceCell::new() })
  }

  fn inject(&self, cx: &mut Provision) -> Result<(), ProvisionError> {
    let _ = self.beta.set(cx.instance::<Beta>()?);
    Ok(())
  }
}

struct Beta {
  alpha: Arc<Alpha>,
}

impl Construct for Beta {
  fn construct(cx: &mut Provision) -> Result<Self, ProvisionError> {
    Ok(Beta {
      alpha: cx.instance::<Alpha>()?,
    })
  }
}

// Left and Right both demand each other in their constructors; there is no
// injection phase to break the loop, so this cycle is unresolvable.
#[derive(Debug)]
struct Left {
  _right: Arc<Right>,
}

impl Construct for Left {
  fn construct(cx: &mut Provision) -> Result<Self, ProvisionError> {
    Ok(Left {
      _right: cx.instance::<Right>()?,
    })
  }
}

#[derive(Debug)]
struct Right {
  _left: Arc<Left>,
}

impl Construct for Right {
  fn construct(cx: &mut Provision) -> Result<Self, ProvisionError> {
    Ok(Right {
      _left: cx.instance::<Left>()?,
    })
  }
}

// --- Tests ---

#[test]
fn test_member_injection_cycle_resolves_through_the_partial_value() {
  let injector = Injector::create(|binder: &mut Binder| {
    binder.bind::<Alpha>().to_self();
    binder.bind::<Beta>().to_self();
  })
  .unwrap();

  let alpha = injector.get::<Alpha>().unwrap();
  let beta = alpha.beta.get().expect("beta was injected");

  // Beta's alpha is the very value whose injection requested it.
  assert!(Arc::ptr_eq(&beta.alpha, &alpha));
}

#[test]
fn test_member_injection_cycle_resolves_for_just_in_time_bindings_too() {
  let injector = Injector::create(|_binder: &mut Binder| {}).unwrap();

  let alpha = injector.instance::<Alpha>().unwrap();
  let beta = alpha.beta.get().expect("beta was injected");
  assert!(Arc::ptr_eq(&beta.alpha, &alpha));
}

#[test]
fn test_constructor_cycle_is_reported_with_the_full_loop() {
  let injector = Injector::create(|binder: &mut Binder| {
    binder.bind::<Left>().to_self();
    binder.bind::<Right>().to_self();
  })
  .unwrap();

  let err = injector.get::<Left>().unwrap_err();
  let text = err.to_string();
  assert!(text.contains("circular dependency"), "{text}");
  assert!(text.contains("Left"), "{text}");
  assert!(text.contains("Right"), "{text}");
}

#[test]
fn test_trait_key_resolves_from_the_implementations_partial_value() {
  trait Registry: Send + Sync {
    fn len(&self) -> usize;
  }

  struct MapRegistry {
    self_ref: OnceCell<Arc<dyn Registry>>,
  }

  impl Registry for MapRegistry {
    fn len(&self) -> usize {
      0
    }
  }

  impl Construct for MapRegistry {
    fn construct(_cx: &mut Provision) -> Result<Self, ProvisionError> {
      Ok(MapRegistry {
        self_ref: OnceCell::new(),
      })
    }

    fn inject(&self, cx: &mut Provision) -> Result<(), ProvisionError> {
      // Requests the trait key while the implementation is mid-injection.
      let _ = self.self_ref.set(cx.get::<dyn Registry>()?);
      Ok(())
    }
  }

  let injector = Injector::create(|binder: &mut Binder| {
    binder.bind::<dyn Registry>().to::<MapRegistry>(|it| it);
  })
  .unwrap();

  let registry = injector.get::<dyn Registry>().unwrap();
  assert_eq!(registry.len(), 0);
}

#[test]
fn test_independent_requests_do_not_share_cycle_state() {
  let injector = Injector::create(|binder: &mut Binder| {
    binder.bind::<Alpha>().to_self();
    binder.bind::<Beta>().to_self();
  })
  .unwrap();

  // Each top-level request is its own provision with fresh bookkeeping.
  let first = injector.get::<Alpha>().unwrap();
  let second = injector.get::<Alpha>().unwrap();
  assert!(!Arc::ptr_eq(&first, &second));
  assert!(first.beta.get().is_some());
  assert!(second.beta.get().is_some());
}
