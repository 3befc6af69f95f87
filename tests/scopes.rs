use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use weft::{Binder, Construct, Injector, Provision, ProvisionError, Stage};

// --- Fixtures ---

struct Session {
  id: usize,
}

impl Construct for Session {
  fn construct(_cx: &mut Provision) -> Result<Self, ProvisionError> {
    Ok(Session { id: 0 })
  }
}

// --- Tests ---

#[test]
fn test_unscoped_bindings_produce_a_fresh_instance_per_request() {
  let injector = Injector::create(|binder: &mut Binder| {
    binder.bind::<Session>().to_self();
  })
  .unwrap();

  let a = injector.get::<Session>().unwrap();
  let b = injector.get::<Session>().unwrap();
  assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn test_singleton_bindings_memoize_one_instance() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counted = calls.clone();

  let injector = Injector::create(move |binder: &mut Binder| {
    let counted = counted.clone();
    binder
      .bind::<Session>()
      .to_provider(move |_cx| {
        Ok(Arc::new(Session {
          id: counted.fetch_add(1, Ordering::SeqCst),
        }))
      })
      .singleton();
  })
  .unwrap();

  let a = injector.get::<Session>().unwrap();
  let b = injector.get::<Session>().unwrap();

  assert!(Arc::ptr_eq(&a, &b));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_singleton_is_constructed_once_under_concurrent_first_use() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counted = calls.clone();

  let injector = Injector::create(move |binder: &mut Binder| {
    let counted = counted.clone();
    binder
      .bind::<Session>()
      .to_provider(move |_cx| {
        Ok(Arc::new(Session {
          id: counted.fetch_add(1, Ordering::SeqCst),
        }))
      })
      .singleton();
  })
  .unwrap();

  thread::scope(|s| {
    for _ in 0..8 {
      let injector = injector.clone();
      s.spawn(move || {
        let session = injector.get::<Session>().unwrap();
        assert_eq!(session.id, 0);
      });
    }
  });

  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_eager_singletons_are_constructed_during_creation() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counted = calls.clone();

  let _injector = Injector::create(move |binder: &mut Binder| {
    let counted = counted.clone();
    binder
      .bind::<Session>()
      .to_provider(move |_cx| {
        counted.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Session { id: 7 }))
      })
      .eager_singleton();
  })
  .unwrap();

  // Never resolved, yet already constructed.
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_production_stage_forces_lazy_singletons_eagerly() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counted = calls.clone();

  let injector = Injector::builder()
    .stage(Stage::Production)
    .module(move |binder: &mut Binder| {
      let counted = counted.clone();
      binder
        .bind::<Session>()
        .to_provider(move |_cx| {
          counted.fetch_add(1, Ordering::SeqCst);
          Ok(Arc::new(Session { id: 3 }))
        })
        .singleton();
    })
    .build()
    .unwrap();

  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(injector.stage(), Stage::Production);
  // The eagerly built instance is the one handed out.
  assert_eq!(injector.get::<Session>().unwrap().id, 3);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_singleton_failure_is_retried_on_the_next_request() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counted = calls.clone();

  let injector = Injector::create(move |binder: &mut Binder| {
    let counted = counted.clone();
    binder
      .bind::<Session>()
      .to_provider(move |_cx| {
        if counted.fetch_add(1, Ordering::SeqCst) == 0 {
          Err(ProvisionError::custom("flaky backend"))
        } else {
          Ok(Arc::new(Session { id: 1 }))
        }
      })
      .singleton();
  })
  .unwrap();

  assert!(injector.get::<Session>().is_err());
  assert_eq!(injector.get::<Session>().unwrap().id, 1);
}
