use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use weft::{Binder, Injector};

// A simple service that gets a unique ID upon creation.
struct RequestTracker {
  id: usize,
}

// A global, thread-safe counter to generate unique IDs.
static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn main() {
  let injector = Injector::create(|binder: &mut Binder| {
    // --- Singleton Binding ---
    // This provider will only be called ONCE.
    binder
      .bind::<RequestTracker>()
      .named("singleton")
      .to_provider(|_cx| {
        println!("Creating SINGLETON RequestTracker...");
        Ok(Arc::new(RequestTracker {
          id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
        }))
      })
      .singleton();

    // --- Unscoped Binding ---
    // This provider will be called EVERY time the key is resolved.
    binder
      .bind::<RequestTracker>()
      .named("transient")
      .to_provider(|_cx| {
        println!("Creating TRANSIENT RequestTracker...");
        Ok(Arc::new(RequestTracker {
          id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
        }))
      });
  })
  .expect("configuration is valid");

  println!("--- Resolving Singletons ---");
  let s1 = injector.get_named::<RequestTracker>("singleton").unwrap();
  let s2 = injector.get_named::<RequestTracker>("singleton").unwrap();
  println!("Singleton 1 ID: {}, Singleton 2 ID: {}", s1.id, s2.id);
  assert_eq!(s1.id, 0);
  assert_eq!(s2.id, 0);
  assert!(
    Arc::ptr_eq(&s1, &s2),
    "Singleton instances should be identical"
  );
  println!("Singleton instances are the same pointer, as expected.\n");

  println!("--- Resolving Unscoped ---");
  let t1 = injector.get_named::<RequestTracker>("transient").unwrap();
  let t2 = injector.get_named::<RequestTracker>("transient").unwrap();
  println!("Transient 1 ID: {}, Transient 2 ID: {}", t1.id, t2.id);
  assert_eq!(t1.id, 1);
  assert_eq!(t2.id, 2);
  assert!(
    !Arc::ptr_eq(&t1, &t2),
    "Unscoped instances should be different"
  );
  println!("Unscoped instances are different pointers, as expected.");
}
