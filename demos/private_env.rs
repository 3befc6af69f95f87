use std::sync::Arc;

use weft::{Binder, Construct, Injector, PrivateBinder, PrivateModule, Provision, ProvisionError};

// --- Public API of the database layer ---
trait UserRepo: Send + Sync {
  fn find(&self, id: u64) -> String;
}

// --- Internals, hidden inside the private environment ---
struct Pool {
  dsn: Arc<String>,
}

impl Construct for Pool {
  fn construct(cx: &mut Provision) -> Result<Self, ProvisionError> {
    Ok(Pool {
      dsn: cx.get_named::<String>("dsn")?,
    })
  }
}

struct PgUserRepo {
  pool: Arc<Pool>,
}

impl UserRepo for PgUserRepo {
  fn find(&self, id: u64) -> String {
    format!("user {} via {}", id, self.pool.dsn)
  }
}

impl Construct for PgUserRepo {
  fn construct(cx: &mut Provision) -> Result<Self, ProvisionError> {
    Ok(PgUserRepo {
      pool: cx.instance::<Pool>()?,
    })
  }
}

// The module binds its internals privately and exposes only the repo trait.
struct DbModule;

impl PrivateModule for DbModule {
  fn configure(&self, binder: &mut PrivateBinder) {
    binder
      .bind::<String>()
      .named("dsn")
      .to_instance("postgres://db:5432/app".to_string());
    binder.bind::<Pool>().to_self().singleton();
    binder.bind::<dyn UserRepo>().to::<PgUserRepo>(|it| it).singleton();
    binder.expose::<dyn UserRepo>();
  }
}

fn main() {
  let injector = Injector::create(|binder: &mut Binder| {
    binder.install_private(Arc::new(DbModule));
  })
  .expect("configuration is valid");

  // The exposed trait resolves through the private environment.
  let repo = injector.get::<dyn UserRepo>().unwrap();
  println!("{}", repo.find(42));
  assert_eq!(repo.find(42), "user 42 via postgres://db:5432/app");

  // The internals never leak into the enclosing injector.
  assert!(injector.get::<Pool>().is_err());
  assert!(injector.get_named::<String>("dsn").is_err());
  println!("Pool and dsn stay private, as expected.");
}
