//! # Weft
//!
//! A thread-safe dependency injection container for Rust, built around
//! modules, explicit bindings and an immutable injector.
//!
//! Weft separates configuration from use. Modules declare *what* implements
//! *what* through a [`Binder`]; building the [`Injector`] validates every
//! declaration at once and freezes the result. After that the injector is an
//! immutable, cheaply cloneable object graph that any number of threads can
//! resolve against concurrently.
//!
//! ## Core Concepts
//!
//! - **Key**: a type plus an optional [`Qualifier`], identifying one binding.
//! - **Module**: a unit of configuration. Any `Fn(&mut Binder)` closure is a
//!   module; implement [`Module`] for reusable ones.
//! - **Binding**: links a key to a way of producing instances, with an
//!   optional scope ([`Scoping::singleton`] memoizes per environment).
//! - **Construct**: the constructor-injection protocol. A `Construct` type
//!   can be synthesized just in time when nothing is explicitly bound.
//! - **Private environments**: [`Binder::install_private`] builds a child
//!   environment whose bindings stay hidden except for the keys it exposes.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use weft::{Construct, Injector, Provision, ProvisionError};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct EnglishGreeter {
//!     message: Arc<String>,
//! }
//!
//! impl Greeter for EnglishGreeter {
//!     fn greet(&self) -> String {
//!         (*self.message).clone()
//!     }
//! }
//!
//! impl Construct for EnglishGreeter {
//!     fn construct(cx: &mut Provision) -> Result<Self, ProvisionError> {
//!         Ok(EnglishGreeter { message: cx.get_named::<String>("greeting")? })
//!     }
//! }
//!
//! let injector = Injector::create(|binder: &mut weft::Binder| {
//!     binder
//!         .bind::<String>()
//!         .named("greeting")
//!         .to_instance("Hello, World!".to_string());
//!     binder
//!         .bind::<dyn Greeter>()
//!         .to::<EnglishGreeter>(|it| it)
//!         .singleton();
//! })
//! .unwrap();
//!
//! let greeter = injector.get::<dyn Greeter>().unwrap();
//! assert_eq!(greeter.greet(), "Hello, World!");
//! ```

mod binder;
mod binding;
mod construct;
mod error;
mod injector;
mod key;
mod linker;
mod matcher;
mod module;
mod scope;

pub use binder::{Binder, BindingBuilder, ConstantBuilder, PrivateBinder};
pub use binding::{BindingInfo, BindingKind, Instance, ProvisionFn, ScopeInfo, Source};
pub use construct::{Construct, ProvideDefault, ProvideFor, Provision};
pub use error::{ConfigIssue, CreationError, ProvisionError};
pub use injector::{Injector, InjectorBuilder, Provider, Stage};
pub use key::{Key, Qualifier, QualifierValue};
pub use matcher::{decorate, matchers, Interceptor, Matcher};
pub use module::{Module, PrivateModule};
pub use scope::{Scope, Scoping};
