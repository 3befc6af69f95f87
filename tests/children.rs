use std::sync::Arc;

use weft::{Binder, ConfigIssue, Injector, ProvisionError};

#[test]
fn test_child_sees_parent_bindings() {
  let parent = Injector::create(|binder: &mut Binder| {
    binder.bind::<String>().named("region").to_instance("eu-west".to_string());
  })
  .unwrap();

  let child = parent
    .child(|binder: &mut Binder| {
      binder.bind::<u16>().named("port").to_instance(9000);
    })
    .unwrap();

  assert_eq!(*child.get_named::<String>("region").unwrap(), "eu-west");
  assert_eq!(*child.get_named::<u16>("port").unwrap(), 9000);
}

#[test]
fn test_parent_does_not_see_child_bindings() {
  let parent = Injector::create(|_binder: &mut Binder| {}).unwrap();
  let _child = parent
    .child(|binder: &mut Binder| {
      binder.bind::<String>().to_instance("child only".to_string());
    })
    .unwrap();

  assert!(matches!(
    parent.get::<String>(),
    Err(ProvisionError::MissingBinding { .. })
  ));
}

#[test]
fn test_child_cannot_shadow_a_parent_binding() {
  let parent = Injector::create(|binder: &mut Binder| {
    binder.bind::<String>().to_instance("parent".to_string());
  })
  .unwrap();

  let err = parent
    .child(|binder: &mut Binder| {
      binder.bind::<String>().to_instance("shadow".to_string());
    })
    .unwrap_err();

  assert!(matches!(err.issues()[0], ConfigIssue::DuplicateBinding { .. }));
}

#[test]
fn test_parent_singleton_is_shared_with_children() {
  let parent = Injector::create(|binder: &mut Binder| {
    binder
      .bind::<Vec<u8>>()
      .to_provider(|_cx| Ok(Arc::new(vec![1, 2, 3])))
      .singleton();
  })
  .unwrap();

  let child = parent.child(|_binder: &mut Binder| {}).unwrap();

  let from_parent = parent.get::<Vec<u8>>().unwrap();
  let from_child = child.get::<Vec<u8>>().unwrap();
  assert!(Arc::ptr_eq(&from_parent, &from_child));
}

#[test]
fn test_child_inherits_stage_and_explicit_bindings_policy() {
  struct Plain;
  impl weft::Construct for Plain {
    fn construct(_cx: &mut weft::Provision) -> Result<Self, ProvisionError> {
      Ok(Plain)
    }
  }

  let parent = Injector::builder()
    .require_explicit_bindings()
    .module(|_binder: &mut Binder| {})
    .build()
    .unwrap();
  let child = parent.child(|_binder: &mut Binder| {}).unwrap();

  assert!(matches!(
    child.instance::<Plain>(),
    Err(ProvisionError::MissingBinding { .. })
  ));
}
