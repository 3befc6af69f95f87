use std::sync::Arc;

use weft::{Binder, Injector};

// --- Abstraction and Implementations ---
trait MessageSender: Send + Sync {
  fn send(&self, to: &str, message: &str) -> String;
}

struct EmailSender;
impl MessageSender for EmailSender {
  fn send(&self, to: &str, message: &str) -> String {
    format!("Sending email to {}: '{}'", to, message)
  }
}

struct SmsSender;
impl MessageSender for SmsSender {
  fn send(&self, to: &str, message: &str) -> String {
    format!("Sending SMS to {}: '{}'", to, message)
  }
}

fn main() {
  // --- Configuration ---
  // Bind both implementations against the trait, under unique names.
  let injector = Injector::create(|binder: &mut Binder| {
    binder
      .bind::<dyn MessageSender>()
      .named("email")
      .to_arc(Arc::new(EmailSender))
      .singleton();
    binder
      .bind::<dyn MessageSender>()
      .named("sms")
      .to_arc(Arc::new(SmsSender))
      .singleton();
  })
  .expect("configuration is valid");

  // --- Resolution ---
  // Now we can choose which implementation we want at the point of resolution.
  let email_notifier = injector.get_named::<dyn MessageSender>("email").unwrap();
  let sms_notifier = injector.get_named::<dyn MessageSender>("sms").unwrap();

  let result1 = email_notifier.send("test@example.com", "Hello from Weft!");
  let result2 = sms_notifier.send("+123456789", "Hello from Weft!");

  println!("{}", result1);
  println!("{}", result2);

  assert!(result1.contains("email"));
  assert!(result2.contains("SMS"));
}
