//! Error taxonomy: batched configuration errors and per-call provision errors.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::binding::Source;
use crate::key::Key;

/// One configuration problem found while creating an injector.
///
/// Issues are always collected and reported together as a [`CreationError`];
/// injector creation never fails fast on the first issue.
#[derive(Clone, Debug, Error)]
pub enum ConfigIssue {
  #[error("duplicate binding for {key}: first bound at {first}, duplicate at {second}")]
  DuplicateBinding { key: Key, first: Source, second: Source },

  // The provenance fields are deliberately not named `source`, which
  // thiserror reserves for the causal-chain accessor.
  #[error("no binding for {key} and just-in-time bindings are disabled (requested at {declared_at})")]
  MissingBinding { key: Key, declared_at: Source },

  #[error("{message} (at {declared_at})")]
  BuilderMisuse { message: String, declared_at: Source },

  #[error("binding for {key} at {declared_at} is linked to itself")]
  RecursiveLink { key: Key, declared_at: Source },

  #[error("{key} was exposed at {declared_at}, but the private module has no binding for it")]
  ExposedButUnbound { key: Key, declared_at: Source },

  #[error("eager construction of {key} failed: {cause}")]
  EagerFailure { key: Key, cause: Arc<ProvisionError> },
}

/// Aggregate failure of one injector-creation attempt.
///
/// Creation is atomic: either every declaration is valid and every eager
/// singleton constructs, or this error lists all of the problems with their
/// provenance and no injector is returned.
#[derive(Clone, Debug)]
pub struct CreationError {
  issues: Vec<ConfigIssue>,
}

impl CreationError {
  pub(crate) fn new(issues: Vec<ConfigIssue>) -> Self {
    debug_assert!(!issues.is_empty());
    Self { issues }
  }

  pub fn issues(&self) -> &[ConfigIssue] {
    &self.issues
  }
}

impl fmt::Display for CreationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "injector creation failed with {} error(s):", self.issues.len())?;
    for (i, issue) in self.issues.iter().enumerate() {
      writeln!(f, "  {}) {}", i + 1, issue)?;
    }
    Ok(())
  }
}

impl std::error::Error for CreationError {}

/// A runtime provisioning failure: producing the requested key, or one of its
/// transitive dependencies, did not succeed.
///
/// Cloneable so that cached just-in-time failures can hand every caller the
/// identical error value.
#[derive(Clone, Debug, Error)]
pub enum ProvisionError {
  #[error("no binding available for {key}")]
  MissingBinding { key: Key },

  #[error("circular dependency: {}", format_cycle(cycle))]
  CircularDependency { cycle: Vec<Key> },

  #[error("provision of {key} failed: {cause}")]
  Failed { key: Key, cause: Arc<ProvisionError> },

  #[error("binding for {key} produced a value of an unexpected type")]
  TypeMismatch { key: Key },

  #[error("{key} is exposed from a child environment that has not finished building")]
  EnvironmentNotReady { key: Key },

  #[error("{0}")]
  Custom(#[from] Arc<dyn std::error::Error + Send + Sync>),
}

impl ProvisionError {
  /// Wraps an arbitrary construction failure.
  pub fn custom(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    ProvisionError::Custom(Arc::from(err.into()))
  }

  /// Attributes a failure to the key whose provision triggered it, keeping
  /// the causal chain intact. Each resolution level adds one frame, so the
  /// final error carries the full key path from the request down to the
  /// root cause. Cycle errors already carry their path and pass through.
  pub(crate) fn for_key(self, key: &Key) -> Self {
    match self {
      e @ ProvisionError::CircularDependency { .. } => e,
      // No duplicate frame when the same key re-attributes its own failure.
      ProvisionError::Failed { key: k, cause } if k == *key => ProvisionError::Failed { key: k, cause },
      e => ProvisionError::Failed {
        key: key.clone(),
        cause: Arc::new(e),
      },
    }
  }

  /// The innermost cause of this error.
  pub fn root_cause(&self) -> &ProvisionError {
    match self {
      ProvisionError::Failed { cause, .. } => cause.root_cause(),
      other => other,
    }
  }
}

fn format_cycle(cycle: &[Key]) -> String {
  let mut out = String::new();
  for key in cycle {
    out.push_str(&key.to_string());
    out.push_str(" -> ");
  }
  match cycle.first() {
    Some(first) => out.push_str(&first.to_string()),
    None => out.push_str("(empty cycle)"),
  }
  out
}
