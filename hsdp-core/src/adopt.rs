//! Adopt - Create, or take over a pre-existing remote entity on conflict
//!
//! When a create is rejected because the entity already exists, the
//! pre-existing entity is located by its natural key. It is adopted only when
//! exactly one match exists and it agrees with the desired entity on the
//! family's validated fields.

use std::future::Future;

use log::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Which create failures count as "already exists"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Only HTTP 409
    #[default]
    ConflictOnly,
    /// HTTP 409, or a 400 whose message says the entity already exists
    /// (IAM applications, CDL data-type definitions)
    ConflictOrBadRequest,
}

impl ConflictPolicy {
    pub fn is_conflict(&self, err: &ProviderError) -> bool {
        match err.status() {
            Some(409) => true,
            Some(400) if *self == ConflictPolicy::ConflictOrBadRequest => {
                let message = err.root().to_string().to_lowercase();
                message.contains("already exist") || message.contains("duplicate")
            }
            _ => false,
        }
    }
}

/// Result of a create-or-adopt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creation<T> {
    Created(T),
    Adopted(T),
}

impl<T> Creation<T> {
    pub fn is_adopted(&self) -> bool {
        matches!(self, Creation::Adopted(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Creation::Created(t) | Creation::Adopted(t) => t,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Creation::Created(t) | Creation::Adopted(t) => t,
        }
    }
}

/// Field-by-field equivalence check used before adopting
#[derive(Debug, Default)]
pub struct FieldCheck {
    mismatched: Option<&'static str>,
}

impl FieldCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `field` as mismatched unless `desired == existing`. Only the
    /// first mismatch is kept.
    pub fn field<V: PartialEq + ?Sized>(mut self, field: &'static str, desired: &V, existing: &V) -> Self {
        if self.mismatched.is_none() && desired != existing {
            self.mismatched = Some(field);
        }
        self
    }

    pub fn finish(self) -> Result<(), &'static str> {
        match self.mismatched {
            Some(field) => Err(field),
            None => Ok(()),
        }
    }
}

/// Interpret a create outcome; on conflict, locate and validate the
/// existing entity.
///
/// `kind` names the entity in mismatch errors ("application"). `locate`
/// searches by natural key. `validate` returns the name of the first field
/// that differs.
pub async fn adopt_on_conflict<T, L, LF, V>(
    kind: &str,
    policy: ConflictPolicy,
    created: ProviderResult<T>,
    locate: L,
    validate: V,
) -> ProviderResult<Creation<T>>
where
    L: FnOnce() -> LF,
    LF: Future<Output = ProviderResult<Vec<T>>>,
    V: FnOnce(&T) -> Result<(), &'static str>,
{
    let create_err = match created {
        Ok(entity) => return Ok(Creation::Created(entity)),
        Err(e) => e,
    };

    // No response at all, or not a conflict: nothing to adopt
    if create_err.status().is_none() || !policy.is_conflict(&create_err) {
        return Err(create_err);
    }

    debug!("create of {} conflicted, searching for existing entity", kind);
    let mut matches = locate()
        .await
        .map_err(|e| e.context("on match attempt during Create conflict"))?;

    if matches.len() != 1 {
        debug!(
            "{} matches for conflicting {}, not adopting",
            matches.len(),
            kind
        );
        return Err(create_err);
    }

    let existing = matches.remove(0);
    validate(&existing).map_err(|field| ProviderError::mismatch(kind, field))?;

    info!("adopting existing {}", kind);
    Ok(Creation::Adopted(existing))
}
