//! Diagnostics - What a handler reports back to the host
//!
//! Handlers return a sequence of severity-tagged diagnostics. Any error
//! diagnostic fails the host's operation for that resource; warnings are
//! shown but do not fail it.

use log::debug;

use crate::error::{ErrorKind, ProviderError, ProviderResult};
use crate::resource::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Ordered diagnostic stream returned by an entry point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn warn(&mut self, summary: impl Into<String>) {
        self.push(Diagnostic::warning(summary));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_error(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Replace every occurrence of the given secret values
    pub fn redact(&mut self, secrets: &[&str]) {
        for diagnostic in &mut self.0 {
            for secret in secrets.iter().filter(|s| !s.is_empty()) {
                diagnostic.summary = diagnostic.summary.replace(secret, "(sensitive value)");
                if let Some(detail) = diagnostic.detail.as_mut() {
                    *detail = detail.replace(secret, "(sensitive value)");
                }
            }
        }
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }
}

impl From<ProviderError> for Diagnostics {
    fn from(err: ProviderError) -> Self {
        Diagnostic::from(&err).into()
    }
}

impl From<&ProviderError> for Diagnostic {
    fn from(err: &ProviderError) -> Self {
        match err.kind() {
            ErrorKind::InvalidPermission => Diagnostic::warning(err.to_string()),
            _ => Diagnostic::error(err.to_string()),
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Host entry point being served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

/// Family-specific mapping rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingRules {
    /// A 403 on delete means the entity is already out of reach
    pub soft_delete: bool,
}

impl MappingRules {
    /// Rules derived from the record itself (`soft_delete` attribute)
    pub fn from_record(record: &Record) -> Self {
        Self {
            soft_delete: record.get_bool_or("soft_delete", false),
        }
    }
}

/// Translate a handler outcome into diagnostics, applying drift-to-empty
/// where the entity is provably gone.
///
/// `Ok` carries warnings the handler collected along the way.
pub fn map_result(
    op: Operation,
    record: &mut Record,
    result: ProviderResult<Diagnostics>,
    rules: MappingRules,
) -> Diagnostics {
    match result {
        Ok(diags) => diags,
        Err(err) => map_error(op, record, err, rules),
    }
}

/// Translate one error into diagnostics
pub fn map_error(
    op: Operation,
    record: &mut Record,
    err: ProviderError,
    rules: MappingRules,
) -> Diagnostics {
    if err.is_cancelled() {
        return Diagnostic::error("operation cancelled").into();
    }

    let gone = match op {
        Operation::Read => {
            err.is_not_found() || err.kind() == ErrorKind::PermissionMeansGone
        }
        Operation::Delete => rules.soft_delete && err.status() == Some(403),
        _ => false,
    };

    if gone {
        debug!(
            "{} '{}' is gone ({}), clearing identifier",
            record.resource_type,
            record.id(),
            err
        );
        record.clear_id();
        return Diagnostics::new();
    }

    err.into()
}

/// A permission listing that answered 403 although the entity exists: warn
/// and keep local state as the source of truth. Any other error is returned.
pub fn permission_read_fallback(
    err: ProviderError,
    what: &str,
) -> Result<Diagnostic, ProviderError> {
    if err.status() == Some(403) {
        Ok(Diagnostic::warning(format!(
            "unable to read {} (permission denied); using local state",
            what
        )))
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new("hsdp_iam_role").with_id("role-1")
    }

    #[test]
    fn read_not_found_drifts_to_empty() {
        let mut r = record();
        let diags = map_error(
            Operation::Read,
            &mut r,
            ProviderError::http(404, "no such role"),
            MappingRules::default(),
        );
        assert!(diags.is_empty());
        assert!(!r.exists());
    }

    #[test]
    fn read_permission_means_gone_drifts_to_empty() {
        let mut r = record();
        let diags = map_error(
            Operation::Read,
            &mut r,
            ProviderError::PermissionMeansGone("role".into()),
            MappingRules::default(),
        );
        assert!(diags.is_empty());
        assert!(!r.exists());
    }

    #[test]
    fn not_found_outside_read_is_an_error() {
        let mut r = record();
        let diags = map_error(
            Operation::Update,
            &mut r,
            ProviderError::http(404, "missing"),
            MappingRules::default(),
        );
        assert!(diags.has_error());
        assert!(r.exists());
    }

    #[test]
    fn soft_delete_forbidden_clears_identifier() {
        let mut r = record();
        let diags = map_error(
            Operation::Delete,
            &mut r,
            ProviderError::http(403, "forbidden"),
            MappingRules { soft_delete: true },
        );
        assert!(diags.is_empty());
        assert!(!r.exists());

        let mut r = record();
        let diags = map_error(
            Operation::Delete,
            &mut r,
            ProviderError::http(403, "forbidden"),
            MappingRules::default(),
        );
        assert!(diags.has_error());
        assert!(r.exists());
    }

    #[test]
    fn cancellation_leaves_identifier() {
        let mut r = record();
        let diags = map_error(
            Operation::Read,
            &mut r,
            ProviderError::Cancelled,
            MappingRules::default(),
        );
        assert_eq!(diags.len(), 1);
        assert!(diags.has_error());
        assert_eq!(r.id(), "role-1");
    }

    #[test]
    fn invalid_permission_is_a_warning() {
        let diags: Diagnostics = ProviderError::InvalidPermission("BOGUS".into()).into();
        assert!(!diags.has_error());
        assert_eq!(
            diags.warnings().next().unwrap().summary,
            "permission 'BOGUS' is invalid"
        );
    }

    #[test]
    fn permission_read_fallback_only_covers_forbidden() {
        let warning = permission_read_fallback(ProviderError::http(403, "denied"), "permissions")
            .unwrap();
        assert_eq!(warning.severity, Severity::Warning);
        assert!(permission_read_fallback(ProviderError::http(500, "boom"), "permissions").is_err());
    }

    #[test]
    fn redact_removes_secret_values() {
        let mut diags: Diagnostics =
            Diagnostic::error("login failed for key s3cr3t").with_detail("s3cr3t").into();
        diags.redact(&["s3cr3t", ""]);
        let d = diags.iter().next().unwrap();
        assert!(!d.summary.contains("s3cr3t"));
        assert_eq!(d.detail.as_deref(), Some("(sensitive value)"));
    }
}
