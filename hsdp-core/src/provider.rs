//! Provider - Resource handlers and the catalogue the host dispatches to
//!
//! Each resource type implements [`ResourceHandler`]; each data source
//! implements [`DataSourceHandler`]. A [`Catalogue`] owns the handlers of one
//! provider and runs a host entry point: schema normalisation and validation,
//! the handler call, error-to-diagnostic mapping and redaction.

use std::future::Future;
use std::pin::Pin;

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{Diagnostic, Diagnostics, MappingRules, Operation, map_result};
use crate::error::{ErrorKind, ProviderError, ProviderResult};
use crate::resource::Record;
use crate::schema::ResourceSchema;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every entry point receives besides the record
pub struct Context<'a, M> {
    /// Provider-wide state (configuration, client factory)
    pub meta: &'a M,
    pub cancel: &'a CancellationToken,
}

impl<M> Clone for Context<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Context<'_, M> {}

impl<'a, M> Context<'a, M> {
    pub fn new(meta: &'a M, cancel: &'a CancellationToken) -> Self {
        Self { meta, cancel }
    }
}

/// Lifecycle of one managed resource type
///
/// Handlers return the warnings they collected on success. Errors are mapped
/// to diagnostics by the [`Catalogue`], which also applies drift-to-empty.
pub trait ResourceHandler<M: Sync>: Send + Sync {
    /// Resource type name (e.g., "hsdp_iam_role")
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Family rules applied when mapping errors of this resource
    fn mapping_rules(&self, record: &Record) -> MappingRules {
        MappingRules::from_record(record)
    }

    fn create<'a>(
        &'a self,
        ctx: Context<'a, M>,
        record: &'a mut Record,
    ) -> BoxFuture<'a, ProviderResult<Diagnostics>>;

    fn read<'a>(
        &'a self,
        ctx: Context<'a, M>,
        record: &'a mut Record,
    ) -> BoxFuture<'a, ProviderResult<Diagnostics>>;

    fn update<'a>(
        &'a self,
        ctx: Context<'a, M>,
        record: &'a mut Record,
    ) -> BoxFuture<'a, ProviderResult<Diagnostics>>;

    fn delete<'a>(
        &'a self,
        ctx: Context<'a, M>,
        record: &'a mut Record,
    ) -> BoxFuture<'a, ProviderResult<Diagnostics>>;

    /// Adopt `id` into the record and read it
    fn import<'a>(
        &'a self,
        ctx: Context<'a, M>,
        id: &'a str,
        record: &'a mut Record,
    ) -> BoxFuture<'a, ProviderResult<Diagnostics>> {
        Box::pin(async move {
            record.set_id(id);
            let diags = match self.read(ctx, record).await {
                Ok(diags) => diags,
                Err(e) if e.is_not_found() || e.kind() == ErrorKind::PermissionMeansGone => {
                    record.clear_id();
                    return Err(ProviderError::ImportNonExistent);
                }
                Err(e) => return Err(e),
            };
            if !record.exists() {
                return Err(ProviderError::ImportNonExistent);
            }
            Ok(diags)
        })
    }
}

/// A read-only data source
pub trait DataSourceHandler<M: Sync>: Send + Sync {
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    fn read<'a>(
        &'a self,
        ctx: Context<'a, M>,
        record: &'a mut Record,
    ) -> BoxFuture<'a, ProviderResult<Diagnostics>>;
}

/// The resource and data-source types of one provider
pub struct Catalogue<M: Sync> {
    name: &'static str,
    resources: Vec<Box<dyn ResourceHandler<M>>>,
    data_sources: Vec<Box<dyn DataSourceHandler<M>>>,
}

impl<M: Sync> Catalogue<M> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            resources: Vec::new(),
            data_sources: Vec::new(),
        }
    }

    pub fn with_resource(mut self, handler: impl ResourceHandler<M> + 'static) -> Self {
        self.resources.push(Box::new(handler));
        self
    }

    pub fn with_data_source(mut self, handler: impl DataSourceHandler<M> + 'static) -> Self {
        self.data_sources.push(Box::new(handler));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn resource_types(&self) -> Vec<&'static str> {
        self.resources.iter().map(|h| h.name()).collect()
    }

    pub fn data_source_types(&self) -> Vec<&'static str> {
        self.data_sources.iter().map(|h| h.name()).collect()
    }

    pub fn resource(&self, name: &str) -> Option<&dyn ResourceHandler<M>> {
        self.resources
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
    }

    pub fn data_source(&self, name: &str) -> Option<&dyn DataSourceHandler<M>> {
        self.data_sources
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
    }

    /// Schema of a resource or data-source type
    pub fn schema(&self, name: &str) -> Option<ResourceSchema> {
        self.resource(name)
            .map(|h| h.schema())
            .or_else(|| self.data_source(name).map(|h| h.schema()))
    }

    /// Run one entry point of the record's resource type. `import_id` is
    /// only used by [`Operation::Import`].
    pub async fn apply(
        &self,
        op: Operation,
        ctx: Context<'_, M>,
        record: &mut Record,
        import_id: Option<&str>,
    ) -> Diagnostics {
        let Some(handler) = self.resource(&record.resource_type) else {
            return Diagnostic::error(format!(
                "unknown resource type '{}'",
                record.resource_type
            ))
            .into();
        };
        let schema = handler.schema();

        if matches!(op, Operation::Create | Operation::Update) {
            schema.normalize(record.attributes_mut());
            if let Err(errors) = schema.validate(record.attributes()) {
                return type_errors(errors);
            }
        }

        let rules = handler.mapping_rules(record);
        info!(
            "{:?} {} '{}'",
            op,
            record.resource_type,
            import_id.unwrap_or(record.id())
        );
        let result = match op {
            Operation::Create => handler.create(ctx, record).await,
            Operation::Read => handler.read(ctx, record).await,
            Operation::Update => handler.update(ctx, record).await,
            Operation::Delete => handler.delete(ctx, record).await,
            Operation::Import => match import_id {
                Some(id) if !id.is_empty() => handler.import(ctx, id, record).await,
                _ => Err(ProviderError::validation("import requires an identifier")),
            },
        };
        let succeeded = result.is_ok();

        let mut diags = map_result(op, record, result, rules);
        if succeeded && !diags.has_error() {
            match op {
                Operation::Delete => record.clear_id(),
                _ => record.commit(),
            }
        }

        redact(&schema, record, &mut diags);
        debug!("{:?} finished with {} diagnostics", op, diags.len());
        diags
    }

    /// Read a data source into the record
    pub async fn read_data_source(&self, ctx: Context<'_, M>, record: &mut Record) -> Diagnostics {
        let Some(handler) = self.data_source(&record.resource_type) else {
            return Diagnostic::error(format!(
                "unknown data source type '{}'",
                record.resource_type
            ))
            .into();
        };
        let schema = handler.schema();
        schema.normalize(record.attributes_mut());
        if let Err(errors) = schema.validate(record.attributes()) {
            return type_errors(errors);
        }

        let result = handler.read(ctx, record).await;
        let mut diags = match result {
            Ok(diags) => diags,
            Err(err) => err.into(),
        };
        redact(&schema, record, &mut diags);
        diags
    }
}

fn type_errors(errors: Vec<crate::schema::TypeError>) -> Diagnostics {
    let mut diags = Diagnostics::new();
    for e in errors {
        diags.push(Diagnostic::error(e.to_string()));
    }
    diags
}

fn redact(schema: &ResourceSchema, record: &Record, diags: &mut Diagnostics) {
    let mut secrets = schema.sensitive_values(record.attributes());
    secrets.extend(schema.sensitive_values(record.prior()));
    if secrets.is_empty() {
        return;
    }
    let refs: Vec<&str> = secrets.iter().map(String::as_str).collect();
    diags.redact(&refs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Value;
    use crate::schema::{AttributeSchema, AttributeType};

    struct Meta;

    /// Handler whose behaviour is driven by the record's `mode` attribute
    struct ScriptedHandler;

    fn scripted(record: &mut Record) -> ProviderResult<Diagnostics> {
        match record.get_str("mode").unwrap_or("ok") {
            "missing" => Err(ProviderError::http(404, "no such thing")),
            "secret" => Err(ProviderError::AuthenticationFailed(format!(
                "bad key {}",
                record.get_string("key")
            ))),
            "cleared" => {
                record.clear_id();
                Ok(Diagnostics::new())
            }
            _ => {
                if !record.exists() {
                    record.set_id("generated-1");
                }
                record.set_string("computed", "yes");
                Ok(Diagnostics::new())
            }
        }
    }

    impl ResourceHandler<Meta> for ScriptedHandler {
        fn name(&self) -> &'static str {
            "test_thing"
        }

        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new("test_thing")
                .attribute(AttributeSchema::new("name", AttributeType::String).required())
                .attribute(AttributeSchema::new("mode", AttributeType::String))
                .attribute(AttributeSchema::new("key", AttributeType::String).sensitive())
        }

        fn create<'a>(
            &'a self,
            _ctx: Context<'a, Meta>,
            record: &'a mut Record,
        ) -> BoxFuture<'a, ProviderResult<Diagnostics>> {
            Box::pin(async move { scripted(record) })
        }

        fn read<'a>(
            &'a self,
            _ctx: Context<'a, Meta>,
            record: &'a mut Record,
        ) -> BoxFuture<'a, ProviderResult<Diagnostics>> {
            Box::pin(async move { scripted(record) })
        }

        fn update<'a>(
            &'a self,
            _ctx: Context<'a, Meta>,
            record: &'a mut Record,
        ) -> BoxFuture<'a, ProviderResult<Diagnostics>> {
            Box::pin(async move { scripted(record) })
        }

        fn delete<'a>(
            &'a self,
            _ctx: Context<'a, Meta>,
            record: &'a mut Record,
        ) -> BoxFuture<'a, ProviderResult<Diagnostics>> {
            Box::pin(async move { scripted(record) })
        }
    }

    fn catalogue() -> Catalogue<Meta> {
        Catalogue::new("test").with_resource(ScriptedHandler)
    }

    fn thing(mode: &str) -> Record {
        Record::new("test_thing")
            .with_attribute("name", Value::string("a"))
            .with_attribute("mode", Value::string(mode))
            .with_attribute("key", Value::string("s3cr3t"))
    }

    #[tokio::test]
    async fn create_sets_identifier_and_commits() {
        let cancel = CancellationToken::new();
        let mut record = thing("ok");
        let diags = catalogue()
            .apply(Operation::Create, Context::new(&Meta, &cancel), &mut record, None)
            .await;
        assert!(diags.is_empty());
        assert_eq!(record.id(), "generated-1");
        assert!(!record.has_change("computed"));
    }

    #[tokio::test]
    async fn create_rejects_missing_required() {
        let cancel = CancellationToken::new();
        let mut record = Record::new("test_thing");
        let diags = catalogue()
            .apply(Operation::Create, Context::new(&Meta, &cancel), &mut record, None)
            .await;
        assert!(diags.has_error());
        assert!(!record.exists());
    }

    #[tokio::test]
    async fn read_of_missing_entity_drifts_to_empty() {
        let cancel = CancellationToken::new();
        let mut record = thing("missing").with_id("x-1");
        let diags = catalogue()
            .apply(Operation::Read, Context::new(&Meta, &cancel), &mut record, None)
            .await;
        assert!(diags.is_empty());
        assert!(!record.exists());
    }

    #[tokio::test]
    async fn import_of_missing_entity_is_an_error() {
        let cancel = CancellationToken::new();
        for mode in ["missing", "cleared"] {
            let mut record = thing(mode);
            let diags = catalogue()
                .apply(
                    Operation::Import,
                    Context::new(&Meta, &cancel),
                    &mut record,
                    Some("x-1"),
                )
                .await;
            assert_eq!(
                diags.errors().next().unwrap().summary,
                "cannot import non-existent remote object"
            );
        }
    }

    #[tokio::test]
    async fn import_sets_identifier() {
        let cancel = CancellationToken::new();
        let mut record = thing("ok");
        let diags = catalogue()
            .apply(
                Operation::Import,
                Context::new(&Meta, &cancel),
                &mut record,
                Some("x-1"),
            )
            .await;
        assert!(diags.is_empty());
        assert_eq!(record.id(), "x-1");
    }

    #[tokio::test]
    async fn delete_clears_identifier() {
        let cancel = CancellationToken::new();
        let mut record = thing("ok").with_id("x-1");
        let diags = catalogue()
            .apply(Operation::Delete, Context::new(&Meta, &cancel), &mut record, None)
            .await;
        assert!(diags.is_empty());
        assert!(!record.exists());
    }

    #[tokio::test]
    async fn diagnostics_never_contain_sensitive_values() {
        let cancel = CancellationToken::new();
        let mut record = thing("secret");
        let diags = catalogue()
            .apply(Operation::Create, Context::new(&Meta, &cancel), &mut record, None)
            .await;
        let summary = &diags.errors().next().unwrap().summary;
        assert!(!summary.contains("s3cr3t"));
        assert!(summary.contains("(sensitive value)"));
    }

    #[tokio::test]
    async fn unknown_type_is_reported() {
        let cancel = CancellationToken::new();
        let mut record = Record::new("nope");
        let diags = catalogue()
            .apply(Operation::Read, Context::new(&Meta, &cancel), &mut record, None)
            .await;
        assert!(diags.has_error());
    }
}
