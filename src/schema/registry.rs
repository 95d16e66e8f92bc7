//! Process-lifetime schema cache keyed by program id.
//!
//! Concurrent `resolve` calls for an id that is not cached share one in-flight fetch. A
//! definitive "no schema" answer is cached like a schema; fetch failures and timeouts are
//! not, so the next call fetches again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::error::Error;
use crate::schema::ProgramSchema;
use crate::schema::idl::schema_from_idl_json;

/// Where schemas come from on a cache miss. `Ok(None)` means the program publishes none.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn fetch_schema(&self, program_id: &str) -> Result<Option<ProgramSchema>, Error>;
}

/// In-memory schemas, typically loaded from IDL files at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticSchemaSource {
    schemas: HashMap<String, ProgramSchema>,
}

impl StaticSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: ProgramSchema) -> Self {
        self.insert(schema);
        self
    }

    pub fn insert(&mut self, schema: ProgramSchema) {
        self.schemas.insert(schema.program_id.clone(), schema);
    }

    pub fn insert_idl_json(&mut self, program_id: &str, json: &str) -> Result<(), Error> {
        self.insert(schema_from_idl_json(program_id, json)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[async_trait]
impl SchemaSource for StaticSchemaSource {
    async fn fetch_schema(&self, program_id: &str) -> Result<Option<ProgramSchema>, Error> {
        Ok(self.schemas.get(program_id).cloned())
    }
}

/// Only asks `inner` about allowlisted programs; anything else is absent without a fetch.
pub struct AllowlistSource {
    allowed: HashSet<String>,
    inner: Arc<dyn SchemaSource>,
}

impl AllowlistSource {
    pub fn new<I, S>(allowed: I, inner: Arc<dyn SchemaSource>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            inner,
        }
    }
}

#[async_trait]
impl SchemaSource for AllowlistSource {
    async fn fetch_schema(&self, program_id: &str) -> Result<Option<ProgramSchema>, Error> {
        if !self.allowed.contains(program_id) {
            return Ok(None);
        }
        self.inner.fetch_schema(program_id).await
    }
}

type Resolved = Option<Arc<ProgramSchema>>;
type PendingFetch = Shared<BoxFuture<'static, Result<Resolved, String>>>;

enum Slot {
    Ready(Resolved),
    Pending(PendingFetch),
}

pub struct SchemaRegistry {
    slots: Arc<DashMap<String, Slot>>,
    source: Arc<dyn SchemaSource>,
    fetch_timeout: Duration,
}

impl SchemaRegistry {
    pub fn new(source: Arc<dyn SchemaSource>, fetch_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            source,
            fetch_timeout,
        }
    }

    pub async fn resolve(&self, program_id: &str) -> Result<Option<Arc<ProgramSchema>>, Error> {
        let pending = match self.slots.entry(program_id.to_string()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(resolved) => return Ok(resolved.clone()),
                Slot::Pending(fetch) => fetch.clone(),
            },
            Entry::Vacant(entry) => {
                let fetch = self.start_fetch(program_id);
                entry.insert(Slot::Pending(fetch.clone()));
                fetch
            }
        };

        pending.await.map_err(|reason| Error::SchemaFetch {
            program_id: program_id.to_string(),
            reason,
        })
    }

    fn start_fetch(&self, program_id: &str) -> PendingFetch {
        let source = Arc::clone(&self.source);
        let slots = Arc::clone(&self.slots);
        let fetch_timeout = self.fetch_timeout;
        let program_id = program_id.to_string();

        async move {
            debug!(program_id = %program_id, "fetching schema");
            let fetched = tokio::time::timeout(fetch_timeout, source.fetch_schema(&program_id));
            let outcome = match fetched.await {
                Ok(Ok(schema)) => Ok(schema.map(Arc::new)),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {}ms", fetch_timeout.as_millis())),
            };
            match &outcome {
                Ok(resolved) => {
                    if resolved.is_none() {
                        debug!(program_id = %program_id, "program publishes no schema");
                    }
                    slots.insert(program_id, Slot::Ready(resolved.clone()));
                }
                Err(reason) => {
                    warn!(program_id = %program_id, error = %reason, "schema fetch failed");
                    slots.remove_if(&program_id, |_, slot| matches!(slot, Slot::Pending(_)));
                }
            }
            outcome
        }
        .boxed()
        .shared()
    }

    /// Seeds a schema so it never reaches the source.
    pub fn preload(&self, schema: ProgramSchema) {
        self.slots.insert(
            schema.program_id.clone(),
            Slot::Ready(Some(Arc::new(schema))),
        );
    }

    pub fn preload_all(&self, schemas: impl IntoIterator<Item = ProgramSchema>) {
        for schema in schemas {
            self.preload(schema);
        }
    }

    /// True once a fetch for `program_id` has settled, including settled as absent.
    pub fn is_cached(&self, program_id: &str) -> bool {
        self.slots
            .get(program_id)
            .is_some_and(|slot| matches!(*slot, Slot::Ready(_)))
    }

    /// Ids with a cached schema, sorted.
    pub fn cached_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Ready(Some(_))))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }
}
