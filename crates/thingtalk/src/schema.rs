//! The schema retriever: batched, cached access to external signatures.
//!
//! The host implements [`SchemaClient`]; the core talks to it only through
//! [`SchemaRetriever`], which caches per kind and turns the many lookups of
//! one analysis pass into one upstream call per category. The analyzer
//! collects every kind a program references before awaiting anything, so a
//! whole `type_check_program` costs at most one `get_schemas` round trip
//! (plus one per uncached mixin batch and memory table).
//!
//! Failures are reified per kind: a kind that fails to load is cached as an
//! error and only surfaces when that kind is actually used; sibling kinds
//! from the same batch resolve normally.
//!
//! All suspension points check a [`CancellationToken`]; cancellation
//! surfaces as `TypeErrorKind::Cancelled` and leaves caches consistent.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;
use futures::future::LocalBoxFuture;

use crate::ast::{ClassDef, FunctionDef, FunctionKind, MixinDef};
use crate::error::{TypeError, TypeErrorKind, TypeResult};
use crate::trace::{NoopTracer, SchemaEvent, SchemaTracer};

/// Cooperative cancellation for long-running analysis.
///
/// Cloning shares the flag; any clone can cancel. The token is checked at
/// every suspension point of the retriever and between rules in the
/// analyzer, so cancellation propagates promptly but never tears a subtree
/// mid-check.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Errors out with `Cancelled` if the token has fired.
    pub fn check(&self) -> TypeResult<()> {
        if self.is_cancelled() {
            Err(TypeError::cancelled())
        } else {
            Ok(())
        }
    }
}

/// The upstream protocol the host provides.
///
/// Each method resolves a whole batch at once; the value for a kind is
/// either its definition or an error string for that kind alone.
pub trait SchemaClient {
    fn get_schemas<'a>(
        &'a self,
        kinds: &'a [String],
        want_metadata: bool,
    ) -> LocalBoxFuture<'a, AHashMap<String, Result<ClassDef, String>>>;

    fn get_mixins<'a>(&'a self, names: &'a [String]) -> LocalBoxFuture<'a, AHashMap<String, MixinDef>>;

    fn get_memory_schema<'a>(&'a self, table: &'a str) -> LocalBoxFuture<'a, Option<FunctionDef>>;
}

/// A schema lookup failure attached to one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    pub kind: String,
    pub message: String,
}

impl SchemaError {
    fn into_type_error(self) -> TypeError {
        TypeError::new(
            TypeErrorKind::UnknownKind,
            format!("could not load class @{}: {}", self.kind, self.message),
        )
    }
}

type ClassCache = AHashMap<String, Result<Rc<ClassDef>, SchemaError>>;

/// Batched, cached lookup of class definitions, mixins, and memory tables.
pub struct SchemaRetriever {
    client: Rc<dyn SchemaClient>,
    types_cache: RefCell<ClassCache>,
    meta_cache: RefCell<ClassCache>,
    mixin_cache: RefCell<AHashMap<String, Option<MixinDef>>>,
    memory_cache: RefCell<AHashMap<String, Option<Rc<FunctionDef>>>>,
    tracer: RefCell<Box<dyn SchemaTracer>>,
}

impl SchemaRetriever {
    pub fn new(client: Rc<dyn SchemaClient>) -> Self {
        Self::with_tracer(client, Box::new(NoopTracer))
    }

    pub fn with_tracer(client: Rc<dyn SchemaClient>, tracer: Box<dyn SchemaTracer>) -> Self {
        Self {
            client,
            types_cache: RefCell::new(AHashMap::new()),
            meta_cache: RefCell::new(AHashMap::new()),
            mixin_cache: RefCell::new(AHashMap::new()),
            memory_cache: RefCell::new(AHashMap::new()),
            tracer: RefCell::new(tracer),
        }
    }

    fn trace(&self, event: SchemaEvent) {
        self.tracer.borrow_mut().record(event);
    }

    /// Loads every uncached kind of the batch with a single upstream call.
    ///
    /// Kinds the upstream does not answer for at all are cached as
    /// `UnknownKind` errors so later lookups fail without another round
    /// trip.
    pub async fn ensure_loaded(
        &self,
        kinds: &[String],
        want_metadata: bool,
        cancel: &CancellationToken,
    ) -> TypeResult<()> {
        let missing: Vec<String> = {
            let cache = if want_metadata {
                self.meta_cache.borrow()
            } else {
                self.types_cache.borrow()
            };
            let mut missing = Vec::new();
            for kind in kinds {
                if cache.contains_key(kind) {
                    self.trace(SchemaEvent::CacheHit { kind: kind.clone() });
                } else if !missing.contains(kind) {
                    self.trace(SchemaEvent::CacheMiss { kind: kind.clone() });
                    missing.push(kind.clone());
                }
            }
            missing
        };
        if missing.is_empty() {
            return Ok(());
        }

        self.trace(SchemaEvent::BatchFlush {
            kinds: missing.clone(),
            with_metadata: want_metadata,
        });
        cancel.check()?;
        let mut results = self.client.get_schemas(&missing, want_metadata).await;
        cancel.check()?;

        let mut cache = if want_metadata {
            self.meta_cache.borrow_mut()
        } else {
            self.types_cache.borrow_mut()
        };
        for kind in missing {
            let entry = match results.remove(&kind) {
                Some(Ok(class)) => Ok(Rc::new(class)),
                Some(Err(message)) => Err(SchemaError {
                    kind: kind.clone(),
                    message,
                }),
                None => Err(SchemaError {
                    kind: kind.clone(),
                    message: "no such class".to_owned(),
                }),
            };
            cache.insert(kind, entry);
        }
        Ok(())
    }

    /// The class definition with types only.
    pub async fn get_full_schema(&self, kind: &str, cancel: &CancellationToken) -> TypeResult<Rc<ClassDef>> {
        self.ensure_loaded(std::slice::from_ref(&kind.to_owned()), false, cancel).await?;
        self.cached(kind, false)
    }

    /// The class definition with types and natural-language metadata.
    pub async fn get_full_meta(&self, kind: &str, cancel: &CancellationToken) -> TypeResult<Rc<ClassDef>> {
        self.ensure_loaded(std::slice::from_ref(&kind.to_owned()), true, cancel).await?;
        self.cached(kind, true)
    }

    fn cached(&self, kind: &str, want_metadata: bool) -> TypeResult<Rc<ClassDef>> {
        let cache = if want_metadata {
            self.meta_cache.borrow()
        } else {
            self.types_cache.borrow()
        };
        match cache.get(kind) {
            Some(Ok(class)) => Ok(Rc::clone(class)),
            Some(Err(error)) => Err(error.clone().into_type_error()),
            None => Err(TypeError::new(
                TypeErrorKind::UnknownKind,
                format!("class @{kind} was never loaded"),
            )),
        }
    }

    /// Cache-only class lookup, for callers that already went through
    /// [`SchemaRetriever::ensure_loaded`] and must not suspend again.
    pub fn cached_schema(&self, kind: &str) -> TypeResult<Rc<ClassDef>> {
        self.cached(kind, false)
    }

    /// Cache-only function lookup; see [`SchemaRetriever::cached_schema`].
    pub fn cached_function(&self, kind: &str, function_type: FunctionKind, name: &str) -> TypeResult<Rc<FunctionDef>> {
        let class = self.cached(kind, false)?;
        class.function(function_type, name).cloned().ok_or_else(|| {
            TypeError::new(
                TypeErrorKind::UnknownFunction,
                format!("class @{kind} has no {function_type} named {name}"),
            )
        })
    }

    /// One function's signature, by category and name.
    pub async fn get_schema_and_names(
        &self,
        kind: &str,
        function_type: FunctionKind,
        name: &str,
        cancel: &CancellationToken,
    ) -> TypeResult<Rc<FunctionDef>> {
        let class = self.get_full_schema(kind, cancel).await?;
        class.function(function_type, name).cloned().ok_or_else(|| {
            TypeError::new(
                TypeErrorKind::UnknownFunction,
                format!("class @{kind} has no {function_type} named {name}"),
            )
        })
    }

    /// Loads every uncached mixin of the batch with one upstream call.
    pub async fn ensure_mixins(&self, names: &[String], cancel: &CancellationToken) -> TypeResult<()> {
        let missing: Vec<String> = {
            let cache = self.mixin_cache.borrow();
            names
                .iter()
                .filter(|n| !cache.contains_key(*n))
                .cloned()
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }
        cancel.check()?;
        let mut results = self.client.get_mixins(&missing).await;
        cancel.check()?;
        let mut cache = self.mixin_cache.borrow_mut();
        for name in missing {
            let entry = results.remove(&name);
            cache.insert(name, entry);
        }
        Ok(())
    }

    /// One mixin declaration, for `import ... from @mixin` validation.
    pub async fn get_mixins(&self, name: &str, cancel: &CancellationToken) -> TypeResult<MixinDef> {
        self.ensure_mixins(std::slice::from_ref(&name.to_owned()), cancel).await?;
        self.mixin_cache
            .borrow()
            .get(name)
            .cloned()
            .flatten()
            .ok_or_else(|| TypeError::new(TypeErrorKind::UnknownKind, format!("no such mixin @{name}")))
    }

    /// The signature of a local memory table, or `None` if the table does
    /// not exist.
    pub async fn get_memory_schema(
        &self,
        table: &str,
        cancel: &CancellationToken,
    ) -> TypeResult<Option<Rc<FunctionDef>>> {
        if let Some(cached) = self.memory_cache.borrow().get(table) {
            return Ok(cached.clone());
        }
        cancel.check()?;
        let result = self.client.get_memory_schema(table).await.map(Rc::new);
        cancel.check()?;
        self.memory_cache.borrow_mut().insert(table.to_owned(), result.clone());
        Ok(result)
    }

    /// Drops one kind from every cache.
    pub fn invalidate(&self, kind: &str) {
        self.types_cache.borrow_mut().remove(kind);
        self.meta_cache.borrow_mut().remove(kind);
        self.trace(SchemaEvent::Invalidate {
            kind: Some(kind.to_owned()),
        });
    }

    /// Drops everything.
    pub fn invalidate_all(&self) {
        self.types_cache.borrow_mut().clear();
        self.meta_cache.borrow_mut().clear();
        self.mixin_cache.borrow_mut().clear();
        self.memory_cache.borrow_mut().clear();
        self.trace(SchemaEvent::Invalidate { kind: None });
    }
}
