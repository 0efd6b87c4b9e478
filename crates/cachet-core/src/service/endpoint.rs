// ── Per-type request surface ──
//
// `ServiceMap` describes each operation as an `ApiRequest`;
// `RequestService` runs it on a background task and hands the parsed
// result to the merge processor.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use cachet_api::{ApiRequest, OperationKind, RawResponse, StubResponses, StubTransport};

use crate::cache::ModelCache;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::settings::Settings;
use crate::wire::WireDocument;

use super::{Backend, MergeJob, Merged};

// ── ServiceMap ──────────────────────────────────────────────────────

/// Request descriptions for entity type `E`.
///
/// Path policy, see [`path`](Self::path): `list` and `create` address the
/// collection `/<type_name>`; `update` and `delete` address the member
/// `/<type_name>/<id>` and require a non-empty id.
#[derive(Debug)]
pub struct ServiceMap<E>(PhantomData<fn() -> E>);

impl<E: Entity> ServiceMap<E> {
    /// Path addressed by `kind` for an entity with identity `id`.
    ///
    /// Member operations fail with `MissingId` when `id` is empty.
    pub fn path(kind: OperationKind, id: &str) -> Result<String, CoreError> {
        match kind {
            OperationKind::List | OperationKind::Create => Ok(Self::collection_path()),
            OperationKind::Update | OperationKind::Delete if id.is_empty() => {
                Err(CoreError::MissingId {
                    type_name: E::type_name(),
                    operation: kind.as_str(),
                })
            }
            OperationKind::Update | OperationKind::Delete => Ok(Self::member_path(id)),
        }
    }

    pub fn collection_path() -> String {
        format!("/{}", E::type_name())
    }

    pub fn member_path(id: &str) -> String {
        format!("/{}/{id}", E::type_name())
    }

    pub fn list() -> ApiRequest {
        ApiRequest::new(OperationKind::List, Self::collection_path())
    }

    /// `POST /<type>` with the entity's attributes and relationships. Any
    /// id already set on the entity is not sent.
    pub fn create(entity: &E) -> ApiRequest {
        let mut resource = entity.to_wire_fragment();
        resource.id = None;
        ApiRequest::new(OperationKind::Create, Self::collection_path())
            .with_body(encode(resource.into_document()))
    }

    /// `PATCH /<type>/<id>` carrying the id in the body as well.
    pub fn update(entity: &E) -> Result<ApiRequest, CoreError> {
        let path = Self::path(OperationKind::Update, entity.id())?;
        Ok(ApiRequest::new(OperationKind::Update, path)
            .with_body(encode(entity.to_wire_fragment().into_document())))
    }

    pub fn delete(entity: &E) -> Result<ApiRequest, CoreError> {
        let path = Self::path(OperationKind::Delete, entity.id())?;
        Ok(ApiRequest::new(OperationKind::Delete, path))
    }
}

fn encode(document: serde_json::Value) -> Bytes {
    Bytes::from(document.to_string())
}

// ── RequestService ──────────────────────────────────────────────────

/// Async list/create/update/delete for entity type `E`.
///
/// Settings are read when a request is issued. Dropping a returned future
/// does not cancel the request: its result is still merged into the cache.
pub struct RequestService<E> {
    backend: Backend,
    stub: StubTransport,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for RequestService<E> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            stub: self.stub.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> RequestService<E> {
    pub(crate) fn new(backend: Backend) -> Self {
        Self {
            backend,
            stub: StubTransport::default(),
            _entity: PhantomData,
        }
    }

    /// Canned bodies answered while the backend is in testing mode.
    pub fn with_stub_responses(mut self, responses: StubResponses) -> Self {
        self.stub = StubTransport::new(responses);
        self
    }

    /// Fetch the collection and merge every entity into the cache.
    ///
    /// Elements without an id are returned but not cached.
    pub async fn list(&self) -> Result<Vec<Arc<E>>, CoreError> {
        self.run(
            ServiceMap::<E>::list(),
            |response| WireDocument::from_slice(&response.body)?.entities::<E>(),
            |cache: &ModelCache, entities: Vec<E>| {
                entities.into_iter().map(|e| merge_one(cache, e)).collect()
            },
        )
        .await
    }

    /// Create on the backend and cache the echoed resource.
    ///
    /// A response without an id is returned but not cached.
    pub async fn create(&self, entity: &E) -> Result<Arc<E>, CoreError> {
        self.run(ServiceMap::<E>::create(entity), parse_one::<E>, merge_one::<E>)
            .await
    }

    /// Update on the backend and cache the echoed resource.
    pub async fn update(&self, entity: &E) -> Result<Arc<E>, CoreError> {
        let request = ServiceMap::<E>::update(entity)?;
        self.run(request, parse_one::<E>, merge_one::<E>).await
    }

    /// Delete on the backend, then evict the entity from memory.
    pub async fn delete(&self, entity: &E) -> Result<(), CoreError> {
        let request = ServiceMap::<E>::delete(entity)?;
        let id = entity.id().to_owned();
        self.run(
            request,
            |_| Ok(()),
            move |cache: &ModelCache, ()| {
                cache.remove::<E>(&id);
            },
        )
        .await
    }

    /// Issue `request` on a background task, parse there, merge on the
    /// processor.
    async fn run<T, R, P, M>(&self, request: ApiRequest, parse: P, merge: M) -> Result<R, CoreError>
    where
        T: Send + 'static,
        R: Send + 'static,
        P: FnOnce(RawResponse) -> Result<T, CoreError> + Send + 'static,
        M: FnOnce(&ModelCache, T) -> R + Send + 'static,
    {
        let merge_tx = self.backend.merge_sender().await?;
        let settings = self.backend.settings();
        let request = request.with_credential(settings.credential());
        let http = self.backend.http().clone();
        let stub = self.stub.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = match fetch(&http, &stub, &settings, &request).await {
                Ok(response) => parse(response),
                Err(e) => Err(e),
            };

            let job: MergeJob = Box::new(move |cache: &ModelCache| {
                let (result, changed) = match outcome {
                    Ok(parsed) => (Ok(merge(cache, parsed)), true),
                    Err(e) => {
                        debug!(entity = E::type_name(), error = %e, "request failed");
                        (Err(e), false)
                    }
                };
                Merged::new(changed, move || {
                    if reply_tx.send(result).is_err() {
                        debug!(entity = E::type_name(), "caller went away, result merged anyway");
                    }
                })
            });

            if merge_tx.send(job).await.is_err() {
                warn!(entity = E::type_name(), "merge processor stopped, dropping response");
            }
        });

        reply_rx.await.map_err(|_| CoreError::NotRunning)?
    }
}

impl<E> std::fmt::Debug for RequestService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestService").finish_non_exhaustive()
    }
}

async fn fetch(
    http: &cachet_api::HttpTransport,
    stub: &StubTransport,
    settings: &Settings,
    request: &ApiRequest,
) -> Result<RawResponse, CoreError> {
    let response = if settings.testing {
        stub.execute(request)
    } else {
        let base = settings
            .base_url
            .as_ref()
            .ok_or(cachet_api::Error::MissingBaseUrl)?;
        http.execute(base, request).await?
    };
    Ok(response.error_for_status()?)
}

#[allow(clippy::needless_pass_by_value)]
fn parse_one<E: Entity>(response: RawResponse) -> Result<E, CoreError> {
    WireDocument::from_slice(&response.body)?.entity::<E>()
}

fn merge_one<E: Entity>(cache: &ModelCache, entity: E) -> Arc<E> {
    if entity.id().is_empty() {
        warn!(entity = E::type_name(), "response resource has no id, not caching it");
        return Arc::new(entity);
    }
    cache.put(entity).0
}
