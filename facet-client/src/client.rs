//! The client orchestrator.
//!
//! Routes every read through the store's coverage masks, deduplicates
//! overlapping fetches onto one in-flight transport call, normalizes
//! responses recursively per the schema, keeps parent back-reference
//! lists in sync, and runs optimistic mutations with snapshot rollback.
//!
//! Concurrency model: store mutations are synchronous and atomic under
//! the store lock; concurrency exists only at the transport boundary,
//! where independent fetches run as separate asynchronous operations
//! joined with a fan-out/fan-in at query boundaries.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use facet_core::{
    parse_entity_id, to_entity_id, EntityId, FacetError, FacetResult, Record, RelationKind,
    Schema, StoreError, TransportError, TypeName,
};
use facet_store::{CoverageClaim, Listener, Missing, Store, SubscriptionId};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::mutation::{record_paths, MutationOutcome, MutationSnapshots, MutationState, MutationWrite};
use crate::projection::{ProjectionCache, ViewData};
use crate::query::{query_signature, selection_signature, Query, QueryItem, QueryResult};
use crate::selection::{connection_parts, selection_paths, Selection, SelectionMap};
use crate::token::ViewRef;
use crate::transport::Transport;
use crate::view::View;

/// Outcome of a synchronous view read.
#[derive(Debug)]
pub enum ViewRead {
    /// Every selected path is covered; the masked projection is ready.
    Ready(Arc<ViewData>),
    /// Data is missing; the caller decides how to wait (see
    /// [`Client::resolve`] or [`Client::read_view_async`]).
    Pending(PendingFetch),
}

impl ViewRead {
    pub fn ready(self) -> Option<Arc<ViewData>> {
        match self {
            ViewRead::Ready(data) => Some(data),
            ViewRead::Pending(_) => None,
        }
    }
}

/// Handle for one missing-data fetch, keyed by entity and missing paths.
///
/// Plain data: resolving it goes back through the client, which joins
/// concurrent resolves of the same key onto a single transport call.
#[derive(Debug, Clone)]
pub struct PendingFetch {
    key: String,
    type_name: TypeName,
    ids: Vec<String>,
    /// `None` requests the whole record (entity wholly unknown).
    select: Option<Vec<String>>,
}

impl PendingFetch {
    pub fn key(&self) -> &str {
        &self.key
    }
}

type FetchCell = Arc<OnceCell<Result<(), FacetError>>>;

/// The FACET client: a per-session normalized object graph.
///
/// The store is exclusively owned by the client; all writes funnel
/// through the normalization path, and readers never mutate.
pub struct Client {
    schema: Schema,
    transport: Arc<dyn Transport>,
    store: RwLock<Store>,
    projections: RwLock<ProjectionCache>,
    pending: Mutex<HashMap<String, FetchCell>>,
    requests: Mutex<HashMap<String, FetchCell>>,
}

impl Client {
    pub fn new(schema: Schema, transport: Arc<dyn Transport>) -> Self {
        Self {
            schema,
            transport,
            store: RwLock::new(Store::new()),
            projections: RwLock::new(ProjectionCache::new()),
            pending: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // ------------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------------
    // Lock order is always store before projections; guards are never held
    // across await points.

    fn store_read(&self) -> FacetResult<RwLockReadGuard<'_, Store>> {
        self.store
            .read()
            .map_err(|_| FacetError::Store(StoreError::LockPoisoned))
    }

    fn store_write(&self) -> FacetResult<RwLockWriteGuard<'_, Store>> {
        self.store
            .write()
            .map_err(|_| FacetError::Store(StoreError::LockPoisoned))
    }

    fn projections_write(&self) -> FacetResult<RwLockWriteGuard<'_, ProjectionCache>> {
        self.projections
            .write()
            .map_err(|_| FacetError::Store(StoreError::LockPoisoned))
    }

    // ------------------------------------------------------------------------
    // Tokens and subscriptions
    // ------------------------------------------------------------------------

    /// Mint a reference token for `(type, raw_id)` against a view.
    pub fn ref_for(&self, type_name: &str, raw_id: &str, view: &View) -> ViewRef {
        ViewRef::new(type_name, raw_id, view)
    }

    /// Mint a reference token from a store key.
    pub fn entity_ref(&self, entity_id: &str, view: &View) -> ViewRef {
        let (type_name, raw_id) = parse_entity_id(entity_id);
        ViewRef::new(type_name, raw_id, view)
    }

    /// Register a change listener for an entity; it fires synchronously
    /// after every merge touching that entity.
    pub fn subscribe(&self, entity_id: &str, listener: Listener) -> FacetResult<SubscriptionId> {
        Ok(self.store_write()?.subscribe(entity_id, listener))
    }

    pub fn unsubscribe(&self, entity_id: &str, subscription: SubscriptionId) -> FacetResult<()> {
        self.store_write()?.unsubscribe(entity_id, subscription);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------------

    /// Read a masked projection of the entity behind `token`.
    ///
    /// The selection is scoped to the token's tag set first, so a token
    /// minted against a narrower view never surfaces data the wider
    /// composition would select (anti-over-fetch-leak). If any scoped path
    /// is uncovered the result is [`ViewRead::Pending`] instead of a
    /// partial projection.
    pub fn read_view(&self, view: &View, token: &ViewRef) -> FacetResult<ViewRead> {
        let entity_id = token.entity_id();

        if let Ok(projections) = self.projections.read() {
            if let Some(cached) = projections.get(&entity_id, view, token) {
                return Ok(ViewRead::Ready(cached));
            }
        }

        let paths = selection_paths(view, Some(token));
        let store = self.store_read()?;
        let missing =
            store.missing_for_selection(&entity_id, Some(paths.iter().map(String::as_str)));

        match missing {
            Missing::Paths(missing) if missing.is_empty() => {
                let data = Arc::new(self.build_projection(&store, view, token));
                self.projections_write()?
                    .set(&entity_id, view, token, Arc::clone(&data));
                Ok(ViewRead::Ready(data))
            }
            Missing::All => Ok(ViewRead::Pending(PendingFetch {
                key: pending_key(token.type_name(), token.raw_id(), None),
                type_name: token.type_name().to_string(),
                ids: vec![token.raw_id().to_string()],
                select: None,
            })),
            Missing::Paths(mut missing) => {
                missing.sort();
                Ok(ViewRead::Pending(PendingFetch {
                    key: pending_key(token.type_name(), token.raw_id(), Some(&missing)),
                    type_name: token.type_name().to_string(),
                    ids: vec![token.raw_id().to_string()],
                    select: Some(missing),
                }))
            }
        }
    }

    /// Drive a pending fetch to completion.
    ///
    /// Concurrent resolves of the same key join one in-flight transport
    /// call; its (cloned) result is surfaced to every waiter. The pending
    /// entry is cleared afterwards so a failed fetch can be retried.
    pub async fn resolve(&self, pending: &PendingFetch) -> FacetResult<()> {
        let cell: FetchCell = {
            let mut map = self
                .pending
                .lock()
                .map_err(|_| FacetError::Store(StoreError::LockPoisoned))?;
            Arc::clone(map.entry(pending.key.clone()).or_default())
        };

        let result = cell
            .get_or_init(|| {
                self.fetch_by_id_and_normalize(
                    &pending.type_name,
                    &pending.ids,
                    pending.select.as_deref(),
                )
            })
            .await
            .clone();

        if let Ok(mut map) = self.pending.lock() {
            map.remove(&pending.key);
        }

        result
    }

    /// Read a projection, fetching missing data as needed.
    ///
    /// A fetch may legitimately leave the read pending (a whole-record
    /// fetch narrowing to a path delta), but a resolve that leaves the
    /// exact same data missing means the transport did not return the
    /// entity; that is reported as a transport failure instead of
    /// refetching forever.
    pub async fn read_view_async(
        &self,
        view: &View,
        token: &ViewRef,
    ) -> FacetResult<Arc<ViewData>> {
        let mut last_key: Option<String> = None;
        loop {
            match self.read_view(view, token)? {
                ViewRead::Ready(data) => return Ok(data),
                ViewRead::Pending(pending) => {
                    if last_key.as_deref() == Some(pending.key()) {
                        return Err(TransportError::Failed {
                            message: format!(
                                "fetch returned no data for '{}'",
                                token.entity_id()
                            ),
                        }
                        .into());
                    }
                    last_key = Some(pending.key.clone());
                    self.resolve(&pending).await?;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Query path
    // ------------------------------------------------------------------------

    /// Execute a named query: batched node fetches plus list fetches, all
    /// concurrent, then reference tokens per entry.
    ///
    /// Node lookups sharing `(type, selection)` are grouped into one
    /// transport call covering only the ids that are actually incomplete.
    /// The whole query is memoized by its structural signature, so
    /// identical concurrent or repeated queries execute once; a failed
    /// execution is forgotten to allow retries.
    pub async fn request(&self, query: &Query) -> FacetResult<QueryResult> {
        let signature = query_signature(query);
        let cell: FetchCell = {
            let mut map = self
                .requests
                .lock()
                .map_err(|_| FacetError::Store(StoreError::LockPoisoned))?;
            Arc::clone(map.entry(signature.clone()).or_default())
        };

        let result = cell.get_or_init(|| self.execute_query(query)).await.clone();

        if result.is_err() {
            if let Ok(mut map) = self.requests.lock() {
                map.remove(&signature);
            }
        }
        result?;

        self.query_result(query)
    }

    async fn execute_query(&self, query: &Query) -> FacetResult<()> {
        struct FetchGroup {
            type_name: TypeName,
            ids: Vec<String>,
            select: Vec<String>,
        }

        let mut groups: BTreeMap<String, FetchGroup> = BTreeMap::new();
        let mut list_items: Vec<(&str, &TypeName, &Value, &View)> = Vec::new();

        {
            let store = self.store_read()?;
            for (name, item) in query {
                match item {
                    QueryItem::Nodes {
                        type_name,
                        ids,
                        view,
                    } => {
                        let paths = selection_paths(view, None);
                        let group_key = format!("{}#{}", type_name, selection_signature(view));
                        let group = groups.entry(group_key).or_insert_with(|| FetchGroup {
                            type_name: type_name.clone(),
                            ids: Vec::new(),
                            select: paths.iter().cloned().collect(),
                        });

                        // Delta first: only truly incomplete ids get fetched.
                        for raw_id in ids {
                            let entity_id = to_entity_id(type_name, raw_id);
                            let missing = store.missing_for_selection(
                                &entity_id,
                                Some(paths.iter().map(String::as_str)),
                            );
                            if !missing.is_satisfied() {
                                group.ids.push(raw_id.clone());
                            }
                        }
                    }
                    QueryItem::List {
                        type_name, args, view, ..
                    } => {
                        list_items.push((name.as_str(), type_name, args, view));
                    }
                }
            }
        }

        let mut fetches: Vec<Pin<Box<dyn Future<Output = FacetResult<()>> + Send + '_>>> =
            Vec::new();

        for group in groups.into_values() {
            if group.ids.is_empty() {
                continue;
            }
            fetches.push(Box::pin(async move {
                self.fetch_by_id_and_normalize(&group.type_name, &group.ids, Some(&group.select))
                    .await
            }));
        }

        for (name, type_name, args, view) in list_items {
            fetches.push(Box::pin(
                self.fetch_list_and_normalize(name, type_name, args, view),
            ));
        }

        futures_util::future::try_join_all(fetches).await?;
        Ok(())
    }

    fn query_result(&self, query: &Query) -> FacetResult<QueryResult> {
        let store = self.store_read()?;
        let mut items = BTreeMap::new();

        for (name, item) in query {
            let refs = match item {
                QueryItem::Nodes {
                    type_name,
                    ids,
                    view,
                } => ids
                    .iter()
                    .map(|raw_id| ViewRef::new(type_name.clone(), raw_id.clone(), view))
                    .collect(),
                QueryItem::List { view, .. } => store
                    .get_list(name)
                    .unwrap_or(&[])
                    .iter()
                    .map(|entity_id| self.entity_ref(entity_id, view))
                    .collect(),
            };
            items.insert(name.clone(), refs);
        }

        Ok(QueryResult::new(items))
    }

    // ------------------------------------------------------------------------
    // Fetching and normalization
    // ------------------------------------------------------------------------

    async fn fetch_by_id_and_normalize(
        &self,
        type_name: &str,
        ids: &[String],
        select: Option<&[String]>,
    ) -> FacetResult<()> {
        tracing::debug!(type_name, count = ids.len(), "fetching entities by id");
        let records = self
            .transport
            .fetch_by_id(type_name, ids, select)
            .await
            .map_err(FacetError::from)?;

        let select_set: Option<BTreeSet<String>> =
            select.map(|paths| paths.iter().cloned().collect());

        let mut store = self.store_write()?;
        let mut projections = self.projections_write()?;
        for value in records {
            if let Value::Object(record) = value {
                self.normalize_into(
                    &mut store,
                    &mut projections,
                    type_name,
                    record,
                    select_set.as_ref(),
                    None,
                )?;
            }
        }
        Ok(())
    }

    async fn fetch_list_and_normalize(
        &self,
        name: &str,
        type_name: &str,
        args: &Value,
        view: &View,
    ) -> FacetResult<()> {
        tracing::debug!(list = name, "fetching list");
        let paths = selection_paths(view, None);
        let select: Vec<String> = paths.iter().cloned().collect();
        let page = self
            .transport
            .fetch_list(name, args, Some(&select))
            .await
            .map_err(FacetError::from)?;

        let mut store = self.store_write()?;
        let mut projections = self.projections_write()?;
        let mut ids = Vec::with_capacity(page.edges.len());
        for edge in page.edges {
            if let Value::Object(record) = edge.node {
                let id = self.normalize_into(
                    &mut store,
                    &mut projections,
                    type_name,
                    record,
                    Some(&paths),
                    None,
                )?;
                ids.push(id);
            }
        }

        // A cursor in the arguments means pagination: append instead of
        // replacing the stored list wholesale.
        if args.get("after").map(|v| !v.is_null()).unwrap_or(false) {
            store.append_list(name, ids);
        } else {
            store.set_list(name, ids);
        }
        Ok(())
    }

    /// Normalize a record into the store outside of any fetch, e.g. for
    /// seeding or server-pushed data. `select` claims coverage for the
    /// given paths; `None` claims the whole entity.
    pub fn write(
        &self,
        type_name: &str,
        record: Record,
        select: Option<&BTreeSet<String>>,
    ) -> FacetResult<EntityId> {
        let mut store = self.store_write()?;
        let mut projections = self.projections_write()?;
        self.normalize_into(&mut store, &mut projections, type_name, record, select, None)
    }

    /// Remove an entity, scrubbing its id from lists and relation values.
    pub fn delete(&self, entity_id: &str) -> FacetResult<()> {
        let mut store = self.store_write()?;
        let mut projections = self.projections_write()?;
        projections.invalidate(entity_id);
        for touched in store.delete(entity_id) {
            projections.invalidate(&touched);
        }
        Ok(())
    }

    /// Recursively replace embedded related objects with their entity ids
    /// and merge every touched entity. Children are normalized before the
    /// parent's field is rewritten; select paths narrow by relation prefix
    /// on the way down. When a snapshot map is given, the first pre-image
    /// of every touched entity is captured before its merge.
    fn normalize_into(
        &self,
        store: &mut Store,
        projections: &mut ProjectionCache,
        type_name: &str,
        record: Record,
        select: Option<&BTreeSet<String>>,
        mut snapshots: Option<&mut MutationSnapshots>,
    ) -> FacetResult<EntityId> {
        let config = self.schema.entity(type_name)?;
        let raw_id = config.identity_of(&record)?;
        let entity_id = to_entity_id(type_name, &raw_id);

        let mut result = Record::new();
        for (key, value) in record {
            match config.relations.get(&key).cloned() {
                Some(RelationKind::ToOne(child_type)) => {
                    if let Value::Object(child) = value {
                        let child_select = narrow_select(select, &key);
                        let child_id = self.normalize_into(
                            store,
                            projections,
                            &child_type,
                            child,
                            child_select.as_ref(),
                            snapshots.as_deref_mut(),
                        )?;
                        result.insert(key, Value::String(child_id));
                    } else {
                        // Already an id (or null) from a previous
                        // normalization pass.
                        result.insert(key, value);
                    }
                }
                Some(RelationKind::ToMany(child_type)) => {
                    if let Value::Array(items) = value {
                        let mut ids = Vec::with_capacity(items.len());
                        for item in items {
                            if let Value::Object(child) = item {
                                let child_select = narrow_select(select, &key);
                                let child_id = self.normalize_into(
                                    store,
                                    projections,
                                    &child_type,
                                    child,
                                    child_select.as_ref(),
                                    snapshots.as_deref_mut(),
                                )?;
                                ids.push(Value::String(child_id));
                            } else {
                                ids.push(item);
                            }
                        }
                        result.insert(key, Value::Array(ids));
                    } else {
                        result.insert(key, value);
                    }
                }
                None => {
                    result.insert(key, value);
                }
            }
        }

        // Parent back-link targets, captured before `result` moves into
        // the merge.
        let back_links: Vec<(facet_core::ParentLink, EntityId)> = self
            .schema
            .parent_links(type_name)
            .iter()
            .filter_map(|link| {
                result
                    .get(&link.via_field)
                    .and_then(Value::as_str)
                    .map(|parent_id| (link.clone(), parent_id.to_string()))
            })
            .collect();

        if let Some(snapshots) = snapshots.as_deref_mut() {
            snapshots.capture_entity(store, &entity_id);
        }

        projections.invalidate(&entity_id);
        let claim = match select {
            None => CoverageClaim::Full,
            Some(paths) => CoverageClaim::Paths(paths.iter().cloned().collect()),
        };
        store.merge(&entity_id, result, claim);

        for (link, parent_id) in back_links {
            self.link_parent_list(store, projections, &entity_id, &link, &parent_id, snapshots.as_deref_mut());
        }

        Ok(entity_id)
    }

    /// Append the child's id to the parent's back-reference list, with set
    /// semantics: a child normalized twice appears once. Parents not yet
    /// in the store are skipped; their list arrives with their own fetch.
    fn link_parent_list(
        &self,
        store: &mut Store,
        projections: &mut ProjectionCache,
        child_id: &str,
        link: &facet_core::ParentLink,
        parent_id: &str,
        snapshots: Option<&mut MutationSnapshots>,
    ) {
        let Some(parent) = store.read(parent_id) else {
            return;
        };

        let mut current = match parent.get(&link.list_field) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        if current.iter().any(|item| item.as_str() == Some(child_id)) {
            return;
        }

        if let Some(snapshots) = snapshots {
            snapshots.capture_entity(store, parent_id);
        }

        projections.invalidate(parent_id);
        current.push(Value::String(child_id.to_string()));
        let mut partial = Record::new();
        partial.insert(link.list_field.clone(), Value::Array(current));
        store.merge(
            parent_id,
            partial,
            CoverageClaim::Paths(vec![link.list_field.clone()]),
        );
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Execute a mutation, optionally applying an optimistic record first.
    ///
    /// On transport failure every entity and list touched by the
    /// optimistic write is restored to its pre-mutation state and the
    /// error is returned; retrying is the caller's decision.
    pub async fn mutate(
        &self,
        key: &str,
        input: Value,
        write: MutationWrite,
    ) -> FacetResult<MutationOutcome> {
        tracing::debug!(mutation = key, state = ?MutationState::Issued, "mutation issued");

        let mut snapshots: Option<MutationSnapshots> = None;
        if let Some(record) = write.optimistic.clone() {
            let mut snaps = MutationSnapshots::new();
            // Claim only the paths actually present, so a speculative
            // partial record never over-claims coverage.
            let claim_paths = record_paths(&record);
            {
                let mut store = self.store_write()?;
                let mut projections = self.projections_write()?;
                self.normalize_into(
                    &mut store,
                    &mut projections,
                    &write.entity_type,
                    record,
                    Some(&claim_paths),
                    Some(&mut snaps),
                )?;
            }
            snapshots = Some(snaps);
            tracing::debug!(
                mutation = key,
                state = ?MutationState::OptimisticApplied,
                "optimistic record applied"
            );
        }

        let select: Option<Vec<String>> = write
            .view
            .as_ref()
            .map(|view| selection_paths(view, None).into_iter().collect());

        match self.transport.mutate(key, input, select.as_deref()).await {
            Ok(response) => {
                let entity_id = match response {
                    Value::Object(record) => {
                        let select_set: Option<BTreeSet<String>> =
                            select.map(|paths| paths.into_iter().collect());
                        let mut store = self.store_write()?;
                        let mut projections = self.projections_write()?;
                        Some(self.normalize_into(
                            &mut store,
                            &mut projections,
                            &write.entity_type,
                            record,
                            select_set.as_ref(),
                            None,
                        )?)
                    }
                    _ => None,
                };
                tracing::debug!(
                    mutation = key,
                    state = ?MutationState::Confirmed,
                    "mutation confirmed"
                );
                Ok(MutationOutcome {
                    state: MutationState::Confirmed,
                    entity_id,
                })
            }
            Err(err) => {
                if let Some(snaps) = snapshots {
                    let mut store = self.store_write()?;
                    let mut projections = self.projections_write()?;
                    snaps.restore_all(&mut store, &mut projections);
                    tracing::warn!(
                        mutation = key,
                        state = ?MutationState::RolledBack,
                        error = %err,
                        "mutation failed; optimistic state rolled back"
                    );
                } else {
                    tracing::warn!(mutation = key, error = %err, "mutation failed");
                }
                Err(err.into())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Projection building
    // ------------------------------------------------------------------------

    /// Walk the token-scoped selection against the stored record: scalars
    /// are copied, relations under nested views resolve to fresh reference
    /// tokens, plain nested relations are inlined, connection shapes are
    /// rebuilt around the stored id list.
    fn build_projection(&self, store: &Store, view: &View, token: &ViewRef) -> ViewData {
        let entity_id = token.entity_id();
        let empty = Record::new();
        let record = store.read(&entity_id).unwrap_or(&empty);

        let mut result = BTreeMap::new();
        for payload in view.payloads(Some(token)) {
            self.project_map(store, &payload.select, record, &mut result);
        }
        ViewData::Object(result)
    }

    fn project_map(
        &self,
        store: &Store,
        select: &SelectionMap,
        record: &Record,
        out: &mut BTreeMap<String, ViewData>,
    ) {
        for (key, selection) in select {
            let value = record.get(key);
            let projected = match selection {
                Selection::Scalar => value
                    .cloned()
                    .map(ViewData::Scalar)
                    .unwrap_or(ViewData::Missing),
                Selection::View(nested) => project_relation_ref(value, nested),
                Selection::Fields(sub) => match connection_parts(sub) {
                    Some((edge_select, node_selection)) => {
                        self.project_connection(store, sub, edge_select, node_selection, value)
                    }
                    None => self.project_relation_inline(store, sub, value),
                },
            };
            out.insert(key.clone(), projected);
        }
    }

    fn project_relation_inline(
        &self,
        store: &Store,
        select: &SelectionMap,
        value: Option<&Value>,
    ) -> ViewData {
        match value {
            Some(Value::String(entity_id)) => self.project_node_fields(store, select, entity_id),
            Some(Value::Array(items)) => ViewData::List(
                items
                    .iter()
                    .map(|item| match item.as_str() {
                        Some(entity_id) => self.project_node_fields(store, select, entity_id),
                        None => ViewData::Scalar(Value::Null),
                    })
                    .collect(),
            ),
            Some(Value::Null) => ViewData::Scalar(Value::Null),
            Some(other) => ViewData::Scalar(other.clone()),
            None => ViewData::Missing,
        }
    }

    fn project_connection(
        &self,
        store: &Store,
        connection_select: &SelectionMap,
        edge_select: &SelectionMap,
        node_selection: &Selection,
        value: Option<&Value>,
    ) -> ViewData {
        let stored_ids: &[Value] = match value {
            Some(Value::Array(items)) => items,
            _ => &[],
        };

        let edges: Vec<ViewData> = stored_ids
            .iter()
            .map(|item| {
                let node = match item.as_str() {
                    Some(entity_id) => match node_selection {
                        Selection::View(nested) => {
                            project_relation_ref(Some(item), nested)
                        }
                        Selection::Fields(node_select) => {
                            self.project_node_fields(store, node_select, entity_id)
                        }
                        Selection::Scalar => ViewData::Scalar(item.clone()),
                    },
                    None => ViewData::Scalar(Value::Null),
                };

                let mut edge = BTreeMap::new();
                edge.insert("node".to_string(), node);
                // Pagination metadata is not cached per entity.
                if edge_select.contains_key("cursor") {
                    edge.insert("cursor".to_string(), ViewData::Scalar(Value::Null));
                }
                ViewData::Object(edge)
            })
            .collect();

        let mut connection = BTreeMap::new();
        connection.insert("edges".to_string(), ViewData::List(edges));
        if connection_select.contains_key("pageInfo") {
            connection.insert("pageInfo".to_string(), ViewData::Scalar(Value::Null));
        }
        ViewData::Object(connection)
    }

    fn project_node_fields(
        &self,
        store: &Store,
        select: &SelectionMap,
        entity_id: &str,
    ) -> ViewData {
        match store.read(entity_id) {
            Some(child) => {
                let (type_name, raw_id) = parse_entity_id(entity_id);
                let mut node = BTreeMap::new();
                node.insert(
                    "id".to_string(),
                    ViewData::Scalar(Value::String(raw_id.to_string())),
                );
                node.insert(
                    "__typename".to_string(),
                    ViewData::Scalar(Value::String(type_name.to_string())),
                );
                self.project_map(store, select, child, &mut node);
                ViewData::Object(node)
            }
            None => ViewData::Scalar(Value::Null),
        }
    }
}

/// Resolve a relation value into reference tokens for a nested view.
fn project_relation_ref(value: Option<&Value>, nested: &View) -> ViewData {
    match value {
        Some(Value::String(entity_id)) => {
            let (type_name, raw_id) = parse_entity_id(entity_id);
            ViewData::Ref(ViewRef::new(type_name, raw_id, nested))
        }
        Some(Value::Array(items)) => ViewData::List(
            items
                .iter()
                .map(|item| match item.as_str() {
                    Some(entity_id) => {
                        let (type_name, raw_id) = parse_entity_id(entity_id);
                        ViewData::Ref(ViewRef::new(type_name, raw_id, nested))
                    }
                    None => ViewData::Scalar(Value::Null),
                })
                .collect(),
        ),
        Some(Value::Null) => ViewData::Scalar(Value::Null),
        Some(other) => ViewData::Scalar(other.clone()),
        None => ViewData::Missing,
    }
}

/// Key for in-flight fetch dedup: entity plus the exact missing paths.
fn pending_key(type_name: &str, raw_id: &str, missing: Option<&[String]>) -> String {
    match missing {
        Some(paths) => format!("N|{}|{}|{}", type_name, raw_id, paths.join(",")),
        None => format!("N|{}|{}|*", type_name, raw_id),
    }
}

fn narrow_select(select: Option<&BTreeSet<String>>, field: &str) -> Option<BTreeSet<String>> {
    let select = select?;
    let prefix = format!("{}.", field);
    Some(
        select
            .iter()
            .filter_map(|path| path.strip_prefix(&prefix))
            .map(String::from)
            .collect(),
    )
}
