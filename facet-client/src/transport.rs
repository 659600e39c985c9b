//! Abstract transport contract.
//!
//! The cache is agnostic to the underlying protocol: anything that can
//! fetch records by id, fetch named lists, and execute mutations
//! satisfies the contract. A call routed to an unconfigured resolver must
//! fail distinguishably; the orchestrator never drops such calls
//! silently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use facet_core::{ResolverKind, TransportError};
use serde_json::Value;

/// Pagination metadata for one list page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

/// One entry of a fetched list page.
#[derive(Debug, Clone)]
pub struct ListEdge {
    pub node: Value,
    pub cursor: Option<String>,
}

/// A fetched page of a named remote list.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub edges: Vec<ListEdge>,
    pub page_info: PageInfo,
}

/// The three-method fetch/mutate contract the client orchestrates over.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch raw records of one type by raw id. `select` lists the dotted
    /// paths needed; `None` requests whole records.
    async fn fetch_by_id(
        &self,
        type_name: &str,
        ids: &[String],
        select: Option<&[String]>,
    ) -> Result<Vec<Value>, TransportError>;

    /// Fetch one page of a named remote list.
    async fn fetch_list(
        &self,
        name: &str,
        args: &Value,
        select: Option<&[String]>,
    ) -> Result<ListPage, TransportError>;

    /// Execute a mutation and return the authoritative record.
    async fn mutate(
        &self,
        key: &str,
        input: Value,
        select: Option<&[String]>,
    ) -> Result<Value, TransportError>;
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type NodeResolver = Arc<
    dyn Fn(Vec<String>, Option<Vec<String>>) -> BoxFuture<Result<Vec<Value>, TransportError>>
        + Send
        + Sync,
>;
type ListResolver = Arc<
    dyn Fn(Value, Option<Vec<String>>) -> BoxFuture<Result<ListPage, TransportError>>
        + Send
        + Sync,
>;
type MutationResolver = Arc<
    dyn Fn(Value, Option<Vec<String>>) -> BoxFuture<Result<Value, TransportError>> + Send + Sync,
>;

/// Transport backed by per-key resolver closures, the way a batched RPC
/// client maps entity types and list procedures onto calls.
#[derive(Default)]
pub struct RouterTransport {
    nodes: HashMap<String, NodeResolver>,
    lists: HashMap<String, ListResolver>,
    mutations: HashMap<String, MutationResolver>,
}

impl RouterTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the by-id resolver for an entity type.
    pub fn with_node_resolver<F, Fut>(mut self, type_name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(Vec<String>, Option<Vec<String>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Value>, TransportError>> + Send + 'static,
    {
        self.nodes.insert(
            type_name.into(),
            Arc::new(move |ids, select| Box::pin(resolver(ids, select))),
        );
        self
    }

    /// Register the resolver for a named remote list.
    pub fn with_list_resolver<F, Fut>(mut self, name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(Value, Option<Vec<String>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ListPage, TransportError>> + Send + 'static,
    {
        self.lists.insert(
            name.into(),
            Arc::new(move |args, select| Box::pin(resolver(args, select))),
        );
        self
    }

    /// Register the resolver for a mutation key.
    pub fn with_mutation_resolver<F, Fut>(mut self, key: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(Value, Option<Vec<String>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
    {
        self.mutations.insert(
            key.into(),
            Arc::new(move |input, select| Box::pin(resolver(input, select))),
        );
        self
    }
}

#[async_trait]
impl Transport for RouterTransport {
    async fn fetch_by_id(
        &self,
        type_name: &str,
        ids: &[String],
        select: Option<&[String]>,
    ) -> Result<Vec<Value>, TransportError> {
        let resolver = self.nodes.get(type_name).ok_or_else(|| {
            TransportError::NoResolver {
                kind: ResolverKind::Node,
                key: type_name.to_string(),
            }
        })?;
        resolver(ids.to_vec(), select.map(<[String]>::to_vec)).await
    }

    async fn fetch_list(
        &self,
        name: &str,
        args: &Value,
        select: Option<&[String]>,
    ) -> Result<ListPage, TransportError> {
        let resolver = self.lists.get(name).ok_or_else(|| {
            TransportError::NoResolver {
                kind: ResolverKind::List,
                key: name.to_string(),
            }
        })?;
        resolver(args.clone(), select.map(<[String]>::to_vec)).await
    }

    async fn mutate(
        &self,
        key: &str,
        input: Value,
        select: Option<&[String]>,
    ) -> Result<Value, TransportError> {
        let resolver = self.mutations.get(key).ok_or_else(|| {
            TransportError::NoResolver {
                kind: ResolverKind::Mutation,
                key: key.to_string(),
            }
        })?;
        resolver(input, select.map(<[String]>::to_vec)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_resolvers_fail_distinguishably() {
        let transport = RouterTransport::new();

        let err = transport
            .fetch_by_id("Post", &["p1".to_string()], None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::NoResolver {
                kind: ResolverKind::Node,
                key: "Post".to_string(),
            }
        );

        let err = transport
            .fetch_list("recentPosts", &Value::Null, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::NoResolver {
                kind: ResolverKind::List,
                ..
            }
        ));

        let err = transport.mutate("likePost", json!({}), None).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::NoResolver {
                kind: ResolverKind::Mutation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_registered_resolvers_are_routed() {
        let transport = RouterTransport::new().with_node_resolver("Post", |ids, select| async move {
            assert_eq!(ids, vec!["p1".to_string()]);
            assert_eq!(select, Some(vec!["title".to_string()]));
            Ok(vec![json!({ "id": "p1", "title": "Hello" })])
        });

        let records = transport
            .fetch_by_id("Post", &["p1".to_string()], Some(&["title".to_string()]))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }
}
