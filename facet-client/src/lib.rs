//! FACET Client - Orchestration Layer
//!
//! The per-session client over the normalized store: tagged views and
//! reference tokens, coverage-driven reads with explicit pending results,
//! deduplicated transport fetches, batched queries, and optimistic
//! mutations with snapshot rollback.

pub mod client;
pub mod mutation;
pub mod projection;
pub mod query;
pub mod selection;
pub mod token;
pub mod transport;
pub mod view;

pub use client::{Client, PendingFetch, ViewRead};
pub use mutation::{MutationOutcome, MutationState, MutationWrite};
pub use projection::ViewData;
pub use query::{query_signature, stable_value_signature, Query, QueryItem, QueryResult};
pub use selection::{selection_paths, Select, Selection, SelectionMap};
pub use token::ViewRef;
pub use transport::{ListEdge, ListPage, PageInfo, RouterTransport, Transport};
pub use view::{View, ViewPayload, ViewRegistry, ViewTag};
