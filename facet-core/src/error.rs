//! Error types for FACET operations

use thiserror::Error;

/// Configuration errors.
///
/// These indicate a programming or setup defect: the schema handed to the
/// client is incomplete. They are fatal and never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown entity type '{type_name}'")]
    UnknownEntityType { type_name: String },

    #[error("Unknown related type '{type_name}' (field '{parent_type}.{field}')")]
    UnknownRelatedType {
        parent_type: String,
        field: String,
        type_name: String,
    },

    #[error("Missing identity for entity type '{type_name}'")]
    MissingIdentity { type_name: String },
}

/// Transport layer errors.
///
/// `Clone` on purpose: a single failed fetch is surfaced to every caller
/// that was deduplicated onto the same in-flight request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("No {kind} resolver configured for '{key}'")]
    NoResolver { kind: ResolverKind, key: String },

    #[error("Transport call failed: {message}")]
    Failed { message: String },
}

/// The resolver family a transport call was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    Node,
    List,
    Mutation,
}

impl std::fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverKind::Node => write!(f, "node"),
            ResolverKind::List => write!(f, "list"),
            ResolverKind::Mutation => write!(f, "mutation"),
        }
    }
}

/// Store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Master error type for all FACET errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FacetError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for FACET operations.
pub type FacetResult<T> = Result<T, FacetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_unknown_type() {
        let err = ConfigError::UnknownEntityType {
            type_name: "Post".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Unknown entity type"));
        assert!(msg.contains("Post"));
    }

    #[test]
    fn test_config_error_display_unknown_related_type() {
        let err = ConfigError::UnknownRelatedType {
            parent_type: "Post".to_string(),
            field: "comments".to_string(),
            type_name: "Comment".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Comment"));
        assert!(msg.contains("Post.comments"));
    }

    #[test]
    fn test_transport_error_display_no_resolver() {
        let err = TransportError::NoResolver {
            kind: ResolverKind::List,
            key: "postsByDate".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("No list resolver"));
        assert!(msg.contains("postsByDate"));
    }

    #[test]
    fn test_facet_error_from_variants() {
        let config = FacetError::from(ConfigError::MissingIdentity {
            type_name: "User".to_string(),
        });
        assert!(matches!(config, FacetError::Config(_)));

        let transport = FacetError::from(TransportError::Failed {
            message: "connection reset".to_string(),
        });
        assert!(matches!(transport, FacetError::Transport(_)));

        let store = FacetError::from(StoreError::LockPoisoned);
        assert!(matches!(store, FacetError::Store(_)));
    }
}
