// crates/batchwright-core/src/core/record.rs
// ============================================================================
// Module: Batchwright Records
// Description: Record payloads submitted to and returned by transactional stores.
// Purpose: Describe vertices, documents, and edges independent of any backend.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Records are typed property bags. Every record carries a [`RecordKind`] and a
//! `record_type` name chosen by the caller. Edges additionally reference the
//! two vertices they connect through [`EdgeEndpoints`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::RecordId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Property map attached to a record.
pub type Properties = BTreeMap<String, Value>;

/// Kind of record persisted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Graph vertex.
    Vertex,
    /// Schemaless document.
    Document,
    /// Graph edge connecting two vertices.
    Edge,
}

impl RecordKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Document => "document",
            Self::Edge => "edge",
        }
    }

    /// Parses a stable label back into a kind.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "vertex" => Some(Self::Vertex),
            "document" => Some(Self::Document),
            "edge" => Some(Self::Edge),
            _ => None,
        }
    }
}

/// Source and destination vertices of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEndpoints {
    /// Outgoing vertex.
    pub from: RecordId,
    /// Incoming vertex.
    pub to: RecordId,
}

/// Fully-formed payload for a record that does not exist yet.
///
/// # Invariants
/// - `endpoints` is `Some` exactly when `kind` is [`RecordKind::Edge`]; see
///   [`NewRecord::shape_error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    /// Record kind.
    pub kind: RecordKind,
    /// Caller-defined type name.
    pub record_type: String,
    /// Initial properties.
    pub properties: Properties,
    /// Edge endpoints (edges only).
    pub endpoints: Option<EdgeEndpoints>,
}

impl NewRecord {
    /// Creates a vertex payload.
    #[must_use]
    pub fn vertex(record_type: impl Into<String>, properties: Properties) -> Self {
        Self {
            kind: RecordKind::Vertex,
            record_type: record_type.into(),
            properties,
            endpoints: None,
        }
    }

    /// Creates a document payload.
    #[must_use]
    pub fn document(record_type: impl Into<String>, properties: Properties) -> Self {
        Self {
            kind: RecordKind::Document,
            record_type: record_type.into(),
            properties,
            endpoints: None,
        }
    }

    /// Creates an edge payload between two vertices.
    #[must_use]
    pub fn edge(
        record_type: impl Into<String>,
        from: RecordId,
        to: RecordId,
        properties: Properties,
    ) -> Self {
        Self {
            kind: RecordKind::Edge,
            record_type: record_type.into(),
            properties,
            endpoints: Some(EdgeEndpoints {
                from,
                to,
            }),
        }
    }

    /// Returns a description of the shape violation, if any.
    #[must_use]
    pub fn shape_error(&self) -> Option<String> {
        if self.record_type.trim().is_empty() {
            return Some("record_type must be non-empty".to_string());
        }
        match (self.kind, self.endpoints) {
            (RecordKind::Edge, None) => Some("edge records require endpoints".to_string()),
            (RecordKind::Vertex | RecordKind::Document, Some(_)) => {
                Some(format!("{} records must not carry endpoints", self.kind.as_str()))
            }
            _ => None,
        }
    }
}

/// Record reference returned by a store after a create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Assigned record identity.
    pub id: RecordId,
    /// Record kind.
    pub kind: RecordKind,
    /// Caller-defined type name.
    pub record_type: String,
    /// Current properties.
    pub properties: Properties,
    /// Edge endpoints (edges only).
    pub endpoints: Option<EdgeEndpoints>,
}

/// Builds a [`Properties`] map from key/value pairs.
#[must_use]
pub fn properties<K, I>(pairs: I) -> Properties
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(key, value)| (key.into(), value)).collect()
}
