//! Create-vs-update decision for search store pushes.
//!
//! A document either has an identity already (it came from the archive, or a
//! previous push assigned one) and is replaced in place, or it has none and
//! the store assigns one. The identity never travels inside the body.

use crate::codec::{self, JsonObject, ID_FIELD};
use bson::{Bson, Document};
use std::fmt;

/// How a document is written to the search store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// POST to the collection; the store assigns the identity.
    Create,
    /// PUT to `<collection>/<id>`; idempotent replace.
    Update { id: String },
}

impl Instruction {
    /// `Update` for a non-empty identity, `Create` otherwise.
    pub fn for_identity(id: Option<&str>) -> Self {
        match id {
            Some(id) if !id.is_empty() => Self::Update { id: id.to_string() },
            _ => Self::Create,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Create => None,
            Self::Update { id } => Some(id),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::Create => "POST",
            Self::Update { .. } => "PUT",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update { id } => write!(f, "update {}", id),
        }
    }
}

/// A body ready for the transport, with its instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPush {
    pub instruction: Instruction,
    pub body: JsonObject,
}

/// Decide the instruction for a wire body and a prior identity.
///
/// Any `_id` field left in the body is removed.
pub fn reconcile(prior: Option<&str>, mut body: JsonObject) -> PreparedPush {
    body.remove(ID_FIELD);
    PreparedPush {
        instruction: Instruction::for_identity(prior),
        body,
    }
}

/// Prepare an archived document: its `_id` becomes the identity, the rest the body.
///
/// String identities are used as-is and object ids by their hex form; any
/// other `_id` type is treated as no identity.
pub fn reconcile_document(mut doc: Document) -> PreparedPush {
    let prior = match doc.remove(ID_FIELD) {
        Some(Bson::String(id)) => Some(id),
        Some(Bson::ObjectId(oid)) => Some(oid.to_hex()),
        _ => None,
    };
    reconcile(prior.as_deref(), codec::document_to_wire(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use serde_json::{json, Value};

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(object) => object,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_no_identity_is_create() {
        assert_eq!(Instruction::for_identity(None), Instruction::Create);
        assert_eq!(Instruction::for_identity(Some("")), Instruction::Create);
    }

    #[test]
    fn test_identity_is_update() {
        let instruction = Instruction::for_identity(Some("AV6XOE1FyS6gf1Jm5ekm"));
        assert_eq!(instruction.id(), Some("AV6XOE1FyS6gf1Jm5ekm"));
        assert_eq!(instruction.method(), "PUT");
        assert_eq!(instruction.to_string(), "update AV6XOE1FyS6gf1Jm5ekm");
    }

    #[test]
    fn test_reconcile_strips_identity_from_body() {
        let body = object(json!({"_id": "stale", "timestamp": "2017-01-01T00:00:00Z"}));
        let push = reconcile(None, body);
        assert_eq!(push.instruction, Instruction::Create);
        assert!(push.body.get("_id").is_none());
        assert!(push.body.get("timestamp").is_some());
    }

    #[test]
    fn test_reconcile_document_string_id() {
        let push = reconcile_document(doc! { "_id": "abc", "stats_schema_version": 1 });
        assert_eq!(push.instruction, Instruction::Update { id: "abc".to_string() });
        assert!(push.body.get("_id").is_none());
        assert_eq!(push.body["stats_schema_version"], json!(1));
    }

    #[test]
    fn test_reconcile_document_object_id() {
        let oid = ObjectId::new();
        let push = reconcile_document(doc! { "_id": oid });
        assert_eq!(push.instruction.id(), Some(oid.to_hex().as_str()));
    }

    #[test]
    fn test_reconcile_document_without_id() {
        let push = reconcile_document(doc! { "users": { "total_user_count": 3 } });
        assert_eq!(push.instruction, Instruction::Create);
    }

    #[test]
    fn test_reconcile_document_empty_id() {
        let push = reconcile_document(doc! { "_id": "" });
        assert_eq!(push.instruction, Instruction::Create);
    }
}
