//! Query and pipeline builders for the operational store.
//!
//! Pure functions: they build BSON and never touch the network, so the
//! shape of every query can be checked without a database.

use super::Cutoff;
use bson::{doc, Bson, Document};

/// Node types counted individually.
pub const NODE_TYPES: [&str; 2] = ["asset", "comment"];

/// User roles in classification priority order; the first match wins.
pub const USER_TYPE_PRIORITY: [&str; 3] = ["service", "demo", "subscriber"];

/// Type given to a user whose roles match none of [`USER_TYPE_PRIORITY`].
pub const UNKNOWN_USER_TYPE: &str = "unknown";

/// Role excluded from the real-user count.
pub const SERVICE_USER_TYPE: &str = "service";

/// Category of personal home projects.
pub const HOME_CATEGORY: &str = "home";

/// Node name that marks a synced Blender configuration.
pub const SYNC_MARKER_NODE: &str = "startup.blend";

/// `{_created: {$lt: T}}` for historical runs, `{}` otherwise.
pub fn cutoff_filter(cutoff: Cutoff) -> Document {
    match cutoff.created_before() {
        Some(before) => doc! { "_created": { "$lt": bson::DateTime::from_chrono(before) } },
        None => Document::new(),
    }
}

/// Merge the cutoff predicate into a find filter.
pub fn with_cutoff(mut filter: Document, cutoff: Cutoff) -> Document {
    for (key, value) in cutoff_filter(cutoff) {
        filter.insert(key, value);
    }
    filter
}

/// Prepend the cutoff `$match` stage to a pipeline (historical runs only).
pub fn with_cutoff_stage(stages: Vec<Document>, cutoff: Cutoff) -> Vec<Document> {
    match cutoff.created_before() {
        Some(_) => std::iter::once(doc! { "$match": cutoff_filter(cutoff) })
            .chain(stages)
            .collect(),
        None => stages,
    }
}

/// `_deleted != true`.
pub fn not_deleted() -> Document {
    doc! { "_deleted": { "$ne": true } }
}

// ─────────────────────────────────────────────────────────────────────────────
// Files
// ─────────────────────────────────────────────────────────────────────────────

pub fn expired_links_filter(cutoff: Cutoff) -> Document {
    with_cutoff(
        doc! { "link_expires": { "$lt": bson::DateTime::from_chrono(cutoff.reference_time()) } },
        cutoff,
    )
}

/// Missing, null and empty links are all "no link".
pub fn no_link_filter(cutoff: Cutoff) -> Document {
    with_cutoff(
        doc! { "$or": [
            { "link": Bson::Null },
            { "link": { "$exists": false } },
            { "link": "" },
        ] },
        cutoff,
    )
}

/// Group files by `backend`, summing counts and stored bytes.
pub fn files_per_backend(cutoff: Cutoff) -> Vec<Document> {
    with_cutoff_stage(
        vec![doc! { "$group": {
            "_id": "$backend",
            "count": { "$sum": 1 },
            "total_bytes": { "$sum": "$length_aggregate_in_bytes" },
        } }],
        cutoff,
    )
}

/// Group files by `status`.
pub fn files_per_status(cutoff: Cutoff) -> Vec<Document> {
    with_cutoff_stage(
        vec![doc! { "$group": { "_id": "$status", "count": { "$sum": 1 } } }],
        cutoff,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Projects
// ─────────────────────────────────────────────────────────────────────────────

/// Single-row pipeline yielding `{home, public, private}` over non-deleted projects.
pub fn project_visibility(cutoff: Cutoff) -> Vec<Document> {
    let flag = |field: &str| doc! { "$sum": { "$cond": { "if": format!("${}", field), "then": 1, "else": 0 } } };
    with_cutoff_stage(
        vec![
            doc! { "$match": not_deleted() },
            doc! { "$project": {
                "is_private": { "$and": [
                    { "$eq": ["$is_private", true] },
                    { "$ne": ["$category", HOME_CATEGORY] },
                ] },
                "is_home": { "$eq": ["$category", HOME_CATEGORY] },
                "is_public": { "$and": [
                    { "$eq": ["$is_private", false] },
                    { "$ne": ["$category", HOME_CATEGORY] },
                ] },
            } },
            doc! { "$group": {
                "_id": Bson::Null,
                "home": flag("is_home"),
                "public": flag("is_public"),
                "private": flag("is_private"),
            } },
        ],
        cutoff,
    )
}

pub fn projects_total_filter(cutoff: Cutoff) -> Document {
    with_cutoff(not_deleted(), cutoff)
}

pub fn projects_deleted_filter(cutoff: Cutoff) -> Document {
    with_cutoff(doc! { "_deleted": true }, cutoff)
}

// ─────────────────────────────────────────────────────────────────────────────
// Nodes
// ─────────────────────────────────────────────────────────────────────────────

/// Count non-deleted nodes in non-private projects, optionally of one type.
/// Yields a single `{total}` row, or nothing when the count is zero.
pub fn public_nodes(node_type: Option<&str>, cutoff: Cutoff) -> Vec<Document> {
    let mut stages = vec![doc! { "$match": not_deleted() }];
    if let Some(node_type) = node_type {
        stages.push(doc! { "$match": { "node_type": node_type } });
    }
    stages.extend([
        doc! { "$lookup": {
            "from": "projects",
            "localField": "project",
            "foreignField": "_id",
            "as": "project",
        } },
        doc! { "$unwind": { "path": "$project" } },
        doc! { "$project": { "project.is_private": 1 } },
        doc! { "$match": { "project.is_private": { "$ne": true } } },
        doc! { "$count": "total" },
    ]);
    with_cutoff_stage(stages, cutoff)
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Nested `$cond` testing each role of [`USER_TYPE_PRIORITY`] in turn.
pub fn user_type_expression() -> Bson {
    USER_TYPE_PRIORITY
        .iter()
        .rev()
        .fold(Bson::String(UNKNOWN_USER_TYPE.to_string()), |otherwise, role| {
            Bson::Document(doc! { "$cond": {
                "if": { "$in": [*role, "$roles"] },
                "then": *role,
                "else": otherwise,
            } })
        })
}

/// Group users holding any known role by their highest-priority role.
pub fn users_per_type(cutoff: Cutoff) -> Vec<Document> {
    with_cutoff_stage(
        vec![
            doc! { "$match": { "roles": { "$in": USER_TYPE_PRIORITY.to_vec() } } },
            doc! { "$project": { "roles": 1, "type": user_type_expression() } },
            doc! { "$group": { "_id": "$type", "count": { "$sum": 1 } } },
        ],
        cutoff,
    )
}

/// Count home projects holding a non-deleted sync marker node.
pub fn sync_client_users(cutoff: Cutoff) -> Vec<Document> {
    with_cutoff_stage(
        vec![
            doc! { "$match": { "_deleted": { "$ne": true }, "name": SYNC_MARKER_NODE } },
            doc! { "$group": { "_id": "$project" } },
            doc! { "$lookup": {
                "from": "projects",
                "localField": "_id",
                "foreignField": "_id",
                "as": "project",
            } },
            doc! { "$unwind": { "path": "$project" } },
            doc! { "$match": { "project.category": HOME_CATEGORY } },
            doc! { "$count": "total" },
        ],
        cutoff,
    )
}

/// Read a numeric aggregation result as a count. Missing or non-numeric is 0.
pub fn count_value(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    }
}

/// Read a group `_id` as a string key; non-string keys are rendered as text.
pub fn raw_group_key(value: Option<&Bson>) -> Option<String> {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => None,
        Some(Bson::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}
