// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for MongoDB.
//!
//! Provides helpers to spin up a MongoDB container and seed the operational
//! collections for integration tests.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::{Client, Database};
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

/// Create a vanilla MongoDB container.
///
/// Uses the official mongo:6 image. Waits for "Waiting for connections".
pub fn mongo_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("mongo", "6")
        .with_exposed_port(27017)
        .with_wait_for(WaitFor::message_on_stdout("Waiting for connections"));
    docker.run(image)
}

/// Connection string for a database in the container.
pub fn mongo_url(container: &Container<'_, GenericImage>, database: &str) -> String {
    let port = container.get_host_port_ipv4(27017);
    format!("mongodb://127.0.0.1:{}/{}", port, database)
}

/// A MongoDB container with a handle on one database.
pub struct TestMongo<'a> {
    #[allow(dead_code)] // Kept alive for container lifetime
    container: Container<'a, GenericImage>,
    pub url: String,
    pub db: Database,
}

impl<'a> TestMongo<'a> {
    pub async fn new(docker: &'a Cli, database: &str) -> Self {
        let container = mongo_container(docker);
        let url = mongo_url(&container, database);
        let client = Client::with_uri_str(&url).await.expect("mongo client");
        let db = client.database(database);
        Self { container, url, db }
    }

    pub async fn insert(&self, collection: &str, docs: Vec<Document>) {
        self.db
            .collection::<Document>(collection)
            .insert_many(docs)
            .await
            .expect("seed insert");
    }
}

pub fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

pub fn bson_time(raw: &str) -> bson::DateTime {
    bson::DateTime::from_chrono(at(raw))
}

/// A file document.
pub fn file(created: &str, backend: Option<&str>, status: &str, link: Option<&str>, link_expires: &str, bytes: i64) -> Document {
    let mut doc = doc! {
        "_created": bson_time(created),
        "status": status,
        "link_expires": bson_time(link_expires),
        "length_aggregate_in_bytes": bytes,
    };
    if let Some(backend) = backend {
        doc.insert("backend", backend);
    }
    if let Some(link) = link {
        doc.insert("link", link);
    }
    doc
}

/// A project document with a fixed id.
pub fn project(id: ObjectId, created: &str, category: &str, is_private: bool, deleted: bool) -> Document {
    doc! {
        "_id": id,
        "_created": bson_time(created),
        "category": category,
        "is_private": is_private,
        "_deleted": deleted,
    }
}

/// A node document.
pub fn node(created: &str, project: ObjectId, node_type: &str, name: &str) -> Document {
    doc! {
        "_created": bson_time(created),
        "project": project,
        "node_type": node_type,
        "name": name,
    }
}

/// A user document.
pub fn user(created: &str, roles: &[&str]) -> Document {
    doc! {
        "_created": bson_time(created),
        "roles": roles.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
    }
}
