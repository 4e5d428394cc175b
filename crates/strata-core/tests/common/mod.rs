//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use strata_core::{
    db::{
        DataStore,
        config::StoreConfig,
        request::AddRequest,
        response::AddStatus,
        subscription::{LiveUpdates, Update},
    },
    key::Key,
    model::{DataModel, IndexDefinition, KeyDefinition, KeyPart, ModelCodec, PropertyDefinition, PropertyKind},
    value::{Value, Values},
};

/// `Task`: keyed by `id`, indexed by `priority`.
pub fn task_model() -> DataModel {
    DataModel::builder("Task", 1)
        .property(PropertyDefinition::new("id", PropertyKind::uint()).required())
        .property(PropertyDefinition::new("title", PropertyKind::text()).required())
        .property(PropertyDefinition::new("priority", PropertyKind::int()))
        .property(PropertyDefinition::new(
            "tags",
            PropertyKind::set(PropertyKind::text()),
        ))
        .key(KeyDefinition::Parts(vec![KeyPart::new("id")]))
        .index(IndexDefinition::new("by_priority").part("priority"))
        .build()
        .expect("task model")
}

pub fn task_store() -> DataStore {
    task_store_with(StoreConfig::default())
}

pub fn task_store_with(config: StoreConfig) -> DataStore {
    let codec = ModelCodec::new(task_model()).expect("task codec");

    DataStore::new(Arc::new(codec), config)
}

pub fn task(id: u64, title: &str, priority: i64) -> Values {
    Values::new()
        .with("id", Value::Uint(id))
        .with("title", title)
        .with("priority", priority)
}

pub fn add(store: &DataStore, values: Values) -> Key {
    match store.add(AddRequest::new([values])).statuses.remove(0) {
        AddStatus::Success { key, .. } => key,
        other => panic!("add failed: {other:?}"),
    }
}

/// Next message, failing the test when none arrives in time.
pub async fn next(updates: &mut LiveUpdates) -> Update {
    tokio::time::timeout(Duration::from_secs(5), updates.next())
        .await
        .expect("update within timeout")
        .expect("open subscription")
}

/// Wait until the listener has exited and closed the stream.
pub async fn closed(updates: &mut LiveUpdates) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while updates.next().await.is_some() {}
    })
    .await
    .expect("stream closes within timeout");
}
