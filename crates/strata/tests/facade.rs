use futures::StreamExt;
use std::sync::Arc;
use strata::prelude::*;

fn notes() -> DataStore {
    let model = DataModel::builder("Note", 1)
        .property(PropertyDefinition::new("id", PropertyKind::uint()).required())
        .property(PropertyDefinition::new("text", PropertyKind::text()))
        .key(strata::core::model::KeyDefinition::Parts(vec![
            strata::core::model::KeyPart::new("id"),
        ]))
        .build()
        .unwrap();

    DataStore::new(
        Arc::new(ModelCodec::new(model).unwrap()),
        StoreConfig::default(),
    )
}

#[tokio::test]
async fn prelude_covers_a_write_read_listen_round() {
    let store = notes();
    let mut updates = store
        .listen(UpdatesRequest::scan(Order::by_key(), 5))
        .unwrap();
    assert!(matches!(
        updates.next().await,
        Some(Update::OrderedKeys { keys, .. }) if keys.is_empty()
    ));

    store.add(AddRequest::new([Values::new()
        .with("id", Value::Uint(1))
        .with("text", "hello")]));

    let Some(Update::Addition { key, values, .. }) = updates.next().await else {
        panic!("expected an addition");
    };
    assert_eq!(values.get("text"), Some(&Value::text("hello")));

    let read = store.get(GetRequest::new([key])).unwrap();
    assert_eq!(read.values.len(), 1);
    assert_eq!(read.version, store.version());

    updates.cancel();
    assert_eq!(updates.state(), SubscriptionState::Cancelled);
}
