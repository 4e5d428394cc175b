mod common;

use common::{add, closed, next, task, task_store};
use std::time::Duration;
use strata_core::{
    clock::Version,
    db::{
        change::{Change, Delta},
        predicate::Filter,
        query::Order,
        request::{
            ChangeRequest, DeleteRequest, GetRequest, ObjectChange, ScanRequest, UpdatePayload,
            UpdatesRequest,
        },
        response::ProcessStatus,
        subscription::{RemovalReason, SubscriptionState, Update},
    },
    value::Value,
};

#[tokio::test]
async fn activation_announces_the_window_and_its_values() {
    let store = task_store();
    let keys = [
        add(&store, task(1, "one", 10)),
        add(&store, task(2, "two", 20)),
        add(&store, task(3, "three", 30)),
    ];

    let mut updates = store
        .listen(UpdatesRequest::scan(Order::by_key(), 10).payload(UpdatePayload::Values))
        .unwrap();

    assert_eq!(
        next(&mut updates).await,
        Update::OrderedKeys {
            keys: keys.to_vec(),
            version: store.version(),
        }
    );
    let Update::InitialValues { values, .. } = next(&mut updates).await else {
        panic!("expected initial values");
    };
    assert_eq!(values.len(), 3);
    assert_eq!(values[1].values.get("title"), Some(&Value::text("two")));
}

#[tokio::test]
async fn commits_arrive_as_additions_changes_and_removals() {
    let store = task_store();
    let mut updates = store
        .listen(UpdatesRequest::scan(Order::by_key(), 10))
        .unwrap();
    assert_eq!(
        next(&mut updates).await,
        Update::OrderedKeys {
            keys: Vec::new(),
            version: Version::ZERO,
        }
    );

    let key = add(&store, task(1, "draft", 10));
    assert!(matches!(
        next(&mut updates).await,
        Update::Addition { key: added, index: 0, .. } if added == key
    ));

    store.change(ChangeRequest::new([ObjectChange::new(
        key.clone(),
        [Change::put("title", "final")],
    )]));
    let Update::Change { deltas, .. } = next(&mut updates).await else {
        panic!("expected a change");
    };
    assert!(deltas.contains(&Delta::Put {
        reference: "title".into(),
        value: Value::text("final"),
    }));

    store.delete(DeleteRequest::soft([key.clone()]));
    assert_eq!(
        next(&mut updates).await,
        Update::Removal {
            key,
            version: store.version(),
            reason: RemovalReason::SoftDeleted,
        }
    );
}

#[tokio::test]
async fn bounded_windows_evict_and_refill() {
    let store = task_store();
    let low = add(&store, task(1, "low", 10));
    let mid = add(&store, task(2, "mid", 20));
    add(&store, task(3, "high", 30));

    let mut updates = store
        .listen(UpdatesRequest::scan(Order::by("priority"), 2))
        .unwrap();
    assert!(matches!(
        next(&mut updates).await,
        Update::OrderedKeys { keys, .. } if keys == vec![low.clone(), mid.clone()]
    ));

    // a better-ranked record pushes the last entry out
    let urgent = add(&store, task(4, "urgent", 5));
    assert!(matches!(
        next(&mut updates).await,
        Update::Removal { key, reason: RemovalReason::NotInRange, .. } if key == mid
    ));
    assert!(matches!(
        next(&mut updates).await,
        Update::Addition { key, index: 0, .. } if key == urgent
    ));

    // removing it pulls the evicted record back in
    store.delete(DeleteRequest::hard([urgent.clone()]));
    assert!(matches!(
        next(&mut updates).await,
        Update::Removal { key, reason: RemovalReason::HardDeleted, .. } if key == urgent
    ));
    assert!(matches!(
        next(&mut updates).await,
        Update::Addition { key, index: 1, .. } if key == mid
    ));
}

#[tokio::test]
async fn reranked_records_move_inside_an_ordered_window() {
    let store = task_store();
    let first = add(&store, task(1, "one", 10));
    let second = add(&store, task(2, "two", 20));
    let third = add(&store, task(3, "three", 30));

    let mut updates = store
        .listen(UpdatesRequest::scan(Order::by("priority"), 10))
        .unwrap();
    assert!(matches!(
        next(&mut updates).await,
        Update::OrderedKeys { keys, .. }
            if keys == vec![first.clone(), second.clone(), third.clone()]
    ));

    store.change(ChangeRequest::new([ObjectChange::new(
        first.clone(),
        [Change::put("priority", 25i64)],
    )]));
    assert!(matches!(
        next(&mut updates).await,
        Update::Removal { key, reason: RemovalReason::NotInRange, .. } if key == first
    ));
    assert!(matches!(
        next(&mut updates).await,
        Update::Addition { key, index: 1, .. } if key == first
    ));

    let reordered = store
        .scan(ScanRequest::new().order(Order::by("priority")))
        .unwrap()
        .keys();
    assert_eq!(reordered, vec![second, first, third]);
}

#[tokio::test]
async fn records_leaving_the_filter_are_removed() {
    let store = task_store();
    let key = add(&store, task(1, "one", 10));

    let mut updates = store
        .listen(UpdatesRequest::keys([key.clone()]).filter(Filter::gte("priority", 5i64)))
        .unwrap();
    next(&mut updates).await;

    store.change(ChangeRequest::new([ObjectChange::new(
        key.clone(),
        [Change::put("priority", 1i64)],
    )]));
    assert!(matches!(
        next(&mut updates).await,
        Update::Removal { key: removed, reason: RemovalReason::NotInRange, .. } if removed == key
    ));

    store.change(ChangeRequest::new([ObjectChange::new(
        key.clone(),
        [Change::put("priority", 7i64)],
    )]));
    assert!(matches!(
        next(&mut updates).await,
        Update::Addition { key: added, index: 0, .. } if added == key
    ));
}

#[tokio::test]
async fn cancelling_closes_the_stream_and_detaches_the_listener() {
    let store = task_store();
    let mut updates = store
        .listen(UpdatesRequest::scan(Order::by_key(), 10))
        .unwrap();
    assert_eq!(store.subscriptions(), 1);

    updates.cancel();
    assert_eq!(updates.state(), SubscriptionState::Cancelled);
    closed(&mut updates).await;

    add(&store, task(1, "after", 1));
    assert_eq!(store.subscriptions(), 0);
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_subscription() {
    let store = task_store();
    let updates = store
        .listen(UpdatesRequest::scan(Order::by_key(), 10))
        .unwrap();
    drop(updates);

    let mut id = 0;
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.subscriptions() > 0 {
            id += 1;
            add(&store, task(id, "tick", 0));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener detaches after drop");
}

#[tokio::test]
async fn live_filters_must_be_reevaluable() {
    let store = task_store();

    assert!(
        store
            .listen(UpdatesRequest::scan(Order::by_key(), 10).filter(Filter::regex("title", "^a")))
            .is_err()
    );
}

#[tokio::test]
async fn replicas_follow_a_subscription() {
    let source = task_store();
    let replica = task_store();
    let first = add(&source, task(1, "one", 10));

    let mut updates = source
        .listen(UpdatesRequest::scan(Order::by_key(), 10).payload(UpdatePayload::Values))
        .unwrap();

    let second = add(&source, task(2, "two", 20));
    source.change(ChangeRequest::new([ObjectChange::new(
        second.clone(),
        [Change::put("title", "two, edited"), Change::put("priority", 25i64)],
    )]));
    source.delete(DeleteRequest::soft([first.clone()]));

    let mut statuses = Vec::new();
    for _ in 0..5 {
        let update = next(&mut updates).await;
        statuses.push(replica.process_update(&update).status);
    }

    assert_eq!(statuses[0], ProcessStatus::Ignored);
    assert_eq!(
        statuses[1],
        ProcessStatus::Applied {
            keys: vec![first.clone()]
        }
    );
    assert!(
        statuses[2..]
            .iter()
            .all(|status| matches!(status, ProcessStatus::Applied { .. }))
    );

    let read = |store: &strata_core::db::DataStore| {
        store
            .get(GetRequest::new([first.clone(), second.clone()]))
            .unwrap()
            .values
            .into_iter()
            .map(|object| (object.key, object.values))
            .collect::<Vec<_>>()
    };
    assert_eq!(read(&replica), read(&source));
    assert_eq!(read(&replica).len(), 1);
    assert!(replica.version() > source.version());
}

#[tokio::test]
async fn one_shot_updates_replay_history_since_a_version() {
    let store = task_store();
    let key = add(&store, task(1, "one", 10));
    let created = store.version();
    for title in ["two", "three"] {
        store.change(ChangeRequest::new([ObjectChange::new(
            key.clone(),
            [Change::put("title", title)],
        )]));
    }

    let response = store
        .get_updates(UpdatesRequest::keys([key.clone()]).from_version(created))
        .unwrap();
    let versions: Vec<Version> = response.updates[1..].iter().map(Update::version).collect();

    assert!(matches!(response.updates[0], Update::OrderedKeys { .. }));
    assert_eq!(versions.len(), 2);
    assert!(versions[0] > created && versions[0] < versions[1]);
    assert_eq!(versions[1], store.version());
}
