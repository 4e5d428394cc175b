mod common;

use common::{add, task, task_store, task_store_with};
use strata_core::{
    db::{
        change::{Change, Delta, replay},
        config::StoreConfig,
        predicate::Filter,
        query::Order,
        request::{
            ChangeRequest, DeleteRequest, GetChangesRequest, ObjectChange, ScanChangesRequest,
            ScanRequest,
        },
    },
    value::Value,
};

#[test]
fn scans_read_any_past_version() {
    let store = task_store();
    let a = add(&store, task(1, "a", 30));
    let b = add(&store, task(2, "b", 20));
    let before = store.version();

    store.change(ChangeRequest::new([ObjectChange::new(
        a.clone(),
        [Change::put("priority", 10i64)],
    )]));
    add(&store, task(3, "c", 5));

    let order = || ScanRequest::new().order(Order::by("priority"));
    assert_eq!(
        store.scan(order().to_version(before)).unwrap().keys(),
        vec![b.clone(), a.clone()]
    );
    assert_eq!(store.scan(order()).unwrap().keys()[1..], [a, b]);
}

#[test]
fn scan_changes_follow_the_scan_window() {
    let store = task_store();
    let keys: Vec<_> = (1..=4)
        .map(|id| add(&store, task(id, "t", i64::try_from(id).unwrap() * 10)))
        .collect();
    let mark = store.version();

    for key in &keys[1..3] {
        store.change(ChangeRequest::new([ObjectChange::new(
            key.clone(),
            [Change::put("title", "edited")],
        )]));
    }

    let response = store
        .scan_changes(
            ScanChangesRequest::new(
                ScanRequest::new()
                    .order(Order::by("priority"))
                    .filter(Filter::lte("priority", 30i64)),
            )
            .from_version(mark),
        )
        .unwrap();

    let changed: Vec<_> = response.changes.iter().map(|c| c.key.clone()).collect();
    assert_eq!(changed, keys[1..3].to_vec());
    assert!(response.changes.iter().all(|c| c.sets.len() == 1));
}

#[test]
fn a_records_feed_rebuilds_it_across_recreation() {
    let store = task_store();
    let key = add(&store, task(7, "first life", 1));
    store.delete(DeleteRequest::soft([key.clone()]));
    add(&store, task(7, "second life", 2));

    let sets = store
        .get_changes(GetChangesRequest::new([key]))
        .unwrap()
        .changes
        .remove(0)
        .sets;
    let creations = sets
        .iter()
        .filter(|set| set.deltas.contains(&Delta::ObjectCreate))
        .count();
    assert_eq!(creations, 2);

    let state = replay(&sets).unwrap().unwrap();
    assert!(!state.deleted);
    assert_eq!(state.values.get("title"), Some(&Value::text("second life")));
}

#[test]
fn stores_loaded_from_json_config_drop_history() {
    let config = StoreConfig::from_json(r#"{ "keep_all_versions": false }"#).unwrap();
    let store = task_store_with(config);
    let key = add(&store, task(1, "a", 1));
    store.change(ChangeRequest::new([ObjectChange::new(
        key.clone(),
        [Change::put("title", "b")],
    )]));

    let sets = store
        .get_changes(GetChangesRequest::new([key]))
        .unwrap()
        .changes
        .remove(0)
        .sets;
    assert_eq!(sets.len(), 1);
    assert!(sets[0].deltas.contains(&Delta::Put {
        reference: "title".into(),
        value: Value::text("b"),
    }));
}
