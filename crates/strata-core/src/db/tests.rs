use super::*;
use crate::{
    db::{
        aggregate::{Aggregation, AggregationResult},
        change::{Change, Delta, ListOp, replay},
        predicate::Filter,
        query::Order,
        request::{ObjectChange, UpdatePayload},
        response::ObjectValues,
        subscription::RemovalReason,
    },
    key::Key,
    model::{ExceptionKind, PropertyDefinition, PropertyKind},
    reference::PropertyRef,
    test_support::{article, manual_clock, sample_codec, sample_model},
    value::{Value, Values},
};

fn store_with(config: StoreConfig) -> DataStore {
    let (_, clock) = manual_clock(1_000);
    DataStore::with_clock(Arc::new(sample_codec()), config, clock)
}

fn store() -> DataStore {
    store_with(StoreConfig::default())
}

fn add(store: &DataStore, values: Values) -> (Key, Version) {
    match store.add(AddRequest::new([values])).statuses.remove(0) {
        AddStatus::Success { key, version } => (key, version),
        other => panic!("add failed: {other:?}"),
    }
}

fn change(store: &DataStore, key: &Key, changes: Vec<Change>) -> ChangeStatus {
    store
        .change(ChangeRequest::new([ObjectChange::new(key.clone(), changes)]))
        .statuses
        .remove(0)
        .1
}

fn get(store: &DataStore, request: GetRequest) -> Vec<ObjectValues> {
    store.get(request).unwrap().values
}

///
/// WRITES AND READS
///

#[test]
fn add_then_get_returns_values_and_nothing_before_creation() {
    let store = store();
    let values = article(1, "hello", "a@x.io", &["x"]);
    let (key, version) = add(&store, values.clone());

    let found = get(&store, GetRequest::new([key.clone()]));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].values, values);
    assert_eq!(found[0].first_version, version);
    assert_eq!(store.version(), version);

    assert!(get(&store, GetRequest::new([key]).to_version(version.prev())).is_empty());
}

#[test]
fn second_add_at_the_same_key_already_exists() {
    let store = store();
    let (key, _) = add(&store, article(1, "a", "a@x.io", &[]));

    let statuses = store
        .add(AddRequest::new([article(1, "b", "b@x.io", &[])]))
        .statuses;
    assert_eq!(
        statuses,
        vec![AddStatus::AlreadyExists {
            key,
            reference: None,
        }]
    );
}

#[test]
fn invalid_values_fail_validation_without_committing() {
    let store = store();
    let statuses = store
        .add(AddRequest::new([Values::new().with("title", "untimed")]))
        .statuses;

    assert!(matches!(&statuses[0], AddStatus::ValidationFail { exceptions } if !exceptions.is_empty()));
    assert_eq!(store.version(), Version::ZERO);
}

#[test]
fn unique_collision_names_the_holder_until_it_is_gone() {
    let store = store();
    let (holder, _) = add(&store, article(1, "a", "same@x.io", &[]));
    add(&store, article(2, "b", "other@x.io", &[]));

    for n in [3, 4] {
        let status = store
            .add(AddRequest::new([article(n, "c", "same@x.io", &[])]))
            .statuses
            .remove(0);
        assert_eq!(
            status,
            AddStatus::AlreadyExists {
                key: holder.clone(),
                reference: Some("email".into()),
            }
        );
    }

    store.delete(DeleteRequest::hard([holder]));
    assert!(matches!(
        store
            .add(AddRequest::new([article(3, "c", "same@x.io", &[])]))
            .statuses[0],
        AddStatus::Success { .. }
    ));
}

#[test]
fn changing_into_a_held_unique_value_is_rejected() {
    let store = store();
    let (holder, _) = add(&store, article(1, "a", "a@x.io", &[]));
    let (key, _) = add(&store, article(2, "b", "b@x.io", &[]));

    assert_eq!(
        change(&store, &key, vec![Change::put("email", "a@x.io")]),
        ChangeStatus::AlreadyExists {
            key: holder,
            reference: Some("email".into()),
        }
    );
}

#[test]
fn final_properties_cannot_change_once_set() {
    let store = store();
    let (key, _) = add(&store, article(1, "a", "a@x.io", &[]).with("author", "ada"));

    let status = change(&store, &key, vec![Change::put("author", "grace")]);
    let ChangeStatus::ValidationFail { exceptions } = status else {
        panic!("expected validation failure, got {status:?}");
    };
    assert_eq!(exceptions[0].reference, "author");
    assert_eq!(exceptions[0].kind, ExceptionKind::AlreadySet);
}

#[test]
fn stale_expected_version_is_a_concurrent_change() {
    let store = store();
    let (key, created) = add(&store, article(1, "a", "a@x.io", &[]));
    change(&store, &key, vec![Change::put("body", "v2")]);

    let status = store
        .change(ChangeRequest::new([ObjectChange::new(
            key.clone(),
            [Change::put("body", "v3")],
        )
        .expect_version(created)]))
        .statuses
        .remove(0)
        .1;
    let ChangeStatus::ValidationFail { exceptions } = status else {
        panic!("expected validation failure, got {status:?}");
    };
    assert!(matches!(
        exceptions[0].kind,
        ExceptionKind::ConcurrentChange { expected, .. } if expected == created
    ));
}

#[test]
fn list_operations_apply_in_order() {
    let store = store();
    let (key, _) = add(
        &store,
        article(1, "a", "a@x.io", &[]).with("items", Value::list(["a", "b", "c"])),
    );

    let status = change(
        &store,
        &key,
        vec![Change::list(
            "items",
            [
                ListOp::DeleteAt { index: 1 },
                ListOp::delete_value("c"),
                ListOp::insert(0, "zero"),
                ListOp::append("x"),
                ListOp::append("y"),
                ListOp::append("z"),
            ],
        )],
    );
    assert!(matches!(status, ChangeStatus::Success { .. }));

    let found = get(&store, GetRequest::new([key]));
    assert_eq!(
        found[0].values.get("items"),
        Some(&Value::list(["zero", "a", "x", "y", "z"]))
    );
}

#[test]
fn missing_list_index_is_a_server_failure() {
    let store = store();
    let (key, _) = add(&store, article(1, "a", "a@x.io", &[]).with("items", Value::list(["a"])));

    let status = change(
        &store,
        &key,
        vec![Change::list("items", [ListOp::DeleteAt { index: 4 }])],
    );
    assert!(matches!(status, ChangeStatus::ServerFail { .. }));
}

#[test]
fn empty_change_set_commits_nothing() {
    let store = store();
    let (key, version) = add(&store, article(1, "a", "a@x.io", &[]));

    assert_eq!(
        change(&store, &key, Vec::new()),
        ChangeStatus::Success {
            version,
            server_changes: Vec::new(),
        }
    );
    assert_eq!(store.version(), version);
}

#[test]
fn server_changes_report_assigned_keys_and_index_moves() {
    let store = store();
    let (key, _) = add(&store, article(1, "a", "a@x.io", &[]));

    let status = change(
        &store,
        &key,
        vec![
            Change::IncMapAdd {
                reference: "notes".into(),
                values: vec![Value::text("first"), Value::text("second")],
            },
            Change::put("title", "b"),
        ],
    );
    let ChangeStatus::Success { server_changes, .. } = status else {
        panic!("expected success, got {status:?}");
    };
    assert!(server_changes.iter().any(|delta| matches!(
        delta,
        Delta::IncMapAdded { entries, .. } if entries.iter().map(|(k, _)| *k).eq([0, 1])
    )));
    assert!(server_changes.iter().any(
        |delta| matches!(delta, Delta::IndexUpdate(update) if update.index == "by_title")
    ));
}

#[test]
fn checks_compare_against_the_stored_record_before_any_change() {
    let store = store();
    let (key, version) = add(&store, article(1, "a", "a@x.io", &[]));

    // a failed check wins over a structural error later in the batch
    let status = change(
        &store,
        &key,
        vec![
            Change::check("title", Some(Value::text("nope"))),
            Change::list("title", [ListOp::append("x")]),
        ],
    );
    let ChangeStatus::ValidationFail { exceptions } = status else {
        panic!("expected validation failure, got {status:?}");
    };
    assert_eq!(
        exceptions[0].kind,
        ExceptionKind::FailedCheck {
            expected: Some(Value::text("nope")),
            actual: Some(Value::text("a")),
        }
    );

    // earlier changes in the batch are not visible to the check
    let status = change(
        &store,
        &key,
        vec![
            Change::put("title", "x"),
            Change::check("title", Some(Value::text("a"))),
        ],
    );
    assert!(matches!(status, ChangeStatus::Success { .. }));
    assert!(store.version() > version);

    let found = get(&store, GetRequest::new([key]));
    assert_eq!(found[0].values.get("title"), Some(&Value::text("x")));
}

#[test]
fn inc_map_keys_survive_deleting_the_whole_map() {
    let store = store();
    let (key, _) = add(&store, article(1, "a", "a@x.io", &[]));

    let assigned = |changes: Vec<Change>| -> Vec<u32> {
        let status = change(&store, &key, changes);
        let ChangeStatus::Success { server_changes, .. } = status else {
            panic!("expected success, got {status:?}");
        };
        server_changes
            .iter()
            .filter_map(|delta| match delta {
                Delta::IncMapAdded { entries, .. } => Some(entries.iter().map(|(k, _)| *k)),
                _ => None,
            })
            .flatten()
            .collect()
    };
    let add_note = |text: &str| Change::IncMapAdd {
        reference: "notes".into(),
        values: vec![Value::text(text)],
    };

    assert_eq!(assigned(vec![add_note("one")]), vec![0]);
    assert_eq!(
        assigned(vec![
            Change::delete(PropertyRef::field("notes").key(0u64)),
            add_note("two"),
        ]),
        vec![1]
    );
    assert_eq!(assigned(vec![Change::delete("notes"), add_note("three")]), vec![2]);

    // history replays to the same entries
    let sets = store
        .get_changes(GetChangesRequest::new([key.clone()]))
        .unwrap()
        .changes
        .remove(0)
        .sets;
    let replayed = replay(&sets).unwrap().unwrap();
    let found = get(&store, GetRequest::new([key]));
    assert_eq!(replayed.values, found[0].values);
}

///
/// DELETES
///

#[test]
fn soft_delete_hides_the_record_but_keeps_its_history() {
    let store = store();
    let (key, _) = add(&store, article(1, "a", "a@x.io", &[]));
    store.delete(DeleteRequest::soft([key.clone()]));

    assert!(get(&store, GetRequest::new([key.clone()])).is_empty());
    let found = get(&store, GetRequest::new([key.clone()]).include_soft_deleted());
    assert!(found[0].is_deleted);

    let changes = store
        .get_changes(GetChangesRequest::new([key.clone()]).include_soft_deleted())
        .unwrap()
        .changes;
    let last = changes[0].sets.last().unwrap();
    assert!(last.deltas.contains(&Delta::SoftDelete));

    // a second soft delete finds nothing to delete
    assert_eq!(
        store.delete(DeleteRequest::soft([key.clone()])).statuses,
        vec![(key, DeleteStatus::DoesNotExist)]
    );
}

#[test]
fn soft_delete_releases_unique_claims() {
    let store = store();
    let (key, _) = add(&store, article(1, "a", "a@x.io", &[]));
    store.delete(DeleteRequest::soft([key]));

    assert!(matches!(
        store.add(AddRequest::new([article(2, "b", "a@x.io", &[])])).statuses[0],
        AddStatus::Success { .. }
    ));
}

#[test]
fn hard_delete_purges_under_every_flag() {
    let store = store();
    let (key, version) = add(&store, article(1, "a", "a@x.io", &[]));
    store.delete(DeleteRequest::hard([key.clone()]));

    for request in [
        GetRequest::new([key.clone()]),
        GetRequest::new([key.clone()]).include_soft_deleted(),
        GetRequest::new([key.clone()]).to_version(version),
        GetRequest::new([key.clone()])
            .include_soft_deleted()
            .to_version(version),
    ] {
        assert!(get(&store, request).is_empty());
    }
}

///
/// HISTORY
///

#[test]
fn replaying_the_change_feed_reproduces_get() {
    let store = store();
    let (key, _) = add(
        &store,
        article(1, "a", "a@x.io", &["x", "y"]).with("labels", Value::set(["l1"])),
    );
    change(&store, &key, vec![Change::put("body", "text")]);
    change(
        &store,
        &key,
        vec![
            Change::SetItems {
                reference: "labels".into(),
                add: vec![Value::text("l2")],
                remove: vec![Value::text("l1")],
            },
            Change::list("tags", [ListOp::append("z")]),
            Change::delete("email"),
        ],
    );

    let sets = store
        .get_changes(GetChangesRequest::new([key.clone()]))
        .unwrap()
        .changes
        .remove(0)
        .sets;
    assert_eq!(sets.len(), 3);

    let replayed = replay(&sets).unwrap().unwrap();
    let current = get(&store, GetRequest::new([key]));
    assert_eq!(replayed.values, current[0].values);
}

#[test]
fn time_travel_reads_see_older_states() {
    let store = store();
    let (key, v1) = add(&store, article(1, "a", "a@x.io", &[]));
    change(&store, &key, vec![Change::put("title", "b")]);

    let old = get(&store, GetRequest::new([key.clone()]).to_version(v1));
    assert_eq!(old[0].values.get("title"), Some(&Value::text("a")));
    let new = get(&store, GetRequest::new([key]));
    assert_eq!(new[0].values.get("title"), Some(&Value::text("b")));
}

#[test]
fn change_feed_windows_and_caps() {
    let store = store();
    let (key, v1) = add(&store, article(1, "a", "a@x.io", &[]));
    change(&store, &key, vec![Change::put("body", "1")]);
    change(&store, &key, vec![Change::put("title", "c")]);

    let after_creation = store
        .get_changes(GetChangesRequest::new([key.clone()]).from_version(v1))
        .unwrap();
    assert_eq!(after_creation.changes[0].sets.len(), 2);

    let newest = store
        .get_changes(GetChangesRequest::new([key.clone()]).max_versions(1))
        .unwrap();
    assert_eq!(newest.changes[0].sets.len(), 1);
    assert_eq!(newest.changes[0].sets[0].version, store.version());

    let selected = store
        .get_changes(GetChangesRequest::new([key]).from_version(v1).select(["body"]))
        .unwrap();
    let fields: Vec<_> = selected.changes[0]
        .sets
        .iter()
        .flat_map(|set| set.deltas.iter().filter_map(Delta::reference))
        .collect();
    assert_eq!(fields, vec![&PropertyRef::field("body")]);
}

#[test]
fn inverted_change_window_is_rejected() {
    let store = store();
    let (key, v1) = add(&store, article(1, "a", "a@x.io", &[]));

    let err = store
        .get_changes(
            GetChangesRequest::new([key])
                .from_version(v1)
                .to_version(v1.prev()),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Request(RequestError::InvertedVersions { .. })
    ));
}

#[test]
fn stores_without_history_reject_version_bounded_reads() {
    let store = store_with(StoreConfig::without_history());
    let (key, version) = add(&store, article(1, "a", "a@x.io", &[]));
    change(&store, &key, vec![Change::put("body", "x")]);

    let err = store
        .scan(ScanRequest::new().to_version(version))
        .unwrap_err();
    assert!(matches!(err, Error::Request(RequestError::HistoryDisabled)));

    let changes = store
        .get_changes(GetChangesRequest::new([key.clone()]))
        .unwrap()
        .changes;
    assert_eq!(changes[0].sets.len(), 1);
    assert_eq!(changes[0].sets[0].deltas[0], Delta::ObjectCreate);

    // latest state stands in for any version after creation
    let found = get(&store, GetRequest::new([key]).to_version(version));
    assert_eq!(found[0].values.get("body"), Some(&Value::text("x")));
}

///
/// SCANS
///

fn seeded(count: i64) -> (DataStore, Vec<Key>) {
    let store = store();
    let keys = (0..count)
        .map(|n| {
            add(
                &store,
                article(n, &format!("t{}", count - n), &format!("{n}@x.io"), &[]),
            )
            .0
        })
        .collect();

    (store, keys)
}

#[test]
fn reversed_timestamp_keys_scan_newest_first() {
    let (store, keys) = seeded(4);

    let scanned = store
        .scan(ScanRequest::new().start_at(keys[2].clone()))
        .unwrap();
    assert_eq!(
        scanned.keys(),
        vec![keys[2].clone(), keys[1].clone(), keys[0].clone()]
    );
    assert_eq!(scanned.fetch_type, FetchType::ByKey);

    let exclusive = store
        .scan(ScanRequest::new().start_at(keys[2].clone()).exclude_start())
        .unwrap();
    assert_eq!(exclusive.keys(), vec![keys[1].clone(), keys[0].clone()]);
}

#[test]
fn descending_scan_is_the_exact_reverse() {
    let (store, _) = seeded(6);
    let filter = Filter::gte("rank", 1i64) & Filter::lt("rank", 5i64);

    let asc = store
        .scan(ScanRequest::new().order(Order::by("rank")).filter(filter.clone()))
        .unwrap();
    let desc = store
        .scan(ScanRequest::new().order(Order::by("rank").desc()).filter(filter))
        .unwrap();

    let mut reversed = desc.keys();
    reversed.reverse();
    assert_eq!(asc.keys().len(), 4);
    assert_eq!(asc.keys(), reversed);
    assert_eq!(
        asc.fetch_type,
        FetchType::ByIndex {
            index: "by_rank".into()
        }
    );
}

#[test]
fn index_scans_start_at_the_start_records_position() {
    let (store, keys) = seeded(4);

    // titles run t4, t3, t2, t1 for keys 0..4
    let scanned = store
        .scan(
            ScanRequest::new()
                .order(Order::by("title"))
                .start_at(keys[1].clone())
                .limit(2),
        )
        .unwrap();
    assert_eq!(scanned.keys(), vec![keys[1].clone(), keys[0].clone()]);
}

#[test]
fn ordered_scans_reject_a_start_without_a_position() {
    let (store, _) = seeded(3);
    let unknown = Key::new([0xff; 8]);

    for request in [
        ScanRequest::new().order(Order::by("title")),
        ScanRequest::new().order(Order::by("email")).allow_full_scan(),
    ] {
        let err = store.scan(request.start_at(unknown.clone())).unwrap_err();
        assert!(matches!(
            err,
            Error::Request(RequestError::UnrankedStart { key, .. }) if key == unknown
        ));
    }
}

#[test]
fn unindexed_orders_need_a_full_scan() {
    let (store, _) = seeded(3);

    let err = store
        .scan(ScanRequest::new().order(Order::by("email")))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Request(RequestError::FullScanRequired { .. })
    ));

    let scanned = store
        .scan(ScanRequest::new().order(Order::by("email")).allow_full_scan())
        .unwrap();
    assert_eq!(scanned.values.len(), 3);
    assert_eq!(scanned.fetch_type, FetchType::ByKey);
    assert_eq!(
        scanned.values[0].values.get("email"),
        Some(&Value::text("0@x.io"))
    );
}

#[test]
fn wildcard_orders_rank_each_record_at_its_lowest_entry() {
    let store = store();
    let (b, _) = add(&store, article(1, "b", "b@x.io", &["m", "z"]));
    let (a, _) = add(&store, article(2, "a", "a@x.io", &["n", "c"]));
    add(&store, article(3, "untagged", "u@x.io", &[]));

    let scanned = store
        .scan(ScanRequest::new().order(Order::by(PropertyRef::field("tags").any())))
        .unwrap();
    assert_eq!(scanned.keys(), vec![a, b]);
}

#[test]
fn scan_limits_are_enforced() {
    let (store, _) = seeded(5);

    assert_eq!(store.scan(ScanRequest::new().limit(2)).unwrap().values.len(), 2);
    assert!(matches!(
        store.scan(ScanRequest::new().limit(0)).unwrap_err(),
        Error::Request(RequestError::LimitOutOfRange { .. })
    ));
}

#[test]
fn selection_and_aggregations_shape_the_response() {
    let (store, keys) = seeded(3);

    let response = store
        .get(
            GetRequest::new(keys)
                .select(["title"])
                .aggregate("total", Aggregation::Sum("rank".into()))
                .aggregate("first", Aggregation::Min("title".into())),
        )
        .unwrap();
    assert!(response.values.iter().all(|v| v.values.len() == 1));
    assert_eq!(
        response.aggregations["total"],
        AggregationResult::Sum(Some(Value::Int(3)))
    );
    assert_eq!(
        response.aggregations["first"],
        AggregationResult::Min(Some(Value::text("t1")))
    );
}

#[test]
fn invalid_regex_is_a_request_error() {
    let (store, keys) = seeded(1);

    let err = store
        .get(GetRequest::new(keys).filter(Filter::regex("title", "(")))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Request(RequestError::InvalidFilter(_))
    ));
}

///
/// SUBSCRIPTIONS (one-shot)
///

#[test]
fn update_requests_must_match_their_operation() {
    let (store, keys) = seeded(2);

    assert!(matches!(
        store.get_updates(UpdatesRequest::scan(Order::by_key(), 5)),
        Err(Error::Request(RequestError::SourceMismatch { .. }))
    ));
    assert!(matches!(
        store.scan_updates(UpdatesRequest::keys(keys)),
        Err(Error::Request(RequestError::SourceMismatch { .. }))
    ));
}

#[test]
fn one_shot_updates_announce_the_window_then_the_payload() {
    let (store, keys) = seeded(3);

    let response = store
        .scan_updates(UpdatesRequest::scan(Order::by_key(), 2).payload(UpdatePayload::Values))
        .unwrap();
    assert_eq!(
        response.updates[0],
        Update::OrderedKeys {
            keys: vec![keys[2].clone(), keys[1].clone()],
            version: store.version(),
        }
    );
    assert!(matches!(
        &response.updates[1],
        Update::InitialValues { values, .. } if values.len() == 2
    ));
}

#[test]
fn known_windows_receive_only_the_difference() {
    let (store, keys) = seeded(3);

    let response = store
        .get_updates(
            UpdatesRequest::keys(keys.clone()).known_window([keys[1].clone(), Key::new([9; 8])]),
        )
        .unwrap();
    let version = store.version();
    assert_eq!(
        response.updates[0],
        Update::Removal {
            key: Key::new([9; 8]),
            version,
            reason: RemovalReason::NotInRange,
        }
    );
    assert!(matches!(&response.updates[1], Update::Addition { key, index: 0, .. } if *key == keys[0]));
    assert!(matches!(&response.updates[2], Update::Addition { key, index: 2, .. } if *key == keys[2]));
}

#[test]
fn property_ordered_subscriptions_need_an_index() {
    let (store, _) = seeded(2);

    assert!(matches!(
        store.scan_updates(UpdatesRequest::scan(Order::by("email"), 5)),
        Err(Error::Request(RequestError::FullScanRequired { .. }))
    ));
}

#[test]
fn listening_outside_a_runtime_is_rejected() {
    let store = store();

    assert!(matches!(
        store.listen(UpdatesRequest::scan(Order::by_key(), 5)),
        Err(Error::Request(RequestError::RuntimeUnavailable))
    ));
}

///
/// MODEL UPDATES
///

#[test]
fn compatible_models_swap_in_and_reindex() {
    let store = store();
    add(&store, article(1, "a", "a@x.io", &[]));

    let mut next = sample_model();
    next.version = 2;
    next.properties
        .push(PropertyDefinition::new("subtitle", PropertyKind::text()));
    store.update_model(next).unwrap();

    assert_eq!(store.model().version, 2);
    assert_eq!(
        store
            .scan(ScanRequest::new().order(Order::by("title")))
            .unwrap()
            .values
            .len(),
        1
    );
}

#[test]
fn incompatible_models_are_rejected() {
    let store = store();
    let mut next = sample_model();
    next.version = 2;
    next.properties
        .push(PropertyDefinition::new("required_now", PropertyKind::text()).required());

    assert!(matches!(
        store.update_model(next),
        Err(Error::Request(RequestError::IncompatibleModel { version: 2, .. }))
    ));
}
