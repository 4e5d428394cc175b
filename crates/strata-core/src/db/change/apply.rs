//! Module: change::apply
//! Responsibility: structural application of changes and replay of deltas.
//! Does not own: schema validation, uniqueness or versioning.

use crate::{
    clock::Version,
    db::change::{Change, Delta, DeltaSet, ListOp},
    model::{ExceptionKind, ValidationException},
    reference::{PropertyRef, Segment},
    value::{IncMap, Value, Values},
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error as ThisError;

///
/// ApplyError
///
/// State mismatch between a change and the current record. Not caused by
/// invalid input values, so it surfaces as a server failure.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ApplyError {
    #[error("'{reference}' does not exist")]
    MissingValue { reference: String },

    #[error("list index {index} is out of range at '{reference}' (len {len})")]
    MissingListIndex {
        reference: String,
        index: u32,
        len: usize,
    },

    #[error("'{reference}' is a {kind}, not a {expected}")]
    WrongKind {
        reference: String,
        expected: &'static str,
        kind: &'static str,
    },

    #[error("wildcard reference '{reference}' cannot be written")]
    WildcardTarget { reference: String },

    #[error("field delta at version {version} precedes object creation")]
    NoObject { version: Version },
}

/// Evaluate every `Check` of a batch against the stored values. Any
/// failure aborts the whole batch before a single change is applied.
pub(crate) fn failed_checks(current: &Values, changes: &[Change]) -> Vec<ValidationException> {
    changes
        .iter()
        .filter_map(|change| match change {
            Change::Check {
                reference,
                expected,
            } => {
                let actual = reference.get(current);
                (actual != expected.as_ref()).then(|| {
                    ValidationException::new(
                        reference.to_string(),
                        ExceptionKind::FailedCheck {
                            expected: expected.clone(),
                            actual: actual.cloned(),
                        },
                    )
                })
            }
            _ => None,
        })
        .collect()
}

/// Apply requested changes in order to a working copy of the values and
/// return the deltas they produce. Checks are skipped here; structural
/// errors abort immediately and leave the caller to discard the copy.
pub(crate) fn apply_changes(
    values: &mut Values,
    changes: &[Change],
) -> Result<Vec<Delta>, ApplyError> {
    let mut deltas = Vec::with_capacity(changes.len());

    for change in changes {
        match change {
            Change::Put { reference, value } => {
                let previous_tag = match reference.get(values) {
                    Some(Value::Tagged(previous)) => Some(previous.tag.clone()),
                    _ => None,
                };
                put(values, reference, value.clone())?;

                let delta = match value {
                    Value::Tagged(next)
                        if previous_tag.as_deref().is_some_and(|tag| tag != next.tag) => {
                        Delta::TypeChange {
                            reference: reference.clone(),
                            tag: next.tag.clone(),
                            value: (*next.value).clone(),
                        }
                    }
                    _ => Delta::Put {
                        reference: reference.clone(),
                        value: value.clone(),
                    },
                };
                deltas.push(delta);
            }
            Change::Delete { reference } => {
                delete(values, reference)?;
                deltas.push(Delta::Delete {
                    reference: reference.clone(),
                });
            }
            Change::List { reference, ops } => {
                apply_list(values, reference, ops)?;
                deltas.push(Delta::List {
                    reference: reference.clone(),
                    ops: ops.clone(),
                });
            }
            Change::SetItems {
                reference,
                add,
                remove,
            } => {
                apply_set(values, reference, add, remove)?;
                deltas.push(Delta::SetItems {
                    reference: reference.clone(),
                    add: add.clone(),
                    remove: remove.clone(),
                });
            }
            Change::IncMapAdd {
                reference,
                values: added,
            } => {
                let map = inc_map_mut(values, reference)?;
                let entries = added
                    .iter()
                    .map(|value| (map.push(value.clone()), value.clone()))
                    .collect();
                deltas.push(Delta::IncMapAdded {
                    reference: reference.clone(),
                    entries,
                });
            }
            Change::Check { .. } => {}
        }
    }

    Ok(deltas)
}

///
/// ReplayState
/// A record rebuilt from its delta sets.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplayState {
    pub values: Values,
    pub deleted: bool,
    /// Version of the most recent `ObjectCreate`.
    pub created: Version,
    /// Version of the last replayed delta set.
    pub version: Version,
}

/// Replay delta sets in order from empty.
pub fn replay(sets: &[DeltaSet]) -> Result<Option<ReplayState>, ApplyError> {
    replay_until(sets, None)
}

/// Replay delta sets with versions up to and including `upto`.
pub(crate) fn replay_until(
    sets: &[DeltaSet],
    upto: Option<Version>,
) -> Result<Option<ReplayState>, ApplyError> {
    let mut state: Option<ReplayState> = None;

    for set in sets {
        if upto.is_some_and(|upto| set.version > upto) {
            break;
        }
        for delta in &set.deltas {
            if matches!(delta, Delta::ObjectCreate) {
                state = Some(ReplayState {
                    values: Values::new(),
                    deleted: false,
                    created: set.version,
                    version: set.version,
                });
                continue;
            }
            let current = state.as_mut().ok_or(ApplyError::NoObject {
                version: set.version,
            })?;
            apply_delta(current, delta)?;
        }
        if let Some(current) = state.as_mut() {
            current.version = set.version;
        }
    }

    Ok(state)
}

/// Apply one delta set produced elsewhere on top of `values`. A creation
/// marker restarts from an empty bag.
pub(crate) fn apply_deltas(values: Values, deltas: &[Delta]) -> Result<ReplayState, ApplyError> {
    let mut state = ReplayState {
        values,
        deleted: false,
        created: Version::ZERO,
        version: Version::ZERO,
    };
    for delta in deltas {
        if matches!(delta, Delta::ObjectCreate) {
            state.values = Values::new();
        }
        apply_delta(&mut state, delta)?;
    }

    Ok(state)
}

fn apply_delta(state: &mut ReplayState, delta: &Delta) -> Result<(), ApplyError> {
    let values = &mut state.values;

    match delta {
        Delta::ObjectCreate | Delta::IndexUpdate(_) => Ok(()),
        Delta::SoftDelete => {
            state.deleted = true;
            Ok(())
        }
        Delta::Put { reference, value } => put(values, reference, value.clone()),
        Delta::TypeChange {
            reference,
            tag,
            value,
        } => put(values, reference, Value::tagged(tag.clone(), value.clone())),
        Delta::Delete { reference } => delete(values, reference),
        Delta::List { reference, ops } => apply_list(values, reference, ops),
        Delta::SetItems {
            reference,
            add,
            remove,
        } => apply_set(values, reference, add, remove),
        Delta::IncMapAdded { reference, entries } => {
            let map = inc_map_mut(values, reference)?;
            for (key, value) in entries {
                map.insert_at(*key, value.clone());
            }
            Ok(())
        }
    }
}

///
/// NAVIGATION
///

enum Parent<'a> {
    Root(&'a mut Values),
    Value(&'a mut Value),
}

// Resolve the container holding the last segment of `reference`.
fn parent_mut<'a, 'r>(
    values: &'a mut Values,
    reference: &'r PropertyRef,
) -> Result<(Parent<'a>, &'r Segment), ApplyError> {
    if reference.is_wildcard() {
        return Err(ApplyError::WildcardTarget {
            reference: reference.to_string(),
        });
    }
    let missing = || ApplyError::MissingValue {
        reference: reference.to_string(),
    };

    let segments = reference.segments();
    let (last, path) = segments.split_last().ok_or_else(missing)?;
    let Some((first, middle)) = path.split_first() else {
        return Ok((Parent::Root(values), last));
    };
    let Segment::Field(name) = first else {
        return Err(missing());
    };

    let mut current = values.get_mut(name).ok_or_else(missing)?;
    for segment in middle {
        current = step_mut(current, segment).ok_or_else(missing)?;
    }

    Ok((Parent::Value(untag(current)), last))
}

fn step_mut<'a>(value: &'a mut Value, segment: &Segment) -> Option<&'a mut Value> {
    match (untag(value), segment) {
        (Value::Embed(values), Segment::Field(name)) => values.get_mut(name),
        (Value::List(items), Segment::Index(index)) => items.get_mut(*index as usize),
        (Value::Map(entries), Segment::Key(key)) => entries.get_mut(key),
        (Value::IncMap(map), Segment::Key(Value::Uint(key))) => {
            u32::try_from(*key).ok().and_then(|key| map.get_mut(key))
        }
        _ => None,
    }
}

// Tagged unions are transparent to navigation.
fn untag(value: &mut Value) -> &mut Value {
    match value {
        Value::Tagged(tagged) => untag(&mut tagged.value),
        other => other,
    }
}

fn put(values: &mut Values, reference: &PropertyRef, value: Value) -> Result<(), ApplyError> {
    let (parent, last) = parent_mut(values, reference)?;

    match (parent, last) {
        (Parent::Root(values), Segment::Field(name)) => {
            replace_entry(&mut **values, name.clone(), value);
        }
        (Parent::Value(Value::Embed(values)), Segment::Field(name)) => {
            replace_entry(&mut **values, name.clone(), value);
        }
        (Parent::Value(Value::List(items)), Segment::Index(index)) => {
            let len = items.len();
            let slot = items
                .get_mut(*index as usize)
                .ok_or_else(|| ApplyError::MissingListIndex {
                    reference: reference.to_string(),
                    index: *index,
                    len,
                })?;
            replace_value(slot, value);
        }
        (Parent::Value(Value::Map(entries)), Segment::Key(key)) => {
            replace_entry(entries, key.clone(), value);
        }
        (Parent::Value(Value::IncMap(map)), Segment::Key(Value::Uint(key))) => {
            let key = inc_key(reference, *key)?;
            map.insert_at(key, value);
        }
        (parent, segment) => return Err(mismatch(reference, &parent, segment)),
    }

    Ok(())
}

fn delete(values: &mut Values, reference: &PropertyRef) -> Result<(), ApplyError> {
    let (parent, last) = parent_mut(values, reference)?;

    match (parent, last) {
        (Parent::Root(values), Segment::Field(name)) => {
            remove_entry(&mut **values, name);
        }
        (Parent::Value(Value::Embed(values)), Segment::Field(name)) => {
            remove_entry(&mut **values, name);
        }
        (Parent::Value(Value::List(items)), Segment::Index(index)) => {
            if *index as usize >= items.len() {
                return Err(ApplyError::MissingListIndex {
                    reference: reference.to_string(),
                    index: *index,
                    len: items.len(),
                });
            }
            items.remove(*index as usize);
        }
        (Parent::Value(Value::Map(entries)), Segment::Key(key)) => {
            remove_entry(entries, key);
        }
        (Parent::Value(Value::Set(items)), Segment::Key(key)) => {
            items.remove(key);
        }
        (Parent::Value(Value::IncMap(map)), Segment::Key(Value::Uint(key))) => {
            map.remove(inc_key(reference, *key)?);
        }
        (parent, segment) => return Err(mismatch(reference, &parent, segment)),
    }

    Ok(())
}

// An incrementing map outlives its entries: removing it only clears them,
// and replacing it keeps the higher key counter.
fn remove_entry<K: Ord>(entries: &mut BTreeMap<K, Value>, key: &K) {
    match entries.get_mut(key) {
        Some(Value::IncMap(map)) => map.clear(),
        Some(_) => {
            entries.remove(key);
        }
        None => {}
    }
}

fn replace_entry<K: Ord>(entries: &mut BTreeMap<K, Value>, key: K, value: Value) {
    match entries.get_mut(&key) {
        Some(slot) => replace_value(slot, value),
        None => {
            entries.insert(key, value);
        }
    }
}

fn replace_value(slot: &mut Value, mut value: Value) {
    if let (Value::IncMap(previous), Value::IncMap(next)) = (&*slot, &mut value) {
        next.reserve_from(previous.next_key());
    }
    *slot = value;
}

// Existing value at `reference`, or a fresh one from `empty` when the
// slot is free. List positions must already exist.
fn target_mut<'a>(
    values: &'a mut Values,
    reference: &PropertyRef,
    empty: fn() -> Value,
) -> Result<&'a mut Value, ApplyError> {
    let (parent, last) = parent_mut(values, reference)?;

    let target = match (parent, last) {
        (Parent::Root(values), Segment::Field(name)) => {
            values.entry(name.clone()).or_insert_with(empty)
        }
        (Parent::Value(Value::Embed(values)), Segment::Field(name)) => {
            values.entry(name.clone()).or_insert_with(empty)
        }
        (Parent::Value(Value::Map(entries)), Segment::Key(key)) => {
            entries.entry(key.clone()).or_insert_with(empty)
        }
        (Parent::Value(Value::List(items)), Segment::Index(index)) => {
            let len = items.len();
            items
                .get_mut(*index as usize)
                .ok_or_else(|| ApplyError::MissingListIndex {
                    reference: reference.to_string(),
                    index: *index,
                    len,
                })?
        }
        (Parent::Value(Value::IncMap(map)), Segment::Key(Value::Uint(key))) => {
            let key = inc_key(reference, *key)?;
            map.get_mut(key).ok_or_else(|| ApplyError::MissingValue {
                reference: reference.to_string(),
            })?
        }
        (parent, segment) => return Err(mismatch(reference, &parent, segment)),
    };

    Ok(untag(target))
}

fn apply_list(values: &mut Values, reference: &PropertyRef, ops: &[ListOp]) -> Result<(), ApplyError> {
    let items = match target_mut(values, reference, || Value::List(Vec::new()))? {
        Value::List(items) => items,
        other => return Err(wrong_kind(reference, "list", other)),
    };

    for op in ops {
        match op {
            ListOp::Insert { index, value } => {
                if *index as usize > items.len() {
                    return Err(ApplyError::MissingListIndex {
                        reference: reference.to_string(),
                        index: *index,
                        len: items.len(),
                    });
                }
                items.insert(*index as usize, value.clone());
            }
            ListOp::DeleteAt { index } => {
                if *index as usize >= items.len() {
                    return Err(ApplyError::MissingListIndex {
                        reference: reference.to_string(),
                        index: *index,
                        len: items.len(),
                    });
                }
                items.remove(*index as usize);
            }
            ListOp::DeleteValue { value } => items.retain(|item| item != value),
            ListOp::Append { value } => items.push(value.clone()),
        }
    }

    Ok(())
}

fn apply_set(
    values: &mut Values,
    reference: &PropertyRef,
    add: &[Value],
    remove: &[Value],
) -> Result<(), ApplyError> {
    let items = match target_mut(values, reference, || Value::Set(BTreeSet::new()))? {
        Value::Set(items) => items,
        other => return Err(wrong_kind(reference, "set", other)),
    };

    for value in remove {
        items.remove(value);
    }
    items.extend(add.iter().cloned());

    Ok(())
}

fn inc_map_mut<'a>(
    values: &'a mut Values,
    reference: &PropertyRef,
) -> Result<&'a mut IncMap, ApplyError> {
    let target = target_mut(values, reference, || Value::IncMap(IncMap::new()))?;
    match target {
        Value::IncMap(map) => Ok(map),
        other => Err(wrong_kind(reference, "inc_map", other)),
    }
}

fn inc_key(reference: &PropertyRef, key: u64) -> Result<u32, ApplyError> {
    u32::try_from(key).map_err(|_| ApplyError::MissingValue {
        reference: reference.to_string(),
    })
}

fn wrong_kind(reference: &PropertyRef, expected: &'static str, actual: &Value) -> ApplyError {
    ApplyError::WrongKind {
        reference: reference.to_string(),
        expected,
        kind: actual.kind_name(),
    }
}

fn mismatch(reference: &PropertyRef, parent: &Parent<'_>, segment: &Segment) -> ApplyError {
    let expected = match segment {
        Segment::Field(_) => "embed",
        Segment::Index(_) => "list",
        Segment::Key(_) | Segment::Any => "map",
    };
    let kind = match parent {
        Parent::Root(_) => "object",
        Parent::Value(value) => value.kind_name(),
    };

    ApplyError::WrongKind {
        reference: reference.to_string(),
        expected,
        kind,
    }
}

///
/// TESTS
///
