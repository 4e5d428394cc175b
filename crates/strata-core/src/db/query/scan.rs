use crate::{
    db::{
        error::{Error, RequestError},
        index::IndexKey,
        query::{Order, ReadSpec},
        response::FetchType,
        state::StoreState,
        store::RecordView,
    },
    error::InternalError,
    key::Key,
    obs::PlanKind,
};
use std::ops::Bound;

///
/// ScanSpec
///

pub(crate) struct ScanSpec<'a> {
    pub(crate) read: ReadSpec<'a>,
    pub(crate) start_key: Option<&'a Key>,
    /// Rank of the start record when already known; looked up otherwise.
    pub(crate) start_rank: Option<&'a IndexKey>,
    pub(crate) include_start: bool,
    pub(crate) order: &'a Order,
    pub(crate) limit: usize,
    pub(crate) allow_full_scan: bool,
}

///
/// ScanOutcome
///

#[derive(Debug)]
pub(crate) struct ScanOutcome {
    pub(crate) rows: Vec<RecordView>,
    pub(crate) fetch_type: FetchType,
    pub(crate) plan: PlanKind,
    pub(crate) scanned: u64,
}

impl ScanOutcome {
    const fn empty(fetch_type: FetchType, plan: PlanKind) -> Self {
        Self {
            rows: Vec::new(),
            fetch_type,
            plan,
            scanned: 0,
        }
    }
}

/// Run an ordered, limit-bounded scan.
///
/// Key order walks the primary key range. A property order walks the
/// index whose parts match it exactly; historical reads of such an order
/// and any unindexed order (with `allow_full_scan`) sort the matching set
/// in memory.
pub(crate) fn scan(state: &StoreState, spec: &ScanSpec<'_>) -> Result<ScanOutcome, Error> {
    if spec.order.is_key_order() {
        return Ok(by_key(state, spec)?);
    }

    let index = state
        .indexes
        .definitions()
        .find(|index| spec.order.served_by(index))
        .map(|index| index.name.clone());

    match index {
        Some(name) if spec.read.as_of.is_none() => by_index(state, spec, name),
        Some(name) => materialized(
            state,
            spec,
            FetchType::ByIndex { index: name },
            PlanKind::Index,
        ),
        None if spec.allow_full_scan => {
            materialized(state, spec, FetchType::ByKey, PlanKind::FullScan)
        }
        None => Err(RequestError::FullScanRequired {
            order: spec.order.to_string(),
        }
        .into()),
    }
}

fn by_key(state: &StoreState, spec: &ScanSpec<'_>) -> Result<ScanOutcome, InternalError> {
    let start = match spec.start_key {
        None => Bound::Unbounded,
        Some(key) if spec.include_start => Bound::Included(key),
        Some(key) => Bound::Excluded(key),
    };

    let mut outcome = ScanOutcome::empty(FetchType::ByKey, PlanKind::Keys);
    for (key, record) in state
        .records
        .range_from(start, spec.order.direction.is_desc())
    {
        if outcome.rows.len() >= spec.limit {
            break;
        }
        outcome.scanned += 1;
        if let Some(view) = spec.read.admit(state.codec(), key, record)? {
            outcome.rows.push(view);
        }
    }

    Ok(outcome)
}

fn by_index(state: &StoreState, spec: &ScanSpec<'_>, name: String) -> Result<ScanOutcome, Error> {
    let store = state.indexes.get(&name).ok_or_else(|| {
        InternalError::query_invariant(format!("planned index '{name}' is not loaded"))
    })?;

    let start = match spec.start_key {
        None => None,
        Some(start) => {
            let rank = spec
                .start_rank
                .cloned()
                .or_else(|| store.rank_of(start))
                .ok_or_else(|| unranked(spec, start))?;
            Some((rank, start))
        }
    };
    let skip_start = start.as_ref().filter(|_| !spec.include_start).map(|(_, key)| *key);

    let mut outcome = ScanOutcome::empty(FetchType::ByIndex { index: name }, PlanKind::Index);
    let ranked = store.ranked(
        start.as_ref().map(|(rank, key)| (rank, *key)),
        spec.order.direction.is_desc(),
    );
    for (_, key) in ranked {
        if outcome.rows.len() >= spec.limit {
            break;
        }
        if skip_start == Some(key) {
            continue;
        }
        let record = state.records.get(key).ok_or_else(|| {
            InternalError::index_invariant(format!("index entry points at missing record {key}"))
        })?;
        outcome.scanned += 1;
        if let Some(view) = spec.read.admit(state.codec(), key, record)? {
            outcome.rows.push(view);
        }
    }

    Ok(outcome)
}

fn unranked(spec: &ScanSpec<'_>, start: &Key) -> Error {
    RequestError::UnrankedStart {
        key: start.clone(),
        order: spec.order.to_string(),
    }
    .into()
}

// Collect every admitted record with a rank, sort, then cut the window.
fn materialized(
    state: &StoreState,
    spec: &ScanSpec<'_>,
    fetch_type: FetchType,
    plan: PlanKind,
) -> Result<ScanOutcome, Error> {
    let mut ranked: Vec<(IndexKey, RecordView)> = Vec::new();
    let mut scanned = 0;

    for (key, record) in state.records.iter() {
        scanned += 1;
        let Some(view) = spec.read.admit(state.codec(), key, record)? else {
            continue;
        };
        if let Some(rank) = spec.order.rank(&view.values) {
            ranked.push((rank, view));
        }
    }
    ranked.sort_by(|a, b| spec.order.compare((Some(&a.0), &a.1.key), (Some(&b.0), &b.1.key)));

    let begin = match spec.start_key {
        None => 0,
        Some(start) => {
            let start_rank = match (spec.start_rank, state.records.get(start)) {
                (Some(rank), _) => Some(rank.clone()),
                (None, Some(record)) => record
                    .view(state.codec(), start, spec.read.as_of)?
                    .and_then(|view| spec.order.rank(&view.values)),
                (None, None) => None,
            };
            let start_rank = start_rank.ok_or_else(|| unranked(spec, start))?;
            spec.order.start_index(
                &ranked,
                |(rank, view)| (Some(rank), &view.key),
                (Some(&start_rank), start),
                spec.include_start,
            )
        }
    };

    Ok(ScanOutcome {
        rows: ranked
            .into_iter()
            .skip(begin)
            .take(spec.limit)
            .map(|(_, view)| view)
            .collect(),
        fetch_type,
        plan,
        scanned,
    })
}
