//! Module: db
//! Responsibility: the `DataStore` facade; locking, metrics spans and
//! request-level validation around the write, query, feed and
//! subscription engines.

pub mod aggregate;
pub mod change;
pub(crate) mod commit;
pub mod config;
pub mod direction;
pub mod error;
pub mod index;
pub mod predicate;
pub(crate) mod process;
pub mod query;
pub mod request;
pub mod response;
pub(crate) mod state;
pub(crate) mod store;
pub mod subscription;
pub(crate) mod unique;
pub(crate) mod write;

#[cfg(test)]
mod tests;

use crate::{
    clock::{HlcClock, Version},
    db::{
        aggregate::aggregate,
        change::feed::{FeedWindow, changes_of},
        commit::{CommitBus, WriteContext},
        config::StoreConfig,
        error::{Error, RequestError},
        predicate::Predicate,
        query::{ReadSpec, ScanSpec, object_values},
        request::{
            AddRequest, ChangeRequest, ChangesWindow, DeleteRequest, GetChangesRequest, GetRequest,
            ScanChangesRequest, ScanRequest, UpdateSource, UpdatesRequest,
        },
        response::{
            AddResponse, AddStatus, ChangeResponse, ChangeStatus, ChangesResponse, DeleteResponse,
            DeleteStatus, FetchType, ObjectChanges, ProcessResponse, UpdatesResponse,
            ValuesResponse,
        },
        state::StoreState,
        store::RecordView,
        subscription::{Listener, LiveUpdates, SubscriptionState, Update, activate},
        write::{add_one, change_one, delete_one},
    },
    error::InternalError,
    model::{Codec, DataModel},
    obs::{ExecKind, GlobalMetricsSink, MetricsEvent, MetricsSink, PlanKind, sink::Span},
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
};
use tracing::{debug, info};

///
/// Inner
/// Shared store internals; listeners hold it weakly.
///

pub(crate) struct Inner {
    pub(crate) config: StoreConfig,
    pub(crate) clock: HlcClock,
    pub(crate) state: RwLock<StoreState>,
    pub(crate) bus: CommitBus,
    pub(crate) sink: Arc<dyn MetricsSink>,
}

///
/// DataStore
///
/// Versioned object store for one data model. Cloning is cheap and every
/// clone addresses the same records.
///

#[derive(Clone)]
pub struct DataStore {
    inner: Arc<Inner>,
}

impl DataStore {
    #[must_use]
    pub fn new(codec: Arc<dyn Codec>, config: StoreConfig) -> Self {
        Self::with_clock(codec, config, HlcClock::system())
    }

    #[must_use]
    pub fn with_clock(codec: Arc<dyn Codec>, config: StoreConfig, clock: HlcClock) -> Self {
        Self::with_sink(codec, config, clock, Arc::new(GlobalMetricsSink))
    }

    #[must_use]
    pub fn with_sink(
        codec: Arc<dyn Codec>,
        config: StoreConfig,
        clock: HlcClock,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                state: RwLock::new(StoreState::new(codec)),
                bus: CommitBus::default(),
                sink,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Version of the last commit; zero for an empty store.
    #[must_use]
    pub fn version(&self) -> Version {
        self.inner.state.read().version
    }

    #[must_use]
    pub fn model(&self) -> DataModel {
        self.inner.state.read().codec.model().clone()
    }

    /// Number of live subscriptions still attached to the commit path.
    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.inner.bus.len()
    }

    ///
    /// WRITES
    ///

    pub fn add(&self, request: AddRequest) -> AddResponse {
        let model = self.model_name();
        let mut span = Span::new(self.sink(), ExecKind::Write, &model);
        let ctx = self.write_context();

        let statuses: Vec<AddStatus> = request
            .values
            .into_iter()
            .map(|values| add_one(&mut self.inner.state.write(), &ctx, values))
            .collect();
        span.set_rows(count(&statuses, |s| matches!(s, AddStatus::Success { .. })));

        AddResponse { statuses }
    }

    pub fn change(&self, request: ChangeRequest) -> ChangeResponse {
        let model = self.model_name();
        let mut span = Span::new(self.sink(), ExecKind::Write, &model);
        let ctx = self.write_context();

        let statuses: Vec<_> = request
            .objects
            .iter()
            .map(|object| {
                let status = change_one(&mut self.inner.state.write(), &ctx, object);
                (object.key.clone(), status)
            })
            .collect();
        span.set_rows(count(&statuses, |(_, s)| {
            matches!(s, ChangeStatus::Success { .. })
        }));

        ChangeResponse { statuses }
    }

    pub fn delete(&self, request: DeleteRequest) -> DeleteResponse {
        let model = self.model_name();
        let mut span = Span::new(self.sink(), ExecKind::Write, &model);
        let ctx = self.write_context();

        let statuses: Vec<_> = request
            .keys
            .into_iter()
            .map(|key| {
                let status = delete_one(
                    &mut self.inner.state.write(),
                    &ctx,
                    &key,
                    request.hard_delete,
                );
                (key, status)
            })
            .collect();
        span.set_rows(count(&statuses, |(_, s)| {
            matches!(s, DeleteStatus::Success { .. })
        }));

        DeleteResponse { statuses }
    }

    /// Apply an update produced by another store. Local commits are
    /// versioned after the update's version.
    pub fn process_update(&self, update: &Update) -> ProcessResponse {
        let model = self.model_name();
        let _span = Span::new(self.sink(), ExecKind::Write, &model);
        let ctx = self.write_context().after_remote(update.version());

        process::process_update(&mut self.inner.state.write(), &ctx, update)
    }

    /// Swap in a newer model when the current codec can read under it.
    pub fn update_model(&self, model: DataModel) -> Result<(), Error> {
        let mut state = self.inner.state.write();
        if !state.codec.compatible_with(&model) {
            return Err(RequestError::IncompatibleModel {
                name: model.name,
                version: model.version,
            }
            .into());
        }

        let version = model.version;
        let codec = state
            .codec
            .upgrade(model)
            .map_err(|err| InternalError::schema_unsupported(err.to_string()))?;
        state.reindex(codec)?;
        info!(model = state.model_name(), version, "model updated");

        Ok(())
    }

    ///
    /// READS
    ///

    pub fn get(&self, request: GetRequest) -> Result<ValuesResponse, Error> {
        self.inner.config.check_keys(request.keys.len())?;
        let predicate = Predicate::compile(request.filter.as_ref())?;

        let state = self.inner.state.read();
        let mut span = Span::new(self.sink(), ExecKind::Read, state.model_name());
        let read = ReadSpec {
            predicate: &predicate,
            as_of: request.to_version,
            include_soft_deleted: request.include_soft_deleted,
        };
        let views = query::get(
            state.codec(),
            |key| state.records.get(key),
            &request.keys,
            &read,
        )?;
        self.record_plan(&state, PlanKind::Keys, request.keys.len() as u64);

        span.set_rows(views.len() as u64);
        Ok(values_response(
            views,
            &request,
            FetchType::ByKey,
            state.version,
        ))
    }

    pub fn scan(&self, request: ScanRequest) -> Result<ValuesResponse, Error> {
        if request.to_version.is_some() && !self.inner.config.keep_all_versions {
            return Err(RequestError::HistoryDisabled.into());
        }
        let limit = self.inner.config.scan_limit(request.limit)?;
        let predicate = Predicate::compile(request.filter.as_ref())?;

        let state = self.inner.state.read();
        let mut span = Span::new(self.sink(), ExecKind::Read, state.model_name());
        let outcome = query::scan(
            &state,
            &ScanSpec {
                read: ReadSpec {
                    predicate: &predicate,
                    as_of: request.to_version,
                    include_soft_deleted: request.include_soft_deleted,
                },
                start_key: request.start_key.as_ref(),
                start_rank: None,
                include_start: request.include_start,
                order: &request.order,
                limit,
                allow_full_scan: request.allow_full_scan,
            },
        )?;
        self.record_plan(&state, outcome.plan, outcome.scanned);

        span.set_rows(outcome.rows.len() as u64);
        Ok(ValuesResponse {
            aggregations: aggregate(
                &request.aggregations,
                outcome.rows.iter().map(|view| &view.values),
            ),
            values: outcome
                .rows
                .into_iter()
                .map(|view| object_values(view, request.select.as_deref()))
                .collect(),
            fetch_type: outcome.fetch_type,
            version: state.version,
        })
    }

    ///
    /// CHANGE FEEDS
    ///

    pub fn get_changes(&self, request: GetChangesRequest) -> Result<ChangesResponse, Error> {
        self.inner.config.check_keys(request.keys.len())?;
        self.check_window(&request.window)?;
        let predicate = Predicate::compile(request.filter.as_ref())?;

        let state = self.inner.state.read();
        let mut span = Span::new(self.sink(), ExecKind::Feed, state.model_name());
        let read = ReadSpec {
            predicate: &predicate,
            as_of: request.window.to_version,
            include_soft_deleted: request.include_soft_deleted,
        };
        let views = query::get(
            state.codec(),
            |key| state.records.get(key),
            &request.keys,
            &read,
        )?;
        self.record_plan(&state, PlanKind::Keys, request.keys.len() as u64);

        let changes = feed(&state, &views, &request.window)?;
        span.set_rows(changes.len() as u64);

        Ok(ChangesResponse {
            changes,
            version: state.version,
        })
    }

    pub fn scan_changes(&self, request: ScanChangesRequest) -> Result<ChangesResponse, Error> {
        self.check_window(&request.window)?;
        let scan = &request.scan;
        let limit = self.inner.config.scan_limit(scan.limit)?;
        let predicate = Predicate::compile(scan.filter.as_ref())?;

        let state = self.inner.state.read();
        let mut span = Span::new(self.sink(), ExecKind::Feed, state.model_name());
        let outcome = query::scan(
            &state,
            &ScanSpec {
                read: ReadSpec {
                    predicate: &predicate,
                    as_of: request.window.to_version,
                    include_soft_deleted: scan.include_soft_deleted,
                },
                start_key: scan.start_key.as_ref(),
                start_rank: None,
                include_start: scan.include_start,
                order: &scan.order,
                limit,
                allow_full_scan: scan.allow_full_scan,
            },
        )?;
        self.record_plan(&state, outcome.plan, outcome.scanned);

        let changes = feed(&state, &outcome.rows, &request.window)?;
        span.set_rows(changes.len() as u64);

        Ok(ChangesResponse {
            changes,
            version: state.version,
        })
    }

    ///
    /// SUBSCRIPTIONS
    ///

    /// One-shot activation over a key list.
    pub fn get_updates(&self, request: UpdatesRequest) -> Result<UpdatesResponse, Error> {
        if !matches!(request.source, UpdateSource::Keys(_)) {
            return Err(RequestError::SourceMismatch {
                operation: "get_updates",
                expected: "key list",
            }
            .into());
        }

        self.one_shot(&request)
    }

    /// One-shot activation over an ordered scan window.
    pub fn scan_updates(&self, request: UpdatesRequest) -> Result<UpdatesResponse, Error> {
        if !matches!(request.source, UpdateSource::Scan { .. }) {
            return Err(RequestError::SourceMismatch {
                operation: "scan_updates",
                expected: "scan",
            }
            .into());
        }

        self.one_shot(&request)
    }

    /// Continuous updates for the request's window, delivered by a task on
    /// the current tokio runtime.
    pub fn listen(&self, request: UpdatesRequest) -> Result<LiveUpdates, Error> {
        let runtime = Handle::try_current().map_err(|_| RequestError::RuntimeUnavailable)?;

        // the mailbox opens under the same read guard as activation, so
        // the first event it sees is the first commit after the window
        let (activation, mailbox) = {
            let state = self.inner.state.read();
            let _span = Span::new(self.sink(), ExecKind::Feed, state.model_name());
            let activation = activate(&state, &self.inner.config, &request, true)?;

            (activation, self.inner.bus.subscribe())
        };

        let (out, updates) = mpsc::unbounded_channel();
        let control = Arc::new(watch::Sender::new(SubscriptionState::Initializing));
        let cursor = activation.tracker.cursor;
        Listener {
            store: Arc::downgrade(&self.inner),
            tracker: activation.tracker,
            initial: activation.updates,
            mailbox,
            out,
            control: Arc::clone(&control),
        }
        .spawn(&runtime);
        debug!(cursor = %cursor, "subscription listening");

        Ok(LiveUpdates::new(updates, control))
    }

    ///
    /// HELPERS
    ///

    fn one_shot(&self, request: &UpdatesRequest) -> Result<UpdatesResponse, Error> {
        let state = self.inner.state.read();
        let mut span = Span::new(self.sink(), ExecKind::Feed, state.model_name());
        let activation = activate(&state, &self.inner.config, request, false)?;
        span.set_rows(activation.tracker.window.len() as u64);

        Ok(UpdatesResponse {
            updates: activation.updates,
            version: state.version,
        })
    }

    fn check_window(&self, window: &ChangesWindow) -> Result<(), RequestError> {
        let Some(to) = window.to_version else {
            return Ok(());
        };
        if !self.inner.config.keep_all_versions {
            return Err(RequestError::HistoryDisabled);
        }
        if window.from_version > to {
            return Err(RequestError::InvertedVersions {
                from: window.from_version,
                to,
            });
        }

        Ok(())
    }

    fn record_plan(&self, state: &StoreState, plan: PlanKind, scanned: u64) {
        self.sink().record(MetricsEvent::Plan { kind: plan });
        self.sink().record(MetricsEvent::RowsScanned {
            model: state.model_name(),
            rows_scanned: scanned,
        });
    }

    fn write_context(&self) -> WriteContext<'_> {
        WriteContext::new(
            &self.inner.clock,
            self.inner.config.keep_all_versions,
            &self.inner.bus,
            self.sink(),
        )
    }

    fn model_name(&self) -> String {
        self.inner.state.read().model_name().to_string()
    }

    fn sink(&self) -> &dyn MetricsSink {
        self.inner.sink.as_ref()
    }
}

fn values_response(
    views: Vec<RecordView>,
    request: &GetRequest,
    fetch_type: FetchType,
    version: Version,
) -> ValuesResponse {
    ValuesResponse {
        aggregations: aggregate(&request.aggregations, views.iter().map(|view| &view.values)),
        values: views
            .into_iter()
            .map(|view| object_values(view, request.select.as_deref()))
            .collect(),
        fetch_type,
        version,
    }
}

// Change feeds of admitted records; records without sets in the window
// are left out.
fn feed(
    state: &StoreState,
    views: &[RecordView],
    window: &ChangesWindow,
) -> Result<Vec<ObjectChanges>, Error> {
    let window = FeedWindow {
        from: window.from_version,
        to: window.to_version,
        select: window.select.as_deref(),
        max_versions: window.max_versions.map(|max| max as usize),
    };

    let mut out = Vec::with_capacity(views.len());
    for view in views {
        let record = state.records.get(&view.key).ok_or_else(|| {
            InternalError::store_invariant(format!("admitted record {} vanished", view.key))
        })?;
        let sets = changes_of(record, state.codec(), &view.key, &window)?;
        if !sets.is_empty() {
            out.push(ObjectChanges {
                key: view.key.clone(),
                sets,
            });
        }
    }

    Ok(out)
}

fn count<T>(statuses: &[T], success: impl Fn(&T) -> bool) -> u64 {
    statuses.iter().filter(|s| success(s)).count() as u64
}
