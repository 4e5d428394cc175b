//! Shared fixtures for unit tests.

use crate::{
    clock::{HlcClock, ManualTimeSource},
    model::{
        DataModel, DefinitionsContext, IndexDefinition, KeyDefinition, KeyPart, ModelCodec,
        ObjectDefinition, PropertyDefinition, PropertyKind,
    },
    reference::PropertyRef,
    value::{Value, Values},
};
use std::sync::Arc;

/// Base timestamp of sample records.
pub(crate) const EPOCH_MS: i64 = 1_700_000_000_000;

/// `Article`: reversed-timestamp key, unique `email`, final `author`,
/// indexes on `title`, every tag, and `rank`.
pub(crate) fn sample_model() -> DataModel {
    let mut ctx = DefinitionsContext::new();
    ctx.declare("Address").unwrap();
    ctx.define(
        ObjectDefinition::new("Address")
            .property(PropertyDefinition::new("city", PropertyKind::text()))
            .property(PropertyDefinition::new("zip", PropertyKind::text())),
    )
    .unwrap();

    DataModel::builder("Article", 1)
        .property(PropertyDefinition::new("created", PropertyKind::Timestamp).required())
        .property(PropertyDefinition::new("title", PropertyKind::text()).required())
        .property(PropertyDefinition::new("email", PropertyKind::text()).unique())
        .property(PropertyDefinition::new("author", PropertyKind::text()).set_once())
        .property(PropertyDefinition::new(
            "tags",
            PropertyKind::list(PropertyKind::text()),
        ))
        .property(PropertyDefinition::new("rank", PropertyKind::int()))
        .property(PropertyDefinition::new("body", PropertyKind::text()))
        .property(PropertyDefinition::new(
            "items",
            PropertyKind::list(PropertyKind::text()),
        ))
        .property(PropertyDefinition::new(
            "notes",
            PropertyKind::inc_map(PropertyKind::text()),
        ))
        .property(PropertyDefinition::new(
            "labels",
            PropertyKind::set(PropertyKind::text()),
        ))
        .property(PropertyDefinition::new("home", PropertyKind::embed("Address")))
        .key(KeyDefinition::Parts(vec![KeyPart::reversed("created")]))
        .index(IndexDefinition::new("by_title").part("title"))
        .index(IndexDefinition::new("by_tag").part(PropertyRef::field("tags").any()))
        .index(IndexDefinition::new("by_rank").part("rank"))
        .definitions(ctx.finish().unwrap())
        .build()
        .unwrap()
}

pub(crate) fn sample_codec() -> ModelCodec {
    ModelCodec::new(sample_model()).unwrap()
}

/// Article number `n`, created `n` milliseconds after the epoch.
pub(crate) fn article(n: i64, title: &str, email: &str, tags: &[&str]) -> Values {
    Values::new()
        .with("created", Value::Timestamp(EPOCH_MS + n))
        .with("title", title)
        .with("email", email)
        .with("tags", Value::list(tags.iter().copied()))
        .with("rank", n)
}

pub(crate) fn manual_clock(millis: u64) -> (Arc<ManualTimeSource>, HlcClock) {
    let time = Arc::new(ManualTimeSource::new(millis));
    let clock = HlcClock::new(time.clone());

    (time, clock)
}
