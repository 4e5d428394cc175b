//! Module: db::aggregate
//! Responsibility: reduce the values of returned records to aggregates.

use crate::{
    reference::PropertyRef,
    value::{Value, Values, compare_order},
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap};

///
/// Aggregation
///
/// Requested reduction over one reference. Wildcard references feed every
/// element into the reduction.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Aggregation {
    Min(PropertyRef),
    Max(PropertyRef),
    /// Number of values present.
    Count(PropertyRef),
    Sum(PropertyRef),
    Average(PropertyRef),
}

impl Aggregation {
    #[must_use]
    pub const fn reference(&self) -> &PropertyRef {
        match self {
            Self::Min(r) | Self::Max(r) | Self::Count(r) | Self::Sum(r) | Self::Average(r) => r,
        }
    }
}

///
/// AggregationResult
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum AggregationResult {
    Min(Option<Value>),
    Max(Option<Value>),
    Count(u64),
    /// `Int` while every summand is integral and the total fits, `Float`
    /// otherwise. `None` when nothing numeric was seen.
    Sum(Option<Value>),
    Average(Option<f64>),
}

/// Run every named aggregation over the given value bags.
pub(crate) fn aggregate<'a>(
    aggregations: &BTreeMap<String, Aggregation>,
    rows: impl Iterator<Item = &'a Values> + Clone,
) -> BTreeMap<String, AggregationResult> {
    aggregations
        .iter()
        .map(|(name, aggregation)| {
            let mut reducer = Reducer::new(aggregation);
            for values in rows.clone() {
                for value in aggregation.reference().resolve(values) {
                    reducer.push(value);
                }
            }
            (name.clone(), reducer.finish())
        })
        .collect()
}

///
/// Reducer
///

struct Reducer<'a> {
    aggregation: &'a Aggregation,
    best: Option<Value>,
    count: u64,
    int_sum: i128,
    float_sum: f64,
    saw_float: bool,
    numeric: u64,
}

impl<'a> Reducer<'a> {
    const fn new(aggregation: &'a Aggregation) -> Self {
        Self {
            aggregation,
            best: None,
            count: 0,
            int_sum: 0,
            float_sum: 0.0,
            saw_float: false,
            numeric: 0,
        }
    }

    fn push(&mut self, value: &Value) {
        self.count += 1;

        match self.aggregation {
            Aggregation::Min(_) => self.keep_if(value, Ordering::Less),
            Aggregation::Max(_) => self.keep_if(value, Ordering::Greater),
            Aggregation::Count(_) => {}
            Aggregation::Sum(_) | Aggregation::Average(_) => match value {
                Value::Int(v) => self.add_int(i128::from(*v)),
                Value::Uint(v) => self.add_int(i128::from(*v)),
                Value::Float(v) => {
                    self.float_sum += v.get();
                    self.saw_float = true;
                    self.numeric += 1;
                }
                _ => {}
            },
        }
    }

    fn keep_if(&mut self, value: &Value, wanted: Ordering) {
        let replace = match &self.best {
            None => value.is_scalar(),
            Some(best) => compare_order(value, best) == Some(wanted),
        };
        if replace {
            self.best = Some(value.clone());
        }
    }

    const fn add_int(&mut self, v: i128) {
        self.int_sum = self.int_sum.saturating_add(v);
        self.numeric += 1;
    }

    #[expect(clippy::cast_precision_loss)]
    fn finish(self) -> AggregationResult {
        let total = self.int_sum as f64 + self.float_sum;

        match self.aggregation {
            Aggregation::Min(_) => AggregationResult::Min(self.best),
            Aggregation::Max(_) => AggregationResult::Max(self.best),
            Aggregation::Count(_) => AggregationResult::Count(self.count),
            Aggregation::Sum(_) => AggregationResult::Sum((self.numeric > 0).then(|| {
                match i64::try_from(self.int_sum) {
                    Ok(sum) if !self.saw_float => Value::Int(sum),
                    _ => Value::from(total),
                }
            })),
            Aggregation::Average(_) => {
                AggregationResult::Average((self.numeric > 0).then(|| total / self.numeric as f64))
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Values> {
        vec![
            Values::new()
                .with("rank", 3i64)
                .with("tags", Value::list(["b", "c"])),
            Values::new()
                .with("rank", 7u64)
                .with("tags", Value::list(["a"])),
            Values::new().with("title", "no rank"),
        ]
    }

    fn run(aggregation: Aggregation) -> AggregationResult {
        let requested = BTreeMap::from([("x".to_string(), aggregation)]);
        let rows = rows();

        aggregate(&requested, rows.iter())
            .remove("x")
            .expect("result present")
    }

    #[test]
    fn numeric_reductions() {
        assert_eq!(
            run(Aggregation::Sum("rank".into())),
            AggregationResult::Sum(Some(Value::Int(10)))
        );
        assert_eq!(
            run(Aggregation::Average("rank".into())),
            AggregationResult::Average(Some(5.0))
        );
        assert_eq!(
            run(Aggregation::Count("rank".into())),
            AggregationResult::Count(2)
        );
        assert_eq!(
            run(Aggregation::Max("rank".into())),
            AggregationResult::Max(Some(Value::Uint(7)))
        );
    }

    #[test]
    fn wildcards_reduce_every_element() {
        let tags = PropertyRef::field("tags").any();

        assert_eq!(
            run(Aggregation::Min(tags.clone())),
            AggregationResult::Min(Some(Value::text("a")))
        );
        assert_eq!(
            run(Aggregation::Count(tags)),
            AggregationResult::Count(3)
        );
    }

    #[test]
    fn empty_input_yields_empty_results() {
        assert_eq!(
            run(Aggregation::Sum("missing".into())),
            AggregationResult::Sum(None)
        );
        assert_eq!(
            run(Aggregation::Average("title".into())),
            AggregationResult::Average(None)
        );
    }
}
