//! Named job counters.
//!
//! Map and reduce functions only see the [`Counters`] trait; the
//! standalone engine backs it with a [`CounterRegistry`] shared by every
//! task thread.

use dashmap::DashMap;
use itertools::Itertools;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};

/// A registry of monotonic counters keyed by `(group, name)`.
///
/// Unknown counters read as zero. Increments from different threads must
/// all be accounted for.
pub trait Counters: Send + Sync {
    fn increment(&self, group: &str, name: &str, delta: i64);
    fn value(&self, group: &str, name: &str) -> i64;
}

/// In-process [`Counters`] backed by a concurrent map of atomics.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    counters: DashMap<(String, String), AtomicI64>,
}

/// One counter in a [`CounterRegistry::snapshot`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CounterValue {
    pub group: String,
    pub name: String,
    pub value: i64,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All counters touched so far, ordered by group then name.
    pub fn snapshot(&self) -> Vec<CounterValue> {
        self.counters
            .iter()
            .map(|entry| {
                let (group, name) = entry.key();
                CounterValue {
                    group: group.clone(),
                    name: name.clone(),
                    value: entry.value().load(Ordering::Relaxed),
                }
            })
            .sorted_by(|a, b| (&a.group, &a.name).cmp(&(&b.group, &b.name)))
            .collect()
    }

    pub fn mapper(&self, counter: MapperCounter) -> i64 {
        self.value(MapperCounter::GROUP, counter.name())
    }

    pub fn reducer(&self, counter: ReducerCounter) -> i64 {
        self.value(ReducerCounter::GROUP, counter.name())
    }
}

impl Counters for CounterRegistry {
    fn increment(&self, group: &str, name: &str, delta: i64) {
        self.counters
            .entry((group.to_owned(), name.to_owned()))
            .or_default()
            .fetch_add(delta, Ordering::Relaxed);
    }

    fn value(&self, group: &str, name: &str) -> i64 {
        self.counters
            .get(&(group.to_owned(), name.to_owned()))
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Why the mapper consumed a line, in group `SALES_MAPPER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapperCounter {
    ValidTransactionsProcessed,
    CancelledTransactions,
    InvalidRecordLength,
    MissingRequiredFields,
    InvalidNumericValues,
    InvalidQuantityOrPrice,
    ProcessingErrors,
}

impl MapperCounter {
    pub const GROUP: &'static str = "SALES_MAPPER";

    pub const ALL: [MapperCounter; 7] = [
        MapperCounter::ValidTransactionsProcessed,
        MapperCounter::CancelledTransactions,
        MapperCounter::InvalidRecordLength,
        MapperCounter::MissingRequiredFields,
        MapperCounter::InvalidNumericValues,
        MapperCounter::InvalidQuantityOrPrice,
        MapperCounter::ProcessingErrors,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MapperCounter::ValidTransactionsProcessed => "VALID_TRANSACTIONS_PROCESSED",
            MapperCounter::CancelledTransactions => "CANCELLED_TRANSACTIONS",
            MapperCounter::InvalidRecordLength => "INVALID_RECORD_LENGTH",
            MapperCounter::MissingRequiredFields => "MISSING_REQUIRED_FIELDS",
            MapperCounter::InvalidNumericValues => "INVALID_NUMERIC_VALUES",
            MapperCounter::InvalidQuantityOrPrice => "INVALID_QUANTITY_OR_PRICE",
            MapperCounter::ProcessingErrors => "PROCESSING_ERRORS",
        }
    }

    pub fn bump(self, counters: &dyn Counters) {
        counters.increment(Self::GROUP, self.name(), 1);
    }
}

/// Reducer totals, in group `SALES_REDUCER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReducerCounter {
    CountriesProcessed,
    TotalTransactions,
    TotalRevenueCents,
}

impl ReducerCounter {
    pub const GROUP: &'static str = "SALES_REDUCER";

    pub fn name(self) -> &'static str {
        match self {
            ReducerCounter::CountriesProcessed => "COUNTRIES_PROCESSED",
            ReducerCounter::TotalTransactions => "TOTAL_TRANSACTIONS",
            ReducerCounter::TotalRevenueCents => "TOTAL_REVENUE_CENTS",
        }
    }

    pub fn add(self, counters: &dyn Counters, delta: i64) {
        counters.increment(Self::GROUP, self.name(), delta);
    }
}

/// The end-of-job statistics block.
pub fn report(counters: &CounterRegistry) -> String {
    use crate::aggregate::format_fixed2;

    let cents = counters.reducer(ReducerCounter::TotalRevenueCents);
    [
        "=== Job Statistics ===".to_owned(),
        "Mapper Counters:".to_owned(),
        format!(
            "  Valid transactions processed: {}",
            counters.mapper(MapperCounter::ValidTransactionsProcessed)
        ),
        format!(
            "  Cancelled transactions: {}",
            counters.mapper(MapperCounter::CancelledTransactions)
        ),
        format!(
            "  Invalid records: {}",
            counters.mapper(MapperCounter::InvalidRecordLength)
        ),
        format!(
            "  Processing errors: {}",
            counters.mapper(MapperCounter::ProcessingErrors)
        ),
        String::new(),
        "Reducer Counters:".to_owned(),
        format!(
            "  Countries processed: {}",
            counters.reducer(ReducerCounter::CountriesProcessed)
        ),
        format!(
            "  Total transactions: {}",
            counters.reducer(ReducerCounter::TotalTransactions)
        ),
        format!(
            "  Total revenue (£): {}",
            format_fixed2(cents as f64 / 100.0)
        ),
    ]
    .join("\n")
}
