//! Total revenue, transaction count and mean revenue per country.
//!
//! The mapper turns each transaction line into `(country, (revenue, 1))`,
//! or consumes it and bumps exactly one `SALES_MAPPER` counter. The
//! combiner and reducer fold [`CountryRevenue`] partials; only the reducer
//! touches the `SALES_REDUCER` counters.

use crate::aggregate::CountryRevenue;
use crate::counters::{Counters, MapperCounter, ReducerCounter};
use crate::record::{Record, HEADER_PREFIX};
use crate::utils::offset_from_bytes;
use crate::*;
use anyhow::{anyhow, Result};
use bytes::{BufMut, Bytes, BytesMut};
use log::warn;

/// What the mapper makes of one input line.
#[derive(Debug, PartialEq)]
pub enum LineOutcome {
    /// The header at the start of a file; consumed without a counter.
    Header,
    /// A rejected line and the counter that records why.
    Skipped(MapperCounter),
    Valid {
        country: String,
        revenue: CountryRevenue,
    },
}

/// Runs the filter and validation rules on one line, first failing rule
/// wins.
///
/// Returns an error for lines that cannot be processed at all (bad UTF-8,
/// revenue overflow); those count as processing errors.
pub fn classify(offset: u64, line: &[u8]) -> Result<LineOutcome> {
    if offset == 0 && line.starts_with(HEADER_PREFIX.as_bytes()) {
        return Ok(LineOutcome::Header);
    }

    let line = std::str::from_utf8(line)?;
    let record = match Record::parse(line) {
        Ok(record) => record,
        Err(_) => return Ok(LineOutcome::Skipped(MapperCounter::InvalidRecordLength)),
    };

    if record.is_cancellation() {
        return Ok(LineOutcome::Skipped(MapperCounter::CancelledTransactions));
    }

    if record.country.is_empty() || record.quantity.is_empty() || record.unit_price.is_empty() {
        return Ok(LineOutcome::Skipped(MapperCounter::MissingRequiredFields));
    }

    let (quantity, unit_price) = match parse_numbers(&record) {
        Some(numbers) => numbers,
        None => return Ok(LineOutcome::Skipped(MapperCounter::InvalidNumericValues)),
    };

    if quantity <= 0 || unit_price <= 0.0 {
        return Ok(LineOutcome::Skipped(MapperCounter::InvalidQuantityOrPrice));
    }

    let revenue = f64::from(quantity) * unit_price;
    if !revenue.is_finite() {
        return Err(anyhow!(
            "revenue overflow: {} * {}",
            record.quantity,
            record.unit_price
        ));
    }

    Ok(LineOutcome::Valid {
        country: record.country,
        revenue: CountryRevenue::single(revenue),
    })
}

fn parse_numbers(record: &Record) -> Option<(i32, f64)> {
    let quantity = record.quantity.parse::<i32>().ok()?;
    let unit_price = record.unit_price.parse::<f64>().ok()?;
    // "NaN" and "inf" parse as f64 but are not prices.
    unit_price.is_finite().then_some((quantity, unit_price))
}

pub fn map(kv: KeyValue, counters: &dyn Counters) -> MapOutput {
    let offset = offset_from_bytes(kv.key())?;

    let emitted = match classify(offset, &kv.value) {
        Ok(LineOutcome::Header) => None,
        Ok(LineOutcome::Skipped(reason)) => {
            reason.bump(counters);
            None
        }
        Ok(LineOutcome::Valid { country, revenue }) => {
            MapperCounter::ValidTransactionsProcessed.bump(counters);
            Some(KeyValue::new(Bytes::from(country), revenue.encode()))
        }
        Err(e) => {
            MapperCounter::ProcessingErrors.bump(counters);
            warn!(
                "Error processing record: {} Error: {}",
                String::from_utf8_lossy(&kv.value),
                e
            );
            None
        }
    };

    Ok(Box::new(emitted.into_iter().map(Ok)))
}

/// Folds encoded partials from `zero()`, holding only the running sum.
fn fold(values: Box<dyn Iterator<Item = Bytes> + '_>) -> Result<CountryRevenue> {
    values.map(|value| CountryRevenue::decode(value)).sum()
}

pub fn combine(
    _key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _counters: &dyn Counters,
) -> Result<Bytes> {
    Ok(fold(values)?.encode())
}

pub fn reduce(
    _key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    counters: &dyn Counters,
) -> Result<Bytes> {
    let merged = fold(values)?;

    ReducerCounter::CountriesProcessed.add(counters, 1);
    ReducerCounter::TotalTransactions.add(counters, merged.transaction_count());
    ReducerCounter::TotalRevenueCents.add(counters, merged.revenue_cents());

    Ok(merged.encode())
}

/// `<country>\t<revenue>\t<count>\t<mean>\n`, the country copied verbatim.
pub fn format(key: &Bytes, value: &Bytes) -> Result<Bytes> {
    let merged = CountryRevenue::decode(value.clone())?;
    let rendered = merged.to_string();

    let mut writer = BytesMut::with_capacity(key.len() + rendered.len() + 2);
    writer.put_slice(key);
    writer.put_u8(b'\t');
    writer.put_slice(rendered.as_bytes());
    writer.put_u8(b'\n');
    Ok(writer.freeze())
}
