//! Converts MapReduce application names to actual application code.
//!
//! # Example
//!
//! ```
//! # use anyhow::Result;
//! use salesmr::workload;
//! # fn main() -> Result<()> {
//! let sales = workload::named("sales")?;
//! assert!(sales.combine_fn.is_some());
//! # Ok(())
//! # }
//! ```

use crate::Workload;
use anyhow::{bail, Result};

pub mod sales;

/// Name of the per-country sales workload, the default for the CLI.
pub const SALES: &str = "sales";

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no application with the given name was found.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        SALES => Some(Workload {
            name: SALES,
            map_fn: sales::map,
            combine_fn: Some(sales::combine),
            reduce_fn: sales::reduce,
            format_fn: sales::format,
        }),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns an [`anyhow::Error`] if no application with the given name was found.
pub fn named(name: &str) -> Result<Workload> {
    match try_named(name) {
        Some(app) => Ok(app),
        None => bail!("No app named `{}` found.", name),
    }
}
