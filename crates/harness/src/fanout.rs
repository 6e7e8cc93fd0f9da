//! Parallel fan-out helper
//!
//! Setup and teardown stages run one branch per node. Every branch runs to
//! completion before the first failure propagates, so partial work is never
//! abandoned mid-flight.

use anyhow::Result;
use futures_util::future::join_all;
use std::future::Future;

/// Run all futures to completion, then propagate the first error
pub(crate) async fn join_first_error<T, F>(futs: impl IntoIterator<Item = F>) -> Result<Vec<T>>
where
    F: Future<Output = Result<T>>,
{
    let mut out = Vec::new();
    let mut first_err = None;

    for result in join_all(futs).await {
        match result {
            Ok(v) => out.push(v),
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}
