//! Conditional status writes with bounded retry

use tracing::debug;

use storefront_catalog::{StatusWrite, StoreCatalog};
use storefront_common::{Error, Result, Store, StoreStatus};

/// Attempts before a contended write gives up
pub(crate) const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Write the status chosen by `decide`, conditional on the version last seen
///
/// `decide` is asked for a target status given the freshest record; `None`
/// means the record is already where it should be and no write happens. On a
/// version conflict the fresh record is fed back to `decide`, so a writer
/// never overwrites a change it has not looked at.
///
/// Returns the record as stored afterwards, or `None` if it was deleted.
pub(crate) async fn write_status<F>(
    catalog: &dyn StoreCatalog,
    seen: &Store,
    decide: F,
) -> Result<Option<Store>>
where
    F: Fn(&Store) -> Option<StoreStatus>,
{
    let mut current = seen.clone();
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let Some(target) = decide(&current) else {
            return Ok(Some(current));
        };
        match catalog
            .update_status(&current.id, target, Some(current.version))
            .await?
        {
            StatusWrite::Applied(store) => return Ok(Some(store)),
            StatusWrite::Missing => return Ok(None),
            StatusWrite::Conflict(fresh) => {
                debug!(
                    store_id = %fresh.id,
                    attempt,
                    expected = current.version,
                    found = fresh.version,
                    "status write lost a race, re-evaluating"
                );
                current = fresh;
            }
        }
    }
    Err(Error::conflict(format!(
        "status write for store {} still contended after {} attempts",
        seen.id, MAX_WRITE_ATTEMPTS
    )))
}
