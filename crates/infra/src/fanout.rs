//! Batch reads fanned out per namespace.

use std::collections::BTreeMap;
use std::future::Future;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use warden_core::{IamError, IamResult, Namespace};

/// Run one `fetch` task per distinct namespace and gather the results.
///
/// Partial results arrive on a shared channel in completion order. The
/// channel closes once every task has dropped its sender, which is the join
/// barrier. A failed partition does not cancel its siblings: everything is
/// drained and the first error seen is returned.
pub async fn fan_out_by_namespace<T, F, Fut>(
    refs: impl IntoIterator<Item = (Namespace, Uuid)>,
    fetch: F,
) -> IamResult<Vec<T>>
where
    T: Send + 'static,
    F: Fn(Namespace, Vec<Uuid>) -> Fut,
    Fut: Future<Output = IamResult<Vec<T>>> + Send + 'static,
{
    let mut partitions: BTreeMap<Namespace, Vec<Uuid>> = BTreeMap::new();
    for (ns, uuid) in refs {
        let keys = partitions.entry(ns).or_default();
        if !keys.contains(&uuid) {
            keys.push(uuid);
        }
    }
    if partitions.is_empty() {
        return Ok(Vec::new());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<IamResult<Vec<T>>>();
    let mut handles = Vec::with_capacity(partitions.len());
    for (ns, uuids) in partitions {
        let tx = tx.clone();
        let fut = fetch(ns, uuids);
        handles.push(tokio::spawn(async move {
            // The receiver outlives every task; a send error means the caller is gone.
            let _ = tx.send(fut.await);
        }));
    }
    drop(tx);

    let mut out = Vec::new();
    let mut first_err: Option<IamError> = None;
    while let Some(result) = rx.recv().await {
        match result {
            Ok(mut items) => out.append(&mut items),
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }

    for handle in handles {
        if let Err(join_err) = handle.await {
            warn!(error = %join_err, "namespace fan-out task failed");
            if first_err.is_none() {
                first_err = Some(IamError::internal(format!("fan-out task failed: {join_err}")));
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}
