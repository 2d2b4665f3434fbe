//! Startup pass that installs the page controller into already-open tabs.

use std::time::Duration;

use futures_util::future::join_all;
use soundtab_proto::media::{HostTab, TabId};
use tracing::{debug, info, warn};

use crate::host::{with_timeout, HostPlatform};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanReport {
    pub ready: Vec<TabId>,
    pub failed: Vec<(TabId, String)>,
}

/// Inject into every scriptable tab, `batch_size` at a time.  One tab failing
/// or hanging never stops the rest of its batch or the batches after it.
pub async fn prepare_pages(
    host: &dyn HostPlatform,
    tabs: &[HostTab],
    batch_size: usize,
    timeout: Duration,
) -> ScanReport {
    let targets: Vec<TabId> = tabs
        .iter()
        .filter(|t| t.is_scriptable())
        .map(|t| t.id)
        .collect();
    debug!(
        "scan: {} of {} tabs are scriptable",
        targets.len(),
        tabs.len()
    );

    let mut report = ScanReport::default();
    for batch in targets.chunks(batch_size.max(1)) {
        let results = join_all(batch.iter().map(|&id| async move {
            (id, with_timeout(timeout, host.inject_controller(id)).await)
        }))
        .await;

        for (id, result) in results {
            match result {
                Ok(()) => report.ready.push(id),
                Err(e) => {
                    debug!("scan: tab {} not prepared: {}", id, e);
                    report.failed.push((id, e.to_string()));
                }
            }
        }
    }

    if report.failed.is_empty() {
        info!("scan: controller ready in {} tabs", report.ready.len());
    } else {
        warn!(
            "scan: controller ready in {} tabs, {} failed",
            report.ready.len(),
            report.failed.len()
        );
    }
    report
}
