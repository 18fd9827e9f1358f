//! Durable gateway state: control-event journal, disabled-drive set and
//! curtailment snapshot.
//!
//! All three files are rewritten in full via write-temp + rename, so a
//! crash mid-write leaves the previous version intact. Disk failures are
//! logged and never surfaced to command callers; the in-memory state stays
//! authoritative.

mod curtailment;
mod disabled;
mod journal;

pub use curtailment::{CurtailedDrive, CurtailmentSnapshot, CurtailmentStore};
pub use disabled::DisabledDrives;
pub use journal::{ControlEvent, DriveEventInfo, EventJournal, JOURNAL_RETENTION};

use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Serialize to a temp file beside `path`, then rename into place
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
