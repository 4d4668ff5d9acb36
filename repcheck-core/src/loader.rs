//! Concurrent checkpoint loading.

use crate::checkpoint::Checkpoint;
use crate::error::VerifyError;
use std::path::PathBuf;

/// Load two checkpoints on the blocking pool and wait for both.
///
/// When both loads fail, the error for `a` is returned.
pub async fn load_pair(a: PathBuf, b: PathBuf) -> Result<(Checkpoint, Checkpoint), VerifyError> {
    tracing::info!(a = %a.display(), b = %b.display(), "Loading checkpoints");
    let load_a = tokio::task::spawn_blocking(move || Checkpoint::load(&a));
    let load_b = tokio::task::spawn_blocking(move || Checkpoint::load(&b));

    let (ra, rb) = tokio::try_join!(load_a, load_b)
        .map_err(|e| VerifyError::task(format!("checkpoint loader panicked: {e}")))?;
    Ok((ra?, rb?))
}
