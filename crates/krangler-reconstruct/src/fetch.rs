use krangler_store::ChunkStore;
use krangler_types::ContentId;
use rayon::prelude::*;

use crate::error::{ReconstructError, ReconstructResult};

/// Chunks fetched concurrently before their bytes are written out, bounding
/// memory to roughly this many chunks.
pub(crate) const FETCH_WINDOW: usize = 32;

/// Fetch, decompress and verify one chunk, checking its length against the
/// length the caller expects.
pub(crate) fn fetch_chunk(
    store: &dyn ChunkStore,
    path: &str,
    key: &ContentId,
    expected_len: u32,
) -> ReconstructResult<Vec<u8>> {
    let data = store
        .load(key)
        .map_err(|e| ReconstructError::from_store(path, key, e))?;
    if data.len() as u64 != u64::from(expected_len) {
        return Err(ReconstructError::ChecksumMismatch {
            path: path.to_owned(),
            key: Some(*key),
            detail: format!(
                "chunk {key} is {} bytes, expected {expected_len}",
                data.len()
            ),
        });
    }
    Ok(data)
}

/// Fetch `(key, len)` pairs in parallel windows and hand each chunk to `sink`
/// in order. The first failure stops the walk.
pub(crate) fn for_each_chunk<F>(
    store: &dyn ChunkStore,
    path: &str,
    chunks: &[(ContentId, u32)],
    mut sink: F,
) -> ReconstructResult<()>
where
    F: FnMut(&[u8]) -> ReconstructResult<()>,
{
    for window in chunks.chunks(FETCH_WINDOW) {
        let fetched: Vec<ReconstructResult<Vec<u8>>> = window
            .par_iter()
            .map(|(key, len)| fetch_chunk(store, path, key, *len))
            .collect();
        for data in fetched {
            sink(&data?)?;
        }
    }
    Ok(())
}
