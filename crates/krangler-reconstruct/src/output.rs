use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::ReconstructResult;

/// Upper bound on memory reserved up front for an in-memory rebuild.
const MAX_PREALLOC: u64 = 64 << 20;

/// Buffer for output whose length comes from decoded, untrusted metadata.
/// The buffer grows past the cap only as verified data arrives.
pub(crate) fn output_buffer(declared_len: u64) -> Vec<u8> {
    Vec::with_capacity(declared_len.min(MAX_PREALLOC) as usize)
}

/// Write through `fill` into a temporary file beside `dest`, then promote it
/// to `dest` only if `fill` succeeds. On failure the temporary is removed and
/// `dest` is untouched.
pub(crate) fn write_atomically<F>(dest: &Path, fill: F) -> ReconstructResult<()>
where
    F: FnOnce(&mut dyn Write) -> ReconstructResult<()>,
{
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let staged = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(staged.as_file());
        fill(&mut writer)?;
        writer.flush()?;
    }
    staged.as_file().sync_all()?;
    staged.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
