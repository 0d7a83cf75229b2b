use std::collections::BTreeMap;

use krangler_crypto::ContentHasher;

use crate::error::{CodecError, CodecResult};
use crate::pack::{FILE_TAG, FREE_TAG, GGPK_TAG, HEADER_LEN, PDIR_TAG, SUPPORTED_VERSIONS};

/// Builds a GGPK pack archive in memory.
///
/// File records are laid out first in path order, followed by directory
/// records (deepest first, root last) and any free records.
#[derive(Clone, Debug)]
pub struct PackWriter {
    version: u32,
    files: BTreeMap<Vec<String>, Vec<u8>>,
    free: Vec<u32>,
}

#[derive(Default)]
struct DirNode {
    dirs: BTreeMap<String, DirNode>,
    files: Vec<Child>,
}

struct Child {
    name: String,
    offset: u64,
    sha256: [u8; 32],
}

impl Default for PackWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PackWriter {
    pub fn new() -> Self {
        Self::with_version(2)
    }

    pub fn with_version(version: u32) -> Self {
        Self {
            version,
            files: BTreeMap::new(),
            free: Vec::new(),
        }
    }

    /// Queue a file under a `/`-separated path. Re-adding a path replaces it.
    pub fn add_file(&mut self, path: &str, data: impl Into<Vec<u8>>) -> CodecResult<&mut Self> {
        let parts: Vec<String> = path
            .split(['/', '\\'])
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect();
        if parts.is_empty() {
            return Err(CodecError::Encode(format!("empty pack path {path:?}")));
        }
        if parts.iter().any(|p| p.contains('\0')) {
            return Err(CodecError::Encode(format!("NUL in pack path {path:?}")));
        }
        self.files.insert(parts, data.into());
        Ok(self)
    }

    /// Append a free record spanning `len` bytes in total (minimum 16).
    pub fn add_free(&mut self, len: u32) -> &mut Self {
        self.free.push(len.max(16));
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Serialize the archive.
    pub fn finish(&self) -> CodecResult<Vec<u8>> {
        if !SUPPORTED_VERSIONS.contains(&self.version) {
            return Err(CodecError::Encode(format!("unsupported version {}", self.version)));
        }
        let mut out = vec![0u8; HEADER_LEN as usize];
        let mut root = DirNode::default();

        for (parts, data) in &self.files {
            let Some((name, dirs)) = parts.split_last() else {
                continue;
            };
            let collision =
                || CodecError::Encode(format!("{} collides with a file", parts.join("/")));
            let offset = write_file(&mut out, name, data)?;
            let mut node = &mut root;
            for dir in dirs {
                if node.files.iter().any(|f| f.name == *dir) {
                    return Err(collision());
                }
                node = node.dirs.entry(dir.clone()).or_default();
            }
            if node.dirs.contains_key(name) {
                return Err(collision());
            }
            node.files.push(Child {
                name: name.clone(),
                offset,
                sha256: ContentHasher::sha256(data),
            });
        }

        let root_offset = write_dir(&mut out, "", &root)?;

        let first_free = if self.free.is_empty() { 0 } else { out.len() as u64 };
        for (i, &len) in self.free.iter().enumerate() {
            let start = out.len() as u64;
            let next = if i + 1 < self.free.len() { start + u64::from(len) } else { 0 };
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&FREE_TAG);
            out.extend_from_slice(&next.to_le_bytes());
            out.resize(start as usize + len as usize, 0);
        }

        out[0..4].copy_from_slice(&HEADER_LEN.to_le_bytes());
        out[4..8].copy_from_slice(&GGPK_TAG);
        out[8..12].copy_from_slice(&self.version.to_le_bytes());
        out[12..20].copy_from_slice(&root_offset.to_le_bytes());
        out[20..28].copy_from_slice(&first_free.to_le_bytes());
        Ok(out)
    }
}

fn utf16_name(name: &str) -> Vec<u8> {
    name.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn record_len(body: usize) -> CodecResult<u32> {
    u32::try_from(body + 8)
        .map_err(|_| CodecError::Encode(format!("record of {body} bytes exceeds u32")))
}

fn write_file(out: &mut Vec<u8>, name: &str, data: &[u8]) -> CodecResult<u64> {
    let offset = out.len() as u64;
    let name_bytes = utf16_name(name);
    let rec_len = record_len(4 + 32 + name_bytes.len() + data.len())?;
    out.extend_from_slice(&rec_len.to_le_bytes());
    out.extend_from_slice(&FILE_TAG);
    out.extend_from_slice(&((name_bytes.len() / 2) as u32).to_le_bytes());
    out.extend_from_slice(&ContentHasher::sha256(data));
    out.extend_from_slice(&name_bytes);
    out.extend_from_slice(data);
    Ok(offset)
}

/// Writes subdirectories first, then this directory. Returns its offset.
fn write_dir(out: &mut Vec<u8>, name: &str, node: &DirNode) -> CodecResult<u64> {
    let mut children: Vec<Child> = Vec::with_capacity(node.dirs.len() + node.files.len());
    for (sub_name, sub) in &node.dirs {
        let offset = write_dir(out, sub_name, sub)?;
        let sha256 = dir_digest(sub);
        children.push(Child {
            name: sub_name.clone(),
            offset,
            sha256,
        });
    }
    for file in &node.files {
        children.push(Child {
            name: file.name.clone(),
            offset: file.offset,
            sha256: file.sha256,
        });
    }
    children.sort_by(|a, b| a.name.cmp(&b.name));

    let concatenated: Vec<u8> = children.iter().flat_map(|c| c.sha256).collect();
    let digest = ContentHasher::sha256(&concatenated);

    let offset = out.len() as u64;
    let name_bytes = utf16_name(name);
    let rec_len = record_len(4 + 4 + 32 + name_bytes.len() + children.len() * 12)?;
    out.extend_from_slice(&rec_len.to_le_bytes());
    out.extend_from_slice(&PDIR_TAG);
    out.extend_from_slice(&((name_bytes.len() / 2) as u32).to_le_bytes());
    out.extend_from_slice(&(children.len() as u32).to_le_bytes());
    out.extend_from_slice(&digest);
    out.extend_from_slice(&name_bytes);
    for child in &children {
        out.extend_from_slice(&name_hash(&child.name).to_le_bytes());
        out.extend_from_slice(&child.offset.to_le_bytes());
    }
    Ok(offset)
}

fn dir_digest(node: &DirNode) -> [u8; 32] {
    let mut children: Vec<(&str, [u8; 32])> = node
        .dirs
        .iter()
        .map(|(name, sub)| (name.as_str(), dir_digest(sub)))
        .chain(node.files.iter().map(|f| (f.name.as_str(), f.sha256)))
        .collect();
    children.sort_by(|a, b| a.0.cmp(b.0));
    let concatenated: Vec<u8> = children.iter().flat_map(|c| c.1).collect();
    ContentHasher::sha256(&concatenated)
}

/// FNV-1a over the lower-cased UTF-16LE name.
fn name_hash(name: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for unit in name.to_lowercase().encode_utf16() {
        for byte in unit.to_le_bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
    }
    hash
}
