use byteorder::{ByteOrder, LittleEndian};

use crate::error::{found, Result};
use crate::registry::{RegValue, Registry, RootKey};

pub const MRU_LIST_EX: &str = "MRUListEx";

const MRU_TERMINATOR: u32 = 0xffff_ffff;

/// Decodes an MRUListEx buffer into slot indices, most recent first.
///
/// Each 4-byte chunk contributes the sum of its bytes. Chunks are visited
/// while more than four bytes remain after their start, so the final chunk
/// (normally the terminator) is never read. Buffers shorter than two chunks
/// decode to nothing.
pub fn decode_mru(buffer: &[u8]) -> Vec<u32> {
    if buffer.len() < 8 {
        return Vec::new();
    }

    let end = buffer.len() - 4;
    (0..end)
        .step_by(4)
        .map(|offset| buffer[offset..offset + 4].iter().map(|&b| u32::from(b)).sum::<u32>())
        .collect()
}

/// Decodes an MRUListEx buffer as little-endian 32-bit indices, stopping at
/// the `0xffffffff` terminator or the last whole chunk.
pub fn decode_mru_strict(buffer: &[u8]) -> Vec<u32> {
    buffer
        .chunks_exact(4)
        .map(LittleEndian::read_u32)
        .take_while(|&index| index != MRU_TERMINATOR)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MruEntry {
    pub index: u32,
    pub value: RegValue,
}

fn read_mru_indices<R: Registry>(registry: &R, key: &R::Key, root: RootKey, path: &str) -> Result<Option<Vec<u32>>> {
    let value = match found(registry.read_value(key, MRU_LIST_EX))? {
        Some(value) => value,
        None => return Ok(None),
    };

    match value.as_bytes() {
        Some(bytes) => Ok(Some(decode_mru(bytes))),
        None => {
            debug!("{}\\{} {} is not a binary value", root, path, MRU_LIST_EX);
            Ok(None)
        }
    }
}

/// Reads and decodes the MRUListEx value of the key at `path`.
pub fn read_mru_list<R: Registry>(registry: &R, root: RootKey, path: &str) -> Result<Option<Vec<u32>>> {
    match found(registry.open_key(root, path))? {
        Some(key) => read_mru_indices(registry, &key, root, path),
        None => Ok(None),
    }
}

/// Reads the values an MRUListEx refers to, in most-recently-used order.
/// Slots without a matching value are skipped.
pub fn read_mru_entries<R: Registry>(registry: &R, root: RootKey, path: &str) -> Result<Vec<MruEntry>> {
    let key = match found(registry.open_key(root, path))? {
        Some(key) => key,
        None => return Ok(Vec::new()),
    };

    let indices = match read_mru_indices(registry, &key, root, path)? {
        Some(indices) => indices,
        None => return Ok(Vec::new()),
    };

    let mut entries = Vec::with_capacity(indices.len());
    for index in indices {
        match found(registry.read_value(&key, &index.to_string()))? {
            Some(value) => entries.push(MruEntry { index, value }),
            None => trace!("mru slot {} has no value", index),
        }
    }

    Ok(entries)
}

#[test]
fn decode_mru_short_buffers() {
    assert!(decode_mru(&[]).is_empty());
    assert!(decode_mru(&[1, 2, 3]).is_empty());
    assert!(decode_mru(&[1, 2, 3, 4]).is_empty());
    assert!(decode_mru(&[1, 2, 3, 4, 5]).is_empty());
    assert!(decode_mru(&[1, 2, 3, 4, 5, 6]).is_empty());
    assert!(decode_mru(&[1, 2, 3, 4, 5, 6, 7]).is_empty());
}

#[test]
fn decode_mru_length_follows_scan_range() {
    // one entry per chunk starting below len - 4
    for len in 8..=20 {
        let buffer = vec![1u8; len];
        assert_eq!(decode_mru(&buffer).len(), (len - 4 + 3) / 4, "len {}", len);
    }
    assert_eq!(decode_mru(&[1, 2, 3, 4, 5, 6, 7, 8, 9]), vec![10, 26]);
}

#[test]
fn decode_mru_skips_last_chunk() {
    assert_eq!(decode_mru(&[1, 2, 3, 4, 5, 6, 7, 8]), vec![10]);
    assert_eq!(decode_mru(&[1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]), vec![4, 8]);
}

#[test]
fn decode_mru_sums_bytes() {
    let buffer = [2, 0, 0, 0, 0, 1, 0, 0, 255, 255, 255, 255];
    assert_eq!(decode_mru(&buffer), vec![2, 1]);
    // a partial tail longer than four bytes still bounds the scan
    assert_eq!(decode_mru(&[1, 0, 0, 0, 9, 9, 9, 9, 7]), vec![1, 36]);
}

#[test]
fn decode_mru_strict_reads_little_endian() {
    assert_eq!(decode_mru_strict(&[2, 0, 0, 0, 1, 0, 0, 0, 255, 255, 255, 255]), vec![2, 1]);
    assert_eq!(decode_mru_strict(&[0, 1, 0, 0]), vec![256]);
    assert_eq!(decode_mru_strict(&[5, 0, 0, 0, 7]), vec![5]);
    assert!(decode_mru_strict(&[255, 255, 255, 255, 1, 0, 0, 0]).is_empty());
}

#[cfg(test)]
fn recent_docs() -> crate::registry::MemoryRegistry {
    let mut registry = crate::registry::MemoryRegistry::new();
    let path = "Software\\Microsoft\\Windows\\CurrentVersion\\Explorer\\RecentDocs";
    registry.set_value(
        RootKey::CurrentUser,
        path,
        MRU_LIST_EX,
        RegValue::Binary(vec![1, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 255, 255, 255, 255]),
    );
    registry.set_value(RootKey::CurrentUser, path, "0", RegValue::Binary(b"a.txt".to_vec()));
    registry.set_value(RootKey::CurrentUser, path, "1", RegValue::Binary(b"b.txt".to_vec()));
    registry
}

#[test]
fn read_mru_list_from_registry() {
    let registry = recent_docs();
    let path = "Software\\Microsoft\\Windows\\CurrentVersion\\Explorer\\RecentDocs";
    assert_eq!(read_mru_list(&registry, RootKey::CurrentUser, path).unwrap(), Some(vec![1, 3, 0]));
    assert_eq!(read_mru_list(&registry, RootKey::CurrentUser, "Software\\Missing").unwrap(), None);
}

#[test]
fn read_mru_entries_skips_missing_slots() {
    let registry = recent_docs();
    let path = "Software\\Microsoft\\Windows\\CurrentVersion\\Explorer\\RecentDocs";
    let entries = read_mru_entries(&registry, RootKey::CurrentUser, path).unwrap();
    let indices: Vec<u32> = entries.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![1, 0]);
    assert_eq!(entries[0].value, RegValue::Binary(b"b.txt".to_vec()));
}

#[cfg(test)]
struct CountingRegistry {
    inner: crate::registry::MemoryRegistry,
    opened: std::cell::Cell<usize>,
}

#[cfg(test)]
impl Registry for CountingRegistry {
    type Key = crate::registry::MemoryKeyHandle;

    fn open_key(&self, root: RootKey, path: &str) -> Result<Self::Key> {
        self.opened.set(self.opened.get() + 1);
        self.inner.open_key(root, path)
    }

    fn enumerate_subkeys(&self, key: &Self::Key) -> Result<Vec<String>> {
        self.inner.enumerate_subkeys(key)
    }

    fn read_value(&self, key: &Self::Key, name: &str) -> Result<RegValue> {
        self.inner.read_value(key, name)
    }
}

#[test]
fn read_mru_entries_opens_key_once() {
    let registry = CountingRegistry {
        inner: recent_docs(),
        opened: std::cell::Cell::new(0),
    };
    let path = "Software\\Microsoft\\Windows\\CurrentVersion\\Explorer\\RecentDocs";
    let entries = read_mru_entries(&registry, RootKey::CurrentUser, path).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(registry.opened.get(), 1);
}
