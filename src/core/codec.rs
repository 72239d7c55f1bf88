//! Binary persistence record for a tag table
//!
//! Flat little-endian layout with no padding:
//!
//! ```text
//! [entry_count: u32]
//!   entry_count x [file_id: u64][name: 255 bytes, NUL padded]
//! [lookup_capacity: u32][num_tags: u32]
//!   lookup_capacity x
//!     [tag_name: 255 bytes, NUL padded; empty = free slot]
//!     [bucket_size: u32]
//!     bucket_size x [entry index: u32]
//! ```
//!
//! Entries appear once each, however many tags reference them. Decoding
//! validates the whole record and fails with `CorruptData` without building
//! anything when it is inconsistent.

use crate::core::config::IndexConfig;
use crate::core::element::Element;
use crate::core::entry::{EntryArena, EntryRef, MAX_NAME_LEN};
use crate::core::table::{validate_tag, TagId, TagLookup, TagTable, MAX_TAG_LEN};
use crate::error::{Result, TagError};
use ahash::AHashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fixed width of every name field
pub const NAME_FIELD_LEN: usize = 255;

const ENTRY_RECORD_LEN: usize = 8 + NAME_FIELD_LEN;
const SLOT_HEADER_LEN: usize = NAME_FIELD_LEN + 4;

const _: () = assert!(MAX_NAME_LEN <= NAME_FIELD_LEN && MAX_TAG_LEN <= NAME_FIELD_LEN);

fn put_u32(buf: &mut Vec<u8>, value: usize, what: &str) -> Result<()> {
    let value = u32::try_from(value)
        .map_err(|_| TagError::InvalidArgument(format!("{} does not fit in u32", what)))?;
    buf.extend_from_slice(&value.to_le_bytes());
    Ok(())
}

fn put_name(buf: &mut Vec<u8>, name: &str) -> Result<()> {
    let bytes = name.as_bytes();
    if bytes.len() > NAME_FIELD_LEN {
        return Err(TagError::InvalidArgument(format!(
            "name '{}' exceeds {} bytes",
            name, NAME_FIELD_LEN
        )));
    }
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + NAME_FIELD_LEN - bytes.len(), 0);
    Ok(())
}

/// Serialize a table
pub fn encode(table: &TagTable) -> Result<Vec<u8>> {
    let arena = table.arena();
    let lookup = table.lookup_table();

    let mut index_of: AHashMap<u32, u32> = AHashMap::new();
    index_of.try_reserve(arena.len())?;
    let mut buf = Vec::new();
    buf.try_reserve(4 + arena.len() * ENTRY_RECORD_LEN + 8 + lookup.capacity() * SLOT_HEADER_LEN)?;

    put_u32(&mut buf, arena.len(), "entry count")?;
    for (position, (handle, entry)) in arena.iter().enumerate() {
        index_of.insert(handle.slot(), position as u32);
        buf.extend_from_slice(&entry.id.to_le_bytes());
        put_name(&mut buf, &entry.name)?;
    }

    put_u32(&mut buf, lookup.capacity(), "lookup capacity")?;
    put_u32(&mut buf, table.num_tags(), "tag count")?;
    for slot in lookup.slots() {
        let name = match slot {
            Some(name) => name,
            None => {
                put_name(&mut buf, "")?;
                put_u32(&mut buf, 0, "bucket size")?;
                continue;
            }
        };
        let members = table
            .lookup(name)
            .map(Element::to_vec)
            .unwrap_or_default();
        put_name(&mut buf, name)?;
        put_u32(&mut buf, members.len(), "bucket size")?;
        buf.try_reserve(members.len() * 4)?;
        for member in members {
            let index = index_of.get(&member.slot()).ok_or_else(|| {
                TagError::InvalidArgument(format!("tag '{}' holds a released entry", name))
            })?;
            buf.extend_from_slice(&index.to_le_bytes());
        }
    }

    debug!(
        "Encoded {} entries and {} tags into {} bytes",
        arena.len(),
        table.num_tags(),
        buf.len()
    );
    Ok(buf)
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(TagError::corrupt(format!(
                "truncated {} at byte {}",
                what, self.offset
            )));
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let b = self.take(8, what)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(b);
        Ok(u64::from_le_bytes(word))
    }

    fn name(&mut self, what: &str) -> Result<String> {
        let field = self.take(NAME_FIELD_LEN, what)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8(field[..end].to_vec())
            .map_err(|_| TagError::corrupt(format!("{} is not valid UTF-8", what)))
    }

    /// Fail unless `count` records of `record_len` bytes can still follow
    fn expect_room(&self, count: u32, record_len: usize, what: &str) -> Result<()> {
        let needed = (count as usize).checked_mul(record_len);
        match needed {
            Some(needed) if needed <= self.remaining() => Ok(()),
            _ => Err(TagError::corrupt(format!(
                "{} of {} exceeds the remaining {} bytes",
                what,
                count,
                self.remaining()
            ))),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(TagError::corrupt(format!(
                "{} trailing bytes after record",
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Rebuild a table from a record
///
/// Bucket count and backend come from `config`; ids, names and membership
/// come from the record. Free tag ids are reused in ascending order.
pub fn decode(bytes: &[u8], config: &IndexConfig) -> Result<TagTable> {
    let result = decode_inner(bytes, config);
    if let Err(ref e) = result {
        warn!("Rejected index record ({} bytes): {}", bytes.len(), e);
    }
    result
}

fn decode_inner(bytes: &[u8], config: &IndexConfig) -> Result<TagTable> {
    config.validate()?;
    let mut reader = Reader::new(bytes);

    let entry_count = reader.u32("entry count")?;
    reader.expect_room(entry_count, ENTRY_RECORD_LEN, "entry count")?;

    let mut arena = EntryArena::new();
    let mut handles: Vec<EntryRef> = Vec::new();
    handles.try_reserve_exact(entry_count as usize)?;
    for i in 0..entry_count {
        let id = reader.u64("entry id")?;
        let name = reader.name("entry name")?;
        if arena.lookup(id).is_some() {
            return Err(TagError::corrupt(format!(
                "entry {} repeats file id {}",
                i, id
            )));
        }
        handles.push(arena.intern(id, &name)?);
    }

    let capacity = reader.u32("lookup capacity")?;
    let num_tags = reader.u32("tag count")?;
    if capacity == 0 {
        return Err(TagError::corrupt("lookup capacity is zero"));
    }
    reader.expect_room(capacity, SLOT_HEADER_LEN, "lookup capacity")?;

    let mut referenced = vec![false; handles.len()];
    let mut slots: Vec<Option<String>> = Vec::new();
    slots.try_reserve_exact(capacity as usize)?;
    let mut buckets: Vec<(TagId, Element)> = Vec::new();

    for id in 0..capacity {
        let name = reader.name("tag name")?;
        let size = reader.u32("bucket size")?;

        if name.is_empty() {
            if size != 0 {
                return Err(TagError::corrupt(format!(
                    "free tag slot {} has {} members",
                    id, size
                )));
            }
            slots.push(None);
            continue;
        }
        if size == 0 {
            return Err(TagError::corrupt(format!("tag '{}' has no members", name)));
        }
        validate_tag(&name).map_err(|e| TagError::corrupt(e.to_string()))?;
        reader.expect_room(size, 4, "bucket size")?;

        let mut element = Element::new(config.backend);
        for _ in 0..size {
            let index = reader.u32("bucket index")? as usize;
            let handle = *handles.get(index).ok_or_else(|| {
                TagError::corrupt(format!(
                    "tag '{}' references entry {} of {}",
                    name,
                    index,
                    handles.len()
                ))
            })?;
            element.insert(handle).map_err(|e| match e {
                TagError::Duplicate(file) => TagError::corrupt(format!(
                    "tag '{}' lists file {} twice",
                    name, file
                )),
                other => other,
            })?;
            arena.retain(handle);
            referenced[index] = true;
        }
        buckets.push((id, element));
        slots.push(Some(name));
    }
    reader.finish()?;

    if buckets.len() != num_tags as usize {
        return Err(TagError::corrupt(format!(
            "record claims {} tags but holds {}",
            num_tags,
            buckets.len()
        )));
    }
    if let Some(orphan) = referenced.iter().position(|used| !used) {
        return Err(TagError::corrupt(format!(
            "entry {} (file {}) belongs to no tag",
            orphan,
            handles[orphan].id()
        )));
    }

    let lookup = TagLookup::from_slots(slots)?;
    TagTable::from_parts(config, lookup, arena, buckets)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a table to `path`, replacing it atomically
///
/// Blocking: the record goes to a sibling temporary file, is synced, then
/// renamed over `path`.
pub fn save_to_path<P: AsRef<Path>>(table: &TagTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode(table)?;
    let tmp = temp_path(path);

    let written = (|| -> Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written?;

    info!(
        "Saved {} tags / {} entries ({} bytes) to {}",
        table.num_tags(),
        table.num_entries(),
        bytes.len(),
        path.display()
    );
    Ok(())
}

/// Read a table from `path` (blocking)
pub fn load_from_path<P: AsRef<Path>>(path: P, config: &IndexConfig) -> Result<TagTable> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let table = decode(&bytes, config)?;
    info!(
        "Loaded {} tags / {} entries ({} bytes) from {}",
        table.num_tags(),
        table.num_entries(),
        bytes.len(),
        path.display()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::element::Backend;
    use tempfile::TempDir;

    fn sample(backend: Backend) -> TagTable {
        let mut t = TagTable::with_config(&IndexConfig {
            backend,
            ..IndexConfig::default()
        })
        .unwrap();
        t.insert_tag("letter", 100, "a").unwrap();
        t.insert_tag("a", 100, "a").unwrap();
        t.insert_tag("letter", 101, "b").unwrap();
        t.insert_tag("number", 201, "one").unwrap();
        t
    }

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_name(buf: &mut Vec<u8>, name: &str) {
        put_name(buf, name).unwrap();
    }

    #[test]
    fn test_layout() {
        let t = sample(Backend::Sorted);
        let bytes = encode(&t).unwrap();

        let entries = 3 * ENTRY_RECORD_LEN;
        let slots = 4 * SLOT_HEADER_LEN;
        let indices = (2 + 1 + 1) * 4;
        assert_eq!(bytes.len(), 4 + entries + 8 + slots + indices);
        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..12], &100u64.to_le_bytes());
        assert_eq!(bytes[12], b'a');
        assert_eq!(bytes[13], 0);
    }

    #[test]
    fn test_roundtrip_preserves_ids_and_members() {
        for backend in Backend::ALL {
            let mut t = sample(backend);
            t.remove_tag("a", 100).unwrap();

            let config = IndexConfig {
                backend,
                ..IndexConfig::default()
            };
            let loaded = decode(&encode(&t).unwrap(), &config).unwrap();

            assert_eq!(loaded.num_tags(), 2);
            assert_eq!(loaded.tag_id("letter"), t.tag_id("letter"));
            assert_eq!(loaded.tag_id("number"), t.tag_id("number"));
            assert_eq!(loaded.lookup("letter").unwrap().ids(), vec![100, 101]);
            assert_eq!(loaded.entry(100).unwrap().refcount, 1);
            assert_eq!(loaded.entry(201).unwrap().name, "one");
        }
    }

    #[test]
    fn test_free_slots_survive_reload() {
        let mut t = sample(Backend::Treap);
        let freed = t.tag_id("a").unwrap();
        t.remove_tag("a", 100).unwrap();

        let mut loaded = decode(&encode(&t).unwrap(), &IndexConfig::default()).unwrap();
        loaded.insert_tag("fresh", 5, "five").unwrap();
        assert_eq!(loaded.tag_id("fresh"), Some(freed));
    }

    #[test]
    fn test_empty_table_roundtrip() {
        let t = TagTable::new().unwrap();
        let loaded = decode(&encode(&t).unwrap(), &IndexConfig::default()).unwrap();
        assert_eq!(loaded.num_tags(), 0);
        assert_eq!(loaded.num_entries(), 0);
    }

    #[test]
    fn test_rejects_index_out_of_range() {
        let mut buf = Vec::new();
        push_u32(&mut buf, 1);
        buf.extend_from_slice(&7u64.to_le_bytes());
        push_name(&mut buf, "seven");
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 1);
        push_name(&mut buf, "t");
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 3);

        assert!(matches!(
            decode(&buf, &IndexConfig::default()),
            Err(TagError::CorruptData(_))
        ));
    }

    #[test]
    fn test_rejects_truncation_and_trailing_bytes() {
        let bytes = encode(&sample(Backend::Sorted)).unwrap();
        for cut in [0, 3, 10, bytes.len() / 2, bytes.len() - 1] {
            assert!(matches!(
                decode(&bytes[..cut], &IndexConfig::default()),
                Err(TagError::CorruptData(_))
            ));
        }
        let mut extra = bytes.clone();
        extra.push(0);
        assert!(matches!(
            decode(&extra, &IndexConfig::default()),
            Err(TagError::CorruptData(_))
        ));
    }

    #[test]
    fn test_rejects_huge_counts_without_allocating() {
        let mut buf = Vec::new();
        push_u32(&mut buf, u32::MAX);
        assert!(matches!(
            decode(&buf, &IndexConfig::default()),
            Err(TagError::CorruptData(_))
        ));
    }

    #[test]
    fn test_save_and_load_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tags.idx");
        let t = sample(Backend::Treap);

        save_to_path(&t, &path).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = load_from_path(&path, &IndexConfig::default()).unwrap();
        assert_eq!(loaded.lookup("letter").unwrap().ids(), vec![100, 101]);
        assert_eq!(loaded.num_entries(), 3);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_from_path(dir.path().join("absent"), &IndexConfig::default()),
            Err(TagError::Io(_))
        ));
    }
}
