use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use smol_str::SmolStr;

use super::LocalCacheStore;
use crate::content::DraftKey;
use crate::error::DraftError;

const EXTENSION: &str = "json";

/// Cache store keeping one file per key, in a directory owned by one user.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves either the old value or the new one, never a torn
/// file.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    user_id: SmolStr,
    dir: PathBuf,
}

impl FileCacheStore {
    /// Open (and create if needed) the store for `user_id` under `root`.
    ///
    /// Each user gets their own subdirectory. Storage keys embed both ids with
    /// `-` separators, so a shared directory can't tell `(a-b, c)` from
    /// `(a, b-c)`.
    pub fn open(root: impl AsRef<Path>, user_id: impl Into<SmolStr>) -> Result<Self, DraftError> {
        let user_id = user_id.into();
        let dir = root.as_ref().join(encode_file_name(&user_id));
        std::fs::create_dir_all(&dir)?;
        Ok(Self { user_id, dir })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", encode_file_name(key), EXTENSION))
    }

    /// All keys currently stored.
    pub fn keys(&self) -> Result<Vec<String>, DraftError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(key) = decode_file_name(stem) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Drafts cached for this store's user.
    pub fn list_local_drafts(&self) -> Result<Vec<DraftKey>, DraftError> {
        let prefix = DraftKey::user_prefix(&self.user_id);
        Ok(self
            .keys()?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(prefix.as_str())
                    .map(|contact| DraftKey::new(self.user_id.clone(), contact))
            })
            .collect())
    }
}

impl LocalCacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>, DraftError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DraftError::CacheRead(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DraftError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value).map_err(|e| DraftError::CacheWrite(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| DraftError::CacheWrite(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), DraftError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DraftError::CacheWrite(e.to_string())),
        }
    }
}

/// Percent-escape anything that isn't safe in a file name on every platform.
pub fn encode_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn decode_file_name(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{DraftContent, LocalDraftRecord};
    use crate::local::{LocalLookup, load_record, save_record};

    #[test]
    fn test_file_name_escaping() {
        let key = "email-draft-user@example.com-c/1";
        let encoded = encode_file_name(key);
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('.'));
        assert_eq!(decode_file_name(&encoded).as_deref(), Some(key));
    }

    #[test]
    fn test_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::open(dir.path(), "u").unwrap();

        assert_eq!(store.get("email-draft-u-c").unwrap(), None);
        store.set("email-draft-u-c", "{}").unwrap();
        assert_eq!(store.get("email-draft-u-c").unwrap().as_deref(), Some("{}"));
        store.set("email-draft-u-c", "{\"a\":1}").unwrap();
        assert_eq!(
            store.get("email-draft-u-c").unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        store.remove("email-draft-u-c").unwrap();
        store.remove("email-draft-u-c").unwrap();
        assert_eq!(store.get("email-draft-u-c").unwrap(), None);
    }

    #[test]
    fn test_list_local_drafts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::open(dir.path(), "u1").unwrap();
        store.set(&DraftKey::new("u1", "c1").storage_key(), "{}").unwrap();
        store.set(&DraftKey::new("u1", "c2").storage_key(), "{}").unwrap();

        let drafts = store.list_local_drafts().unwrap();
        assert_eq!(
            drafts,
            vec![DraftKey::new("u1", "c1"), DraftKey::new("u1", "c2")]
        );
    }

    #[test]
    fn test_users_sharing_a_dash_prefix_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let ab = FileCacheStore::open(dir.path(), "a-b").unwrap();
        let a = FileCacheStore::open(dir.path(), "a").unwrap();

        // Both keys render as `email-draft-a-b-c`.
        let theirs = DraftKey::new("a-b", "c");
        let mine = DraftKey::new("a", "b-c");
        assert_eq!(theirs.storage_key(), mine.storage_key());

        let record = LocalDraftRecord {
            content: DraftContent::new("secret of a-b", ""),
            timestamp: 1,
        };
        save_record(&ab, &theirs, &record).unwrap();

        assert!(a.list_local_drafts().unwrap().is_empty());
        assert_eq!(load_record(&a, &mine), LocalLookup::Absent);
        assert_eq!(ab.list_local_drafts().unwrap(), vec![theirs.clone()]);
        assert_eq!(load_record(&ab, &theirs), LocalLookup::Found(record));
    }

    #[test]
    fn test_no_tmp_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::open(dir.path(), "u").unwrap();
        store.set("k", "v").unwrap();
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["k.json".to_string()]);
    }
}
