//! Bundle wire format: one physical archive object packing many small
//! logical files.
//!
//! A bundle is a bincode-framed structure: header, member directory with
//! offsets into a contiguous data area, then the data itself. The header
//! carries a CRC32 of the data area; decoding verifies magic, version,
//! checksum, and directory bounds before any member is handed out.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use nearline_core::{ArchiveError, ArchiveResult};

/// Bundle magic: "NLBN" = 0x4E4C424E
pub const BUNDLE_MAGIC: u32 = 0x4E4C_424E;

/// Current bundle format version
const BUNDLE_VERSION: u8 = 1;

/// Header stored at the front of each bundle object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleHeader {
    /// Magic number (BUNDLE_MAGIC)
    pub magic: u32,
    /// Format version
    pub version: u8,
    /// Number of members packed in this bundle
    pub member_count: u32,
    /// Total data bytes (excluding header and directory)
    pub data_bytes: u64,
    /// CRC32 of the data area
    pub checksum: u32,
    /// Timestamp when the bundle was sealed
    pub sealed_at_secs: u64,
}

/// Directory entry for one member of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Original file name of the member
    pub name: String,
    /// Offset of the member's bytes within the data area
    pub offset: u64,
    /// Length of the member's bytes
    pub len: u64,
}

/// A complete bundle: header, member directory, packed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    /// Bundle header
    pub header: BundleHeader,
    /// Member directory (in packing order)
    pub entries: Vec<BundleEntry>,
    /// Contiguous member data
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl Bundle {
    /// Returns the bytes of the named member, if present and in bounds.
    pub fn member(&self, name: &str) -> Option<&[u8]> {
        self.entries.iter().find(|e| e.name == name).and_then(|e| {
            let start = e.offset as usize;
            self.data.get(start..start + e.len as usize)
        })
    }

    /// Iterates over the member names in packing order.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

/// Assembles a sealed bundle from an ordered member list and the
/// concatenated data area. `members` pairs each name with its byte length,
/// in the order the payloads were appended to `data`.
pub fn assemble(members: &[(String, u64)], data: Vec<u8>) -> Bundle {
    let mut entries = Vec::with_capacity(members.len());
    let mut offset = 0u64;
    for (name, len) in members {
        entries.push(BundleEntry {
            name: name.clone(),
            offset,
            len: *len,
        });
        offset += len;
    }

    let sealed_at_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    Bundle {
        header: BundleHeader {
            magic: BUNDLE_MAGIC,
            version: BUNDLE_VERSION,
            member_count: entries.len() as u32,
            data_bytes: data.len() as u64,
            checksum: crc32fast::hash(&data),
            sealed_at_secs,
        },
        entries,
        data,
    }
}

/// Encodes a bundle into its physical object bytes.
pub fn encode_bundle(bundle: &Bundle) -> ArchiveResult<Vec<u8>> {
    bincode::serialize(bundle).map_err(|e| ArchiveError::Serialization {
        reason: e.to_string(),
    })
}

/// Decodes and verifies a bundle object fetched from `path`.
///
/// Verification covers magic, version, data checksum, and every directory
/// entry's bounds; any violation is a `CorruptBundle` error.
pub fn decode_bundle(path: &str, raw: &[u8]) -> ArchiveResult<Bundle> {
    let bundle: Bundle = bincode::deserialize(raw).map_err(|e| ArchiveError::CorruptBundle {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    if bundle.header.magic != BUNDLE_MAGIC {
        return Err(ArchiveError::CorruptBundle {
            path: path.to_string(),
            reason: format!("bad magic {:#x}", bundle.header.magic),
        });
    }
    if bundle.header.version != BUNDLE_VERSION {
        return Err(ArchiveError::CorruptBundle {
            path: path.to_string(),
            reason: format!("unsupported version {}", bundle.header.version),
        });
    }
    if bundle.header.data_bytes != bundle.data.len() as u64 {
        return Err(ArchiveError::CorruptBundle {
            path: path.to_string(),
            reason: "data length does not match header".to_string(),
        });
    }
    if bundle.header.member_count != bundle.entries.len() as u32 {
        return Err(ArchiveError::CorruptBundle {
            path: path.to_string(),
            reason: "member count does not match directory".to_string(),
        });
    }
    let actual = crc32fast::hash(&bundle.data);
    if actual != bundle.header.checksum {
        return Err(ArchiveError::CorruptBundle {
            path: path.to_string(),
            reason: format!(
                "checksum mismatch: expected {:#x}, actual {:#x}",
                bundle.header.checksum, actual
            ),
        });
    }
    for entry in &bundle.entries {
        let in_bounds = entry
            .offset
            .checked_add(entry.len)
            .is_some_and(|end| end <= bundle.data.len() as u64);
        if !in_bounds {
            return Err(ArchiveError::CorruptBundle {
                path: path.to_string(),
                reason: format!("entry {} exceeds data bounds", entry.name),
            });
        }
    }

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> Bundle {
        let mut data = Vec::new();
        data.extend_from_slice(b"first");
        data.extend_from_slice(b"second!");
        assemble(
            &[("a.txt".to_string(), 5), ("b.txt".to_string(), 7)],
            data,
        )
    }

    #[test]
    fn test_assemble_offsets() {
        let bundle = sample_bundle();
        assert_eq!(bundle.entries[0], BundleEntry {
            name: "a.txt".to_string(),
            offset: 0,
            len: 5,
        });
        assert_eq!(bundle.entries[1], BundleEntry {
            name: "b.txt".to_string(),
            offset: 5,
            len: 7,
        });
        assert_eq!(bundle.header.member_count, 2);
        assert_eq!(bundle.header.data_bytes, 12);
        assert!(bundle.header.sealed_at_secs > 0);
    }

    #[test]
    fn test_member_lookup() {
        let bundle = sample_bundle();
        assert_eq!(bundle.member("a.txt"), Some(&b"first"[..]));
        assert_eq!(bundle.member("b.txt"), Some(&b"second!"[..]));
        assert_eq!(bundle.member("missing.txt"), None);
    }

    #[test]
    fn test_member_names_in_order() {
        let bundle = sample_bundle();
        let names: Vec<_> = bundle.member_names().collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let bundle = sample_bundle();
        let raw = encode_bundle(&bundle).unwrap();
        let decoded = decode_bundle("node/bundle-1.nlb", &raw).unwrap();
        assert_eq!(decoded.entries, bundle.entries);
        assert_eq!(decoded.data, bundle.data);
        assert_eq!(decoded.member("b.txt"), Some(&b"second!"[..]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_bundle("node/x", b"definitely not a bundle").unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptBundle { .. }));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bundle = sample_bundle();
        bundle.header.magic = 0xDEAD_BEEF;
        let raw = encode_bundle(&bundle).unwrap();
        let err = decode_bundle("node/x", &raw).unwrap_err();
        assert!(format!("{}", err).contains("bad magic"));
    }

    #[test]
    fn test_decode_rejects_corrupted_data() {
        let bundle = sample_bundle();
        let mut raw = encode_bundle(&bundle).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let err = decode_bundle("node/x", &raw).unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptBundle { .. }));
    }

    #[test]
    fn test_decode_rejects_out_of_bounds_entry() {
        let mut bundle = sample_bundle();
        bundle.entries[1].len = 1000;
        let raw = encode_bundle(&bundle).unwrap();
        let err = decode_bundle("node/x", &raw).unwrap_err();
        assert!(format!("{}", err).contains("exceeds data bounds"));
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = assemble(&[], Vec::new());
        let raw = encode_bundle(&bundle).unwrap();
        let decoded = decode_bundle("node/empty", &raw).unwrap();
        assert_eq!(decoded.header.member_count, 0);
        assert!(decoded.member("anything").is_none());
    }
}
