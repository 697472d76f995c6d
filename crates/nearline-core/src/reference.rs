//! Physical reference codec: the addressing scheme for archived units.
//!
//! A reference travels embedded in a single opaque location string of the
//! form `nearline://<archive>/<path>[?filename=<name>|?parts=<n>]`. Encoding
//! is lossless; decoding a malformed string is a `DecodeError`, never a
//! panic and never a silent default.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// URI scheme used by encoded physical references.
pub const REFERENCE_SCHEME: &str = "nearline";

/// Error variants for physical reference decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The string does not start with the `nearline://` scheme prefix.
    #[error("missing scheme prefix in reference: {value}")]
    MissingScheme {
        /// The offending input string.
        value: String,
    },

    /// The string has no archive or no path component.
    #[error("reference has no archive/path component: {value}")]
    MissingPath {
        /// The offending input string.
        value: String,
    },

    /// A bundle member reference with an empty `filename` parameter.
    #[error("bundle member reference has an empty filename")]
    EmptyMemberName,

    /// The `parts` parameter does not parse as a positive integer.
    #[error("invalid part count: {value}")]
    InvalidPartCount {
        /// The unparseable parameter value.
        value: String,
    },

    /// The reference carries a parameter this codec does not know.
    #[error("unknown reference parameter: {name}")]
    UnknownParameter {
        /// The unrecognized parameter name.
        name: String,
    },
}

/// Decoded form of a stored unit's address.
///
/// Archive paths must not contain `?`; the writer only generates such paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicalReference {
    /// One physical object holding one logical file.
    Direct {
        /// Logical name of the remote archive.
        archive: String,
        /// Archive path of the object.
        path: String,
    },
    /// The logical file is one named entry inside a multi-file bundle.
    BundleMember {
        /// Logical name of the remote archive.
        archive: String,
        /// Archive path of the bundle object.
        path: String,
        /// Name of the member inside the bundle.
        member_name: String,
    },
    /// The logical file was split into sequentially-numbered parts.
    SplitParts {
        /// Logical name of the remote archive.
        archive: String,
        /// Shared path prefix of the part objects.
        path: String,
        /// Number of parts the file was split into.
        part_count: u32,
    },
}

impl PhysicalReference {
    /// The logical archive name this reference points into.
    pub fn archive(&self) -> &str {
        match self {
            PhysicalReference::Direct { archive, .. }
            | PhysicalReference::BundleMember { archive, .. }
            | PhysicalReference::SplitParts { archive, .. } => archive,
        }
    }

    /// The archive path (or path prefix) of the physical unit.
    pub fn path(&self) -> &str {
        match self {
            PhysicalReference::Direct { path, .. }
            | PhysicalReference::BundleMember { path, .. }
            | PhysicalReference::SplitParts { path, .. } => path,
        }
    }

    /// Encodes this reference into its opaque string form.
    pub fn encode(&self) -> String {
        match self {
            PhysicalReference::Direct { archive, path } => {
                format!("{}://{}/{}", REFERENCE_SCHEME, archive, path)
            }
            PhysicalReference::BundleMember {
                archive,
                path,
                member_name,
            } => format!(
                "{}://{}/{}?filename={}",
                REFERENCE_SCHEME, archive, path, member_name
            ),
            PhysicalReference::SplitParts {
                archive,
                path,
                part_count,
            } => format!(
                "{}://{}/{}?parts={}",
                REFERENCE_SCHEME, archive, path, part_count
            ),
        }
    }

    /// Decodes an opaque reference string.
    pub fn decode(value: &str) -> Result<Self, DecodeError> {
        let scheme_prefix = format!("{}://", REFERENCE_SCHEME);
        let rest = value
            .strip_prefix(&scheme_prefix)
            .ok_or_else(|| DecodeError::MissingScheme {
                value: value.to_string(),
            })?;

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let (archive, path) =
            location
                .split_once('/')
                .ok_or_else(|| DecodeError::MissingPath {
                    value: value.to_string(),
                })?;
        if archive.is_empty() || path.is_empty() {
            return Err(DecodeError::MissingPath {
                value: value.to_string(),
            });
        }

        match query {
            None => Ok(PhysicalReference::Direct {
                archive: archive.to_string(),
                path: path.to_string(),
            }),
            Some(query) => {
                if let Some(member_name) = query.strip_prefix("filename=") {
                    if member_name.is_empty() {
                        return Err(DecodeError::EmptyMemberName);
                    }
                    Ok(PhysicalReference::BundleMember {
                        archive: archive.to_string(),
                        path: path.to_string(),
                        member_name: member_name.to_string(),
                    })
                } else if let Some(count) = query.strip_prefix("parts=") {
                    let part_count: u32 =
                        count.parse().map_err(|_| DecodeError::InvalidPartCount {
                            value: count.to_string(),
                        })?;
                    if part_count == 0 {
                        return Err(DecodeError::InvalidPartCount {
                            value: count.to_string(),
                        });
                    }
                    Ok(PhysicalReference::SplitParts {
                        archive: archive.to_string(),
                        path: path.to_string(),
                        part_count,
                    })
                } else {
                    let name = query.split('=').next().unwrap_or(query);
                    Err(DecodeError::UnknownParameter {
                        name: name.to_string(),
                    })
                }
            }
        }
    }
}

/// Builds the archive path of one part of a split file. Parts are 1-based.
pub fn part_path(prefix: &str, index: u32) -> String {
    format!("{}.part{}", prefix, index)
}

/// Builds the archive path of an object under a destination node.
pub fn object_path(dest_node: &str, name: &str) -> String {
    format!("{}/{}", dest_node.trim_end_matches('/'), name)
}
