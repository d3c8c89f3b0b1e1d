//! Error kinds shared across schema versions.

use thiserror::Error;

use crate::report::Report;

/// Failures raised while parsing, validating, translating, or merging a
/// config. Callers that need the full diagnostic detail should also
/// consult the [`Report`] returned alongside these where applicable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The input was zero bytes.
    #[error("not a config (empty)")]
    Empty,
    /// The input was not valid JSON.
    #[error("config is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),
    /// The declared version is missing, unparseable, or not one we support.
    #[error("unsupported config version")]
    UnknownVersion,
    /// Structural validation produced at least one fatal entry.
    #[error("invalid config:\n{0}")]
    Invalid(Report),

    /// Legacy configs carrying networkd units cannot be translated.
    #[error("config must not use networkd units")]
    UsesNetworkd,
    /// Two entries resolved to the same absolute path.
    #[error("config cannot contain paths that conflict: {old} and {new}")]
    DuplicateInode { old: String, new: String },
    /// An entry's path traverses a symlink the same config creates.
    #[error("{name} uses link defined by this config: {link_path}")]
    UsesOwnLink { link_path: String, name: String },
    /// Two systemd units share a name.
    #[error("duplicate systemd unit: {name}")]
    DuplicateUnit { name: String },
    /// Two dropins within one unit share a name.
    #[error("duplicate dropin {name} in unit {unit}")]
    DuplicateDropin { unit: String, name: String },
    /// A filesystem name has no mountpoint mapping and is not `root`.
    #[error("filesystem {0} has no mountpoint mapping")]
    UnmappedFilesystem(String),
    /// A legacy `mount.create` block without `force` cannot be expressed
    /// in the current schema.
    #[error("filesystem creation must be forced when the create object is used")]
    CreateWithoutForce,

    /// A config that cannot be deduplicated.
    #[error("cannot deduplicate: {0}")]
    Dedup(String),
}

/// Hash strings are `<algorithm>-<hex digest>`; these are the ways a
/// string can fail to be one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("malformed hash specifier")]
    Malformed,
    #[error("unrecognized hash function")]
    Unrecognized,
    #[error("hash is the wrong size")]
    WrongSize,
}

/// Split a hash string into its function and hex digest, checking shape.
pub fn hash_parts(hash: &str) -> Result<(&str, &str), HashError> {
    let (fun, sum) = hash.split_once('-').ok_or(HashError::Malformed)?;
    let expected = match fun {
        "sha256" => 64,
        "sha512" => 128,
        _ => return Err(HashError::Unrecognized),
    };
    if sum.len() != expected || !sum.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HashError::WrongSize);
    }
    Ok((fun, sum))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_parts() {
        let sha512 = format!("sha512-{}", "0123456789abcdef".repeat(8));
        let (fun, sum) = hash_parts(&sha512).unwrap();
        assert_eq!(fun, "sha512");
        assert_eq!(sum.len(), 128);

        let sha256 = format!("sha256-{}", "0519a9826023338828942b081814355d".repeat(2));
        let (fun, sum) = hash_parts(&sha256).unwrap();
        assert_eq!(fun, "sha256");
        assert_eq!(sum.len(), 64);

        // colon separator is malformed, not merely wrong-sized
        assert_eq!(
            hash_parts("sha512:01234567").unwrap_err(),
            HashError::Malformed
        );
        assert_eq!(
            hash_parts("sha256:12345678").unwrap_err(),
            HashError::Malformed
        );
    }

    #[test]
    fn test_hash_validate() {
        assert_eq!(hash_parts("xor-abcdef").unwrap_err(), HashError::Unrecognized);
        assert_eq!(hash_parts("sha512-123").unwrap_err(), HashError::WrongSize);
        assert_eq!(hash_parts("sha256-345").unwrap_err(), HashError::WrongSize);
        let nonhex = format!("sha256-{}", "z".repeat(64));
        assert_eq!(hash_parts(&nonhex).unwrap_err(), HashError::WrongSize);
    }
}
