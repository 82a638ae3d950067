//! Git object identifiers: a 20-byte SHA-1 digest with hex parsing and
//! display, plus the tree-entry permission modes the canonical tree codec
//! operates on.

use std::fmt;
use std::str::FromStr;

/// A Git object id: the raw 20-byte SHA-1 digest of a framed object.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GitOid([u8; 20]);

impl GitOid {
    pub const ZERO: GitOid = GitOid([0u8; 20]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitOid({self})")
    }
}

/// Error parsing a 40-hex-digit object id.
#[derive(Debug, thiserror::Error)]
#[error("invalid git object id `{value}`: {reason}")]
pub struct OidParseError {
    pub value: String,
    pub reason: String,
}

impl FromStr for GitOid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(OidParseError {
                value: s.to_string(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_val(chunk[0]).ok_or_else(|| OidParseError {
                value: s.to_string(),
                reason: format!("non-hex character at position {}", i * 2),
            })?;
            let lo = hex_val(chunk[1]).ok_or_else(|| OidParseError {
                value: s.to_string(),
                reason: format!("non-hex character at position {}", i * 2 + 1),
            })?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(GitOid(bytes))
    }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Permission code attached to a tree entry, matching Git's canonical
/// encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryMode {
    Blob,
    BlobExecutable,
    Tree,
    Link,
}

impl EntryMode {
    /// Octal permission string as it appears in a tree object's framing.
    pub fn octal(self) -> &'static str {
        match self {
            EntryMode::Blob => "100644",
            EntryMode::BlobExecutable => "100755",
            EntryMode::Tree => "40000",
            EntryMode::Link => "120000",
        }
    }

    pub fn is_tree(self) -> bool {
        matches!(self, EntryMode::Tree)
    }
}

/// A single entry in a tree object: name, permission mode, and the id of
/// the object it points to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub oid: GitOid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase_40_hex() {
        let oid = GitOid::from_bytes([0xAB; 20]);
        assert_eq!(oid.to_string(), "ab".repeat(20));
        assert_eq!(oid.to_string().len(), 40);
    }

    #[test]
    fn roundtrips_through_display_and_parse() {
        let oid = GitOid::from_bytes(core::array::from_fn(|i| i as u8));
        let parsed: GitOid = oid.to_string().parse().unwrap();
        assert_eq!(oid, parsed);
    }

    #[test]
    fn parses_uppercase_hex() {
        let parsed: GitOid = "AB".repeat(20).parse().unwrap();
        assert_eq!(parsed, GitOid::from_bytes([0xAB; 20]));
    }

    #[test]
    fn rejects_wrong_length() {
        let err = "deadbeef".parse::<GitOid>().unwrap_err();
        assert!(err.reason.contains("40 hex"));
    }

    #[test]
    fn rejects_non_hex() {
        let err = "z".repeat(40).parse::<GitOid>().unwrap_err();
        assert!(err.reason.contains("non-hex"));
    }

    #[test]
    fn zero_is_recognized() {
        assert!(GitOid::ZERO.is_zero());
        assert!(!GitOid::from_bytes([1; 20]).is_zero());
    }
}
