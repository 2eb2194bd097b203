pub mod cx;
pub mod limits;
pub mod varint;

pub use cx::Cx;

use std::fmt;

use sha2::{Digest, Sha256};

/// Length in bytes of a content address.
pub const ADDRESS_LEN: usize = 32;

/// Content address of a serialized tree node.
///
/// An address is the SHA-256 digest of the node's encoded bytes, so a
/// node's identity is determined entirely by its content. Two trees
/// that share subtrees share the addresses (and therefore the stored
/// chunks) of those subtrees.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address. Never produced by hashing real content;
    /// used only as an encode-side placeholder. Reading through it is
    /// a store error.
    pub const NULL: Self = Self([0u8; ADDRESS_LEN]);

    /// Wrap raw digest bytes as an address.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Compute the address of a content buffer.
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        Self(digest.into())
    }

    /// The raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Whether this is the null placeholder address.
    #[must_use]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex chars is enough to identify a chunk in logs.
        write!(f, "Address(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_of_is_deterministic() {
        let a = Address::of(b"chunk contents");
        let b = Address::of(b"chunk contents");
        assert_eq!(a, b);
        assert_ne!(a, Address::of(b"other contents"));
    }

    #[test]
    fn address_null_is_not_a_content_hash() {
        assert!(Address::NULL.is_null());
        assert!(!Address::of(b"").is_null());
    }

    #[test]
    fn address_display_is_lowercase_hex() {
        let addr = Address::from_bytes([0xAB; ADDRESS_LEN]);
        let hex = addr.to_string();
        assert_eq!(hex.len(), ADDRESS_LEN * 2);
        assert!(hex.chars().all(|c| c == 'a' || c == 'b'));
    }

    #[test]
    fn address_debug_is_truncated() {
        let addr = Address::from_bytes([0x01; ADDRESS_LEN]);
        assert_eq!(format!("{addr:?}"), "Address(01010101..)");
    }
}
