use sha3::{digest::Update, Digest, Keccak256};

use crate::H256;

/// Computes hash of domain concatenated with "HYPERLANE"
pub fn domain_hash(address: H256, domain: impl Into<u32>) -> H256 {
    H256::from_slice(
        Keccak256::new()
            .chain(domain.into().to_be_bytes())
            .chain(address.as_ref())
            .chain("HYPERLANE".as_bytes())
            .finalize()
            .as_slice(),
    )
}

/// Keccak256 of a byte string.
pub fn keccak256(bytes: impl AsRef<[u8]>) -> H256 {
    H256::from_slice(Keccak256::digest(bytes.as_ref()).as_slice())
}

/// Format bytes as a 0x-prefixed hex string.
pub fn fmt_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            fmt_bytes(keccak256([]).as_bytes()),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn domain_hash_depends_on_domain() {
        let address = H256::repeat_byte(0x11);
        assert_ne!(domain_hash(address, 1u32), domain_hash(address, 2u32));
    }
}
