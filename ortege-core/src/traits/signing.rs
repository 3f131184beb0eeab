use std::fmt::Debug;

use auto_impl::auto_impl;
use ethers_core::{
    types::{Address, Signature},
    utils::hash_message,
};

use crate::H256;

/// A type that can be signed. The signature will be of a hash of select
/// contents defined by `signing_hash`.
pub trait Signable: Sized {
    /// A hash of the contents.
    /// The EIP-191 compliant version of this hash is signed by validators.
    fn signing_hash(&self) -> H256;

    /// EIP-191 compliant hash of the signing hash.
    fn eth_signed_message_hash(&self) -> H256 {
        hash_message(self.signing_hash())
    }
}

/// Decides whether `signature` is a valid signature by `signer` over
/// `digest`. The digest is the EIP-191 hash that validators actually sign.
#[auto_impl(&, Box, Arc)]
pub trait SignatureVerifier: Send + Sync + Debug {
    /// Check a single signature.
    fn verify(&self, signer: Address, digest: H256, signature: &Signature) -> bool;
}

/// Verifies secp256k1 signatures by recovering the signer.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaSignatureVerifier;

impl SignatureVerifier for EcdsaSignatureVerifier {
    fn verify(&self, signer: Address, digest: H256, signature: &Signature) -> bool {
        signature.verify(digest, signer).is_ok()
    }
}

#[cfg(test)]
mod test {
    use ethers_signers::{LocalWallet, Signer};

    use super::*;

    const KEY: &str = "45bde4a4e1f0d1e7cba8e9e4c4c0b9b1c3a7a1d6e1ab8f2c9d5e4f3a2b1c0d9e";

    #[test]
    fn ecdsa_verifier_accepts_only_the_signer() {
        let wallet: LocalWallet = KEY.parse().unwrap();
        let digest = hash_message(H256::repeat_byte(7));
        let signature = wallet.sign_hash(digest);

        let verifier = EcdsaSignatureVerifier;
        assert!(verifier.verify(wallet.address(), digest, &signature));
        assert!(!verifier.verify(Address::repeat_byte(1), digest, &signature));
        assert!(!verifier.verify(
            wallet.address(),
            hash_message(H256::repeat_byte(8)),
            &signature
        ));
    }
}
