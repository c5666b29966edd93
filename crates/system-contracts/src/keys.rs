//! Ledger keys and the signatures presented with an outer transaction.
//!
//! Signatures arrive already verified by the transaction handler; this module
//! only records which public keys signed and with what prefix length.

use alloy_primitives::{Address, FixedBytes};

/// A public key that can sign ledger transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PublicKey {
    /// Ed25519 public key.
    Ed25519(FixedBytes<32>),
    /// Compressed secp256k1 public key.
    EcdsaSecp256k1(FixedBytes<33>),
}

/// Key structure attached to an account or token role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    /// Active when its public key signed with a full prefix.
    Simple(PublicKey),
    /// Placeholder satisfied by the named contract acting as the caller, or
    /// by a legacy activation grant for it.
    ContractId(Address),
    /// Active when every member is active.
    KeyList(Vec<Key>),
    /// Active when at least `threshold` members are active.
    Threshold {
        /// Number of members that must be active.
        threshold: u32,
        /// Candidate members.
        keys: Vec<Key>,
    },
}

impl Key {
    /// Convenience constructor for an Ed25519 key.
    pub fn ed25519(bytes: [u8; 32]) -> Self {
        Self::Simple(PublicKey::Ed25519(FixedBytes::from(bytes)))
    }

    /// `threshold`-of-`keys` structure.
    pub const fn threshold(threshold: u32, keys: Vec<Self>) -> Self {
        Self::Threshold { threshold, keys }
    }

    /// Contract identities named anywhere in the key.
    pub fn contract_ids(&self) -> Vec<Address> {
        let mut out = Vec::new();
        self.collect_contract_ids(&mut out);
        out
    }

    fn collect_contract_ids(&self, out: &mut Vec<Address>) {
        match self {
            Self::Simple(_) => {}
            Self::ContractId(contract) => out.push(*contract),
            Self::KeyList(keys) | Self::Threshold { keys, .. } => {
                for key in keys {
                    key.collect_contract_ids(out);
                }
            }
        }
    }
}

/// How much of the public key a signature's prefix identifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignaturePrefix {
    /// The prefix is the whole public key.
    Full,
    /// The prefix is a strict prefix of the public key.
    Partial,
}

/// One signature on the outer transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentedSignature {
    /// Key that produced the signature.
    pub key: PublicKey,
    /// Prefix the signature was presented with.
    pub prefix: SignaturePrefix,
}

/// Signatures presented with the outer transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActiveSignatureSet {
    signatures: Vec<PresentedSignature>,
}

impl ActiveSignatureSet {
    /// Empty set.
    pub const fn new() -> Self {
        Self {
            signatures: Vec::new(),
        }
    }

    /// Adds a signature.
    pub fn push(&mut self, key: PublicKey, prefix: SignaturePrefix) {
        self.signatures.push(PresentedSignature { key, prefix });
    }

    /// Builder form of [`Self::push`] with a full prefix.
    pub fn with_full(mut self, key: PublicKey) -> Self {
        self.push(key, SignaturePrefix::Full);
        self
    }

    /// Builder form of [`Self::push`] with a partial prefix.
    pub fn with_partial(mut self, key: PublicKey) -> Self {
        self.push(key, SignaturePrefix::Partial);
        self
    }

    /// Whether `key` signed with a full prefix.
    pub fn has_full_prefix(&self, key: &PublicKey) -> bool {
        self.signatures
            .iter()
            .any(|sig| sig.key == *key && sig.prefix == SignaturePrefix::Full)
    }

    /// Number of presented signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns `true` when nothing was presented.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn partial_prefix_is_not_full() {
        let key = PublicKey::Ed25519(FixedBytes::from([7u8; 32]));
        let partial = ActiveSignatureSet::new().with_partial(key);
        assert!(!partial.has_full_prefix(&key));

        let full = partial.with_full(key);
        assert!(full.has_full_prefix(&key));
        assert_eq!(full.len(), 2);
    }

    #[test]
    fn collects_nested_contract_ids() {
        let a = address!("0x00000000000000000000000000000000000004d2");
        let b = address!("0x00000000000000000000000000000000000004d3");
        let key = Key::threshold(
            1,
            vec![
                Key::ed25519([1u8; 32]),
                Key::ContractId(a),
                Key::KeyList(vec![Key::ContractId(b)]),
            ],
        );
        assert_eq!(key.contract_ids(), vec![a, b]);
    }
}
