//! Authorization of privileged system contract operations.
//!
//! A [`KeyRequirement`] lists the keys an operation needs, each tagged with the
//! entity owning it. The [`Authorizer`] checks every required key against:
//!
//! 1. full-prefix signatures on the outer transaction, when the operation kind
//!    is enabled for top-level signatures;
//! 2. contract-identity components naming the contract that is the direct
//!    sender of the precompile call;
//! 3. contract-identity components covered by a legacy activation grant for
//!    the key owner, while the block height is below the grant cutoff and the
//!    contract is on the call chain.
//!
//! Key lists need all members active, threshold keys need `threshold` of them.
//! Authorization never mutates state.

use crate::config::DispatcherConfig;
use crate::keys::{ActiveSignatureSet, Key};
use crate::selector::OperationKind;
use crate::status::ResponseCode;
use alloy_primitives::Address;

/// Role a required key plays for its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRole {
    /// Token admin key.
    Admin,
    /// Token KYC key.
    Kyc,
    /// Account key.
    Account,
}

/// A single key that must be active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequiredKey {
    /// Entity the key belongs to.
    pub owner: Address,
    /// Role of the key.
    pub role: KeyRole,
    /// The key itself.
    pub key: Key,
}

/// Keys an operation requires, snapshotted from ledger metadata at call time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRequirement {
    keys: Vec<RequiredKey>,
}

impl KeyRequirement {
    /// Requirement satisfied by any caller.
    pub const fn none() -> Self {
        Self { keys: Vec::new() }
    }

    /// Requirement on a single key.
    pub fn single(owner: Address, role: KeyRole, key: Key) -> Self {
        Self {
            keys: vec![RequiredKey { owner, role, key }],
        }
    }

    /// Returns `true` when nothing needs to be signed.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Required keys.
    pub fn keys(&self) -> &[RequiredKey] {
        &self.keys
    }
}

/// Per-call inputs to authorization.
#[derive(Clone, Copy, Debug)]
pub struct AuthContext<'a> {
    /// Operation being authorized.
    pub operation: OperationKind,
    /// Direct sender of the precompile call.
    pub sender: Address,
    /// Contracts of the enclosing frames, outermost first.
    pub call_chain: &'a [Address],
    /// Height of the block being executed.
    pub block_number: u64,
    /// Signatures on the outer transaction.
    pub signatures: &'a ActiveSignatureSet,
}

/// Evaluates [`KeyRequirement`]s against the signatures and grants of a call.
#[derive(Debug)]
pub struct Authorizer<'a> {
    config: &'a DispatcherConfig,
}

impl<'a> Authorizer<'a> {
    /// Authorizer reading grants and signature policy from `config`.
    pub const fn new(config: &'a DispatcherConfig) -> Self {
        Self { config }
    }

    /// Checks that every required key is active.
    ///
    /// # Errors
    ///
    /// [`ResponseCode::InvalidFullPrefixSignatureForPrecompile`] naming no key;
    /// the denied key is logged.
    pub fn authorize(
        &self,
        requirement: &KeyRequirement,
        ctx: &AuthContext<'_>,
    ) -> Result<(), ResponseCode> {
        for required in requirement.keys() {
            if self.is_active(required.owner, &required.key, ctx) {
                tracing::debug!(
                    target: "system_contracts",
                    operation = %ctx.operation,
                    owner = ?required.owner,
                    role = ?required.role,
                    "required key active"
                );
                continue;
            }
            tracing::warn!(
                target: "system_contracts",
                operation = %ctx.operation,
                owner = ?required.owner,
                role = ?required.role,
                sender = ?ctx.sender,
                contract_ids = ?required.key.contract_ids(),
                block_number = ctx.block_number,
                "authorization denied"
            );
            return Err(ResponseCode::InvalidFullPrefixSignatureForPrecompile);
        }
        Ok(())
    }

    fn is_active(&self, owner: Address, key: &Key, ctx: &AuthContext<'_>) -> bool {
        match key {
            Key::Simple(public_key) => {
                self.config.allows_top_level_sigs(ctx.operation)
                    && ctx.signatures.has_full_prefix(public_key)
            }
            Key::ContractId(contract) => self.is_contract_active(owner, *contract, ctx),
            Key::KeyList(keys) => {
                !keys.is_empty() && keys.iter().all(|k| self.is_active(owner, k, ctx))
            }
            Key::Threshold { threshold, keys } => {
                let needed = (*threshold).max(1) as usize;
                keys.iter()
                    .filter(|k| self.is_active(owner, k, ctx))
                    .take(needed)
                    .count()
                    >= needed
            }
        }
    }

    fn is_contract_active(&self, owner: Address, contract: Address, ctx: &AuthContext<'_>) -> bool {
        if contract == ctx.sender {
            return true;
        }
        let granted = self
            .config
            .legacy_activations
            .is_granted(owner, contract, ctx.block_number);
        if granted && ctx.call_chain.contains(&contract) {
            tracing::debug!(
                target: "system_contracts",
                ?owner,
                ?contract,
                block_number = ctx.block_number,
                "contract key activated by legacy grant"
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{entity_address, LegacyActivations};
    use crate::keys::PublicKey;
    use alloy_primitives::FixedBytes;

    fn pk(byte: u8) -> PublicKey {
        PublicKey::Ed25519(FixedBytes::from([byte; 32]))
    }

    fn ctx<'a>(
        operation: OperationKind,
        sender: Address,
        call_chain: &'a [Address],
        block_number: u64,
        signatures: &'a ActiveSignatureSet,
    ) -> AuthContext<'a> {
        AuthContext {
            operation,
            sender,
            call_chain,
            block_number,
            signatures,
        }
    }

    #[test]
    fn empty_requirement_always_passes() {
        let config = DispatcherConfig::default();
        let sigs = ActiveSignatureSet::new();
        let auth = Authorizer::new(&config);
        let owner = entity_address(1001);
        assert!(auth
            .authorize(&KeyRequirement::none(), &ctx(OperationKind::IsKyc, owner, &[], 1, &sigs))
            .is_ok());
    }

    #[test]
    fn full_prefix_signature_activates_simple_key() {
        let config = DispatcherConfig::default();
        let owner = entity_address(1001);
        let requirement = KeyRequirement::single(owner, KeyRole::Kyc, Key::Simple(pk(1)));
        let auth = Authorizer::new(&config);

        let partial = ActiveSignatureSet::new().with_partial(pk(1));
        assert_eq!(
            auth.authorize(
                &requirement,
                &ctx(OperationKind::GrantKyc, owner, &[], 1, &partial)
            ),
            Err(ResponseCode::InvalidFullPrefixSignatureForPrecompile)
        );

        let full = ActiveSignatureSet::new().with_full(pk(1));
        assert!(auth
            .authorize(&requirement, &ctx(OperationKind::GrantKyc, owner, &[], 1, &full))
            .is_ok());
    }

    #[test]
    fn top_level_sigs_respect_operation_policy() {
        let mut config = DispatcherConfig::default();
        config.top_level_sig_operations.remove(&OperationKind::DeleteToken);
        let owner = entity_address(1001);
        let requirement = KeyRequirement::single(owner, KeyRole::Admin, Key::Simple(pk(2)));
        let sigs = ActiveSignatureSet::new().with_full(pk(2));

        assert_eq!(
            Authorizer::new(&config).authorize(
                &requirement,
                &ctx(OperationKind::DeleteToken, owner, &[], 1, &sigs)
            ),
            Err(ResponseCode::InvalidFullPrefixSignatureForPrecompile)
        );
    }

    #[test]
    fn contract_id_matches_direct_sender() {
        let config = DispatcherConfig::default();
        let contract = entity_address(2001);
        let owner = entity_address(1001);
        let requirement =
            KeyRequirement::single(owner, KeyRole::Account, Key::ContractId(contract));
        let sigs = ActiveSignatureSet::new();
        let auth = Authorizer::new(&config);

        assert!(auth
            .authorize(&requirement, &ctx(OperationKind::Associate, contract, &[], 1, &sigs))
            .is_ok());
        assert!(auth
            .authorize(&requirement, &ctx(OperationKind::Associate, owner, &[contract], 1, &sigs))
            .is_err());
    }

    #[test]
    fn legacy_grant_activates_contract_on_call_chain_below_cutoff() {
        let owner = entity_address(1058);
        let contract = entity_address(1062);
        let relay = entity_address(1070);
        let config = DispatcherConfig {
            legacy_activations: LegacyActivations::new(100).with_grant(owner, contract),
            ..Default::default()
        };
        let key = Key::threshold(1, vec![Key::Simple(pk(3)), Key::ContractId(contract)]);
        let requirement = KeyRequirement::single(owner, KeyRole::Account, key);
        let sigs = ActiveSignatureSet::new();
        let auth = Authorizer::new(&config);

        let chain = [contract, relay];
        assert!(auth
            .authorize(&requirement, &ctx(OperationKind::Associate, relay, &chain, 99, &sigs))
            .is_ok());
        assert_eq!(
            auth.authorize(&requirement, &ctx(OperationKind::Associate, relay, &chain, 100, &sigs)),
            Err(ResponseCode::InvalidFullPrefixSignatureForPrecompile)
        );
        assert!(auth
            .authorize(&requirement, &ctx(OperationKind::Associate, relay, &[relay], 99, &sigs))
            .is_err());
    }

    #[test]
    fn grant_for_other_owner_does_not_apply() {
        let owner = entity_address(1058);
        let contract = entity_address(1062);
        let config = DispatcherConfig {
            legacy_activations: LegacyActivations::new(100)
                .with_grant(entity_address(9999), contract),
            ..Default::default()
        };
        let requirement =
            KeyRequirement::single(owner, KeyRole::Account, Key::ContractId(contract));
        let sigs = ActiveSignatureSet::new();
        assert!(Authorizer::new(&config)
            .authorize(
                &requirement,
                &ctx(OperationKind::Associate, entity_address(5), &[contract], 1, &sigs)
            )
            .is_err());
    }

    #[test]
    fn threshold_counts_independent_components() {
        let config = DispatcherConfig::default();
        let owner = entity_address(1001);
        let contract = entity_address(2001);
        let key = Key::threshold(
            2,
            vec![Key::Simple(pk(4)), Key::Simple(pk(5)), Key::ContractId(contract)],
        );
        let requirement = KeyRequirement::single(owner, KeyRole::Admin, key);
        let auth = Authorizer::new(&config);

        let one_sig = ActiveSignatureSet::new().with_full(pk(4));
        assert!(auth
            .authorize(&requirement, &ctx(OperationKind::DeleteToken, owner, &[], 1, &one_sig))
            .is_err());
        assert!(auth
            .authorize(
                &requirement,
                &ctx(OperationKind::DeleteToken, contract, &[], 1, &one_sig)
            )
            .is_ok());
    }

    #[test]
    fn key_list_needs_every_member() {
        let config = DispatcherConfig::default();
        let owner = entity_address(1001);
        let key = Key::KeyList(vec![Key::Simple(pk(6)), Key::Simple(pk(7))]);
        let requirement = KeyRequirement::single(owner, KeyRole::Admin, key);
        let auth = Authorizer::new(&config);

        let one = ActiveSignatureSet::new().with_full(pk(6));
        assert!(auth
            .authorize(&requirement, &ctx(OperationKind::DeleteToken, owner, &[], 1, &one))
            .is_err());
        let both = one.with_full(pk(7));
        assert!(auth
            .authorize(&requirement, &ctx(OperationKind::DeleteToken, owner, &[], 1, &both))
            .is_ok());

        let empty = KeyRequirement::single(owner, KeyRole::Admin, Key::KeyList(Vec::new()));
        assert!(auth
            .authorize(&empty, &ctx(OperationKind::DeleteToken, owner, &[], 1, &both))
            .is_err());
    }
}
