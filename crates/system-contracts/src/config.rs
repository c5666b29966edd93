//! Dispatcher configuration.
//!
//! Configuration is read either from the `systemContracts` object of a
//! chainspec extras blob ([`parse_dispatcher_config`]) or from environment
//! variables ([`DispatcherConfig::from_env`]). Legacy activations are parsed
//! into a typed table at load time and never re-read during dispatch.

use crate::gas::GasSchedule;
use crate::selector::{OperationKind, SELECTOR_LEN};
use alloy_primitives::{address, Address};
use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
};
use thiserror::Error;

/// Token service system contract address: `0x00..0167` (359).
pub const HTS_SYSTEM_CONTRACT_ADDR: Address =
    address!("0x0000000000000000000000000000000000000167");

/// Pseudorandom seed system contract address: `0x00..0169` (361).
pub const PRNG_SYSTEM_CONTRACT_ADDR: Address =
    address!("0x0000000000000000000000000000000000000169");

/// Default upper bound on call input length.
pub const DEFAULT_MAX_INPUT_LEN: usize = 4_096;

/// Errors raised while loading dispatcher configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The extras blob has no `systemContracts` object.
    #[error("missing systemContracts config in chainspec extras")]
    Missing,
    /// A field failed to deserialize or validate.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// A legacy activation entry does not match `<owner> by[<contract>|...]`.
    #[error("invalid legacy activation entry `{0}`")]
    InvalidLegacyActivation(String),
}

/// Long-zero EVM address of ledger entity `num` (shard 0, realm 0).
pub fn entity_address(num: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&num.to_be_bytes());
    Address::from(bytes)
}

/// Entity number of a long-zero address, or `None` for any other address.
pub fn entity_num(address: Address) -> Option<u64> {
    let bytes = address.as_slice();
    if bytes[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let mut num = [0u8; 8];
    num.copy_from_slice(&bytes[12..]);
    Some(u64::from_be_bytes(num))
}

fn parse_entity(raw: &str) -> Option<Address> {
    let raw = raw.trim();
    if raw.starts_with("0x") {
        Address::from_str(raw).ok()
    } else {
        raw.parse::<u64>().ok().map(entity_address)
    }
}

/// Contract-delegated signing rights, valid below a block-height cutoff.
///
/// A grant `(owner, contract)` lets a contract-identity component naming
/// `contract` inside the key of `owner` count as active whenever `contract` is
/// on the call chain, without being the direct sender.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLegacyActivations")]
pub struct LegacyActivations {
    grants: BTreeMap<Address, BTreeSet<Address>>,
    cutoff_block: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLegacyActivations {
    #[serde(default)]
    grants: String,
    #[serde(default)]
    cutoff_block: u64,
}

impl TryFrom<RawLegacyActivations> for LegacyActivations {
    type Error = ConfigError;

    fn try_from(raw: RawLegacyActivations) -> Result<Self, Self::Error> {
        Self::parse(&raw.grants, raw.cutoff_block)
    }
}

impl LegacyActivations {
    /// Empty table with the given cutoff.
    pub const fn new(cutoff_block: u64) -> Self {
        Self {
            grants: BTreeMap::new(),
            cutoff_block,
        }
    }

    /// Adds a grant letting `contract` activate its identity inside `owner`'s key.
    pub fn with_grant(mut self, owner: Address, contract: Address) -> Self {
        self.grants.entry(owner).or_default().insert(contract);
        self
    }

    /// Parses comma-separated entries of the form `1058 by[1062|1063]`.
    ///
    /// Entities are entity numbers or `0x`-prefixed addresses.
    pub fn parse(spec: &str, cutoff_block: u64) -> Result<Self, ConfigError> {
        let mut table = Self::new(cutoff_block);
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let invalid = || ConfigError::InvalidLegacyActivation(entry.to_string());

            let (owner, contracts) = entry.split_once("by").ok_or_else(invalid)?;
            let owner = parse_entity(owner).ok_or_else(invalid)?;
            let contracts = contracts
                .trim()
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .ok_or_else(invalid)?;

            for contract in contracts.split('|') {
                let contract = parse_entity(contract).ok_or_else(invalid)?;
                table = table.with_grant(owner, contract);
            }
        }
        Ok(table)
    }

    /// Block height from which no grant is honoured.
    pub const fn cutoff_block(&self) -> u64 {
        self.cutoff_block
    }

    /// Returns `true` when no grants are configured.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// All `(owner, contract)` grants.
    pub fn grants(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.grants
            .iter()
            .flat_map(|(owner, contracts)| contracts.iter().map(move |c| (*owner, *c)))
    }

    /// Whether `contract` may activate its identity inside `owner`'s key at `block_number`.
    pub fn is_granted(&self, owner: Address, contract: Address, block_number: u64) -> bool {
        block_number < self.cutoff_block
            && self
                .grants
                .get(&owner)
                .is_some_and(|contracts| contracts.contains(&contract))
    }
}

fn default_top_level_sig_operations() -> BTreeSet<OperationKind> {
    OperationKind::ALL
        .into_iter()
        .filter(|kind| kind.is_mutation())
        .collect()
}

/// Node-wide dispatcher configuration, read-only during dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatcherConfig {
    /// Address of the token service system contract.
    pub system_contract_address: Address,
    /// Address of the pseudorandom seed system contract.
    pub prng_address: Address,
    /// Inputs longer than this fail with `ErrorDecodingInput`.
    pub max_input_len: usize,
    /// Fixed gas charges.
    pub gas: GasSchedule,
    /// Contract-delegated signing grants.
    pub legacy_activations: LegacyActivations,
    /// Operation kinds for which full-prefix signatures on the outer
    /// transaction may activate required keys.
    pub top_level_sig_operations: BTreeSet<OperationKind>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            system_contract_address: HTS_SYSTEM_CONTRACT_ADDR,
            prng_address: PRNG_SYSTEM_CONTRACT_ADDR,
            max_input_len: DEFAULT_MAX_INPUT_LEN,
            gas: GasSchedule::default(),
            legacy_activations: LegacyActivations::default(),
            top_level_sig_operations: default_top_level_sig_operations(),
        }
    }
}

impl DispatcherConfig {
    /// Creates a `DispatcherConfig` from environment variables.
    ///
    /// Every variable is optional; unset variables keep their defaults.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `SYSTEM_CONTRACTS_ADDR` | token service address |
    /// | `SYSTEM_CONTRACTS_PRNG_ADDR` | PRNG address |
    /// | `SYSTEM_CONTRACTS_MAX_INPUT_LEN` | input length limit |
    /// | `SYSTEM_CONTRACTS_LEGACY_ACTIVATIONS` | grants, e.g. `1058 by[1062]` |
    /// | `SYSTEM_CONTRACTS_LEGACY_ACTIVATION_CUTOFF` | cutoff block height |
    /// | `SYSTEM_CONTRACTS_TOP_LEVEL_SIGS` | comma-separated operation kinds |
    pub fn from_env() -> eyre::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SYSTEM_CONTRACTS_ADDR") {
            config.system_contract_address = Address::from_str(addr.trim())?;
        }
        if let Ok(addr) = std::env::var("SYSTEM_CONTRACTS_PRNG_ADDR") {
            config.prng_address = Address::from_str(addr.trim())?;
        }
        if let Ok(len) = std::env::var("SYSTEM_CONTRACTS_MAX_INPUT_LEN") {
            config.max_input_len = len.trim().parse()?;
        }

        let cutoff = std::env::var("SYSTEM_CONTRACTS_LEGACY_ACTIVATION_CUTOFF")
            .ok()
            .map(|s| s.trim().parse::<u64>())
            .transpose()?
            .unwrap_or_default();
        let grants = std::env::var("SYSTEM_CONTRACTS_LEGACY_ACTIVATIONS").unwrap_or_default();
        config.legacy_activations = LegacyActivations::parse(&grants, cutoff)?;

        if let Ok(ops) = std::env::var("SYSTEM_CONTRACTS_TOP_LEVEL_SIGS") {
            config.top_level_sig_operations = ops
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| OperationKind::from_str(s).map_err(|e| eyre::eyre!(e)))
                .collect::<eyre::Result<_>>()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config = serde_json::from_str::<Self>(json)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.system_contract_address == self.prng_address {
            return Err(ConfigError::Invalid(
                "token service and PRNG addresses must differ".to_string(),
            ));
        }
        if self.max_input_len < SELECTOR_LEN {
            return Err(ConfigError::Invalid(format!(
                "maxInputLen ({}) must cover a selector",
                self.max_input_len
            )));
        }
        Ok(())
    }

    /// Returns `true` when `address` is one of the fixed system contract addresses.
    pub fn is_system_address(&self, address: Address) -> bool {
        address == self.system_contract_address || address == self.prng_address
    }

    /// Whether top-level full-prefix signatures may activate keys for `kind`.
    pub fn allows_top_level_sigs(&self, kind: OperationKind) -> bool {
        self.top_level_sig_operations.contains(&kind)
    }
}

/// Reads `systemContracts` from a chainspec/extras JSON blob.
///
/// Expected shape (example):
/// {
///   "systemContracts": {
///     "systemContractAddress": "0x0000000000000000000000000000000000000167",
///     "maxInputLen": 4096,
///     "gas": { "view": 2607, "overrides": { "deleteToken": 12000 } },
///     "legacyActivations": { "grants": "1058 by[1062]", "cutoffBlock": 1000000 },
///     "topLevelSigOperations": ["associate", "dissociate"]
///   }
/// }
pub fn parse_dispatcher_config(extras: &Value) -> Result<DispatcherConfig, ConfigError> {
    let raw = extras.get("systemContracts").ok_or(ConfigError::Missing)?;
    let config = serde_json::from_value::<DispatcherConfig>(raw.clone())
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
