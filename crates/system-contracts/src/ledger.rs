//! Ledger state consumed and changed by system contract operations.
//!
//! [`LedgerState`] is the seam to the node's token and account storage.
//! Executors only read through it; the dispatcher hands it the ordered
//! [`LedgerChange`]s of a successful operation to apply as one unit.
//!
//! [`InMemoryLedger`] is a deterministic implementation backed by ordered maps.
//! Entities are created through explicit calls that return their addresses,
//! which makes it suitable as a per-scenario fixture.

use crate::config::entity_address;
use crate::keys::Key;
use alloy_primitives::{Address, B256};
use std::collections::BTreeMap;
use thiserror::Error;

/// First entity number handed out by [`InMemoryLedger`].
pub const FIRST_ENTITY_NUM: u64 = 1001;

/// Token flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenType {
    /// Divisible units tracked as balances.
    FungibleCommon,
    /// Individually serialized units.
    NonFungibleUnique,
}

/// Token metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// EVM address of the token.
    pub address: Address,
    /// Token name.
    pub name: String,
    /// Token symbol.
    pub symbol: String,
    /// Decimals; always zero for non-fungible tokens.
    pub decimals: u8,
    /// Flavour of the token.
    pub token_type: TokenType,
    /// Units (fungible) or serials (non-fungible) in circulation.
    pub total_supply: u64,
    /// Account holding newly created supply.
    pub treasury: Address,
    /// Key required to delete the token.
    pub admin_key: Option<Key>,
    /// Key required to grant or revoke KYC.
    pub kyc_key: Option<Key>,
    /// Key required to freeze or unfreeze relationships.
    pub freeze_key: Option<Key>,
    /// Freeze flag new relationships start with when a freeze key exists.
    pub default_freeze_status: bool,
    /// KYC flag new relationships start with when a KYC key exists.
    pub default_kyc_status: bool,
    /// Whether the token has been deleted.
    pub deleted: bool,
}

impl Token {
    /// Returns `true` for fungible tokens.
    pub const fn is_fungible(&self) -> bool {
        matches!(self.token_type, TokenType::FungibleCommon)
    }

    /// KYC flag of a newly created relationship.
    pub const fn initial_kyc_granted(&self) -> bool {
        self.kyc_key.is_none() || self.default_kyc_status
    }

    /// Freeze flag of a newly created relationship.
    pub const fn initial_frozen(&self) -> bool {
        self.freeze_key.is_some() && self.default_freeze_status
    }
}

/// Account metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// EVM address of the account.
    pub address: Address,
    /// Signing key; contracts may have none.
    pub key: Option<Key>,
    /// Whether the account is a smart contract.
    pub is_contract: bool,
}

impl Account {
    /// Key that must sign for this account.
    ///
    /// A keyless contract is controlled by its own identity.
    pub fn controlling_key(&self) -> Option<Key> {
        match &self.key {
            Some(key) => Some(key.clone()),
            None if self.is_contract => Some(Key::ContractId(self.address)),
            None => None,
        }
    }
}

/// State of a `(token, account)` relationship.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenRelationship {
    /// Units (fungible) or NFT count (non-fungible) held.
    pub balance: u64,
    /// Whether KYC is granted.
    pub kyc_granted: bool,
    /// Whether the relationship is frozen.
    pub frozen: bool,
}

/// Errors raised when a change cannot be applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// No token at the address.
    #[error("unknown token {0}")]
    UnknownToken(Address),
    /// No account at the address.
    #[error("unknown account {0}")]
    UnknownAccount(Address),
    /// The relationship does not exist.
    #[error("no relationship between token {token} and account {account}")]
    MissingRelationship {
        /// Token of the relationship.
        token: Address,
        /// Account of the relationship.
        account: Address,
    },
    /// The relationship already exists.
    #[error("relationship between token {token} and account {account} already exists")]
    RelationshipExists {
        /// Token of the relationship.
        token: Address,
        /// Account of the relationship.
        account: Address,
    },
    /// Balance arithmetic left the `u64` range.
    #[error("balance out of range for {account}")]
    BalanceOutOfRange {
        /// Account whose balance would over- or underflow.
        account: Address,
    },
}

/// A single ledger mutation produced by an executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerChange {
    /// Mark the token deleted.
    DeleteToken {
        /// Token to delete.
        token: Address,
    },
    /// Set the KYC flag of a relationship.
    SetKyc {
        /// Token of the relationship.
        token: Address,
        /// Account of the relationship.
        account: Address,
        /// New flag.
        granted: bool,
    },
    /// Create a relationship.
    Associate {
        /// Token of the relationship.
        token: Address,
        /// Account of the relationship.
        account: Address,
        /// Initial KYC flag.
        kyc_granted: bool,
        /// Initial freeze flag.
        frozen: bool,
    },
    /// Remove a relationship.
    Dissociate {
        /// Token of the relationship.
        token: Address,
        /// Account of the relationship.
        account: Address,
    },
    /// Move fungible units between relationships.
    Transfer {
        /// Token moved.
        token: Address,
        /// Debited account.
        from: Address,
        /// Credited account.
        to: Address,
        /// Units moved.
        amount: u64,
    },
    /// Replace the entropy accumulator.
    SetEntropy {
        /// New accumulator value.
        entropy: B256,
    },
}

/// Read access to ledger entities plus atomic application of changes.
pub trait LedgerState {
    /// Token at `address`.
    fn token(&self, address: Address) -> Option<&Token>;

    /// Account at `address`.
    fn account(&self, address: Address) -> Option<&Account>;

    /// Relationship between `token` and `account`.
    fn relationship(&self, token: Address, account: Address) -> Option<&TokenRelationship>;

    /// Owner of NFT `serial` of `token`.
    fn nft_owner(&self, token: Address, serial: u64) -> Option<Address>;

    /// Current entropy accumulator.
    fn entropy(&self) -> B256;

    /// Applies `changes` in order, all or nothing.
    fn apply(&mut self, changes: &[LedgerChange]) -> Result<(), LedgerError>;
}

/// Parameters of a token created through [`InMemoryLedger::create_token`].
#[derive(Clone, Debug)]
pub struct TokenSpec {
    name: String,
    symbol: String,
    decimals: u8,
    token_type: TokenType,
    initial_supply: u64,
    treasury: Address,
    admin_key: Option<Key>,
    kyc_key: Option<Key>,
    freeze_key: Option<Key>,
    default_freeze_status: bool,
    default_kyc_status: bool,
}

impl TokenSpec {
    /// Fungible token with no keys and no supply.
    pub fn fungible(name: &str, symbol: &str, decimals: u8, treasury: Address) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            token_type: TokenType::FungibleCommon,
            initial_supply: 0,
            treasury,
            admin_key: None,
            kyc_key: None,
            freeze_key: None,
            default_freeze_status: false,
            default_kyc_status: false,
        }
    }

    /// Non-fungible token with no keys; mint serials with [`InMemoryLedger::mint_nft`].
    pub fn non_fungible(name: &str, symbol: &str, treasury: Address) -> Self {
        Self {
            token_type: TokenType::NonFungibleUnique,
            ..Self::fungible(name, symbol, 0, treasury)
        }
    }

    /// Supply credited to the treasury at creation.
    pub const fn with_supply(mut self, supply: u64) -> Self {
        self.initial_supply = supply;
        self
    }

    /// Sets the admin key.
    pub fn with_admin_key(mut self, key: Key) -> Self {
        self.admin_key = Some(key);
        self
    }

    /// Sets the KYC key.
    pub fn with_kyc_key(mut self, key: Key) -> Self {
        self.kyc_key = Some(key);
        self
    }

    /// Sets the freeze key.
    pub fn with_freeze_key(mut self, key: Key) -> Self {
        self.freeze_key = Some(key);
        self
    }

    /// Sets the default freeze flag.
    pub const fn with_default_freeze(mut self, frozen: bool) -> Self {
        self.default_freeze_status = frozen;
        self
    }

    /// Sets the default KYC flag.
    pub const fn with_default_kyc(mut self, granted: bool) -> Self {
        self.default_kyc_status = granted;
        self
    }
}

/// Deterministic in-memory ledger.
#[derive(Clone, Debug)]
pub struct InMemoryLedger {
    next_entity: u64,
    tokens: BTreeMap<Address, Token>,
    accounts: BTreeMap<Address, Account>,
    relationships: BTreeMap<(Address, Address), TokenRelationship>,
    nfts: BTreeMap<(Address, u64), Address>,
    entropy: B256,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Empty ledger with a zero entropy accumulator.
    pub const fn new() -> Self {
        Self::with_entropy(B256::ZERO)
    }

    /// Empty ledger seeded with `entropy`.
    pub const fn with_entropy(entropy: B256) -> Self {
        Self {
            next_entity: FIRST_ENTITY_NUM,
            tokens: BTreeMap::new(),
            accounts: BTreeMap::new(),
            relationships: BTreeMap::new(),
            nfts: BTreeMap::new(),
            entropy,
        }
    }

    fn next_address(&mut self) -> Address {
        let address = entity_address(self.next_entity);
        self.next_entity += 1;
        address
    }

    /// Creates an account controlled by `key`.
    pub fn create_account(&mut self, key: Key) -> Address {
        let address = self.next_address();
        self.accounts.insert(
            address,
            Account {
                address,
                key: Some(key),
                is_contract: false,
            },
        );
        address
    }

    /// Creates a contract account, optionally with an admin key.
    pub fn create_contract(&mut self, key: Option<Key>) -> Address {
        let address = self.next_address();
        self.accounts.insert(
            address,
            Account {
                address,
                key,
                is_contract: true,
            },
        );
        address
    }

    /// Creates a token and associates its treasury with the initial supply.
    ///
    /// The treasury relationship starts KYC-granted and unfrozen.
    pub fn create_token(&mut self, spec: TokenSpec) -> Address {
        let address = self.next_address();
        let TokenSpec {
            name,
            symbol,
            decimals,
            token_type,
            initial_supply,
            treasury,
            admin_key,
            kyc_key,
            freeze_key,
            default_freeze_status,
            default_kyc_status,
        } = spec;
        let initial_supply = match token_type {
            TokenType::FungibleCommon => initial_supply,
            TokenType::NonFungibleUnique => 0,
        };
        self.tokens.insert(
            address,
            Token {
                address,
                name,
                symbol,
                decimals,
                token_type,
                total_supply: initial_supply,
                treasury,
                admin_key,
                kyc_key,
                freeze_key,
                default_freeze_status,
                default_kyc_status,
                deleted: false,
            },
        );
        self.relationships.insert(
            (address, treasury),
            TokenRelationship {
                balance: initial_supply,
                kyc_granted: true,
                frozen: false,
            },
        );
        address
    }

    /// Mints the next serial of a non-fungible token to its treasury.
    pub fn mint_nft(&mut self, token: Address) -> Result<u64, LedgerError> {
        let entry = self
            .tokens
            .get_mut(&token)
            .filter(|t| !t.is_fungible())
            .ok_or(LedgerError::UnknownToken(token))?;
        entry.total_supply += 1;
        let serial = entry.total_supply;
        let treasury = entry.treasury;

        let rel = self
            .relationships
            .get_mut(&(token, treasury))
            .ok_or(LedgerError::MissingRelationship {
                token,
                account: treasury,
            })?;
        rel.balance += 1;
        self.nfts.insert((token, serial), treasury);
        Ok(serial)
    }

    fn relationship_entry(
        &self,
        token: Address,
        account: Address,
    ) -> Result<TokenRelationship, LedgerError> {
        self.relationships
            .get(&(token, account))
            .copied()
            .ok_or(LedgerError::MissingRelationship { token, account })
    }

    /// Applies one change, pushing what it overwrote onto `undo`.
    fn apply_one(&mut self, change: &LedgerChange, undo: &mut Vec<Undo>) -> Result<(), LedgerError> {
        match *change {
            LedgerChange::DeleteToken { token } => {
                let entry = self
                    .tokens
                    .get_mut(&token)
                    .ok_or(LedgerError::UnknownToken(token))?;
                undo.push(Undo::Deleted {
                    token,
                    deleted: entry.deleted,
                });
                entry.deleted = true;
            }
            LedgerChange::SetKyc {
                token,
                account,
                granted,
            } => {
                let previous = self.relationship_entry(token, account)?;
                undo.push(Undo::Relationship {
                    key: (token, account),
                    previous: Some(previous),
                });
                self.relationships.insert(
                    (token, account),
                    TokenRelationship {
                        kyc_granted: granted,
                        ..previous
                    },
                );
            }
            LedgerChange::Associate {
                token,
                account,
                kyc_granted,
                frozen,
            } => {
                if !self.tokens.contains_key(&token) {
                    return Err(LedgerError::UnknownToken(token));
                }
                if !self.accounts.contains_key(&account) {
                    return Err(LedgerError::UnknownAccount(account));
                }
                if self.relationships.contains_key(&(token, account)) {
                    return Err(LedgerError::RelationshipExists { token, account });
                }
                undo.push(Undo::Relationship {
                    key: (token, account),
                    previous: None,
                });
                self.relationships.insert(
                    (token, account),
                    TokenRelationship {
                        balance: 0,
                        kyc_granted,
                        frozen,
                    },
                );
            }
            LedgerChange::Dissociate { token, account } => {
                let previous = self
                    .relationships
                    .remove(&(token, account))
                    .ok_or(LedgerError::MissingRelationship { token, account })?;
                undo.push(Undo::Relationship {
                    key: (token, account),
                    previous: Some(previous),
                });
            }
            LedgerChange::Transfer {
                token,
                from,
                to,
                amount,
            } => {
                let debit = self.relationship_entry(token, from)?;
                self.relationship_entry(token, to)?;
                let debited = debit
                    .balance
                    .checked_sub(amount)
                    .ok_or(LedgerError::BalanceOutOfRange { account: from })?;
                undo.push(Undo::Relationship {
                    key: (token, from),
                    previous: Some(debit),
                });
                self.relationships.insert(
                    (token, from),
                    TokenRelationship {
                        balance: debited,
                        ..debit
                    },
                );
                // Re-read: `from == to` sees the debit.
                let credit = self.relationship_entry(token, to)?;
                let credited = credit
                    .balance
                    .checked_add(amount)
                    .ok_or(LedgerError::BalanceOutOfRange { account: to })?;
                undo.push(Undo::Relationship {
                    key: (token, to),
                    previous: Some(credit),
                });
                self.relationships.insert(
                    (token, to),
                    TokenRelationship {
                        balance: credited,
                        ..credit
                    },
                );
            }
            LedgerChange::SetEntropy { entropy } => {
                undo.push(Undo::Entropy(self.entropy));
                self.entropy = entropy;
            }
        }
        Ok(())
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Deleted { token, deleted } => {
                    if let Some(entry) = self.tokens.get_mut(&token) {
                        entry.deleted = deleted;
                    }
                }
                Undo::Relationship {
                    key,
                    previous: Some(previous),
                } => {
                    self.relationships.insert(key, previous);
                }
                Undo::Relationship {
                    key,
                    previous: None,
                } => {
                    self.relationships.remove(&key);
                }
                Undo::Entropy(entropy) => self.entropy = entropy,
            }
        }
    }
}

/// Prior value of an entry touched by [`InMemoryLedger::apply`].
#[derive(Debug)]
enum Undo {
    Deleted { token: Address, deleted: bool },
    Relationship {
        key: (Address, Address),
        previous: Option<TokenRelationship>,
    },
    Entropy(B256),
}

impl LedgerState for InMemoryLedger {
    fn token(&self, address: Address) -> Option<&Token> {
        self.tokens.get(&address)
    }

    fn account(&self, address: Address) -> Option<&Account> {
        self.accounts.get(&address)
    }

    fn relationship(&self, token: Address, account: Address) -> Option<&TokenRelationship> {
        self.relationships.get(&(token, account))
    }

    fn nft_owner(&self, token: Address, serial: u64) -> Option<Address> {
        self.nfts.get(&(token, serial)).copied()
    }

    fn entropy(&self) -> B256 {
        self.entropy
    }

    fn apply(&mut self, changes: &[LedgerChange]) -> Result<(), LedgerError> {
        let mut undo = Vec::with_capacity(changes.len());
        for change in changes {
            if let Err(err) = self.apply_one(change, &mut undo) {
                self.rollback(undo);
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Key {
        Key::ed25519([byte; 32])
    }

    #[test]
    fn entities_get_sequential_long_zero_addresses() {
        let mut ledger = InMemoryLedger::new();
        let a = ledger.create_account(key(1));
        let b = ledger.create_account(key(2));
        assert_eq!(a, entity_address(FIRST_ENTITY_NUM));
        assert_eq!(b, entity_address(FIRST_ENTITY_NUM + 1));
    }

    #[test]
    fn treasury_holds_initial_supply() {
        let mut ledger = InMemoryLedger::new();
        let treasury = ledger.create_account(key(1));
        let token = ledger.create_token(TokenSpec::fungible("Gold", "GLD", 2, treasury).with_supply(500));

        let rel = ledger.relationship(token, treasury).expect("treasury relationship");
        assert_eq!(rel.balance, 500);
        assert!(rel.kyc_granted);
        assert_eq!(ledger.token(token).map(|t| t.total_supply), Some(500));
    }

    #[test]
    fn failed_batch_leaves_state_untouched() {
        let mut ledger = InMemoryLedger::new();
        let treasury = ledger.create_account(key(1));
        let other = ledger.create_account(key(2));
        let token = ledger.create_token(TokenSpec::fungible("Gold", "GLD", 2, treasury).with_supply(10));

        let result = ledger.apply(&[
            LedgerChange::DeleteToken { token },
            LedgerChange::Transfer {
                token,
                from: treasury,
                to: other,
                amount: 1,
            },
        ]);
        assert_eq!(
            result,
            Err(LedgerError::MissingRelationship {
                token,
                account: other
            })
        );
        assert_eq!(ledger.token(token).map(|t| t.deleted), Some(false));
        assert_eq!(ledger.relationship(token, treasury).map(|r| r.balance), Some(10));
    }

    #[test]
    fn rollback_restores_every_touched_entry() {
        let mut ledger = InMemoryLedger::new();
        let treasury = ledger.create_account(key(1));
        let other = ledger.create_account(key(2));
        let token = ledger.create_token(
            TokenSpec::fungible("Gold", "GLD", 2, treasury)
                .with_supply(10)
                .with_kyc_key(key(3)),
        );

        let result = ledger.apply(&[
            LedgerChange::SetEntropy {
                entropy: B256::repeat_byte(0x11),
            },
            LedgerChange::Associate {
                token,
                account: other,
                kyc_granted: true,
                frozen: false,
            },
            LedgerChange::Transfer {
                token,
                from: treasury,
                to: other,
                amount: 4,
            },
            LedgerChange::SetKyc {
                token,
                account: treasury,
                granted: false,
            },
            LedgerChange::Transfer {
                token,
                from: treasury,
                to: other,
                amount: 7,
            },
        ]);

        assert_eq!(
            result,
            Err(LedgerError::BalanceOutOfRange { account: treasury })
        );
        assert_eq!(ledger.entropy(), B256::ZERO);
        assert_eq!(ledger.relationship(token, other), None);
        let rel = ledger.relationship(token, treasury).copied();
        assert_eq!(rel.map(|r| (r.balance, r.kyc_granted)), Some((10, true)));
    }

    #[test]
    fn self_transfer_keeps_balance() {
        let mut ledger = InMemoryLedger::new();
        let treasury = ledger.create_account(key(1));
        let token = ledger.create_token(TokenSpec::fungible("Gold", "GLD", 2, treasury).with_supply(10));

        ledger
            .apply(&[LedgerChange::Transfer {
                token,
                from: treasury,
                to: treasury,
                amount: 3,
            }])
            .expect("self transfer");
        assert_eq!(ledger.relationship(token, treasury).map(|r| r.balance), Some(10));
    }

    #[test]
    fn minting_assigns_serials_to_treasury() {
        let mut ledger = InMemoryLedger::new();
        let treasury = ledger.create_account(key(1));
        let token = ledger.create_token(TokenSpec::non_fungible("Art", "ART", treasury));

        assert_eq!(ledger.mint_nft(token), Ok(1));
        assert_eq!(ledger.mint_nft(token), Ok(2));
        assert_eq!(ledger.nft_owner(token, 2), Some(treasury));
        assert_eq!(ledger.nft_owner(token, 3), None);
        assert_eq!(ledger.relationship(token, treasury).map(|r| r.balance), Some(2));
    }

    #[test]
    fn keyless_contract_is_self_controlled() {
        let mut ledger = InMemoryLedger::new();
        let contract = ledger.create_contract(None);
        let account = ledger.account(contract).expect("contract exists");
        assert_eq!(account.controlling_key(), Some(Key::ContractId(contract)));
    }

    #[test]
    fn initial_flags_follow_token_keys() {
        let mut ledger = InMemoryLedger::new();
        let treasury = ledger.create_account(key(1));
        let plain = ledger.create_token(TokenSpec::fungible("A", "A", 0, treasury));
        let gated = ledger.create_token(
            TokenSpec::fungible("B", "B", 0, treasury)
                .with_kyc_key(key(2))
                .with_freeze_key(key(3))
                .with_default_freeze(true),
        );

        let plain = ledger.token(plain).expect("token");
        assert!(plain.initial_kyc_granted());
        assert!(!plain.initial_frozen());

        let gated = ledger.token(gated).expect("token");
        assert!(!gated.initial_kyc_granted());
        assert!(gated.initial_frozen());
    }
}
