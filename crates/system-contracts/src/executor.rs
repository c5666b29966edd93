//! Native operation executors.
//!
//! Executors are pure functions of a ledger snapshot and a decoded call. They
//! return the typed result and the ordered changes to apply, or the failure
//! status. Nothing here writes to the ledger.
//!
//! Checks that gate authorization (token existence, deletion, presence of the
//! signing key) run in [`key_requirement`] so they surface before any
//! signature is evaluated.

use crate::auth::{KeyRequirement, KeyRole};
use crate::ledger::{LedgerChange, LedgerState, Token, TokenRelationship};
use crate::selector::{NativeCall, RedirectCall};
use crate::status::ResponseCode;
use alloy_primitives::{keccak256, Address, B256, U256};

/// Typed result of a successful operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeResult {
    /// Boolean flag.
    Boolean(bool),
    /// Signed 64-bit value.
    Int64(i64),
    /// Account or token address.
    Address(Address),
    /// 32 raw bytes.
    Bytes32(B256),
    /// Token amount.
    TokenBalance(U256),
    /// Small unsigned value, used for decimals.
    Uint8(u8),
    /// UTF-8 text.
    Text(String),
    /// No value beyond the status.
    Unit,
}

/// Result plus the ledger changes that realize it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Executed {
    /// Typed result.
    pub result: NativeResult,
    /// Changes to apply, in order.
    pub changes: Vec<LedgerChange>,
}

impl Executed {
    fn read(result: NativeResult) -> Self {
        Self {
            result,
            changes: Vec::new(),
        }
    }

    fn write(change: LedgerChange) -> Self {
        Self {
            result: NativeResult::Unit,
            changes: vec![change],
        }
    }
}

/// Call-level inputs to execution.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionContext {
    /// Direct sender of the precompile call.
    pub sender: Address,
    /// Height of the block being executed.
    pub block_number: u64,
    /// Whether the call runs in a static frame.
    pub is_static: bool,
}

fn existing_token<L: LedgerState + ?Sized>(
    ledger: &L,
    token: Address,
) -> Result<&Token, ResponseCode> {
    ledger.token(token).ok_or(ResponseCode::InvalidTokenId)
}

fn live_token<L: LedgerState + ?Sized>(ledger: &L, token: Address) -> Result<&Token, ResponseCode> {
    let token = existing_token(ledger, token)?;
    if token.deleted {
        return Err(ResponseCode::TokenWasDeleted);
    }
    Ok(token)
}

fn account_requirement<L: LedgerState + ?Sized>(
    ledger: &L,
    account: Address,
) -> Result<KeyRequirement, ResponseCode> {
    let key = ledger
        .account(account)
        .and_then(|a| a.controlling_key())
        .ok_or(ResponseCode::InvalidAccountId)?;
    Ok(KeyRequirement::single(account, KeyRole::Account, key))
}

/// Keys `call` needs, derived from ledger metadata.
///
/// # Errors
///
/// Entity-state failures that make signatures irrelevant: unknown or deleted
/// tokens, tokens lacking the role key, unknown accounts.
pub fn key_requirement<L: LedgerState + ?Sized>(
    ledger: &L,
    call: &NativeCall,
    sender: Address,
) -> Result<KeyRequirement, ResponseCode> {
    match call {
        NativeCall::DeleteToken { token } => {
            let entity = live_token(ledger, *token)?;
            let key = entity
                .admin_key
                .clone()
                .ok_or(ResponseCode::TokenIsImmutable)?;
            Ok(KeyRequirement::single(*token, KeyRole::Admin, key))
        }
        NativeCall::GrantKyc { token, .. } | NativeCall::RevokeKyc { token, .. } => {
            let entity = live_token(ledger, *token)?;
            let key = entity
                .kyc_key
                .clone()
                .ok_or(ResponseCode::TokenHasNoKycKey)?;
            Ok(KeyRequirement::single(*token, KeyRole::Kyc, key))
        }
        NativeCall::Associate { account, .. } | NativeCall::Dissociate { account, .. } => {
            account_requirement(ledger, *account)
        }
        NativeCall::Redirect {
            call: RedirectCall::Associate | RedirectCall::Dissociate,
            ..
        } => account_requirement(ledger, sender),
        NativeCall::IsKyc { .. }
        | NativeCall::IsFrozen { .. }
        | NativeCall::DefaultFreezeStatus { .. }
        | NativeCall::DefaultKycStatus { .. }
        | NativeCall::PseudorandomSeed
        | NativeCall::Redirect { .. } => Ok(KeyRequirement::none()),
    }
}

/// Executes an authorized `call` against `ledger`.
pub fn execute<L: LedgerState + ?Sized>(
    ledger: &L,
    call: &NativeCall,
    ctx: &ExecutionContext,
) -> Result<Executed, ResponseCode> {
    match call {
        NativeCall::DeleteToken { token } => {
            live_token(ledger, *token)?;
            Ok(Executed::write(LedgerChange::DeleteToken { token: *token }))
        }
        NativeCall::GrantKyc { token, account } => set_kyc(ledger, *token, *account, true),
        NativeCall::RevokeKyc { token, account } => set_kyc(ledger, *token, *account, false),
        NativeCall::IsKyc { token, account } => {
            relationship_flag(ledger, *token, *account, |rel| rel.kyc_granted)
        }
        NativeCall::IsFrozen { token, account } => {
            relationship_flag(ledger, *token, *account, |rel| rel.frozen)
        }
        NativeCall::DefaultFreezeStatus { token } => {
            let entity = existing_token(ledger, *token)?;
            Ok(Executed::read(NativeResult::Boolean(entity.default_freeze_status)))
        }
        NativeCall::DefaultKycStatus { token } => {
            let entity = existing_token(ledger, *token)?;
            Ok(Executed::read(NativeResult::Boolean(entity.default_kyc_status)))
        }
        NativeCall::Associate { account, token } => associate(ledger, *token, *account),
        NativeCall::Dissociate { account, token } => dissociate(ledger, *token, *account),
        NativeCall::PseudorandomSeed => Ok(pseudorandom_seed(ledger, ctx)),
        NativeCall::Redirect { token, call, .. } => redirect(ledger, *token, call, ctx),
    }
}

fn set_kyc<L: LedgerState + ?Sized>(
    ledger: &L,
    token: Address,
    account: Address,
    granted: bool,
) -> Result<Executed, ResponseCode> {
    let entity = live_token(ledger, token)?;
    if entity.kyc_key.is_none() {
        return Err(ResponseCode::TokenHasNoKycKey);
    }
    if ledger.account(account).is_none() {
        return Err(ResponseCode::InvalidAccountId);
    }
    if ledger.relationship(token, account).is_none() {
        return Err(ResponseCode::TokenNotAssociatedToAccount);
    }
    Ok(Executed::write(LedgerChange::SetKyc {
        token,
        account,
        granted,
    }))
}

fn relationship_flag<L: LedgerState + ?Sized>(
    ledger: &L,
    token: Address,
    account: Address,
    flag: impl Fn(&TokenRelationship) -> bool,
) -> Result<Executed, ResponseCode> {
    existing_token(ledger, token)?;
    if ledger.account(account).is_none() {
        return Err(ResponseCode::InvalidAccountId);
    }
    let value = ledger.relationship(token, account).is_some_and(flag);
    Ok(Executed::read(NativeResult::Boolean(value)))
}

fn associate<L: LedgerState + ?Sized>(
    ledger: &L,
    token: Address,
    account: Address,
) -> Result<Executed, ResponseCode> {
    let entity = live_token(ledger, token)?;
    if ledger.account(account).is_none() {
        return Err(ResponseCode::InvalidAccountId);
    }
    if ledger.relationship(token, account).is_some() {
        return Err(ResponseCode::TokenAlreadyAssociatedToAccount);
    }
    Ok(Executed::write(LedgerChange::Associate {
        token,
        account,
        kyc_granted: entity.initial_kyc_granted(),
        frozen: entity.initial_frozen(),
    }))
}

fn dissociate<L: LedgerState + ?Sized>(
    ledger: &L,
    token: Address,
    account: Address,
) -> Result<Executed, ResponseCode> {
    let entity = existing_token(ledger, token)?;
    if ledger.account(account).is_none() {
        return Err(ResponseCode::InvalidAccountId);
    }
    let rel = ledger
        .relationship(token, account)
        .ok_or(ResponseCode::TokenNotAssociatedToAccount)?;
    // Relationships with deleted tokens can be dropped whatever they hold.
    if !entity.deleted && rel.balance > 0 {
        return Err(ResponseCode::TransactionRequiresZeroTokenBalances);
    }
    Ok(Executed::write(LedgerChange::Dissociate { token, account }))
}

/// `keccak256(entropy || block_number)`; non-static calls also advance the
/// accumulator to `keccak256(seed || entropy)`.
fn pseudorandom_seed<L: LedgerState + ?Sized>(ledger: &L, ctx: &ExecutionContext) -> Executed {
    let entropy = ledger.entropy();

    let mut preimage = [0u8; 40];
    preimage[..32].copy_from_slice(entropy.as_slice());
    preimage[32..].copy_from_slice(&ctx.block_number.to_be_bytes());
    let seed = keccak256(preimage);

    let changes = if ctx.is_static {
        Vec::new()
    } else {
        let mut next = [0u8; 64];
        next[..32].copy_from_slice(seed.as_slice());
        next[32..].copy_from_slice(entropy.as_slice());
        vec![LedgerChange::SetEntropy {
            entropy: keccak256(next),
        }]
    };

    Executed {
        result: NativeResult::Bytes32(seed),
        changes,
    }
}

fn redirect<L: LedgerState + ?Sized>(
    ledger: &L,
    token: Address,
    call: &RedirectCall,
    ctx: &ExecutionContext,
) -> Result<Executed, ResponseCode> {
    match call {
        RedirectCall::Associate => associate(ledger, token, ctx.sender),
        RedirectCall::Dissociate => dissociate(ledger, token, ctx.sender),
        RedirectCall::Transfer { recipient, amount } => {
            transfer(ledger, token, ctx.sender, *recipient, *amount)
        }
        view => token_view(ledger, token, view, ctx.sender).map(Executed::read),
    }
}

fn token_view<L: LedgerState + ?Sized>(
    ledger: &L,
    token: Address,
    call: &RedirectCall,
    sender: Address,
) -> Result<NativeResult, ResponseCode> {
    let entity = existing_token(ledger, token)?;
    Ok(match call {
        RedirectCall::Name => NativeResult::Text(entity.name.clone()),
        RedirectCall::Symbol => NativeResult::Text(entity.symbol.clone()),
        RedirectCall::Decimals => {
            if !entity.is_fungible() {
                return Err(ResponseCode::InvalidTokenId);
            }
            NativeResult::Uint8(entity.decimals)
        }
        RedirectCall::TotalSupply => NativeResult::TokenBalance(U256::from(entity.total_supply)),
        RedirectCall::BalanceOf { account } => {
            let balance = ledger
                .relationship(token, *account)
                .map(|rel| rel.balance)
                .unwrap_or_default();
            NativeResult::TokenBalance(U256::from(balance))
        }
        RedirectCall::OwnerOf { serial } => {
            if entity.is_fungible() {
                return Err(ResponseCode::InvalidTokenId);
            }
            let owner = u64::try_from(*serial)
                .ok()
                .and_then(|serial| ledger.nft_owner(token, serial))
                .ok_or(ResponseCode::InvalidTokenNftSerialNumber)?;
            NativeResult::Address(owner)
        }
        RedirectCall::IsAssociated => {
            NativeResult::Boolean(ledger.relationship(token, sender).is_some())
        }
        RedirectCall::Associate | RedirectCall::Dissociate | RedirectCall::Transfer { .. } => {
            return Err(ResponseCode::NotSupported)
        }
    })
}

fn transfer<L: LedgerState + ?Sized>(
    ledger: &L,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<Executed, ResponseCode> {
    let entity = live_token(ledger, token)?;
    if !entity.is_fungible() {
        return Err(ResponseCode::NotSupported);
    }
    if ledger.account(to).is_none() {
        return Err(ResponseCode::InvalidAccountId);
    }
    let debit = ledger
        .relationship(token, from)
        .ok_or(ResponseCode::TokenNotAssociatedToAccount)?;
    let credit = ledger
        .relationship(token, to)
        .ok_or(ResponseCode::TokenNotAssociatedToAccount)?;
    if !debit.kyc_granted || !credit.kyc_granted {
        return Err(ResponseCode::AccountKycNotGrantedForToken);
    }
    if debit.frozen || credit.frozen {
        return Err(ResponseCode::AccountFrozenForToken);
    }
    let amount = u64::try_from(amount).map_err(|_| ResponseCode::InsufficientTokenBalance)?;
    if debit.balance < amount {
        return Err(ResponseCode::InsufficientTokenBalance);
    }

    let changes = if amount == 0 || from == to {
        Vec::new()
    } else {
        vec![LedgerChange::Transfer {
            token,
            from,
            to,
            amount,
        }]
    };
    Ok(Executed {
        result: NativeResult::Boolean(true),
        changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Key;
    use crate::ledger::{InMemoryLedger, TokenSpec};

    struct Fixture {
        ledger: InMemoryLedger,
        treasury: Address,
        holder: Address,
        token: Address,
    }

    fn key(byte: u8) -> Key {
        Key::ed25519([byte; 32])
    }

    fn fixture() -> Fixture {
        let mut ledger = InMemoryLedger::new();
        let treasury = ledger.create_account(key(1));
        let holder = ledger.create_account(key(2));
        let token = ledger.create_token(
            TokenSpec::fungible("Gold", "GLD", 2, treasury)
                .with_supply(1_000)
                .with_admin_key(key(10))
                .with_kyc_key(key(11)),
        );
        Fixture {
            ledger,
            treasury,
            holder,
            token,
        }
    }

    fn ctx(sender: Address) -> ExecutionContext {
        ExecutionContext {
            sender,
            block_number: 7,
            is_static: false,
        }
    }

    fn run(
        ledger: &mut InMemoryLedger,
        call: NativeCall,
        sender: Address,
    ) -> Result<NativeResult, ResponseCode> {
        let executed = execute(&*ledger, &call, &ctx(sender))?;
        ledger.apply(&executed.changes).expect("changes apply");
        Ok(executed.result)
    }

    fn redirect(token: Address, call: RedirectCall) -> NativeCall {
        NativeCall::Redirect {
            token,
            call,
            explicit: false,
        }
    }

    #[test]
    fn delete_requires_admin_key() {
        let Fixture {
            mut ledger,
            treasury,
            holder,
            token,
        } = fixture();
        let immutable = ledger.create_token(TokenSpec::fungible("Lead", "PB", 0, treasury));
        assert_eq!(
            key_requirement(&ledger, &NativeCall::DeleteToken { token: immutable }, holder),
            Err(ResponseCode::TokenIsImmutable)
        );
        let req = key_requirement(&ledger, &NativeCall::DeleteToken { token }, holder)
            .expect("admin key");
        assert_eq!(req.keys()[0].role, KeyRole::Admin);
        assert_eq!(req.keys()[0].owner, token);
    }

    #[test]
    fn kyc_requirement_checks_token_first() {
        let Fixture { ledger, holder, .. } = fixture();
        let missing = Address::repeat_byte(0x42);
        assert_eq!(
            key_requirement(
                &ledger,
                &NativeCall::GrantKyc {
                    token: missing,
                    account: holder
                },
                holder
            ),
            Err(ResponseCode::InvalidTokenId)
        );
    }

    #[test]
    fn grant_kyc_requires_association() {
        let Fixture {
            mut ledger,
            treasury,
            holder,
            token,
        } = fixture();
        let grant = NativeCall::GrantKyc {
            token,
            account: holder,
        };
        assert_eq!(
            run(&mut ledger, grant.clone(), treasury),
            Err(ResponseCode::TokenNotAssociatedToAccount)
        );

        run(
            &mut ledger,
            NativeCall::Associate {
                account: holder,
                token,
            },
            holder,
        )
        .expect("associate");
        assert_eq!(run(&mut ledger, grant, treasury), Ok(NativeResult::Unit));

        let is_kyc = NativeCall::IsKyc {
            token,
            account: holder,
        };
        assert_eq!(run(&mut ledger, is_kyc, holder), Ok(NativeResult::Boolean(true)));
    }

    #[test]
    fn association_lifecycle() {
        let Fixture {
            mut ledger,
            treasury,
            holder,
            token,
        } = fixture();
        let associate = NativeCall::Associate {
            account: holder,
            token,
        };
        run(&mut ledger, associate.clone(), holder).expect("first associate");
        assert_eq!(
            run(&mut ledger, associate, holder),
            Err(ResponseCode::TokenAlreadyAssociatedToAccount)
        );

        let dissociate = NativeCall::Dissociate {
            account: treasury,
            token,
        };
        assert_eq!(
            run(&mut ledger, dissociate, treasury),
            Err(ResponseCode::TransactionRequiresZeroTokenBalances)
        );
    }

    #[test]
    fn erc_views_read_token_metadata() {
        let Fixture {
            mut ledger,
            treasury,
            holder,
            token,
        } = fixture();
        assert_eq!(
            run(&mut ledger, redirect(token, RedirectCall::Symbol), holder),
            Ok(NativeResult::Text("GLD".to_string()))
        );
        assert_eq!(
            run(&mut ledger, redirect(token, RedirectCall::Decimals), holder),
            Ok(NativeResult::Uint8(2))
        );
        assert_eq!(
            run(
                &mut ledger,
                redirect(token, RedirectCall::BalanceOf { account: treasury }),
                holder
            ),
            Ok(NativeResult::TokenBalance(U256::from(1_000)))
        );
        assert_eq!(
            run(
                &mut ledger,
                redirect(token, RedirectCall::BalanceOf { account: holder }),
                holder
            ),
            Ok(NativeResult::TokenBalance(U256::ZERO))
        );
        assert_eq!(
            run(&mut ledger, redirect(token, RedirectCall::IsAssociated), treasury),
            Ok(NativeResult::Boolean(true))
        );
    }

    #[test]
    fn owner_of_is_nft_only() {
        let Fixture {
            mut ledger,
            treasury,
            holder,
            token,
        } = fixture();
        let nft = ledger.create_token(TokenSpec::non_fungible("Art", "ART", treasury));
        ledger.mint_nft(nft).expect("mint");

        let owner_of = |token, serial: u64| {
            redirect(
                token,
                RedirectCall::OwnerOf {
                    serial: U256::from(serial),
                },
            )
        };
        assert_eq!(
            run(&mut ledger, owner_of(nft, 1), holder),
            Ok(NativeResult::Address(treasury))
        );
        assert_eq!(
            run(&mut ledger, owner_of(nft, 2), holder),
            Err(ResponseCode::InvalidTokenNftSerialNumber)
        );
        assert_eq!(
            run(&mut ledger, owner_of(token, 1), holder),
            Err(ResponseCode::InvalidTokenId)
        );
        assert_eq!(
            run(&mut ledger, redirect(nft, RedirectCall::Decimals), holder),
            Err(ResponseCode::InvalidTokenId)
        );
    }

    #[test]
    fn transfer_enforces_kyc_then_balance() {
        let Fixture {
            mut ledger,
            treasury,
            holder,
            token,
        } = fixture();
        run(
            &mut ledger,
            NativeCall::Associate {
                account: holder,
                token,
            },
            holder,
        )
        .expect("associate");

        let transfer = |amount: u64| {
            redirect(
                token,
                RedirectCall::Transfer {
                    recipient: holder,
                    amount: U256::from(amount),
                },
            )
        };
        assert_eq!(
            run(&mut ledger, transfer(10), treasury),
            Err(ResponseCode::AccountKycNotGrantedForToken)
        );

        run(
            &mut ledger,
            NativeCall::GrantKyc {
                token,
                account: holder,
            },
            treasury,
        )
        .expect("grant");
        assert_eq!(run(&mut ledger, transfer(10), treasury), Ok(NativeResult::Boolean(true)));
        assert_eq!(
            run(&mut ledger, transfer(5_000), treasury),
            Err(ResponseCode::InsufficientTokenBalance)
        );
        assert_eq!(ledger.relationship(token, holder).map(|r| r.balance), Some(10));
    }

    #[test]
    fn static_seed_does_not_advance_entropy() {
        let Fixture { ledger, holder, .. } = fixture();
        let static_ctx = ExecutionContext {
            is_static: true,
            ..ctx(holder)
        };
        let first = execute(&ledger, &NativeCall::PseudorandomSeed, &static_ctx).unwrap();
        assert!(first.changes.is_empty());

        let live = execute(&ledger, &NativeCall::PseudorandomSeed, &ctx(holder)).unwrap();
        assert_eq!(first.result, live.result);
        assert_eq!(live.changes.len(), 1);
    }
}
