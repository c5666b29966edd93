//! Selector decoding for system contract calls.
//!
//! A call reaches the dispatcher through one of three doors:
//!
//! | Target | Input | Resolution |
//! |--------|-------|------------|
//! | token service address | `ITokenService` call | direct operation |
//! | token service address | `redirectForToken(token, inner)` | explicit redirect |
//! | PRNG address | `getPseudorandomSeed()` | seed generation |
//! | any other address | `IErcToken`/`IHrcToken` call | implicit redirect to the token at that address |
//!
//! Decoding never touches ledger state; the result is a closed [`NativeCall`]
//! enum with typed arguments.

use crate::config::DispatcherConfig;
use crate::status::ResponseCode;
use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall, SolInterface};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

sol! {
    /// Native token service exposed at the system contract address.
    interface ITokenService {
        /// Delete a token. Requires the token admin key.
        function deleteToken(address token) external returns (int64 responseCode);

        /// Grant KYC to an associated account. Requires the token KYC key.
        function grantTokenKyc(address token, address account) external returns (int64 responseCode);

        /// Revoke KYC from an associated account. Requires the token KYC key.
        function revokeTokenKyc(address token, address account) external returns (int64 responseCode);

        /// Query whether KYC is granted for a relationship.
        function isKyc(address token, address account) external returns (int64 responseCode, bool kycGranted);

        /// Query whether a relationship is frozen.
        function isFrozen(address token, address account) external returns (int64 responseCode, bool frozen);

        /// Query the freeze flag new relationships start with.
        function getTokenDefaultFreezeStatus(address token) external returns (int64 responseCode, bool defaultFreezeStatus);

        /// Query the KYC flag new relationships start with.
        function getTokenDefaultKycStatus(address token) external returns (int64 responseCode, bool defaultKycStatus);

        /// Associate an account with a token. Requires the account key.
        function associateToken(address account, address token) external returns (int64 responseCode);

        /// Dissociate an account from a token. Requires the account key.
        function dissociateToken(address account, address token) external returns (int64 responseCode);

        /// Forward an ERC/HRC call to a token.
        /// @param token Token address the inner call is addressed to
        /// @param encodedFunctionSelector ABI-encoded inner call
        function redirectForToken(address token, bytes encodedFunctionSelector) external returns (int64 responseCode, bytes response);
    }

    /// ERC-20/ERC-721 facade served on behalf of a token.
    interface IErcToken {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
        function transfer(address recipient, uint256 amount) external returns (bool);
    }

    /// Association facade served on behalf of a token, acting for `msg.sender`.
    interface IHrcToken {
        function associate() external returns (int64 responseCode);
        function dissociate() external returns (int64 responseCode);
        function isAssociated() external view returns (bool associated);
    }

    /// Pseudorandom seed system contract.
    interface IPrng {
        /// 32 bytes derived from the ledger's running entropy.
        function getPseudorandomSeed() external returns (bytes32);
    }
}

/// Length of an ABI function selector.
pub const SELECTOR_LEN: usize = 4;

/// Logical operation kind of a decoded call.
///
/// Drives gas metering, result encoding and the top-level signature policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// `deleteToken`
    DeleteToken,
    /// `grantTokenKyc`
    GrantKyc,
    /// `revokeTokenKyc`
    RevokeKyc,
    /// `isKyc`
    IsKyc,
    /// `isFrozen`
    IsFrozen,
    /// `getTokenDefaultFreezeStatus`
    DefaultFreezeStatus,
    /// `getTokenDefaultKycStatus`
    DefaultKycStatus,
    /// `associateToken`
    Associate,
    /// `dissociateToken`
    Dissociate,
    /// `getPseudorandomSeed`
    PseudorandomSeed,
    /// ERC `name`
    ErcName,
    /// ERC `symbol`
    ErcSymbol,
    /// ERC `decimals`
    ErcDecimals,
    /// ERC `totalSupply`
    ErcTotalSupply,
    /// ERC `balanceOf`
    ErcBalanceOf,
    /// ERC `ownerOf`
    ErcOwnerOf,
    /// ERC `transfer`
    ErcTransfer,
    /// HRC `isAssociated`
    HrcIsAssociated,
    /// HRC `associate`
    HrcAssociate,
    /// HRC `dissociate`
    HrcDissociate,
}

/// Gas class an operation is charged under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationClass {
    /// Changes ledger state.
    Mutation,
    /// Reads ledger state.
    View,
    /// Draws from the entropy accumulator.
    Prng,
}

/// ABI shape of an operation's return data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultShape {
    /// `int64 responseCode`
    ResponseCode,
    /// `(int64 responseCode, bool value)`
    StatusAndValue,
    /// Raw ABI value with no status word.
    Value,
}

impl OperationKind {
    /// Every operation kind.
    pub const ALL: [Self; 20] = [
        Self::DeleteToken,
        Self::GrantKyc,
        Self::RevokeKyc,
        Self::IsKyc,
        Self::IsFrozen,
        Self::DefaultFreezeStatus,
        Self::DefaultKycStatus,
        Self::Associate,
        Self::Dissociate,
        Self::PseudorandomSeed,
        Self::ErcName,
        Self::ErcSymbol,
        Self::ErcDecimals,
        Self::ErcTotalSupply,
        Self::ErcBalanceOf,
        Self::ErcOwnerOf,
        Self::ErcTransfer,
        Self::HrcIsAssociated,
        Self::HrcAssociate,
        Self::HrcDissociate,
    ];

    /// Configuration name of the operation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeleteToken => "deleteToken",
            Self::GrantKyc => "grantKyc",
            Self::RevokeKyc => "revokeKyc",
            Self::IsKyc => "isKyc",
            Self::IsFrozen => "isFrozen",
            Self::DefaultFreezeStatus => "defaultFreezeStatus",
            Self::DefaultKycStatus => "defaultKycStatus",
            Self::Associate => "associate",
            Self::Dissociate => "dissociate",
            Self::PseudorandomSeed => "pseudorandomSeed",
            Self::ErcName => "ercName",
            Self::ErcSymbol => "ercSymbol",
            Self::ErcDecimals => "ercDecimals",
            Self::ErcTotalSupply => "ercTotalSupply",
            Self::ErcBalanceOf => "ercBalanceOf",
            Self::ErcOwnerOf => "ercOwnerOf",
            Self::ErcTransfer => "ercTransfer",
            Self::HrcIsAssociated => "hrcIsAssociated",
            Self::HrcAssociate => "hrcAssociate",
            Self::HrcDissociate => "hrcDissociate",
        }
    }

    /// Gas class of the operation.
    pub const fn class(self) -> OperationClass {
        match self {
            Self::DeleteToken
            | Self::GrantKyc
            | Self::RevokeKyc
            | Self::Associate
            | Self::Dissociate
            | Self::ErcTransfer
            | Self::HrcAssociate
            | Self::HrcDissociate => OperationClass::Mutation,
            Self::PseudorandomSeed => OperationClass::Prng,
            Self::IsKyc
            | Self::IsFrozen
            | Self::DefaultFreezeStatus
            | Self::DefaultKycStatus
            | Self::ErcName
            | Self::ErcSymbol
            | Self::ErcDecimals
            | Self::ErcTotalSupply
            | Self::ErcBalanceOf
            | Self::ErcOwnerOf
            | Self::HrcIsAssociated => OperationClass::View,
        }
    }

    /// Returns `true` when the operation changes token or account state.
    pub const fn is_mutation(self) -> bool {
        matches!(self.class(), OperationClass::Mutation)
    }

    /// Return data layout of the operation.
    pub const fn shape(self) -> ResultShape {
        match self {
            Self::DeleteToken
            | Self::GrantKyc
            | Self::RevokeKyc
            | Self::Associate
            | Self::Dissociate
            | Self::HrcAssociate
            | Self::HrcDissociate => ResultShape::ResponseCode,
            Self::IsKyc | Self::IsFrozen | Self::DefaultFreezeStatus | Self::DefaultKycStatus => {
                ResultShape::StatusAndValue
            }
            Self::PseudorandomSeed
            | Self::ErcName
            | Self::ErcSymbol
            | Self::ErcDecimals
            | Self::ErcTotalSupply
            | Self::ErcBalanceOf
            | Self::ErcOwnerOf
            | Self::ErcTransfer
            | Self::HrcIsAssociated => ResultShape::Value,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown operation kind `{s}`"))
    }
}

/// Inner call of a token redirect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectCall {
    /// ERC `name()`
    Name,
    /// ERC `symbol()`
    Symbol,
    /// ERC `decimals()`
    Decimals,
    /// ERC `totalSupply()`
    TotalSupply,
    /// ERC `balanceOf(account)`
    BalanceOf {
        /// Account whose balance is read.
        account: Address,
    },
    /// ERC `ownerOf(serial)`
    OwnerOf {
        /// NFT serial number.
        serial: U256,
    },
    /// ERC `transfer(recipient, amount)` from `msg.sender`.
    Transfer {
        /// Receiving account.
        recipient: Address,
        /// Amount in the token's smallest unit.
        amount: U256,
    },
    /// HRC `isAssociated()` for `msg.sender`.
    IsAssociated,
    /// HRC `associate()` for `msg.sender`.
    Associate,
    /// HRC `dissociate()` for `msg.sender`.
    Dissociate,
}

impl RedirectCall {
    /// Operation kind of the inner call.
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Name => OperationKind::ErcName,
            Self::Symbol => OperationKind::ErcSymbol,
            Self::Decimals => OperationKind::ErcDecimals,
            Self::TotalSupply => OperationKind::ErcTotalSupply,
            Self::BalanceOf { .. } => OperationKind::ErcBalanceOf,
            Self::OwnerOf { .. } => OperationKind::ErcOwnerOf,
            Self::Transfer { .. } => OperationKind::ErcTransfer,
            Self::IsAssociated => OperationKind::HrcIsAssociated,
            Self::Associate => OperationKind::HrcAssociate,
            Self::Dissociate => OperationKind::HrcDissociate,
        }
    }
}

/// A fully decoded system contract call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeCall {
    /// Delete `token`.
    DeleteToken {
        /// Token to delete.
        token: Address,
    },
    /// Grant KYC on the `(token, account)` relationship.
    GrantKyc {
        /// Token whose KYC key signs.
        token: Address,
        /// Account receiving KYC.
        account: Address,
    },
    /// Revoke KYC on the `(token, account)` relationship.
    RevokeKyc {
        /// Token whose KYC key signs.
        token: Address,
        /// Account losing KYC.
        account: Address,
    },
    /// Read the KYC flag of a relationship.
    IsKyc {
        /// Token of the relationship.
        token: Address,
        /// Account of the relationship.
        account: Address,
    },
    /// Read the freeze flag of a relationship.
    IsFrozen {
        /// Token of the relationship.
        token: Address,
        /// Account of the relationship.
        account: Address,
    },
    /// Read the token's default freeze flag.
    DefaultFreezeStatus {
        /// Token queried.
        token: Address,
    },
    /// Read the token's default KYC flag.
    DefaultKycStatus {
        /// Token queried.
        token: Address,
    },
    /// Associate `account` with `token`.
    Associate {
        /// Account gaining the relationship.
        account: Address,
        /// Token being associated.
        token: Address,
    },
    /// Dissociate `account` from `token`.
    Dissociate {
        /// Account losing the relationship.
        account: Address,
        /// Token being dissociated.
        token: Address,
    },
    /// Draw a pseudorandom seed.
    PseudorandomSeed,
    /// Call serviced on behalf of a token.
    Redirect {
        /// Token the call is addressed to.
        token: Address,
        /// Decoded inner call.
        call: RedirectCall,
        /// `true` when wrapped in `redirectForToken`.
        explicit: bool,
    },
}

impl NativeCall {
    /// Logical operation kind.
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::DeleteToken { .. } => OperationKind::DeleteToken,
            Self::GrantKyc { .. } => OperationKind::GrantKyc,
            Self::RevokeKyc { .. } => OperationKind::RevokeKyc,
            Self::IsKyc { .. } => OperationKind::IsKyc,
            Self::IsFrozen { .. } => OperationKind::IsFrozen,
            Self::DefaultFreezeStatus { .. } => OperationKind::DefaultFreezeStatus,
            Self::DefaultKycStatus { .. } => OperationKind::DefaultKycStatus,
            Self::Associate { .. } => OperationKind::Associate,
            Self::Dissociate { .. } => OperationKind::Dissociate,
            Self::PseudorandomSeed => OperationKind::PseudorandomSeed,
            Self::Redirect { call, .. } => call.kind(),
        }
    }

    /// Returns `true` for redirects.
    pub const fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }

    /// Returns `true` for redirects wrapped in `redirectForToken`.
    pub const fn is_explicit_redirect(&self) -> bool {
        matches!(self, Self::Redirect { explicit: true, .. })
    }
}

/// First four bytes of `input`, zero-padded when shorter.
pub fn selector_of(input: &[u8]) -> [u8; SELECTOR_LEN] {
    let mut selector = [0u8; SELECTOR_LEN];
    let len = input.len().min(SELECTOR_LEN);
    selector[..len].copy_from_slice(&input[..len]);
    selector
}

/// Decodes `input` addressed to `target` into a [`NativeCall`].
///
/// # Errors
///
/// - [`ResponseCode::MalformedSelector`] when `input` is shorter than 4 bytes
/// - [`ResponseCode::ErrorDecodingInput`] when `input` exceeds the configured
///   limit or its arguments fail ABI decoding
/// - [`ResponseCode::NotSupported`] for unknown direct selectors
/// - [`ResponseCode::UnsupportedRedirectSelector`] for unknown redirect payloads
pub fn decode(
    config: &DispatcherConfig,
    target: Address,
    input: &[u8],
) -> Result<NativeCall, ResponseCode> {
    if input.len() < SELECTOR_LEN {
        return Err(ResponseCode::MalformedSelector);
    }
    if input.len() > config.max_input_len {
        return Err(ResponseCode::ErrorDecodingInput);
    }

    let selector = selector_of(input);

    if target == config.prng_address {
        return if selector == IPrng::getPseudorandomSeedCall::SELECTOR {
            Ok(NativeCall::PseudorandomSeed)
        } else {
            Err(ResponseCode::NotSupported)
        };
    }

    if selector == ITokenService::redirectForTokenCall::SELECTOR {
        let wrapper = ITokenService::redirectForTokenCall::abi_decode(input)
            .map_err(|_| ResponseCode::ErrorDecodingInput)?;
        return decode_redirect(wrapper.token, &wrapper.encodedFunctionSelector, true);
    }

    if target != config.system_contract_address {
        return decode_redirect(target, input, false);
    }

    if !ITokenService::ITokenServiceCalls::valid_selector(selector) {
        return Err(ResponseCode::NotSupported);
    }
    let decoded = ITokenService::ITokenServiceCalls::abi_decode(input)
        .map_err(|_| ResponseCode::ErrorDecodingInput)?;

    use ITokenService::ITokenServiceCalls as Calls;
    Ok(match decoded {
        Calls::deleteToken(call) => NativeCall::DeleteToken { token: call.token },
        Calls::grantTokenKyc(call) => NativeCall::GrantKyc {
            token: call.token,
            account: call.account,
        },
        Calls::revokeTokenKyc(call) => NativeCall::RevokeKyc {
            token: call.token,
            account: call.account,
        },
        Calls::isKyc(call) => NativeCall::IsKyc {
            token: call.token,
            account: call.account,
        },
        Calls::isFrozen(call) => NativeCall::IsFrozen {
            token: call.token,
            account: call.account,
        },
        Calls::getTokenDefaultFreezeStatus(call) => {
            NativeCall::DefaultFreezeStatus { token: call.token }
        }
        Calls::getTokenDefaultKycStatus(call) => NativeCall::DefaultKycStatus { token: call.token },
        Calls::associateToken(call) => NativeCall::Associate {
            account: call.account,
            token: call.token,
        },
        Calls::dissociateToken(call) => NativeCall::Dissociate {
            account: call.account,
            token: call.token,
        },
        // Handled above by selector.
        Calls::redirectForToken(_) => return Err(ResponseCode::ErrorDecodingInput),
    })
}

fn decode_redirect(token: Address, inner: &[u8], explicit: bool) -> Result<NativeCall, ResponseCode> {
    if inner.len() < SELECTOR_LEN {
        return Err(ResponseCode::UnsupportedRedirectSelector);
    }
    let selector = selector_of(inner);

    let call = if IErcToken::IErcTokenCalls::valid_selector(selector) {
        use IErcToken::IErcTokenCalls as Erc;
        match Erc::abi_decode(inner).map_err(|_| ResponseCode::ErrorDecodingInput)? {
            Erc::name(_) => RedirectCall::Name,
            Erc::symbol(_) => RedirectCall::Symbol,
            Erc::decimals(_) => RedirectCall::Decimals,
            Erc::totalSupply(_) => RedirectCall::TotalSupply,
            Erc::balanceOf(call) => RedirectCall::BalanceOf {
                account: call.account,
            },
            Erc::ownerOf(call) => RedirectCall::OwnerOf {
                serial: call.tokenId,
            },
            Erc::transfer(call) => RedirectCall::Transfer {
                recipient: call.recipient,
                amount: call.amount,
            },
        }
    } else if IHrcToken::IHrcTokenCalls::valid_selector(selector) {
        use IHrcToken::IHrcTokenCalls as Hrc;
        match Hrc::abi_decode(inner).map_err(|_| ResponseCode::ErrorDecodingInput)? {
            Hrc::associate(_) => RedirectCall::Associate,
            Hrc::dissociate(_) => RedirectCall::Dissociate,
            Hrc::isAssociated(_) => RedirectCall::IsAssociated,
        }
    } else {
        return Err(ResponseCode::UnsupportedRedirectSelector);
    };

    Ok(NativeCall::Redirect {
        token,
        call,
        explicit,
    })
}
