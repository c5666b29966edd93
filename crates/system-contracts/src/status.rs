//! Ledger response codes returned by system contract calls.
//!
//! Ledger-level codes share the numbering of the node's transaction receipts so
//! that the `int64` status word a contract observes can be compared directly
//! against receipt statuses. Structural decoding failures have no receipt
//! counterpart and live in the `1000+` range.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome status of a single system contract call.
///
/// [`ResponseCode::Success`] is the only non-failure variant. Every other
/// variant doubles as the error type of the decoding, authorization and
/// execution stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum ResponseCode {
    /// The operation completed.
    #[error("success")]
    Success = 22,
    /// The selector or operation is not available from this call site.
    #[error("operation not supported")]
    NotSupported = 13,
    /// Referenced account does not exist.
    #[error("invalid account id")]
    InvalidAccountId = 15,
    /// Value was sent to a non-payable system contract.
    #[error("invalid contract id")]
    InvalidContractId = 16,
    /// Unexpected internal failure while applying ledger changes.
    #[error("internal failure")]
    FailInvalid = 23,
    /// Offered gas does not cover the fixed operation charge.
    #[error("insufficient gas")]
    InsufficientGas = 30,
    /// Account is frozen for the token.
    #[error("account frozen for token")]
    AccountFrozenForToken = 165,
    /// Referenced token does not exist or has the wrong type.
    #[error("invalid token id")]
    InvalidTokenId = 167,
    /// KYC has not been granted to the account for the token.
    #[error("account kyc not granted for token")]
    AccountKycNotGrantedForToken = 176,
    /// Token was created without a KYC key.
    #[error("token has no kyc key")]
    TokenHasNoKycKey = 177,
    /// Sender balance does not cover the transfer.
    #[error("insufficient token balance")]
    InsufficientTokenBalance = 178,
    /// Token has been deleted.
    #[error("token was deleted")]
    TokenWasDeleted = 179,
    /// No relationship exists between the token and the account.
    #[error("token not associated to account")]
    TokenNotAssociatedToAccount = 184,
    /// Token was created without an admin key.
    #[error("token is immutable")]
    TokenIsImmutable = 193,
    /// Relationship between the token and the account already exists.
    #[error("token already associated to account")]
    TokenAlreadyAssociatedToAccount = 194,
    /// Dissociation requires a zero balance for a live token.
    #[error("transaction requires zero token balances")]
    TransactionRequiresZeroTokenBalances = 197,
    /// Serial number does not identify a minted NFT.
    #[error("invalid token nft serial number")]
    InvalidTokenNftSerialNumber = 226,
    /// Required keys were not activated by full-prefix signatures or contract grants.
    #[error("invalid full prefix signature for precompile")]
    InvalidFullPrefixSignatureForPrecompile = 327,
    /// Input was shorter than a 4-byte selector.
    #[error("malformed selector")]
    MalformedSelector = 1001,
    /// Redirect payload does not carry a supported token selector.
    #[error("unsupported redirect selector")]
    UnsupportedRedirectSelector = 1002,
    /// Arguments could not be ABI-decoded, or input exceeded the size limit.
    #[error("error decoding precompile input")]
    ErrorDecodingInput = 1003,
}

impl ResponseCode {
    /// Every known code, in declaration order.
    pub const ALL: [Self; 21] = [
        Self::Success,
        Self::NotSupported,
        Self::InvalidAccountId,
        Self::InvalidContractId,
        Self::FailInvalid,
        Self::InsufficientGas,
        Self::AccountFrozenForToken,
        Self::InvalidTokenId,
        Self::AccountKycNotGrantedForToken,
        Self::TokenHasNoKycKey,
        Self::InsufficientTokenBalance,
        Self::TokenWasDeleted,
        Self::TokenNotAssociatedToAccount,
        Self::TokenIsImmutable,
        Self::TokenAlreadyAssociatedToAccount,
        Self::TransactionRequiresZeroTokenBalances,
        Self::InvalidTokenNftSerialNumber,
        Self::InvalidFullPrefixSignatureForPrecompile,
        Self::MalformedSelector,
        Self::UnsupportedRedirectSelector,
        Self::ErrorDecodingInput,
    ];

    /// Numeric code as carried in the `int64` status word.
    pub const fn as_i64(self) -> i64 {
        self as i32 as i64
    }

    /// Resolves a numeric status word back to a code.
    pub fn from_i64(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_i64() == code)
    }

    /// Returns `true` for [`ResponseCode::Success`].
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}
