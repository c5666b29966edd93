//! ABI encoding of operation results.
//!
//! | Shape | Success | Failure |
//! |-------|---------|---------|
//! | `ResponseCode` | `int64` status | `int64` status |
//! | `StatusAndValue` | `(int64, bool)` | `int64` status |
//! | `Value` | raw ABI value | empty |
//!
//! Explicit redirects wrap a successful inner encoding as `(int64, bytes)` and
//! return the bare status word on failure.

use crate::executor::NativeResult;
use crate::selector::{OperationKind, ResultShape};
use crate::status::ResponseCode;
use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolValue;

fn status_word(status: ResponseCode) -> Vec<u8> {
    status.as_i64().abi_encode()
}

fn value_word(result: &NativeResult) -> Vec<u8> {
    match result {
        NativeResult::Boolean(flag) => flag.abi_encode(),
        NativeResult::Int64(value) => value.abi_encode(),
        NativeResult::Address(address) => address.abi_encode(),
        NativeResult::Bytes32(bytes) => bytes.abi_encode(),
        NativeResult::TokenBalance(amount) => amount.abi_encode(),
        NativeResult::Uint8(value) => U256::from(*value).abi_encode(),
        NativeResult::Text(text) => text.abi_encode(),
        NativeResult::Unit => Vec::new(),
    }
}

/// Return data of a successful `kind` call.
pub fn encode_success(kind: OperationKind, explicit_redirect: bool, result: &NativeResult) -> Bytes {
    let status = ResponseCode::Success;
    let inner = match kind.shape() {
        ResultShape::ResponseCode => status_word(status),
        ResultShape::StatusAndValue => match result {
            NativeResult::Boolean(flag) => (status.as_i64(), *flag).abi_encode_params(),
            other => {
                let mut out = status_word(status);
                out.extend(value_word(other));
                out
            }
        },
        ResultShape::Value => value_word(result),
    };

    if explicit_redirect {
        (status.as_i64(), Bytes::from(inner)).abi_encode_params().into()
    } else {
        inner.into()
    }
}

/// Return data of a `kind` call that failed with `status`.
pub fn encode_failure(kind: OperationKind, explicit_redirect: bool, status: ResponseCode) -> Bytes {
    if explicit_redirect {
        return status_word(status).into();
    }
    match kind.shape() {
        ResultShape::ResponseCode | ResultShape::StatusAndValue => status_word(status).into(),
        ResultShape::Value => Bytes::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, B256};

    fn decode_status(bytes: &[u8]) -> i64 {
        i64::abi_decode(bytes).expect("status word")
    }

    #[test]
    fn response_code_shape_carries_status_either_way() {
        let ok = encode_success(OperationKind::DeleteToken, false, &NativeResult::Unit);
        assert_eq!(ok.len(), 32);
        assert_eq!(decode_status(&ok), ResponseCode::Success.as_i64());

        let failed = encode_failure(OperationKind::DeleteToken, false, ResponseCode::TokenWasDeleted);
        assert_eq!(decode_status(&failed), ResponseCode::TokenWasDeleted.as_i64());
    }

    #[test]
    fn status_and_value_is_two_words() {
        let ok = encode_success(OperationKind::IsKyc, false, &NativeResult::Boolean(true));
        let (status, flag) = <(i64, bool)>::abi_decode_params(&ok).expect("two words");
        assert_eq!(status, ResponseCode::Success.as_i64());
        assert!(flag);

        let failed = encode_failure(OperationKind::IsKyc, false, ResponseCode::InvalidTokenId);
        assert_eq!(failed.len(), 32);
        assert_eq!(decode_status(&failed), ResponseCode::InvalidTokenId.as_i64());
    }

    #[test]
    fn value_shape_failure_is_empty() {
        assert!(encode_failure(OperationKind::ErcBalanceOf, false, ResponseCode::InvalidTokenId)
            .is_empty());
    }

    #[test]
    fn values_encode_as_abi_words() {
        let balance = encode_success(
            OperationKind::ErcBalanceOf,
            false,
            &NativeResult::TokenBalance(U256::from(250)),
        );
        assert_eq!(U256::abi_decode(&balance).unwrap(), U256::from(250));

        let name = encode_success(OperationKind::ErcName, false, &NativeResult::Text("Gold".into()));
        assert_eq!(String::abi_decode(&name).unwrap(), "Gold");

        let owner = address!("0x00000000000000000000000000000000000003e9");
        let encoded = encode_success(OperationKind::ErcOwnerOf, false, &NativeResult::Address(owner));
        assert_eq!(encoded.len(), 32);
        assert_eq!(&encoded[12..], owner.as_slice());

        let seed = B256::repeat_byte(0xab);
        let encoded = encode_success(OperationKind::PseudorandomSeed, false, &NativeResult::Bytes32(seed));
        assert_eq!(encoded.as_ref(), seed.as_slice());

        let decimals = encode_success(OperationKind::ErcDecimals, false, &NativeResult::Uint8(8));
        assert_eq!(U256::abi_decode(&decimals).unwrap(), U256::from(8));
    }

    #[test]
    fn explicit_redirect_wraps_success_only() {
        let ok = encode_success(
            OperationKind::ErcTotalSupply,
            true,
            &NativeResult::TokenBalance(U256::from(9)),
        );
        let (status, inner) = <(i64, Bytes)>::abi_decode_params(&ok).expect("wrapped");
        assert_eq!(status, ResponseCode::Success.as_i64());
        assert_eq!(U256::abi_decode(&inner).unwrap(), U256::from(9));

        let failed = encode_failure(OperationKind::ErcTotalSupply, true, ResponseCode::InvalidTokenId);
        assert_eq!(decode_status(&failed), ResponseCode::InvalidTokenId.as_i64());
    }
}
