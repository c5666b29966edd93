//! # Native Service System Contracts
//!
//! This crate exposes native token-service and pseudorandom-number operations
//! to EVM contracts through fixed system contract addresses. Calls are decoded
//! by 4-byte selector, authorized against the keys the ledger records,
//! executed against a [`ledger::LedgerState`], and answered with ABI-encoded
//! return data. Every call leaves exactly one child record.
//!
//! ## System Contracts
//!
//! | Address | Name | Description |
//! |---------|------|-------------|
//! | `0x0167` | token service | KYC, deletion, association and token views |
//! | `0x0169` | [PRNG](selector::IPrng) | Per-transaction pseudorandom seed |
//! | token addresses | redirect | ERC-20/721 and HRC facades over native tokens |
//!
//! ## Pipeline
//!
//! 1. **Decode**: [`selector::decode`] maps calldata and target to a [`selector::NativeCall`]
//! 2. **Gas**: [`gas::GasSchedule`] prices the operation
//! 3. **Authorize**: [`auth::Authorizer`] checks keys against signatures and contract identity
//! 4. **Execute**: [`executor::execute`] stages ledger changes, applied all-or-nothing
//! 5. **Encode**: [`encoder`] shapes the result for the caller
//! 6. **Record**: [`records::emit_child_record`] appends the child record
//!
//! ## Integration
//!
//! ```ignore
//! use system_contracts::{DispatcherConfig, InMemoryLedger, SystemContractPrecompile};
//!
//! let precompile = SystemContractPrecompile::new(DispatcherConfig::from_env()?, InMemoryLedger::new());
//! precompile.install(&mut precompiles);
//! precompile.begin_transaction(parent, signatures);
//! ```

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod executor;
pub mod gas;
pub mod keys;
pub mod ledger;
pub mod precompile;
pub mod records;
pub mod selector;
pub mod status;

pub use config::{
    parse_dispatcher_config, ConfigError, DispatcherConfig, LegacyActivations,
    HTS_SYSTEM_CONTRACT_ADDR, PRNG_SYSTEM_CONTRACT_ADDR,
};
pub use dispatcher::{CallContext, DispatchOutcome, Dispatcher, TransactionScope};
pub use keys::{ActiveSignatureSet, Key, PublicKey};
pub use ledger::{InMemoryLedger, LedgerState, TokenSpec};
pub use precompile::{FrameContext, SystemContractPrecompile};
pub use records::{ChildRecord, ParentTransaction, RecordStream, Timestamp, TransactionId};
pub use selector::OperationKind;
pub use status::ResponseCode;
