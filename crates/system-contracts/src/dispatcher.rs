//! The system contract call pipeline.
//!
//! ```text
//! value guard -> decode -> static guard -> gas pre-check -> key requirement
//!     -> authorize -> execute -> apply -> encode -> child record
//! ```
//!
//! Every stage may short-circuit; whatever the outcome, exactly one child
//! record is emitted and the gas charged is fixed for the stage reached.

use crate::auth::{AuthContext, Authorizer};
use crate::config::DispatcherConfig;
use crate::encoder::{encode_failure, encode_success};
use crate::executor::{execute, key_requirement, ExecutionContext};
use crate::keys::ActiveSignatureSet;
use crate::ledger::LedgerState;
use crate::records::{emit_child_record, ContractCallResult, ParentTransaction, RecordSink};
use crate::selector::{decode, selector_of, NativeCall, OperationKind};
use crate::status::ResponseCode;
use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use std::sync::Arc;

/// Transaction-wide inputs shared by every system contract call in it.
#[derive(Clone, Debug)]
pub struct TransactionScope {
    /// Parent transaction the child records link to.
    pub parent: ParentTransaction,
    /// Signatures presented with the parent transaction.
    pub signatures: ActiveSignatureSet,
    /// Height of the block being executed.
    pub block_number: u64,
}

/// A single call into a system contract.
#[derive(Clone, Debug)]
pub struct CallContext {
    /// Direct sender (`msg.sender`).
    pub caller: Address,
    /// Address the call was made to.
    pub target: Address,
    /// Call data.
    pub input: Bytes,
    /// Gas offered to the call.
    pub gas: u64,
    /// Value sent with the call.
    pub value: U256,
    /// Whether the call runs in a static frame.
    pub is_static: bool,
    /// Contracts of the enclosing frames, outermost first.
    pub call_chain: Vec<Address>,
}

/// What the EVM sees of a dispatched call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Final status, also recorded on the child record.
    pub status: ResponseCode,
    /// Return data.
    pub output: Bytes,
    /// Gas charged.
    pub gas_used: u64,
    /// Whether the frame reverts.
    pub reverted: bool,
    /// Operation the call resolved to.
    pub operation: Option<OperationKind>,
}

struct Resolution {
    status: ResponseCode,
    output: Bytes,
    gas_used: u64,
    operation: Option<OperationKind>,
    reason: Option<&'static str>,
}

/// Routes system contract calls through decoding, authorization and execution.
#[derive(Clone, Debug, Default)]
pub struct Dispatcher {
    config: Arc<DispatcherConfig>,
}

impl Dispatcher {
    /// Dispatcher over `config`.
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs `call` to completion against `ledger` and records it in `records`.
    pub fn dispatch<L, R>(
        &self,
        ledger: &mut L,
        records: &mut R,
        scope: &TransactionScope,
        call: &CallContext,
    ) -> DispatchOutcome
    where
        L: LedgerState + ?Sized,
        R: RecordSink + ?Sized,
    {
        tracing::info!(
            target: "system_contracts",
            caller = ?call.caller,
            target_address = ?call.target,
            gas = call.gas,
            calldata_len = call.input.len(),
            is_static = call.is_static,
            "system contract call invoked"
        );

        let resolution = self.resolve(ledger, scope, call);
        let reverted = !resolution.status.is_success();

        let record = emit_child_record(
            records,
            &scope.parent,
            resolution.status,
            ContractCallResult {
                function_selector: FixedBytes::from(selector_of(&call.input)),
                output: resolution.output.clone(),
                gas_used: resolution.gas_used,
                error_message: reverted.then(|| {
                    resolution
                        .reason
                        .map_or_else(|| resolution.status.to_string(), str::to_string)
                }),
            },
            resolution.operation,
        );

        tracing::info!(
            target: "system_contracts",
            status = ?resolution.status,
            operation = ?resolution.operation,
            gas_used = resolution.gas_used,
            child_index = record.child_index,
            "system contract call completed"
        );

        DispatchOutcome {
            status: resolution.status,
            output: resolution.output,
            gas_used: resolution.gas_used,
            reverted,
            operation: resolution.operation,
        }
    }

    fn structural(&self, status: ResponseCode, offered: u64) -> Resolution {
        tracing::debug!(target: "system_contracts", ?status, "structural rejection");
        Resolution {
            status,
            output: Bytes::new(),
            gas_used: self.config.gas.structural_charge(offered),
            operation: None,
            reason: None,
        }
    }

    fn rejected(&self, native: &NativeCall, status: ResponseCode, offered: u64) -> Resolution {
        let kind = native.kind();
        Resolution {
            status,
            output: encode_failure(kind, native.is_explicit_redirect(), status),
            gas_used: self.config.gas.rejection_charge(kind, offered),
            operation: Some(kind),
            reason: None,
        }
    }

    fn resolve<L: LedgerState + ?Sized>(
        &self,
        ledger: &mut L,
        scope: &TransactionScope,
        call: &CallContext,
    ) -> Resolution {
        let config = &*self.config;

        if !call.value.is_zero() && config.is_system_address(call.target) {
            tracing::warn!(
                target: "system_contracts",
                value = %call.value,
                "value sent to non-payable system contract"
            );
            return self.structural(ResponseCode::InvalidContractId, call.gas);
        }

        let native = match decode(config, call.target, &call.input) {
            Ok(native) => native,
            Err(status) => return self.structural(status, call.gas),
        };
        let kind = native.kind();

        if !call.value.is_zero() {
            return self.rejected(&native, ResponseCode::InvalidContractId, call.gas);
        }
        if call.is_static && kind.is_mutation() {
            tracing::debug!(target: "system_contracts", operation = %kind, "mutation in static frame");
            return Resolution {
                reason: Some("system contract mutations are not static"),
                ..self.rejected(&native, ResponseCode::NotSupported, call.gas)
            };
        }

        let cost = match config.gas.check(kind, call.gas) {
            Ok(cost) => cost,
            Err(status) => {
                return Resolution {
                    status,
                    output: Bytes::new(),
                    gas_used: call.gas,
                    operation: Some(kind),
                    reason: None,
                }
            }
        };

        let requirement = match key_requirement(&*ledger, &native, call.caller) {
            Ok(requirement) => requirement,
            Err(status) => return self.rejected(&native, status, call.gas),
        };
        let auth_ctx = AuthContext {
            operation: kind,
            sender: call.caller,
            call_chain: &call.call_chain,
            block_number: scope.block_number,
            signatures: &scope.signatures,
        };
        if let Err(status) = Authorizer::new(config).authorize(&requirement, &auth_ctx) {
            return self.rejected(&native, status, call.gas);
        }

        let exec_ctx = ExecutionContext {
            sender: call.caller,
            block_number: scope.block_number,
            is_static: call.is_static,
        };
        let executed = match execute(&*ledger, &native, &exec_ctx) {
            Ok(executed) => executed,
            Err(status) => return self.rejected(&native, status, call.gas),
        };

        if let Err(err) = ledger.apply(&executed.changes) {
            tracing::warn!(
                target: "system_contracts",
                operation = %kind,
                %err,
                "failed to apply ledger changes"
            );
            return self.rejected(&native, ResponseCode::FailInvalid, call.gas);
        }
        if !executed.changes.is_empty() {
            tracing::info!(
                target: "system_contracts",
                operation = %kind,
                changes = executed.changes.len(),
                "ledger changes applied"
            );
        }

        Resolution {
            status: ResponseCode::Success,
            output: encode_success(kind, native.is_explicit_redirect(), &executed.result),
            gas_used: cost,
            operation: Some(kind),
            reason: None,
        }
    }
}
