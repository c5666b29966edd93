//! EVM precompile adapter for the system contract dispatcher.
//!
//! [`SystemContractPrecompile`] implements the `alloy-evm` [`Precompile`] trait
//! so it can be installed at the token service and PRNG addresses of a
//! [`PrecompilesMap`]. The host brackets each outer transaction with
//! [`SystemContractPrecompile::begin_transaction`] and
//! [`SystemContractPrecompile::end_transaction`], and sets the call chain
//! before calls made under nested contracts. Static-ness comes from the
//! `PrecompileInput` of each call.
//!
//! ## Output mapping
//!
//! | Dispatch outcome | Precompile result |
//! |------------------|-------------------|
//! | success | `PrecompileOutput::new(gas_used, output)` |
//! | `InsufficientGas` | `PrecompileError::OutOfGas` |
//! | any other failure | `PrecompileOutput::new_reverted(gas_used, output)` |
//!
//! # Architecture Assumption
//!
//! A single instance is shared by all transactions of a block, as with the
//! other stateful precompiles of the node. Ledger, record stream and scope sit
//! behind one `Arc<RwLock>` so each call runs to completion before the next.

use crate::config::DispatcherConfig;
use crate::dispatcher::{CallContext, Dispatcher, TransactionScope};
use crate::keys::ActiveSignatureSet;
use crate::ledger::LedgerState;
use crate::records::{ChildRecord, ParentTransaction, RecordStream, TransactionId};
use crate::status::ResponseCode;
use alloy_evm::{
    precompiles::{DynPrecompile, Precompile, PrecompileInput, PrecompilesMap},
    revm::precompile::{PrecompileError, PrecompileId, PrecompileResult},
};
use alloy_primitives::{Address, Bytes};
use parking_lot::RwLock;
use revm::precompile::PrecompileOutput;
use std::sync::{Arc, OnceLock};

/// Call-chain context the EVM does not pass to precompiles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameContext {
    /// Contracts of the enclosing frames, outermost first.
    pub call_chain: Vec<Address>,
}

#[derive(Clone, Debug)]
struct ActiveTransaction {
    parent: ParentTransaction,
    signatures: ActiveSignatureSet,
}

#[derive(Debug)]
struct SharedState<L> {
    ledger: L,
    records: RecordStream,
    transaction: Option<ActiveTransaction>,
    frame: FrameContext,
}

/// System contract dispatcher exposed as an EVM precompile.
#[derive(Debug)]
pub struct SystemContractPrecompile<L> {
    dispatcher: Dispatcher,
    state: Arc<RwLock<SharedState<L>>>,
}

impl<L> Clone for SystemContractPrecompile<L> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<L: LedgerState> SystemContractPrecompile<L> {
    /// Lazily-initialized precompile ID
    pub fn id() -> &'static PrecompileId {
        static ID: OnceLock<PrecompileId> = OnceLock::new();
        ID.get_or_init(|| PrecompileId::custom("system_contracts"))
    }

    /// Creates the precompile over `ledger`.
    pub fn new(config: DispatcherConfig, ledger: L) -> Self {
        Self {
            dispatcher: Dispatcher::new(config),
            state: Arc::new(RwLock::new(SharedState {
                ledger,
                records: RecordStream::new(),
                transaction: None,
                frame: FrameContext::default(),
            })),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &DispatcherConfig {
        self.dispatcher.config()
    }

    /// Opens the scope of an outer transaction.
    pub fn begin_transaction(&self, parent: ParentTransaction, signatures: ActiveSignatureSet) {
        tracing::debug!(
            target: "system_contracts",
            payer = ?parent.id.payer,
            signatures = signatures.len(),
            "transaction scope opened"
        );
        let mut state = self.state.write();
        state.transaction = Some(ActiveTransaction { parent, signatures });
        state.frame = FrameContext::default();
    }

    /// Sets the call chain for subsequent calls.
    pub fn set_frame(&self, frame: FrameContext) {
        self.state.write().frame = frame;
    }

    /// Closes the current transaction scope.
    pub fn end_transaction(&self) {
        let mut state = self.state.write();
        state.transaction = None;
        state.frame = FrameContext::default();
    }

    /// Runs `f` against the ledger.
    pub fn with_ledger<T>(&self, f: impl FnOnce(&L) -> T) -> T {
        f(&self.state.read().ledger)
    }

    /// Child records emitted for `parent`.
    pub fn children(&self, parent: &TransactionId) -> Vec<ChildRecord> {
        self.state.read().records.children(parent).to_vec()
    }
}

impl<L: LedgerState + Send + Sync + 'static> SystemContractPrecompile<L> {
    /// Installs the precompile at the token service and PRNG addresses.
    pub fn install(&self, precompiles: &mut PrecompilesMap) {
        let addresses = [
            self.config().system_contract_address,
            self.config().prng_address,
        ];
        for address in addresses {
            let precompile = self.clone();
            let id = Self::id().clone();
            precompiles.apply_precompile(&address, move |_| {
                Some(DynPrecompile::new_stateful(id, move |input| {
                    precompile.call(input)
                }))
            });
        }
    }
}

impl<L: LedgerState> Precompile for SystemContractPrecompile<L> {
    fn precompile_id(&self) -> &PrecompileId {
        Self::id()
    }

    fn call(&self, mut input: PrecompileInput<'_>) -> PrecompileResult {
        let block_number = input.internals_mut().block_number().to::<u64>();

        let mut guard = self.state.write();
        let state = &mut *guard;
        let Some(transaction) = state.transaction.as_ref() else {
            tracing::warn!(target: "system_contracts", caller = ?input.caller, "call outside transaction scope");
            return Err(PrecompileError::Other(
                "no active transaction scope".into(),
            ));
        };

        let scope = TransactionScope {
            parent: transaction.parent,
            signatures: transaction.signatures.clone(),
            block_number,
        };
        let call = CallContext {
            caller: input.caller,
            target: input.target_address,
            input: Bytes::copy_from_slice(input.data),
            gas: input.gas,
            value: input.value,
            is_static: input.is_static_call(),
            call_chain: state.frame.call_chain.clone(),
        };

        let outcome = self
            .dispatcher
            .dispatch(&mut state.ledger, &mut state.records, &scope, &call);

        match outcome.status {
            ResponseCode::InsufficientGas => Err(PrecompileError::OutOfGas),
            _ if outcome.reverted => Ok(PrecompileOutput::new_reverted(
                outcome.gas_used,
                outcome.output,
            )),
            _ => Ok(PrecompileOutput::new(outcome.gas_used, outcome.output)),
        }
    }

    fn is_pure(&self) -> bool {
        false
    }
}
