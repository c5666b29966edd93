//! Fixed gas charges for system contract operations.
//!
//! Each operation kind costs a fixed amount regardless of outcome: a graceful
//! revert is charged the same as a success. Calls that never resolve to an
//! operation (malformed, unsupported or oversized input) pay the structural
//! rejection charge instead.

use crate::selector::{OperationClass, OperationKind};
use crate::status::ResponseCode;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Charge for operations that change ledger state.
pub const MUTATION_GAS: u64 = 10_000;

/// Charge for read-only queries, including ERC redirect views.
pub const VIEW_GAS: u64 = 2_607;

/// Charge for one pseudorandom seed.
pub const PRNG_GAS: u64 = 5_000;

/// Charge for calls rejected before an operation was identified.
pub const STRUCTURAL_REJECTION_GAS: u64 = 320_000;

/// Gas cost table, loaded once with the dispatcher configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GasSchedule {
    /// Cost of mutating operations.
    pub mutation: u64,
    /// Cost of read-only operations.
    pub view: u64,
    /// Cost of seed generation.
    pub prng: u64,
    /// Cost of structural rejections.
    pub structural_rejection: u64,
    /// Per-operation costs overriding the class defaults.
    pub overrides: BTreeMap<OperationKind, u64>,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            mutation: MUTATION_GAS,
            view: VIEW_GAS,
            prng: PRNG_GAS,
            structural_rejection: STRUCTURAL_REJECTION_GAS,
            overrides: BTreeMap::new(),
        }
    }
}

impl GasSchedule {
    /// Fixed cost of `kind`.
    pub fn cost_of(&self, kind: OperationKind) -> u64 {
        if let Some(cost) = self.overrides.get(&kind) {
            return *cost;
        }
        match kind.class() {
            OperationClass::Mutation => self.mutation,
            OperationClass::View => self.view,
            OperationClass::Prng => self.prng,
        }
    }

    /// Checks `offered` against the cost of `kind` and returns the charge.
    ///
    /// Fails with [`ResponseCode::InsufficientGas`] when the offer is short; the
    /// caller then consumes the whole offer.
    pub fn check(&self, kind: OperationKind, offered: u64) -> Result<u64, ResponseCode> {
        let cost = self.cost_of(kind);
        if offered < cost {
            Err(ResponseCode::InsufficientGas)
        } else {
            Ok(cost)
        }
    }

    /// Gas consumed by a structural rejection, capped at the offer.
    pub fn structural_charge(&self, offered: u64) -> u64 {
        self.structural_rejection.min(offered)
    }

    /// Gas consumed by a rejection of an identified operation, capped at the offer.
    pub fn rejection_charge(&self, kind: OperationKind, offered: u64) -> u64 {
        self.cost_of(kind).min(offered)
    }
}
