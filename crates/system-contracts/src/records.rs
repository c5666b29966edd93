//! Child transaction records for system contract calls.
//!
//! Every dispatched call yields exactly one [`ChildRecord`] linked to the
//! parent transaction, failures included. The child index and consensus
//! timestamp are assigned when the record is emitted, so records of one parent
//! are totally ordered by emission.

use crate::selector::OperationKind;
use crate::status::ResponseCode;
use alloy_primitives::{Address, Bytes, FixedBytes};
use serde::Serialize;
use std::collections::BTreeMap;

/// Consensus time with nanosecond resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Timestamp {
    /// Whole seconds since the epoch.
    pub seconds: i64,
    /// Nanoseconds within the second.
    pub nanos: u32,
}

impl Timestamp {
    const NANOS_PER_SECOND: u64 = 1_000_000_000;

    /// Creates a timestamp, normalizing `nanos` into seconds.
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos: 0 }.plus_nanos(nanos as u64)
    }

    /// Returns this timestamp shifted forward by `nanos`.
    pub const fn plus_nanos(self, nanos: u64) -> Self {
        let total = self.nanos as u64 + nanos;
        Self {
            seconds: self.seconds + (total / Self::NANOS_PER_SECOND) as i64,
            nanos: (total % Self::NANOS_PER_SECOND) as u32,
        }
    }
}

/// Identity of the outer transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionId {
    /// Paying account.
    pub payer: Address,
    /// Start of the transaction's validity window.
    pub valid_start: Timestamp,
}

/// The parent contract call a child record hangs off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentTransaction {
    /// Parent transaction id.
    pub id: TransactionId,
    /// Consensus time of the parent.
    pub consensus_time: Timestamp,
}

/// Contract-call section of a child record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCallResult {
    /// Selector the call was made with, zero-padded for short input.
    pub function_selector: FixedBytes<4>,
    /// Return data handed back to the EVM.
    pub output: Bytes,
    /// Gas charged.
    pub gas_used: u64,
    /// Failure description, if the call failed.
    pub error_message: Option<String>,
}

/// Audit record of one system contract call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecord {
    /// Parent transaction.
    pub parent: TransactionId,
    /// Position among the parent's children, from zero.
    pub child_index: u32,
    /// `parent consensus time + child_index + 1` nanoseconds.
    pub consensus_time: Timestamp,
    /// Final status.
    pub status: ResponseCode,
    /// Contract-call result.
    pub call_result: ContractCallResult,
    /// Operation the call resolved to; `None` for structural rejections.
    pub operation: Option<OperationKind>,
}

/// Destination of emitted child records.
pub trait RecordSink {
    /// Children already emitted for `parent`.
    fn child_count(&self, parent: &TransactionId) -> u32;

    /// Stores a record.
    fn push(&mut self, record: ChildRecord);
}

/// Builds the next child record for `parent` and pushes it into `sink`.
pub fn emit_child_record<R: RecordSink + ?Sized>(
    sink: &mut R,
    parent: &ParentTransaction,
    status: ResponseCode,
    call_result: ContractCallResult,
    operation: Option<OperationKind>,
) -> ChildRecord {
    let child_index = sink.child_count(&parent.id);
    let record = ChildRecord {
        parent: parent.id,
        child_index,
        consensus_time: parent.consensus_time.plus_nanos(u64::from(child_index) + 1),
        status,
        call_result,
        operation,
    };
    sink.push(record.clone());
    record
}

/// In-memory record store, queryable by parent.
#[derive(Clone, Debug, Default)]
pub struct RecordStream {
    by_parent: BTreeMap<TransactionId, Vec<ChildRecord>>,
}

impl RecordStream {
    /// Empty stream.
    pub const fn new() -> Self {
        Self {
            by_parent: BTreeMap::new(),
        }
    }

    /// Children of `parent` in consensus order.
    pub fn children(&self, parent: &TransactionId) -> &[ChildRecord] {
        self.by_parent.get(parent).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total records across all parents.
    pub fn len(&self) -> usize {
        self.by_parent.values().map(Vec::len).sum()
    }

    /// Returns `true` when no record was emitted.
    pub fn is_empty(&self) -> bool {
        self.by_parent.is_empty()
    }

    /// Serializes the children of `parent` as JSON.
    pub fn children_json(&self, parent: &TransactionId) -> serde_json::Result<String> {
        serde_json::to_string(self.children(parent))
    }
}

fn saturating_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl RecordSink for RecordStream {
    fn child_count(&self, parent: &TransactionId) -> u32 {
        self.by_parent
            .get(parent)
            .map_or(0, |records| saturating_count(records.len()))
    }

    fn push(&mut self, record: ChildRecord) {
        self.by_parent.entry(record.parent).or_default().push(record);
    }
}
