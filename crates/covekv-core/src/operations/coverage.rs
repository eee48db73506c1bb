//! Coverage plan retrieval.
//!
//! A coverage plan answers "which `(host, port)` owns which keyspace
//! slice?", and carries the opaque context token each slice must be queried
//! with. The plan is what a caller uses to fan a query out to the specific
//! nodes owning each partition.

use std::collections::hash_map;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use prost::Message;
use tracing::error;

use covekv_common::protocol::messages::{CoverageReq, CoverageResp};
use covekv_common::protocol::{codes, expect_code, CoveError, Result, WireMessage};

use crate::operation::{Decoded, Operation, OperationCodec};
use crate::query::{HostAndPort, Namespace};

/// Entries with this host cannot be queried; one of them invalidates the
/// whole plan.
const UNROUTABLE_HOST: &str = "0.0.0.0";

/// Builder for a coverage plan operation over one namespace.
pub struct CoveragePlanBuilder {
    namespace: Namespace,
    min_partitions: Option<u32>,
    replace_cover: Option<Vec<u8>>,
    unavailable_cover: Vec<Vec<u8>>,
}

impl CoveragePlanBuilder {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            min_partitions: None,
            replace_cover: None,
            unavailable_cover: Vec::new(),
        }
    }

    /// Minimum number of partitions the plan should cover.
    pub fn with_min_partitions(mut self, min_partitions: u32) -> Self {
        self.min_partitions = Some(min_partitions);
        self
    }

    /// Asks the store to refresh one previously obtained coverage context.
    pub fn with_replace_coverage_context(mut self, context: impl Into<Vec<u8>>) -> Self {
        self.replace_cover = Some(context.into());
        self
    }

    /// Entry-based variant of
    /// [`with_replace_coverage_context`](Self::with_replace_coverage_context).
    pub fn with_replace_coverage_entry(self, entry: &CoverageEntry) -> Self {
        self.with_replace_coverage_context(entry.coverage_context().to_vec())
    }

    /// Marks one previously failed coverage context for exclusion or
    /// reassignment.
    pub fn with_unavailable_coverage_context(mut self, context: impl Into<Vec<u8>>) -> Self {
        self.unavailable_cover.push(context.into());
        self
    }

    pub fn with_unavailable_coverage_contexts(
        mut self,
        contexts: impl IntoIterator<Item = Vec<u8>>,
    ) -> Self {
        self.unavailable_cover.extend(contexts);
        self
    }

    /// Entry-based variant of
    /// [`with_unavailable_coverage_contexts`](Self::with_unavailable_coverage_contexts).
    pub fn with_unavailable_coverage_entries<'a>(
        mut self,
        entries: impl IntoIterator<Item = &'a CoverageEntry>,
    ) -> Self {
        self.unavailable_cover
            .extend(entries.into_iter().map(|e| e.coverage_context().to_vec()));
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn build(self) -> Operation<CoverageCodec> {
        let request = CoverageReq {
            bucket_type: self.namespace.bucket_type().to_vec(),
            bucket: self.namespace.bucket().to_vec(),
            min_partitions: self.min_partitions,
            replace_cover: self.replace_cover,
            unavailable_cover: self.unavailable_cover,
        };
        Operation::new(CoverageCodec { request })
    }
}

/// Codec for the coverage plan operation.
pub struct CoverageCodec {
    request: CoverageReq,
}

impl OperationCodec for CoverageCodec {
    type Frame = CoverageResp;
    type Output = CoveragePlan;

    fn request(&self) -> WireMessage {
        WireMessage::new(codes::COVERAGE_REQ, self.request.encode_to_vec())
    }

    fn decode(&self, raw: WireMessage) -> Result<Decoded<CoverageResp>> {
        expect_code(&raw, codes::COVERAGE_RESP)?;
        let resp = CoverageResp::decode(raw.body)?;
        let done = resp.done.unwrap_or(true);
        Ok(Decoded { frame: resp, done })
    }

    /// Builds the plan in one pass over all frames. An entry with host
    /// `0.0.0.0` makes the whole plan untrustworthy for fan-out, so the
    /// conversion fails atomically; no partial plan is ever surfaced.
    fn convert(&self, frames: Vec<CoverageResp>) -> Result<CoveragePlan> {
        let mut plan = CoveragePlan::default();
        for resp in frames {
            for raw in resp.entries {
                let entry = CoverageEntry {
                    host: raw.ip,
                    port: raw.port as u16,
                    description: raw.keyspace_desc,
                    coverage_context: raw.cover_context,
                };
                if entry.host == UNROUTABLE_HOST {
                    error!(
                        description = %entry.description,
                        "coverage entry has unroutable host {}; rejecting the whole plan",
                        UNROUTABLE_HOST
                    );
                    return Err(CoveError::UnroutableCoverageEntry(entry.description));
                }
                plan.push(entry);
            }
        }
        Ok(plan)
    }
}

/// One partition-ownership entry of a coverage plan.
///
/// Equality and hashing cover `(host, port, coverage_context)` only; the
/// description is human-readable and not semantically load-bearing.
#[derive(Debug, Clone)]
pub struct CoverageEntry {
    host: String,
    port: u16,
    description: String,
    coverage_context: Vec<u8>,
}

impl CoverageEntry {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Human-readable description of the keyspace slice covered.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Opaque token echoed back when querying this slice.
    pub fn coverage_context(&self) -> &[u8] {
        &self.coverage_context
    }

    pub fn host_and_port(&self) -> HostAndPort {
        HostAndPort::new(self.host.clone(), self.port)
    }
}

impl PartialEq for CoverageEntry {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.coverage_context == other.coverage_context
    }
}

impl Eq for CoverageEntry {}

impl Hash for CoverageEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.coverage_context.hash(state);
    }
}

/// A decoded coverage plan: per-host entry lists keyed by `(host, port)`.
///
/// Entries within one host keep their arrival order; ordering across hosts
/// is unspecified. Built once during conversion and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct CoveragePlan {
    per_host: HashMap<HostAndPort, Vec<CoverageEntry>>,
}

impl CoveragePlan {
    fn push(&mut self, entry: CoverageEntry) {
        self.per_host
            .entry(entry.host_and_port())
            .or_default()
            .push(entry);
    }

    /// The distinct hosts the plan routes to.
    pub fn hosts(&self) -> impl Iterator<Item = &HostAndPort> {
        self.per_host.keys()
    }

    /// Entries owned by one host, in arrival order. Empty when the host is
    /// not part of the plan.
    pub fn host_entries(&self, host: &HostAndPort) -> &[CoverageEntry] {
        self.per_host.get(host).map_or(&[], Vec::as_slice)
    }

    pub fn host_entries_for(&self, host: &str, port: u16) -> &[CoverageEntry] {
        self.host_entries(&HostAndPort::new(host, port))
    }

    /// Restartable iteration over all entries, flattening host groups in
    /// unspecified cross-host order.
    pub fn iter(&self) -> impl Iterator<Item = &CoverageEntry> {
        self.per_host.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.per_host.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.per_host.is_empty()
    }
}

impl<'a> IntoIterator for &'a CoveragePlan {
    type Item = &'a CoverageEntry;
    type IntoIter = std::iter::Flatten<hash_map::Values<'a, HostAndPort, Vec<CoverageEntry>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.per_host.values().flatten()
    }
}
