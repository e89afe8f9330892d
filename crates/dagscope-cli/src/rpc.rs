//! JSON-RPC event source.
//!
//! Implements [`EventSource`] over the observed node's JSON-RPC endpoint
//! with blocking `ureq` calls. Every failure at this layer — connection,
//! HTTP status, malformed response — maps to
//! [`SourceError::Transient`], so a flaky node costs one poll iteration
//! and nothing more. A `null` result maps to `NotFound`/`None` per the
//! contract.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;
use tracing::trace;

use dagscope_core::event::Seq;
use dagscope_core::{
    BlockInfo, BlockNumber, Epoch, EpochSelector, Event, EventId, EventSource, Frame, SourceError,
    Validator, ValidatorId, ValidatorSet,
};

/// Blocking JSON-RPC client for one node.
#[derive(Debug)]
pub struct RpcClient {
    agent: ureq::Agent,
    url: String,
}

impl RpcClient {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            agent: ureq::agent(),
            url: format!("http://{host}:{port}/"),
        }
    }

    /// One JSON-RPC call. `Ok(None)` means the node answered with a
    /// `null` result.
    fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, SourceError> {
        trace!(method, %params, "rpc call");
        let response = self
            .agent
            .post(&self.url)
            .send_json(json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1,
            }))
            .map_err(|err| SourceError::Transient(format!("{method}: {err}")))?;

        let envelope: Envelope<T> = response
            .into_json()
            .map_err(|err| SourceError::Transient(format!("{method}: bad response: {err}")))?;

        if let Some(err) = envelope.error {
            return Err(SourceError::Transient(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        Ok(envelope.result)
    }
}

impl EventSource for RpcClient {
    fn heads(&self, epoch: EpochSelector) -> Result<Vec<EventId>, SourceError> {
        let selector = match epoch {
            EpochSelector::Pending => "pending".to_string(),
            EpochSelector::Sealed(e) => e.to_string(),
        };
        let raw: Vec<String> = self.call("dag_getHeads", json!([selector]))?.unwrap_or_default();
        raw.iter().map(|s| parse_id(s)).collect()
    }

    fn event(&self, id: EventId) -> Result<Event, SourceError> {
        let payload: EventPayload = self
            .call("dag_getEvent", json!([id.to_string(), true]))?
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        payload.try_into()
    }

    fn validators(&self, epoch: Epoch) -> Result<ValidatorSet, SourceError> {
        let raw: BTreeMap<String, ValidatorPayload> = self
            .call("dag_getValidators", json!([epoch.0]))?
            .ok_or_else(|| SourceError::NotFound(format!("validators for epoch {epoch}")))?;

        raw.into_iter()
            .map(|(id, v)| {
                let id = id
                    .parse::<u32>()
                    .map_err(|_| SourceError::Transient(format!("bad validator id {id:?}")))?;
                Ok(Validator { id: ValidatorId(id), weight: v.weight })
            })
            .collect()
    }

    fn epoch_block(&self, epoch: Epoch) -> Result<Option<BlockNumber>, SourceError> {
        let block: Option<u64> = self.call("dag_getEpochBlock", json!([epoch.0]))?;
        Ok(block.map(BlockNumber))
    }

    fn block_by_number(&self, n: BlockNumber) -> Result<Option<BlockInfo>, SourceError> {
        let block: Option<BlockPayload> =
            self.call("eth_getBlockByNumber", json!([format!("{:#x}", n.0), false]))?;
        block
            .map(|b| Ok(BlockInfo { number: n, atropos: parse_id(&b.hash)? }))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    message: String,
}

/// Event shape as the node reports it. Fields the pipeline does not use
/// (timestamps, gas accounting, transactions) are ignored by serde.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload {
    hash: String,
    creator: u32,
    epoch: u64,
    frame: u32,
    seq: u32,
    #[serde(default)]
    is_root: bool,
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ValidatorPayload {
    weight: u64,
}

#[derive(Debug, Deserialize)]
struct BlockPayload {
    hash: String,
}

fn parse_id(s: &str) -> Result<EventId, SourceError> {
    s.parse()
        .map_err(|_| SourceError::Transient(format!("bad event id {s:?}")))
}

impl TryFrom<EventPayload> for Event {
    type Error = SourceError;

    fn try_from(p: EventPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&p.hash)?,
            creator: ValidatorId(p.creator),
            seq: Seq(p.seq),
            frame: Frame(p.frame),
            epoch: Epoch(p.epoch),
            parents: p.parents.iter().map(|s| parse_id(s)).collect::<Result<_, _>>()?,
            claimed_root: p.is_root,
        })
    }
}
