//! Per-transaction execution results and their persisted wire format.
//!
//! ```text
//! [success: bool]
//! [units: u64]
//! [output: u32 len + bytes]
//! [warp_message: u32 len + bytes, empty if absent]
//! ```
//!
//! A block's results are stored as `u32 count` followed by that many
//! results. This format is replay-critical: field order must not change.

use crate::codec::{self, Reader};
use crate::error::CodecError;
use crate::types::{MAX_BLOCK_SIZE, MAX_WARP_MESSAGE_SIZE};
use crate::warp::WarpMessage;

/// bool + u64 + two empty length prefixes
const MIN_RESULT_SIZE: usize = 1 + 8 + 4 + 4;

/// Outcome of executing one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub success: bool,
    /// Units charged, including on failure.
    pub units: u64,
    /// Action output on success, error text on failure.
    pub output: Vec<u8>,
    pub warp_message: Option<WarpMessage>,
}

impl TxResult {
    pub fn success(units: u64, output: Vec<u8>, warp_message: Option<WarpMessage>) -> Self {
        Self { success: true, units, output, warp_message }
    }

    pub fn failure(units: u64, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            units,
            output: reason.into().into_bytes(),
            warp_message: None,
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        codec::write_bool(buf, self.success);
        codec::write_u64(buf, self.units);
        codec::write_var_bytes(buf, &self.output);
        match &self.warp_message {
            Some(msg) => codec::write_var_bytes(buf, &msg.bytes()),
            None => codec::write_u32(buf, 0),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MIN_RESULT_SIZE + self.output.len());
        self.encode_into(&mut buf);
        buf
    }

    pub fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let success = r.read_bool()?;
        let units = r.read_u64()?;
        let output = r.read_var_bytes("result output", MAX_BLOCK_SIZE)?;
        let warp_bytes = r.read_var_bytes("warp message", MAX_WARP_MESSAGE_SIZE)?;
        let warp_message = if warp_bytes.is_empty() {
            None
        } else {
            Some(WarpMessage::parse(&warp_bytes)?)
        };
        Ok(Self { success, units, output, warp_message })
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let result = Self::decode_from(&mut r)?;
        r.finish()?;
        Ok(result)
    }
}

pub fn encode_results(results: &[TxResult]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + results.len() * MIN_RESULT_SIZE);
    codec::write_u32(&mut buf, results.len() as u32);
    for result in results {
        result.encode_into(&mut buf);
    }
    buf
}

/// Decode a count-prefixed result list. Bytes left over after the declared
/// count are a structural error.
pub fn decode_results(data: &[u8]) -> Result<Vec<TxResult>, CodecError> {
    let mut r = Reader::new(data);
    let count = r.read_count(MIN_RESULT_SIZE)?;
    let mut results = Vec::with_capacity(count);
    for _ in 0..count {
        results.push(TxResult::decode_from(&mut r)?);
    }
    r.finish()?;
    Ok(results)
}
