//! Cross-chain warp messages.
//!
//! A warp message is an unsigned attestation emitted by a successful
//! export and consumed by an import on the destination chain. Signature
//! aggregation is done by the validator set outside this core; here we
//! only carry the payload and its id.
//!
//! ```text
//! [codec_version: u16 = 0]
//! [network_id: u32]
//! [source_chain_id: 32]
//! [payload: u32 len + bytes]
//! ```

use crate::codec::{self, Reader};
use crate::crypto::hash_sha256;
use crate::error::CodecError;
use crate::types::{ChainId, Id, MAX_WARP_MESSAGE_SIZE};

const CODEC_VERSION: u16 = 0;

/// version + network id + chain id + payload length prefix
const HEADER_SIZE: usize = 2 + 4 + 32 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarpMessage {
    pub network_id: u32,
    pub source_chain_id: ChainId,
    pub payload: Vec<u8>,
}

impl WarpMessage {
    pub fn new(network_id: u32, source_chain_id: ChainId, payload: Vec<u8>) -> Self {
        Self { network_id, source_chain_id, payload }
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        codec::write_u16(&mut buf, CODEC_VERSION);
        codec::write_u32(&mut buf, self.network_id);
        codec::write_id(&mut buf, &self.source_chain_id);
        codec::write_var_bytes(&mut buf, &self.payload);
        buf
    }

    /// Parse a message, rejecting anything over [`MAX_WARP_MESSAGE_SIZE`]
    /// or with bytes after the payload.
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() > MAX_WARP_MESSAGE_SIZE {
            return Err(CodecError::TooLarge {
                field: "warp message",
                size: data.len(),
                max: MAX_WARP_MESSAGE_SIZE,
            });
        }
        let mut r = Reader::new(data);
        let version = r.read_u16()?;
        if version != CODEC_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let network_id = r.read_u32()?;
        let source_chain_id = r.read_id()?;
        let payload = r.read_var_bytes("warp payload", MAX_WARP_MESSAGE_SIZE)?;
        r.finish()?;
        Ok(Self { network_id, source_chain_id, payload })
    }

    /// Message id: `sha256` of the encoded message.
    pub fn id(&self) -> Id {
        hash_sha256(&self.bytes())
    }

    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}
