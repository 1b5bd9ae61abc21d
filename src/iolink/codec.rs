//! M-sequence frame codec.
//!
//! Request frames are `[MC, CKT, payload...]`: the MC byte packs
//! direction/channel/address, the CKT byte carries the message type in its
//! top two bits and a 6-bit checksum of the whole frame in the low six.
//! Single-byte replies come back as `[value, ck]` and write-acks as `[ck]`,
//! both protected by the same fold.

use crate::error::{Error, ProtocolError, Result};

/// Seed of the XOR fold. Chosen by the protocol so an all-zero frame does
/// not checksum to zero.
const CHECKSUM_SEED: u8 = 0x52;

/// Frame direction (MC bit 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// Communication channel (MC bits 6..5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    Process = 0,
    Page = 1,
    Diagnosis = 2,
    Isdu = 3,
}

/// The only M-sequence type the sensor speaks.
pub const MSG_TYPE_0: u8 = 0;

/// Fold `data` down to the 6-bit frame checksum: XOR all bytes starting
/// from the seed, then mix specific bit pairs of the folded byte.
pub fn checksum(data: &[u8]) -> u8 {
    let chk = data.iter().fold(CHECKSUM_SEED, |acc, b| acc ^ b);

    (((chk >> 7) ^ (chk >> 5) ^ (chk >> 3) ^ (chk >> 1)) & 1) << 5
        | (((chk >> 6) ^ (chk >> 4) ^ (chk >> 2) ^ chk) & 1) << 4
        | (((chk >> 7) ^ (chk >> 6)) & 1) << 3
        | (((chk >> 5) ^ (chk >> 4)) & 1) << 2
        | (((chk >> 3) ^ (chk >> 2)) & 1) << 1
        | ((chk >> 1) ^ chk) & 1
}

/// Build a request frame. The checksum is computed over the frame with the
/// CKT checksum bits still zero, then OR'd into the CKT low six bits.
pub fn build(
    dir: Direction,
    channel: Channel,
    addr: u8,
    mtype: u8,
    payload: Option<&[u8]>,
) -> Vec<u8> {
    let mc = ((dir as u8) << 7) | ((channel as u8) << 5) | (addr & 0x1F);
    let mut frame = vec![mc, mtype << 6];

    if let Some(data) = payload {
        frame.extend_from_slice(data);
    }

    frame[1] |= checksum(&frame);
    frame
}

/// Recompute the checksum of a full frame and compare it with the embedded
/// one. True iff the frame was produced by [`build`].
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < 2 {
        return false;
    }

    let mtype = frame[1] >> 6;
    let mut clean = frame.to_vec();
    clean[1] = mtype << 6;

    checksum(&clean) == (frame[1] & 0x3F)
}

/// Validate a `[value, ck]` reply and return the value.
pub fn check_reply(reply: &[u8]) -> Result<u8> {
    if reply.len() < 2 {
        return Err(ProtocolError::ShortResponse {
            wanted: 2,
            got: reply.len(),
        }
        .into());
    }

    let expected = checksum(&reply[..1]);
    if reply[1] != expected {
        return Err(Error::Checksum {
            expected,
            actual: reply[1],
        });
    }

    Ok(reply[0])
}

/// Validate a bare `[ck]` write acknowledgement.
pub fn check_ack(reply: &[u8]) -> Result<()> {
    if reply.is_empty() {
        return Err(ProtocolError::ShortResponse { wanted: 1, got: 0 }.into());
    }

    let expected = checksum(&[]);
    if reply[0] != expected {
        return Err(Error::Checksum {
            expected,
            actual: reply[0],
        });
    }

    Ok(())
}
