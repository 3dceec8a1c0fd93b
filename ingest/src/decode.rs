//! C5 (decode half): turns an undecoded [`RawLog`] into a typed [`RawEvent`].
//! Unknown topics are tolerated — the caller warns and skips rather than
//! treating an unrecognized event as an ingester failure (§7).

use crate::signatures;
use droplets_chain::transport::RawLog;
use droplets_common::error::StoreError;
use ethers::abi::{decode, ParamType, Token};
use ethers::types::{Address, H256, I256, U256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log has no topics")]
    NoTopics,

    #[error("malformed {event} log: {reason}")]
    Malformed { event: &'static str, reason: String },
}

impl From<DecodeError> for StoreError {
    fn from(e: DecodeError) -> Self {
        StoreError::Invariant(e.to_string())
    }
}

fn address_from_topic(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

fn address_to_topic(address: Address) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_bytes());
    H256(bytes)
}

#[derive(Debug, Clone)]
pub struct TransferLog {
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

#[derive(Debug, Clone)]
pub struct StakeLikeLog {
    pub user: Address,
    pub amount: U256,
    pub round_id: u64,
}

#[derive(Debug, Clone)]
pub struct RoundRolledLog {
    pub round_id: u64,
    pub pps: U256,
    pub shares_minted: U256,
    pub wrapped_minted: U256,
    pub wrapped_burned: U256,
    pub yield_amount: I256,
    pub is_yield_positive: bool,
}

#[derive(Debug, Clone)]
pub struct OftSentLog {
    pub guid: H256,
    pub from_address: Address,
    pub dst_eid: u32,
    pub amount_sent_ld: U256,
}

#[derive(Debug, Clone)]
pub struct OftReceivedLog {
    pub guid: H256,
    pub to_address: Address,
    pub src_eid: u32,
    pub amount_received_ld: U256,
}

/// Every event this engine's decoders recognize, tagged by variant (§9
/// "dynamic-typed event args -> typed variants").
#[derive(Debug, Clone)]
pub enum RawEvent {
    Transfer(TransferLog),
    Stake(StakeLikeLog),
    Unstake(StakeLikeLog),
    Redeem(StakeLikeLog),
    InstantUnstake(StakeLikeLog),
    RoundRolled(RoundRolledLog),
    OftSent(OftSentLog),
    OftReceived(OftReceivedLog),
}

/// Decodes one log. Returns `Ok(None)` for a topic0 this engine doesn't
/// track (tolerated per §7), `Err` only for a recognized topic0 whose body
/// fails to decode (a genuinely malformed log).
pub fn decode_log(log: &RawLog) -> Result<Option<RawEvent>, DecodeError> {
    let topic0 = *log.topics.first().ok_or(DecodeError::NoTopics)?;

    if topic0 == signatures::TRANSFER {
        return decode_transfer(log).map(Some);
    }
    if topic0 == signatures::STAKE {
        return decode_stake_like(log, "Stake").map(RawEvent::Stake).map(Some);
    }
    if topic0 == signatures::UNSTAKE {
        return decode_stake_like(log, "Unstake").map(RawEvent::Unstake).map(Some);
    }
    if topic0 == signatures::REDEEM {
        return decode_stake_like(log, "Redeem").map(RawEvent::Redeem).map(Some);
    }
    if topic0 == signatures::INSTANT_UNSTAKE {
        return decode_stake_like(log, "InstantUnstake").map(RawEvent::InstantUnstake).map(Some);
    }
    if topic0 == signatures::ROUND_ROLLED {
        return decode_round_rolled(log).map(Some);
    }
    if topic0 == signatures::OFT_SENT {
        return decode_oft_sent(log).map(Some);
    }
    if topic0 == signatures::OFT_RECEIVED {
        return decode_oft_received(log).map(Some);
    }

    Ok(None)
}

fn decode_transfer(log: &RawLog) -> Result<RawEvent, DecodeError> {
    if log.topics.len() < 3 {
        return Err(DecodeError::Malformed { event: "Transfer", reason: "expected 2 indexed topics".into() });
    }
    let from = address_from_topic(&log.topics[1]);
    let to = address_from_topic(&log.topics[2]);
    let tokens = decode(&[ParamType::Uint(256)], &log.data)
        .map_err(|e| DecodeError::Malformed { event: "Transfer", reason: e.to_string() })?;
    let value = as_uint(&tokens[0]);
    Ok(RawEvent::Transfer(TransferLog { from, to, value }))
}

fn decode_stake_like(log: &RawLog, event: &'static str) -> Result<StakeLikeLog, DecodeError> {
    if log.topics.len() < 2 {
        return Err(DecodeError::Malformed { event, reason: "expected 1 indexed topic".into() });
    }
    let user = address_from_topic(&log.topics[1]);
    let tokens = decode(&[ParamType::Uint(256), ParamType::Uint(256)], &log.data)
        .map_err(|e| DecodeError::Malformed { event, reason: e.to_string() })?;
    let amount = as_uint(&tokens[0]);
    let round_id = as_uint(&tokens[1]).as_u64();
    Ok(StakeLikeLog { user, amount, round_id })
}

fn decode_round_rolled(log: &RawLog) -> Result<RawEvent, DecodeError> {
    let tokens = decode(
        &[
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Int(256),
            ParamType::Bool,
        ],
        &log.data,
    )
    .map_err(|e| DecodeError::Malformed { event: "RoundRolled", reason: e.to_string() })?;

    let yield_amount = match &tokens[5] {
        Token::Int(v) => I256::from_raw(*v),
        _ => unreachable!("ParamType::Int always decodes to Token::Int"),
    };
    let is_yield_positive = match &tokens[6] {
        Token::Bool(b) => *b,
        _ => unreachable!("ParamType::Bool always decodes to Token::Bool"),
    };

    Ok(RawEvent::RoundRolled(RoundRolledLog {
        round_id: as_uint(&tokens[0]).as_u64(),
        pps: as_uint(&tokens[1]),
        shares_minted: as_uint(&tokens[2]),
        wrapped_minted: as_uint(&tokens[3]),
        wrapped_burned: as_uint(&tokens[4]),
        yield_amount,
        is_yield_positive,
    }))
}

fn decode_oft_sent(log: &RawLog) -> Result<RawEvent, DecodeError> {
    if log.topics.len() < 3 {
        return Err(DecodeError::Malformed { event: "OFTSent", reason: "expected 2 indexed topics".into() });
    }
    let guid = log.topics[1];
    let from_address = address_from_topic(&log.topics[2]);
    let tokens = decode(&[ParamType::Uint(32), ParamType::Uint(256), ParamType::Uint(256)], &log.data)
        .map_err(|e| DecodeError::Malformed { event: "OFTSent", reason: e.to_string() })?;
    let dst_eid = as_uint(&tokens[0]).as_u32();
    let amount_sent_ld = as_uint(&tokens[1]);
    Ok(RawEvent::OftSent(OftSentLog { guid, from_address, dst_eid, amount_sent_ld }))
}

fn decode_oft_received(log: &RawLog) -> Result<RawEvent, DecodeError> {
    if log.topics.len() < 3 {
        return Err(DecodeError::Malformed { event: "OFTReceived", reason: "expected 2 indexed topics".into() });
    }
    let guid = log.topics[1];
    let to_address = address_from_topic(&log.topics[2]);
    let tokens = decode(&[ParamType::Uint(32), ParamType::Uint(256)], &log.data)
        .map_err(|e| DecodeError::Malformed { event: "OFTReceived", reason: e.to_string() })?;
    let src_eid = as_uint(&tokens[0]).as_u32();
    let amount_received_ld = as_uint(&tokens[1]);
    Ok(RawEvent::OftReceived(OftReceivedLog { guid, to_address, src_eid, amount_received_ld }))
}

fn as_uint(token: &Token) -> U256 {
    match token {
        Token::Uint(v) => *v,
        _ => unreachable!("ParamType::Uint always decodes to Token::Uint"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};

    fn transfer_log(from: Address, to: Address, value: u64) -> RawLog {
        RawLog {
            address: Address::zero(),
            topics: vec![
                signatures::TRANSFER,
                address_to_topic(from),
                address_to_topic(to),
            ],
            data: encode(&[Token::Uint(U256::from(value))]).into(),
            block_number: 100,
            transaction_hash: H256::zero(),
            transaction_index: 0,
            log_index: 0,
        }
    }

    #[test]
    fn decodes_transfer() {
        let from = Address::from_low_u64_be(1);
        let to = Address::from_low_u64_be(2);
        let log = transfer_log(from, to, 500);
        match decode_log(&log).unwrap().unwrap() {
            RawEvent::Transfer(t) => {
                assert_eq!(t.from, from);
                assert_eq!(t.to, to);
                assert_eq!(t.value, U256::from(500));
            }
            other => panic!("expected Transfer, got {other:?}"),
        }
    }

    #[test]
    fn unknown_topic_is_tolerated() {
        let log = RawLog {
            address: Address::zero(),
            topics: vec![H256::random()],
            data: vec![].into(),
            block_number: 1,
            transaction_hash: H256::zero(),
            transaction_index: 0,
            log_index: 0,
        };
        assert!(decode_log(&log).unwrap().is_none());
    }

    #[test]
    fn malformed_transfer_is_an_error() {
        let log = RawLog {
            address: Address::zero(),
            topics: vec![signatures::TRANSFER, H256::zero(), H256::zero()],
            data: vec![].into(),
            block_number: 1,
            transaction_hash: H256::zero(),
            transaction_index: 0,
            log_index: 0,
        };
        assert!(decode_log(&log).is_err());
    }

    #[test]
    fn decodes_round_rolled() {
        let data = encode(&[
            Token::Uint(U256::from(3u64)),
            Token::Uint(U256::from(10u64).pow(U256::from(18))),
            Token::Uint(U256::from(1000u64)),
            Token::Uint(U256::from(0u64)),
            Token::Uint(U256::from(0u64)),
            Token::Int(I256::from_raw(U256::from(50u64)).into_raw()),
            Token::Bool(true),
        ]);
        let log = RawLog {
            address: Address::zero(),
            topics: vec![signatures::ROUND_ROLLED],
            data: data.into(),
            block_number: 1,
            transaction_hash: H256::zero(),
            transaction_index: 0,
            log_index: 0,
        };
        match decode_log(&log).unwrap().unwrap() {
            RawEvent::RoundRolled(r) => {
                assert_eq!(r.round_id, 3);
                assert!(r.is_yield_positive);
            }
            other => panic!("expected RoundRolled, got {other:?}"),
        }
    }
}

impl std::fmt::Display for RawEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RawEvent::Transfer(_) => "Transfer",
            RawEvent::Stake(_) => "Stake",
            RawEvent::Unstake(_) => "Unstake",
            RawEvent::Redeem(_) => "Redeem",
            RawEvent::InstantUnstake(_) => "InstantUnstake",
            RawEvent::RoundRolled(_) => "RoundRolled",
            RawEvent::OftSent(_) => "OFTSent",
            RawEvent::OftReceived(_) => "OFTReceived",
        };
        write!(f, "{name}")
    }
}
