//! Decodes the four integration-protocol event shapes C12 matches against.
//! Mirrors `droplets_ingest::decode`'s tolerant-unknown-topic convention, but
//! these decoders are keyed by [`IntegrationKind`] rather than a single flat
//! dispatch table, since the same topic0 (plain `Mint(address,uint256,uint256)`)
//! means different things on a cToken market than on an AMM pool.

use crate::signatures;
use droplets_chain::transport::RawLog;
use droplets_common::model::IntegrationKind;
use ethers::abi::{decode, ParamType, Token};
use ethers::types::{Address, H256, U256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log has no topics")]
    NoTopics,

    #[error("malformed {event} log: {reason}")]
    Malformed { event: &'static str, reason: String },
}

fn address_from_topic(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

/// Which side of a deposit/withdraw pair a decoded log represents, independent
/// of protocol. Matching works on this normalized shape rather than on each
/// protocol's own event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationEventKind {
    In,
    Out,
}

/// A decoded integration-protocol log, reduced to what the matcher needs:
/// which address moved how much of the vault asset, tagged in/out, and
/// (where the protocol's event carries one) which account it was booked to.
#[derive(Debug, Clone)]
pub struct IntegrationEvent {
    pub kind: IntegrationEventKind,
    pub account: Option<Address>,
    pub amount: U256,
    pub tx_hash: H256,
    pub log_index: u64,
    pub block_number: u64,
}

/// Decodes one log against the event shapes a contract of `kind` can emit.
/// Returns `Ok(None)` for a topic0 that kind doesn't use on this log — not an
/// error, since a contract address can emit more log types than the ones C9/
/// C12 care about (e.g. Approval alongside Deposit).
pub fn decode_integration_log(
    log: &RawLog,
    kind: IntegrationKind,
) -> Result<Option<IntegrationEvent>, DecodeError> {
    let topic0 = *log.topics.first().ok_or(DecodeError::NoTopics)?;

    match kind {
        IntegrationKind::Erc4626 => {
            if topic0 == signatures::ERC4626_DEPOSIT {
                return decode_erc4626_deposit(log).map(Some);
            }
            if topic0 == signatures::ERC4626_WITHDRAW {
                return decode_erc4626_withdraw(log).map(Some);
            }
        }
        IntegrationKind::LendingCToken => {
            if topic0 == signatures::CTOKEN_MINT {
                return decode_ctoken_mint(log).map(Some);
            }
            if topic0 == signatures::CTOKEN_REDEEM {
                return decode_ctoken_redeem(log).map(Some);
            }
        }
        IntegrationKind::LendingAToken => {
            if topic0 == signatures::ATOKEN_SUPPLY {
                return decode_atoken_supply(log).map(Some);
            }
            if topic0 == signatures::ATOKEN_WITHDRAW {
                return decode_atoken_withdraw(log).map(Some);
            }
        }
        IntegrationKind::AmmLp => {
            if topic0 == signatures::LP_MINT {
                return decode_lp_mint(log).map(Some);
            }
            if topic0 == signatures::LP_BURN {
                return decode_lp_burn(log).map(Some);
            }
        }
    }

    Ok(None)
}

fn decode_erc4626_deposit(log: &RawLog) -> Result<IntegrationEvent, DecodeError> {
    if log.topics.len() < 3 {
        return Err(DecodeError::Malformed { event: "Deposit", reason: "expected 2 indexed topics".into() });
    }
    let owner = address_from_topic(&log.topics[2]);
    let tokens = decode(&[ParamType::Uint(256), ParamType::Uint(256)], &log.data)
        .map_err(|e| DecodeError::Malformed { event: "Deposit", reason: e.to_string() })?;
    Ok(IntegrationEvent {
        kind: IntegrationEventKind::In,
        account: Some(owner),
        amount: as_uint(&tokens[0]),
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
    })
}

fn decode_erc4626_withdraw(log: &RawLog) -> Result<IntegrationEvent, DecodeError> {
    if log.topics.len() < 4 {
        return Err(DecodeError::Malformed { event: "Withdraw", reason: "expected 3 indexed topics".into() });
    }
    let owner = address_from_topic(&log.topics[3]);
    let tokens = decode(&[ParamType::Uint(256), ParamType::Uint(256)], &log.data)
        .map_err(|e| DecodeError::Malformed { event: "Withdraw", reason: e.to_string() })?;
    Ok(IntegrationEvent {
        kind: IntegrationEventKind::Out,
        account: Some(owner),
        amount: as_uint(&tokens[0]),
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
    })
}

fn decode_ctoken_mint(log: &RawLog) -> Result<IntegrationEvent, DecodeError> {
    let tokens = decode(
        &[ParamType::Address, ParamType::Uint(256), ParamType::Uint(256)],
        &log.data,
    )
    .map_err(|e| DecodeError::Malformed { event: "Mint", reason: e.to_string() })?;
    let minter = match &tokens[0] {
        Token::Address(a) => *a,
        _ => unreachable!("ParamType::Address always decodes to Token::Address"),
    };
    Ok(IntegrationEvent {
        kind: IntegrationEventKind::In,
        account: Some(minter),
        amount: as_uint(&tokens[1]),
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
    })
}

fn decode_ctoken_redeem(log: &RawLog) -> Result<IntegrationEvent, DecodeError> {
    let tokens = decode(
        &[ParamType::Address, ParamType::Uint(256), ParamType::Uint(256)],
        &log.data,
    )
    .map_err(|e| DecodeError::Malformed { event: "Redeem", reason: e.to_string() })?;
    let redeemer = match &tokens[0] {
        Token::Address(a) => *a,
        _ => unreachable!("ParamType::Address always decodes to Token::Address"),
    };
    Ok(IntegrationEvent {
        kind: IntegrationEventKind::Out,
        account: Some(redeemer),
        amount: as_uint(&tokens[1]),
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
    })
}

fn decode_atoken_supply(log: &RawLog) -> Result<IntegrationEvent, DecodeError> {
    if log.topics.len() < 3 {
        return Err(DecodeError::Malformed { event: "Supply", reason: "expected 2 indexed topics".into() });
    }
    let on_behalf_of = address_from_topic(&log.topics[2]);
    let tokens = decode(&[ParamType::Address, ParamType::Uint(256), ParamType::Uint(16)], &log.data)
        .map_err(|e| DecodeError::Malformed { event: "Supply", reason: e.to_string() })?;
    Ok(IntegrationEvent {
        kind: IntegrationEventKind::In,
        // Not trusted for address matching: the reserve's own user/onBehalfOf
        // fields can be a router rather than the end account (signatures.rs).
        account: Some(on_behalf_of),
        amount: as_uint(&tokens[1]),
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
    })
}

fn decode_atoken_withdraw(log: &RawLog) -> Result<IntegrationEvent, DecodeError> {
    if log.topics.len() < 4 {
        return Err(DecodeError::Malformed { event: "Withdraw", reason: "expected 3 indexed topics".into() });
    }
    let user = address_from_topic(&log.topics[2]);
    let tokens = decode(&[ParamType::Uint(256)], &log.data)
        .map_err(|e| DecodeError::Malformed { event: "Withdraw", reason: e.to_string() })?;
    Ok(IntegrationEvent {
        kind: IntegrationEventKind::Out,
        account: Some(user),
        amount: as_uint(&tokens[0]),
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
    })
}

fn decode_lp_mint(log: &RawLog) -> Result<IntegrationEvent, DecodeError> {
    // amount0/amount1 are pool-token amounts, not vault-asset LP shares —
    // this protocol never yields a trustworthy per-address amount, hence the
    // tx_hash-only match strategy. The amount recorded here is amount0 purely
    // so the decoder has something non-zero to carry; the matcher for this
    // kind never reads it.
    let tokens = decode(&[ParamType::Uint(256), ParamType::Uint(256)], &log.data)
        .map_err(|e| DecodeError::Malformed { event: "Mint", reason: e.to_string() })?;
    Ok(IntegrationEvent {
        kind: IntegrationEventKind::In,
        account: None,
        amount: as_uint(&tokens[0]),
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
    })
}

fn decode_lp_burn(log: &RawLog) -> Result<IntegrationEvent, DecodeError> {
    if log.topics.len() < 3 {
        return Err(DecodeError::Malformed { event: "Burn", reason: "expected 2 indexed topics".into() });
    }
    let tokens = decode(&[ParamType::Uint(256), ParamType::Uint(256)], &log.data)
        .map_err(|e| DecodeError::Malformed { event: "Burn", reason: e.to_string() })?;
    Ok(IntegrationEvent {
        kind: IntegrationEventKind::Out,
        account: None,
        amount: as_uint(&tokens[0]),
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
    })
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

    fn topic_addr(a: Address) -> H256 {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(a.as_bytes());
        H256(bytes)
    }

    #[test]
    fn decodes_erc4626_deposit() {
        let owner = Address::from_low_u64_be(7);
        let log = RawLog {
            address: Address::zero(),
            topics: vec![signatures::ERC4626_DEPOSIT, H256::zero(), topic_addr(owner)],
            data: encode(&[Token::Uint(U256::from(500u64)), Token::Uint(U256::from(500u64))]).into(),
            block_number: 10,
            transaction_hash: H256::zero(),
            transaction_index: 0,
            log_index: 0,
        };
        let event = decode_integration_log(&log, IntegrationKind::Erc4626).unwrap().unwrap();
        assert_eq!(event.kind, IntegrationEventKind::In);
        assert_eq!(event.account, Some(owner));
        assert_eq!(event.amount, U256::from(500));
    }

    #[test]
    fn unrelated_topic_on_matching_kind_is_tolerated() {
        let log = RawLog {
            address: Address::zero(),
            topics: vec![H256::random()],
            data: vec![].into(),
            block_number: 1,
            transaction_hash: H256::zero(),
            transaction_index: 0,
            log_index: 0,
        };
        assert!(decode_integration_log(&log, IntegrationKind::Erc4626).unwrap().is_none());
    }

    #[test]
    fn decodes_ctoken_mint_and_redeem() {
        let minter = Address::from_low_u64_be(3);
        let log = RawLog {
            address: Address::zero(),
            topics: vec![signatures::CTOKEN_MINT],
            data: encode(&[
                Token::Address(minter),
                Token::Uint(U256::from(100u64)),
                Token::Uint(U256::from(99u64)),
            ])
            .into(),
            block_number: 1,
            transaction_hash: H256::zero(),
            transaction_index: 0,
            log_index: 0,
        };
        let event = decode_integration_log(&log, IntegrationKind::LendingCToken).unwrap().unwrap();
        assert_eq!(event.kind, IntegrationEventKind::In);
        assert_eq!(event.account, Some(minter));
    }

    #[test]
    fn lp_mint_carries_no_account() {
        let log = RawLog {
            address: Address::zero(),
            topics: vec![signatures::LP_MINT],
            data: encode(&[Token::Uint(U256::from(1u64)), Token::Uint(U256::from(2u64))]).into(),
            block_number: 1,
            transaction_hash: H256::zero(),
            transaction_index: 0,
            log_index: 0,
        };
        let event = decode_integration_log(&log, IntegrationKind::AmmLp).unwrap().unwrap();
        assert!(event.account.is_none());
    }
}
