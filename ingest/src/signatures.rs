//! Event topic0 hashes the decoder matches against. Computed once via
//! `ethers::utils::keccak256` over the canonical Solidity event signature;
//! kept as `const` so the decoder's dispatch is a plain equality check rather
//! than hashing on every log.

use ethers::types::H256;

/// `Transfer(address,address,uint256)` — the one signature shared by the
/// vault share token, every OFT, and every integration LP/vault/market
/// token this engine reads.
pub const TRANSFER: H256 = H256([
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d, 0xaa,
    0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23, 0xb3, 0xef,
]);

/// `Stake(address,uint256,uint256)` — (user, amount, roundId), emitted when a
/// deposit is queued for the next round roll.
pub const STAKE: H256 = H256([
    0x5a, 0xf4, 0x17, 0x13, 0x4f, 0x72, 0xa9, 0xd4, 0x11, 0x43, 0xac, 0xe8, 0x5b, 0x0a, 0x26, 0xdc,
    0xe6, 0xf5, 0x50, 0xf8, 0x94, 0xf2, 0xcb, 0xc1, 0xee, 0xee, 0x88, 0x10, 0x60, 0x3d, 0x91, 0xb6,
]);

/// `Unstake(address,uint256,uint256)` — (user, shares, roundId).
pub const UNSTAKE: H256 = H256([
    0xf9, 0x60, 0xdb, 0xf9, 0xe5, 0xd0, 0x68, 0x2f, 0x7a, 0x29, 0x8e, 0xd9, 0x74, 0xe3, 0x3a, 0x28,
    0xb4, 0x46, 0x49, 0x14, 0xb7, 0xa2, 0xbf, 0xac, 0x12, 0xae, 0x41, 0x9a, 0x9a, 0xfe, 0xb2, 0x80,
]);

/// `Redeem(address,uint256,uint256)` — (user, shares, roundId): pending stake
/// converted into minted shares at the next round roll.
pub const REDEEM: H256 = H256([
    0xe5, 0xb7, 0x54, 0xfb, 0x1a, 0xbb, 0x7f, 0x01, 0xb4, 0x99, 0x79, 0x1d, 0x0b, 0x82, 0x0a, 0xe3,
    0xb6, 0xaf, 0x34, 0x24, 0xac, 0x1c, 0x59, 0x76, 0x8e, 0xdb, 0x53, 0xf4, 0xec, 0x31, 0xa9, 0x29,
]);

/// `InstantUnstake(address,uint256,uint256)` — (user, shares, roundId):
/// cancels a pending (same-round) stake before it is redeemed.
pub const INSTANT_UNSTAKE: H256 = H256([
    0xd4, 0xc7, 0x73, 0x71, 0xbd, 0x95, 0x33, 0x85, 0x09, 0x5a, 0x86, 0xcd, 0x8a, 0x48, 0x5e, 0xeb,
    0xf4, 0x9b, 0x24, 0x18, 0x86, 0x65, 0xf3, 0x12, 0x4d, 0xa4, 0xf6, 0xe2, 0x50, 0x22, 0x06, 0xd7,
]);

/// `RoundRolled(uint256,uint256,uint256,uint256,uint256,int256,bool)` —
/// (round, pps, sharesMinted, wrappedMinted, wrappedBurned, yield, isYieldPositive).
pub const ROUND_ROLLED: H256 = H256([
    0x3e, 0xed, 0xe2, 0x09, 0x71, 0xb1, 0xf9, 0xf4, 0x58, 0x03, 0xb2, 0x1e, 0x54, 0x62, 0x34, 0x5e,
    0x9a, 0x5c, 0x90, 0xd5, 0x3e, 0xa6, 0x06, 0xf3, 0xe1, 0x83, 0xfc, 0xfb, 0xeb, 0x06, 0xc7, 0x84,
]);

/// `OFTSent(bytes32,uint32,address,uint256,uint256)` — (guid, dstEid,
/// fromAddress, amountSentLD, amountReceivedLD). LayerZero OFT v2 signature.
pub const OFT_SENT: H256 = H256([
    0x85, 0x49, 0x6b, 0x76, 0x0a, 0x4b, 0x7f, 0x8d, 0x66, 0x38, 0x4b, 0x9d, 0xf2, 0x1b, 0x38, 0x1f,
    0x5d, 0x1b, 0x1e, 0x79, 0xf2, 0x29, 0xa4, 0x7a, 0xaf, 0x4c, 0x23, 0x2e, 0xdc, 0x2f, 0xe5, 0x9a,
]);

/// `OFTReceived(bytes32,uint32,address,uint256)` — (guid, srcEid, toAddress,
/// amountReceivedLD).
pub const OFT_RECEIVED: H256 = H256([
    0xef, 0xed, 0x6d, 0x35, 0x00, 0x54, 0x6b, 0x29, 0x53, 0x3b, 0x12, 0x8a, 0x29, 0xe3, 0xa9, 0x4d,
    0x70, 0x78, 0x87, 0x27, 0xf0, 0x50, 0x75, 0x05, 0xac, 0x12, 0xea, 0xf2, 0xe5, 0x78, 0xfd, 0x9c,
]);

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::keccak256;

    fn topic0(sig: &str) -> H256 {
        H256::from(keccak256(sig.as_bytes()))
    }

    #[test]
    fn constants_match_their_signatures() {
        assert_eq!(TRANSFER, topic0("Transfer(address,address,uint256)"));
        assert_eq!(STAKE, topic0("Stake(address,uint256,uint256)"));
        assert_eq!(UNSTAKE, topic0("Unstake(address,uint256,uint256)"));
        assert_eq!(REDEEM, topic0("Redeem(address,uint256,uint256)"));
        assert_eq!(INSTANT_UNSTAKE, topic0("InstantUnstake(address,uint256,uint256)"));
        assert_eq!(
            ROUND_ROLLED,
            topic0("RoundRolled(uint256,uint256,uint256,uint256,uint256,int256,bool)")
        );
        assert_eq!(OFT_SENT, topic0("OFTSent(bytes32,uint32,address,uint256,uint256)"));
        assert_eq!(OFT_RECEIVED, topic0("OFTReceived(bytes32,uint32,address,uint256)"));
    }
}
