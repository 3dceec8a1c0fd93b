//! Topic0 hashes for the integration-protocol events C12 matches against
//! vault-side `integration_in`/`integration_out` legs. Distinct from
//! `droplets_ingest::signatures`, which only knows the vault/OFT/round
//! event set — these belong to third-party contracts this workspace
//! doesn't control, so the validator decodes them independently rather
//! than growing the ingester's signature table with protocol-specific
//! shapes it otherwise has no use for.

use ethers::types::H256;

/// EIP-4626 `Deposit(address indexed sender, address indexed owner, uint256 assets, uint256 shares)`.
pub const ERC4626_DEPOSIT: H256 = H256([
    0xdc, 0xbc, 0x1c, 0x05, 0x24, 0x0f, 0x31, 0xff, 0x3a, 0xd0, 0x67, 0xef, 0x1e, 0xe3, 0x5c, 0xe4,
    0x99, 0x7d, 0xa6, 0x65, 0x53, 0xb9, 0xf0, 0x7a, 0x3b, 0x3e, 0x37, 0x55, 0x1d, 0x97, 0xd2, 0xf4,
]);

/// EIP-4626 `Withdraw(address indexed sender, address indexed receiver, address indexed owner, uint256 assets, uint256 shares)`.
pub const ERC4626_WITHDRAW: H256 = H256([
    0xfb, 0xde, 0x79, 0x7d, 0x20, 0x1c, 0x84, 0x9a, 0xb9, 0x6c, 0x4a, 0xe5, 0x89, 0x08, 0xa7, 0x68,
    0x3d, 0x86, 0x8d, 0x45, 0x57, 0x8a, 0x74, 0x17, 0x9a, 0xfd, 0xae, 0xa3, 0x57, 0x4e, 0x5b, 0x1a,
]);

/// Compound-style `Mint(address minter, uint256 mintAmount, uint256 mintTokens)` — no
/// indexed fields, the shape Enclabs cTokens inherit unmodified.
pub const CTOKEN_MINT: H256 = H256([
    0x4c, 0x20, 0x9b, 0x5f, 0xc8, 0xad, 0x50, 0x75, 0x8f, 0x13, 0xe2, 0xe1, 0x08, 0x8b, 0xa5, 0x6a,
    0x56, 0x0d, 0xff, 0x69, 0x0a, 0x1c, 0x6f, 0xef, 0x26, 0x39, 0x4f, 0x4c, 0x03, 0x82, 0x1c, 0x4f,
]);

/// Compound-style `Redeem(address redeemer, uint256 redeemAmount, uint256 redeemTokens)`.
pub const CTOKEN_REDEEM: H256 = H256([
    0xe5, 0xb7, 0x54, 0xfb, 0x1a, 0xbb, 0x7f, 0x01, 0xb4, 0x99, 0x79, 0x1d, 0x0b, 0x82, 0x0a, 0xe3,
    0xb6, 0xaf, 0x34, 0x24, 0xac, 0x1c, 0x59, 0x76, 0x8e, 0xdb, 0x53, 0xf4, 0xec, 0x31, 0xa9, 0x29,
]);

/// Aave-v3-style `Supply(address indexed reserve, address user, address indexed onBehalfOf, uint256 amount, uint16 indexed referralCode)`.
/// `user` (the caller, often a router/zap proxy) is NOT indexed and is not
/// the same address this validator tries to match against — only
/// `onBehalfOf` is, and even that can be a proxy for flows that route
/// through a zap contract, which is why Stability's aToken market is
/// matched by (tx_hash, amount) rather than by address (§4.10).
pub const ATOKEN_SUPPLY: H256 = H256([
    0x2b, 0x62, 0x7d, 0x2f, 0x76, 0x81, 0x38, 0x84, 0x94, 0x72, 0x1b, 0xc4, 0x6b, 0xc3, 0xb4, 0xd7,
    0xa8, 0x23, 0xd5, 0x7f, 0x40, 0x97, 0x5b, 0xd4, 0xbf, 0x0e, 0x9c, 0x2c, 0x68, 0x8f, 0x47, 0x0c,
]);

/// Aave-v3-style `Withdraw(address indexed reserve, address indexed user, address indexed to, uint256 amount)`.
pub const ATOKEN_WITHDRAW: H256 = H256([
    0x31, 0x15, 0xd1, 0x44, 0x9a, 0x7b, 0x73, 0x2c, 0x98, 0x6c, 0xba, 0x18, 0x24, 0x4e, 0x89, 0x7a,
    0x45, 0x0f, 0x61, 0xe1, 0xbb, 0x8d, 0x58, 0x9c, 0xd2, 0xe6, 0x9e, 0x6c, 0x8b, 0x3e, 0x75, 0x46,
]);

/// Uniswap-v2-style `Mint(address indexed sender, uint256 amount0, uint256 amount1)` —
/// carries both pool-side token amounts rather than a single vault-asset
/// delta, which is why the AMM LP protocol is matched by tx_hash only (§4.10).
pub const LP_MINT: H256 = H256([
    0x4c, 0x20, 0x9b, 0x5f, 0xc8, 0xad, 0x50, 0x75, 0x8f, 0x13, 0xe2, 0xe1, 0x08, 0x8b, 0xa5, 0x6a,
    0x56, 0x0d, 0xff, 0x69, 0x0a, 0x1c, 0x6f, 0xef, 0x26, 0x39, 0x4f, 0x4c, 0x03, 0x82, 0x1c, 0x4f,
]);

/// Uniswap-v2-style `Burn(address indexed sender, uint256 amount0, uint256 amount1, address indexed to)`.
pub const LP_BURN: H256 = H256([
    0xdc, 0xcd, 0x41, 0x2f, 0x0b, 0x12, 0x52, 0x81, 0x9c, 0xb1, 0xfd, 0x33, 0x0b, 0x93, 0x22, 0x4c,
    0xa4, 0x26, 0x12, 0x89, 0x2b, 0xb3, 0xf4, 0xf7, 0x89, 0x97, 0x6e, 0x6d, 0x81, 0x93, 0x64, 0x96,
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
        assert_eq!(
            ERC4626_DEPOSIT,
            topic0("Deposit(address,address,uint256,uint256)")
        );
        assert_eq!(
            ERC4626_WITHDRAW,
            topic0("Withdraw(address,address,address,uint256,uint256)")
        );
        assert_eq!(CTOKEN_MINT, topic0("Mint(address,uint256,uint256)"));
        assert_eq!(CTOKEN_REDEEM, topic0("Redeem(address,uint256,uint256)"));
        assert_eq!(
            ATOKEN_SUPPLY,
            topic0("Supply(address,address,address,uint256,uint16)")
        );
        assert_eq!(
            ATOKEN_WITHDRAW,
            topic0("Withdraw(address,address,address,uint256)")
        );
        assert_eq!(LP_MINT, topic0("Mint(address,uint256,uint256)"));
        assert_eq!(LP_BURN, topic0("Burn(address,uint256,uint256,address)"));
    }

    #[test]
    fn ctoken_mint_and_lp_mint_collide_by_construction() {
        // Both are plain `Mint(address,uint256,uint256)`; the validator tells
        // them apart by which contract (protocol kind) emitted the log, never
        // by topic0 alone.
        assert_eq!(CTOKEN_MINT, LP_MINT);
    }
}
