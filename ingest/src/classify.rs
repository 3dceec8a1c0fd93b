//! C5 (classify half): the transfer-classification rules of §4.3, applied in
//! order. Stake/Unstake/Redeem/InstantUnstake need no classification — their
//! `event_type` already says what they are.

use droplets_common::model::Classification;
use ethers::types::Address;

/// Everything the classifier needs to know about the chain/contract a
/// transfer was observed on, beyond the transfer's own `from`/`to`.
pub struct ClassifyContext<'a> {
    /// The tracked contract's own address (the vault share token on
    /// Chain-E, or the OFT token on a satellite chain).
    pub contract_address: Address,
    /// Whether this observation is on Chain-E (the canonical chain).
    pub is_canonical_chain: bool,
    /// Whether an `OFTSent`/`OFTReceived` log was decoded in the same
    /// transaction as this transfer (§4.3 rule 3).
    pub oft_event_in_same_tx: bool,
    /// Addresses registered as integration contracts (§4.3 rule 4).
    pub integration_addresses: &'a [Address],
}

impl ClassifyContext<'_> {
    fn is_integration(&self, address: Address) -> bool {
        self.integration_addresses.contains(&address)
    }
}

/// One classified leg of a `Transfer` log: which address it applies to, the
/// classification, and whether that leg credits or debits the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLeg {
    pub address: Address,
    pub classification: Classification,
    pub credits: bool,
}

/// Classifies a decoded `Transfer(from, to, value)` into the one or two
/// `ShareEvent` legs it produces, per §4.3's ordered rules:
///
/// 1. `from == 0x0` -> mint (ignored if `to` is the vault/contract itself).
/// 2. `to == 0x0` or burn address -> burn.
/// 3. `from`/`to` is this contract's own address on a non-canonical chain,
///    paired with an OFT event in the same tx -> bridge_burn / bridge_mint.
/// 4. `from`/`to` is a registered integration contract -> integration_out /
///    integration_in.
/// 5. otherwise -> transfer_user (two legs: debit sender, credit receiver).
///
/// Rule 3's bridge check is evaluated before the mint/burn checks complete
/// for the satellite-chain case, because an OFT's destination-side mint is
/// itself a `Transfer(0x0 -> user)` — without this, rule 1 would always
/// claim it first and `bridge_mint` could never be produced. This is an
/// explicit resolution of that ordering, recorded in DESIGN.md.
pub fn classify_transfer(from: Address, to: Address, ctx: &ClassifyContext) -> Vec<TransferLeg> {
    let zero = Address::zero();
    let burn = droplets_common::burn_address();

    if !ctx.is_canonical_chain && ctx.oft_event_in_same_tx {
        if to == ctx.contract_address {
            return vec![TransferLeg { address: from, classification: Classification::BridgeBurn, credits: false }];
        }
        if from == ctx.contract_address || from == zero {
            return vec![TransferLeg { address: to, classification: Classification::BridgeMint, credits: true }];
        }
    }

    if from == zero {
        if to == ctx.contract_address {
            return vec![];
        }
        return vec![TransferLeg { address: to, classification: Classification::Mint, credits: true }];
    }

    if to == zero || to == burn {
        return vec![TransferLeg { address: from, classification: Classification::BurnUnstake, credits: false }];
    }

    if ctx.is_integration(to) {
        return vec![TransferLeg { address: from, classification: Classification::IntegrationOut, credits: false }];
    }
    if ctx.is_integration(from) {
        return vec![TransferLeg { address: to, classification: Classification::IntegrationIn, credits: true }];
    }

    vec![
        TransferLeg { address: from, classification: Classification::TransferUser, credits: false },
        TransferLeg { address: to, classification: Classification::TransferUser, credits: true },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn ctx<'a>(contract: Address, canonical: bool, oft: bool, integrations: &'a [Address]) -> ClassifyContext<'a> {
        ClassifyContext {
            contract_address: contract,
            is_canonical_chain: canonical,
            oft_event_in_same_tx: oft,
            integration_addresses: integrations,
        }
    }

    #[test]
    fn mint_credits_receiver() {
        let vault = addr(1);
        let legs = classify_transfer(Address::zero(), addr(2), &ctx(vault, true, false, &[]));
        assert_eq!(legs, vec![TransferLeg { address: addr(2), classification: Classification::Mint, credits: true }]);
    }

    #[test]
    fn mint_to_vault_itself_is_ignored() {
        let vault = addr(1);
        let legs = classify_transfer(Address::zero(), vault, &ctx(vault, true, false, &[]));
        assert!(legs.is_empty());
    }

    #[test]
    fn burn_debits_sender() {
        let vault = addr(1);
        let legs = classify_transfer(addr(2), Address::zero(), &ctx(vault, true, false, &[]));
        assert_eq!(
            legs,
            vec![TransferLeg { address: addr(2), classification: Classification::BurnUnstake, credits: false }]
        );
    }

    #[test]
    fn bridge_burn_on_satellite_paired_with_oft_event() {
        let oft = addr(1);
        let legs = classify_transfer(addr(2), oft, &ctx(oft, false, true, &[]));
        assert_eq!(
            legs,
            vec![TransferLeg { address: addr(2), classification: Classification::BridgeBurn, credits: false }]
        );
    }

    #[test]
    fn bridge_mint_on_satellite_paired_with_oft_event() {
        let oft = addr(1);
        let legs = classify_transfer(Address::zero(), addr(2), &ctx(oft, false, true, &[]));
        assert_eq!(
            legs,
            vec![TransferLeg { address: addr(2), classification: Classification::BridgeMint, credits: true }]
        );
    }

    #[test]
    fn without_oft_pairing_satellite_zero_transfer_is_plain_mint() {
        let oft = addr(1);
        let legs = classify_transfer(Address::zero(), addr(2), &ctx(oft, false, false, &[]));
        assert_eq!(legs, vec![TransferLeg { address: addr(2), classification: Classification::Mint, credits: true }]);
    }

    #[test]
    fn transfer_into_integration_contract_is_integration_out() {
        let vault = addr(1);
        let integration = addr(9);
        let legs = classify_transfer(addr(2), integration, &ctx(vault, true, false, &[integration]));
        assert_eq!(
            legs,
            vec![TransferLeg { address: addr(2), classification: Classification::IntegrationOut, credits: false }]
        );
    }

    #[test]
    fn transfer_from_integration_contract_is_integration_in() {
        let vault = addr(1);
        let integration = addr(9);
        let legs = classify_transfer(integration, addr(2), &ctx(vault, true, false, &[integration]));
        assert_eq!(
            legs,
            vec![TransferLeg { address: addr(2), classification: Classification::IntegrationIn, credits: true }]
        );
    }

    #[test]
    fn plain_transfer_produces_two_legs() {
        let vault = addr(1);
        let legs = classify_transfer(addr(2), addr(3), &ctx(vault, true, false, &[]));
        assert_eq!(
            legs,
            vec![
                TransferLeg { address: addr(2), classification: Classification::TransferUser, credits: false },
                TransferLeg { address: addr(3), classification: Classification::TransferUser, credits: true },
            ]
        );
    }
}
