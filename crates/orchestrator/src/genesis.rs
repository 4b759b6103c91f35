//! Embedded default genesis files.
//!
//! Every chain the orchestrator spawns without an explicit genesis gets one
//! of these. The L2 genesis carries the cross-domain messenger contract at
//! its predeploy address, so messages can be sent and relayed without any
//! deployment step, and funds the well-known dev accounts the relayer signs
//! with.

/// Default L1 genesis: the funded dev accounts, no predeploys.
pub const L1_GENESIS: &[u8] = include_bytes!("genesis/genesis-l1.json");

/// Default L2 genesis: the funded dev accounts plus the cross-domain
/// messenger predeploy.
pub const L2_GENESIS: &[u8] = include_bytes!("genesis/genesis-l2.json");

#[cfg(test)]
mod tests {
    use super::*;
    use omnisim_types::{CROSS_DOMAIN_MESSENGER, RELAY_ACCOUNT};
    use serde_json::Value;

    fn alloc(genesis: &[u8]) -> Value {
        serde_json::from_slice::<Value>(genesis).unwrap()["alloc"].take()
    }

    #[test]
    fn l2_genesis_carries_the_messenger_predeploy() {
        let alloc = alloc(L2_GENESIS);
        let code = alloc[CROSS_DOMAIN_MESSENGER.to_string()]["code"].as_str().unwrap();
        assert!(code.len() > 4, "predeploy has no code");
        assert!(code.starts_with("0x"));
    }

    #[test]
    fn l1_genesis_has_no_predeploys() {
        let alloc = alloc(L1_GENESIS);
        assert!(alloc[CROSS_DOMAIN_MESSENGER.to_string()].is_null());
    }

    #[test]
    fn relay_account_is_funded_on_both_layers() {
        for genesis in [L1_GENESIS, L2_GENESIS] {
            let alloc = alloc(genesis);
            let balance = alloc[RELAY_ACCOUNT.to_string()]["balance"].as_str().unwrap();
            assert_ne!(balance, "0x0");
        }
    }
}
