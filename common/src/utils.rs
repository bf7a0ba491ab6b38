use ethers::types::{Address, U256};
use ethers::utils::keccak256;
use rlp::RlpStream;

/// Address assigned to a contract created by `sender` with the transaction at `nonce`
///
/// This is the CREATE rule: the last 20 bytes of `keccak256(rlp([sender, nonce]))`.
pub fn contract_address(sender: Address, nonce: U256) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender);
    stream.append(&nonce);

    let hash = keccak256(stream.out());
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_contract_address_known_vectors() {
        let sender = Address::from(hex!("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0"));

        assert_eq!(
            contract_address(sender, U256::zero()),
            Address::from(hex!("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d"))
        );
        assert_eq!(
            contract_address(sender, U256::from(1)),
            Address::from(hex!("343c43a37d37dff08ae8c4a11544c718abb4fcf8"))
        );
        assert_eq!(
            contract_address(sender, U256::from(2)),
            Address::from(hex!("f778b86fa74e846c4f0a1fbd1335fe81c00a0c91"))
        );
        assert_eq!(
            contract_address(sender, U256::from(3)),
            Address::from(hex!("fffd933a0bc612844eaf0c6fe3e5b8e9b6c1d19c"))
        );
    }

    #[test]
    fn test_contract_address_hardhat_default_account() {
        // First account of the default hardhat/anvil mnemonic
        let sender = Address::from(hex!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"));

        assert_eq!(
            contract_address(sender, U256::zero()),
            Address::from(hex!("5fbdb2315678afecb367f032d93f642f64180aa3"))
        );
        assert_eq!(
            contract_address(sender, U256::from(1)),
            Address::from(hex!("e7f1725e7734ce288f8367e1bb143e90bb3f0512"))
        );
    }

    #[test]
    fn test_contract_address_matches_ethers() {
        let sender = Address::from(hex!("4c06524b1bd7aa002747252257bbe0c472735a6d"));

        for nonce in [0u64, 1, 127, 128, 255, 256, 1 << 24, u64::MAX] {
            assert_eq!(
                contract_address(sender, U256::from(nonce)),
                ethers::utils::get_contract_address(sender, nonce),
                "nonce {}",
                nonce
            );
        }
    }
}
