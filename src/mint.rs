use std::time::Duration;

use ethers::abi::{encode, Token};
use ethers::types::{Address, TransactionReceipt, TransactionRequest, U256};
use ethers::utils::{id, parse_ether};

use crate::error::Error;
use crate::ethereum::Ledger;
use crate::orchestrator::submit;

/// Price the minting page charges per token
pub const DEFAULT_MINT_PRICE: &str = "0.001";

/// Calldata for `mint(address to, uint256 tokenId)`
pub fn mint_calldata(to: Address, token_id: U256) -> Vec<u8> {
    let mut data = id("mint(address,uint256)").to_vec();
    data.extend(encode(&[Token::Address(to), Token::Uint(token_id)]));
    data
}

/// Parse an ether amount such as `"0.001"` into wei
pub fn mint_price(ether: &str) -> Result<U256, Error> {
    parse_ether(ether).map_err(|e| Error::InvalidAmount(format!("{}: {}", ether, e)))
}

/// Mint `token_id` to `to`, paying `price` wei, and wait for the receipt
pub async fn mint<L: Ledger + ?Sized>(
    ledger: &L,
    nft: Address,
    to: Address,
    token_id: U256,
    price: U256,
    timeout: Duration,
) -> Result<TransactionReceipt, Error> {
    let tx = TransactionRequest::new()
        .from(ledger.signer())
        .to(nft)
        .value(price)
        .data(mint_calldata(to, token_id));

    log::info!("minting token {} to {:?} on {:?}", token_id, to, nft);
    submit(ledger, tx, timeout).await.map_err(Error::MintFailed)
}
