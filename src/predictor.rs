// Contract address prediction
//
// A prediction is a read-then-act: the nonce is read now and the address only
// materialises if the account sends exactly the counted transactions in
// between. Nothing here can enforce that; the caller has to be the only
// sender on the account until the predicted contract exists.

use common::{contract_address, PredictedAddress};
use ethers::types::{Address, U256};

use crate::error::Error;
use crate::ethereum::Ledger;

/// Transaction count of an account at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceSnapshot {
    pub account: Address,
    pub nonce: U256,
}

impl NonceSnapshot {
    /// Address created by the `offset`-th transaction after this snapshot
    ///
    /// `offset = 1` is the very next transaction, so the creating nonce is
    /// `nonce + offset - 1`.
    pub fn predict(&self, offset: u64) -> Result<PredictedAddress, Error> {
        if offset == 0 {
            return Err(Error::InvalidOffset);
        }
        let nonce = self.nonce + U256::from(offset - 1);

        Ok(PredictedAddress {
            address: contract_address(self.account, nonce),
            sender: self.account,
            nonce,
            offset,
        })
    }
}

/// Predicts creation addresses from an account's live transaction count
pub struct AddressPredictor<'a, L: Ledger + ?Sized> {
    ledger: &'a L,
}

impl<'a, L: Ledger + ?Sized> AddressPredictor<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Read the current transaction count of `account`
    pub async fn snapshot(&self, account: Address) -> Result<NonceSnapshot, Error> {
        let nonce = self
            .ledger
            .transaction_count(account)
            .await
            .map_err(|cause| Error::AccountUnavailable { account, cause })?;

        Ok(NonceSnapshot { account, nonce })
    }

    /// Address of the contract created by `account`'s `offset`-th next transaction
    pub async fn predict(&self, account: Address, offset: u64) -> Result<PredictedAddress, Error> {
        if offset == 0 {
            return Err(Error::InvalidOffset);
        }
        let prediction = self.snapshot(account).await?.predict(offset)?;
        log::debug!(
            "{:?} + {} -> nonce {} -> {:?}",
            account,
            offset,
            prediction.nonce,
            prediction.address
        );
        Ok(prediction)
    }
}
