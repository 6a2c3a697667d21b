//! The persisted wallet tables and their operations.

use serde::{Deserialize, Serialize};

use super::{StorageError, StorageResult};
use crate::types::{
    Account, AccountAddress, AddressBookEntry, Credential, Identity, IdentityId, ImportOutcome,
    NewIdentity, WalletId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Wallet {
    id: WalletId,
    /// Hex encoded public key of the device pairing path.
    identifier: String,
}

/// All rows owned by the local wallet.
///
/// Row order is insertion order. Uniqueness is enforced by the operations
/// below: one wallet per device identifier, one identity per
/// `(wallet, identity_number)`, one credential per `cred_id`, one account and
/// one address-book entry per address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDatabase {
    wallets: Vec<Wallet>,
    identities: Vec<Identity>,
    credentials: Vec<Credential>,
    accounts: Vec<Account>,
    address_book: Vec<AddressBookEntry>,
}

impl WalletDatabase {
    // Wallets

    /// Returns the wallet paired with the device `identifier`, pairing it first if needed.
    pub fn wallet_id_for(&mut self, identifier: &[u8]) -> WalletId {
        let identifier = hex::encode(identifier);
        if let Some(wallet) = self.wallets.iter().find(|w| w.identifier == identifier) {
            return wallet.id;
        }
        let id = WalletId(self.wallets.iter().map(|w| w.id.0).max().unwrap_or(0) + 1);
        log::info!("paired new wallet {id}");
        self.wallets.push(Wallet { id, identifier });
        id
    }

    // Identities

    /// Every stored identity.
    #[must_use]
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Identities of one wallet, in insertion order.
    pub fn identities_of_wallet(&self, wallet_id: WalletId) -> impl Iterator<Item = &Identity> {
        self.identities
            .iter()
            .filter(move |identity| identity.wallet_id == wallet_id)
    }

    /// Looks up an identity by its number on the device.
    #[must_use]
    pub fn find_identity(&self, wallet_id: WalletId, identity_number: u32) -> Option<&Identity> {
        self.identities_of_wallet(wallet_id)
            .find(|identity| identity.identity_number == identity_number)
    }

    /// Inserts an identity and returns it with its assigned row id.
    ///
    /// # Errors
    /// Returns [`StorageError::Conflict`] if the wallet already has an identity
    /// with the same number.
    pub fn insert_identity(&mut self, identity: NewIdentity) -> StorageResult<Identity> {
        if self
            .find_identity(identity.wallet_id, identity.identity_number)
            .is_some()
        {
            return Err(StorageError::Conflict(format!(
                "wallet {} already has identity number {}",
                identity.wallet_id, identity.identity_number
            )));
        }
        let id = IdentityId(self.identities.iter().map(|i| i.id.0).max().unwrap_or(0) + 1);
        let identity = identity.into_identity(id);
        self.identities.push(identity.clone());
        Ok(identity)
    }

    // Credentials

    /// Every stored credential.
    #[must_use]
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// The first credential number not yet used by `identity_id`: the highest
    /// stored number plus one, or `0` if the identity has no credentials.
    #[must_use]
    pub fn next_credential_number(&self, identity_id: IdentityId) -> u32 {
        self.credentials
            .iter()
            .filter(|credential| credential.identity_id == identity_id)
            .map(|credential| credential.credential_number + 1)
            .max()
            .unwrap_or(0)
    }

    /// Inserts credentials keyed by `cred_id`. Already known ids are skipped.
    pub fn import_credentials(
        &mut self,
        credentials: impl IntoIterator<Item = Credential>,
    ) -> Vec<ImportOutcome> {
        credentials
            .into_iter()
            .map(|credential| {
                if self
                    .credentials
                    .iter()
                    .any(|stored| stored.cred_id == credential.cred_id)
                {
                    ImportOutcome::NoOp
                } else {
                    self.credentials.push(credential);
                    ImportOutcome::Applied
                }
            })
            .collect()
    }

    // Accounts

    /// Every stored account.
    #[must_use]
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Accounts stored under `address`.
    #[must_use]
    pub fn find_accounts_by_address(&self, address: &AccountAddress) -> Vec<&Account> {
        self.accounts
            .iter()
            .filter(|account| account.address == *address)
            .collect()
    }

    /// Inserts an account unless one with the same address exists.
    pub fn import_account(&mut self, account: Account) -> ImportOutcome {
        if self.find_accounts_by_address(&account.address).is_empty() {
            self.accounts.push(account);
            ImportOutcome::Applied
        } else {
            ImportOutcome::NoOp
        }
    }

    // Address book

    /// Every address-book entry.
    #[must_use]
    pub fn address_book(&self) -> &[AddressBookEntry] {
        &self.address_book
    }

    /// The address-book entry for `address`, if any.
    #[must_use]
    pub fn address_book_entry(&self, address: &AccountAddress) -> Option<&AddressBookEntry> {
        self.address_book
            .iter()
            .find(|entry| entry.address == *address)
    }

    /// Inserts an address-book entry unless one for the same address exists.
    pub fn import_address_book_entry(&mut self, entry: AddressBookEntry) -> ImportOutcome {
        if self.address_book_entry(&entry.address).is_some() {
            ImportOutcome::NoOp
        } else {
            self.address_book.push(entry);
            ImportOutcome::Applied
        }
    }

    /// Makes the entry for `address` read-only. Returns whether anything changed.
    pub fn mark_address_book_entry_read_only(&mut self, address: &AccountAddress) -> bool {
        match self
            .address_book
            .iter_mut()
            .find(|entry| entry.address == *address)
        {
            Some(entry) if !entry.read_only => {
                entry.read_only = true;
                true
            }
            _ => false,
        }
    }
}
