//! Import of scan results into the wallet database.
//!
//! Everything found under one identity number is written in a single store
//! transaction, and every write is skip-if-present, so importing the same
//! result twice leaves the database as the first import left it.

use crate::store::{AtomicBlobStore, StorageResult, WalletDatabase, WalletStore};
use crate::types::{
    Account, AddressBookEntry, Identity, IdentityId, IdentityStatus, IdentityVersion, ImportOutcome,
    NewIdentity, RecoveredCredentials, WalletId, YearMonth,
};

/// Note attached to address-book entries created for recovered accounts.
pub const RECOVERED_ACCOUNT_NOTE: &str = "Recovered account";

/// Display name of an identity synthesized by recovery.
#[must_use]
pub fn recovered_identity_name(identity_number: u32) -> String {
    format!("Recovered - index {identity_number}")
}

/// Placeholder identity for an identity number with chain evidence but no local row.
///
/// The identity object carries no attributes and expires this month: the real
/// object is only held by the identity provider.
#[must_use]
pub fn recovered_identity(wallet_id: WalletId, identity_number: u32) -> NewIdentity {
    let now = YearMonth::current();
    let identity_object = serde_json::json!({
        "attributeList": {
            "chosenAttributes": {},
            "createdAt": now.as_str(),
            "validTo": now.as_str(),
            "maxAccounts": 0,
        },
    });
    NewIdentity {
        wallet_id,
        identity_number,
        name: recovered_identity_name(identity_number),
        status: IdentityStatus::Recovered,
        version: IdentityVersion::Current,
        identity_object: identity_object.to_string(),
    }
}

/// Rows written by one import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Identity the rows were filed under; `None` when nothing was found.
    pub identity_id: Option<IdentityId>,
    /// Whether a placeholder identity was created.
    pub identity_created: bool,
    /// Accounts inserted.
    pub accounts_added: usize,
    /// Accounts already present, by address.
    pub accounts_skipped: usize,
    /// Credentials inserted.
    pub credentials_added: usize,
    /// Credentials already present, by id.
    pub credentials_skipped: usize,
    /// Address-book entries inserted.
    pub address_book_added: usize,
}

/// Imports the result of scanning `identity_number`.
///
/// An empty result writes nothing. Otherwise, inside one transaction:
///
/// - unless `known` is given (or the identity was stored meanwhile), a
///   placeholder identity is inserted and every pair is re-tagged with its id
/// - accounts whose address is already stored are skipped; new ones get a
///   read-only address-book entry, or take over the name of an existing entry,
///   which becomes read-only
/// - credentials already stored under the same id are skipped
///
/// # Errors
/// Returns an error if the store cannot be read or written. Nothing is
/// written in that case.
pub fn import_recovered<B: AtomicBlobStore>(
    store: &WalletStore<B>,
    wallet_id: WalletId,
    identity_number: u32,
    known: Option<&Identity>,
    recovered: RecoveredCredentials,
) -> StorageResult<ImportSummary> {
    if recovered.is_empty() {
        return Ok(ImportSummary {
            identity_id: known.map(|identity| identity.id),
            ..ImportSummary::default()
        });
    }

    store.with_txn(move |db| {
        let mut summary = ImportSummary::default();
        let existing = known
            .map(|identity| identity.id)
            .or_else(|| db.find_identity(wallet_id, identity_number).map(|identity| identity.id));
        let identity_id = match existing {
            Some(identity_id) => identity_id,
            None => {
                let identity = db.insert_identity(recovered_identity(wallet_id, identity_number))?;
                log::info!("created recovered identity {identity_number}");
                summary.identity_created = true;
                identity.id
            }
        };
        summary.identity_id = Some(identity_id);

        let mut recovered = recovered;
        for pair in recovered.pairs_mut() {
            pair.assign_identity(identity_id);
        }

        for account in recovered.accounts() {
            import_account(db, account.clone(), &mut summary);
        }

        for outcome in db.import_credentials(recovered.credentials().cloned()) {
            match outcome {
                ImportOutcome::Applied => summary.credentials_added += 1,
                ImportOutcome::NoOp => summary.credentials_skipped += 1,
            }
        }

        Ok(summary)
    })
}

fn import_account(
    db: &mut WalletDatabase,
    mut account: Account,
    summary: &mut ImportSummary,
) {
    if !db.find_accounts_by_address(&account.address).is_empty() {
        summary.accounts_skipped += 1;
        return;
    }

    if let Some(entry) = db.address_book_entry(&account.address) {
        account.name.clone_from(&entry.name);
        db.mark_address_book_entry_read_only(&account.address);
    } else {
        let entry = AddressBookEntry {
            address: account.address,
            name: account.name.clone(),
            note: Some(RECOVERED_ACCOUNT_NOTE.to_string()),
            read_only: true,
        };
        if db.import_address_book_entry(entry) == ImportOutcome::Applied {
            summary.address_book_added += 1;
        }
    }

    if db.import_account(account) == ImportOutcome::Applied {
        summary.accounts_added += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::store::MemoryBlobStore;
    use crate::types::{AccountAddress, AccountStatus, Credential, CredentialId, Policy, RecoveredPair};

    fn pair(account: u8, credential_number: u32) -> RecoveredPair {
        let address = AccountAddress::new([account; 32]);
        RecoveredPair {
            account: Account {
                address,
                name: address.to_base58()[..8].to_string(),
                identity_id: IdentityId::UNASSIGNED,
                status: AccountStatus::Confirmed,
                signature_threshold: 1,
                is_initial: credential_number == 0,
            },
            credential: Credential {
                cred_id: CredentialId::new([u8::try_from(credential_number).unwrap(); 48]),
                identity_id: IdentityId::UNASSIGNED,
                account_address: address,
                credential_number,
                credential_index: Some(0),
                policy: Policy {
                    created_at: YearMonth::from("202401"),
                    valid_to: YearMonth::from("202901"),
                    revealed_attributes: BTreeMap::new(),
                },
            },
        }
    }

    fn scan_result() -> RecoveredCredentials {
        // Credentials 0 and 2 sit on the same account
        RecoveredCredentials::new(vec![pair(1, 0), pair(1, 2), pair(2, 5)])
    }

    fn store() -> (WalletStore<MemoryBlobStore>, WalletId) {
        let store = WalletStore::open(MemoryBlobStore::new()).unwrap();
        let wallet_id = store.with_txn(|db| Ok(db.wallet_id_for(b"device"))).unwrap();
        (store, wallet_id)
    }

    #[test]
    fn test_creates_placeholder_identity_and_retags_rows() {
        let (store, wallet_id) = store();
        let summary = import_recovered(&store, wallet_id, 3, None, scan_result()).unwrap();

        assert!(summary.identity_created);
        assert_eq!(summary.accounts_added, 2);
        assert_eq!(summary.accounts_skipped, 1);
        assert_eq!(summary.credentials_added, 3);
        assert_eq!(summary.address_book_added, 2);

        let db = store.snapshot().unwrap();
        let identity = db.find_identity(wallet_id, 3).unwrap();
        assert_eq!(summary.identity_id, Some(identity.id));
        assert_eq!(identity.name, "Recovered - index 3");
        assert_eq!(identity.status, IdentityStatus::Recovered);
        assert_eq!(identity.version, IdentityVersion::Current);

        let object: serde_json::Value = serde_json::from_str(&identity.identity_object).unwrap();
        assert_eq!(object["attributeList"]["maxAccounts"], 0);
        assert!(object["attributeList"]["chosenAttributes"]
            .as_object()
            .unwrap()
            .is_empty());

        assert!(db.accounts().iter().all(|a| a.identity_id == identity.id));
        assert!(db.credentials().iter().all(|c| c.identity_id == identity.id));
        assert!(db.address_book().iter().all(|entry| entry.read_only
            && entry.note.as_deref() == Some(RECOVERED_ACCOUNT_NOTE)));
    }

    #[test]
    fn test_import_is_idempotent() {
        let (store, wallet_id) = store();
        import_recovered(&store, wallet_id, 0, None, scan_result()).unwrap();
        let after_first = store.snapshot().unwrap();

        let summary = import_recovered(&store, wallet_id, 0, None, scan_result()).unwrap();
        assert!(!summary.identity_created);
        assert_eq!(summary.accounts_added, 0);
        assert_eq!(summary.credentials_added, 0);
        assert_eq!(summary.credentials_skipped, 3);
        assert_eq!(summary.address_book_added, 0);
        assert_eq!(store.snapshot().unwrap(), after_first);
    }

    #[test]
    fn test_known_identity_is_reused() {
        let (store, wallet_id) = store();
        let known = store
            .with_txn(|db| {
                db.insert_identity(NewIdentity {
                    name: "Main".to_string(),
                    status: IdentityStatus::Confirmed,
                    ..recovered_identity(wallet_id, 0)
                })
            })
            .unwrap();

        let summary = import_recovered(&store, wallet_id, 0, Some(&known), scan_result()).unwrap();
        assert!(!summary.identity_created);
        assert_eq!(summary.identity_id, Some(known.id));
        assert_eq!(store.snapshot().unwrap().identities().len(), 1);
    }

    #[test]
    fn test_existing_address_book_entry_names_the_account() {
        let (store, wallet_id) = store();
        store
            .with_txn(|db| {
                db.import_address_book_entry(AddressBookEntry {
                    address: AccountAddress::new([2; 32]),
                    name: "Cold storage".to_string(),
                    note: None,
                    read_only: false,
                });
                Ok(())
            })
            .unwrap();

        let summary = import_recovered(&store, wallet_id, 0, None, scan_result()).unwrap();
        assert_eq!(summary.address_book_added, 1);

        let db = store.snapshot().unwrap();
        let account = db.find_accounts_by_address(&AccountAddress::new([2; 32]))[0];
        assert_eq!(account.name, "Cold storage");
        let entry = db.address_book_entry(&AccountAddress::new([2; 32])).unwrap();
        assert!(entry.read_only);
        assert_eq!(entry.note, None);
        assert_eq!(db.address_book().len(), 2);
    }

    #[test]
    fn test_empty_result_writes_nothing() {
        let (store, wallet_id) = store();
        let before = store.snapshot().unwrap();
        let summary =
            import_recovered(&store, wallet_id, 9, None, RecoveredCredentials::default()).unwrap();
        assert_eq!(summary, ImportSummary::default());
        assert_eq!(store.snapshot().unwrap(), before);
    }
}
