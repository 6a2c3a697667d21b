use recoverykit_core::{Account, WalletDatabase};
use serde::Serialize;

use super::CliStore;
use crate::output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountRow<'a> {
    #[serde(flatten)]
    account: &'a Account,
    identity_number: Option<u32>,
    read_only: bool,
}

fn rows(db: &WalletDatabase) -> Vec<AccountRow<'_>> {
    db.accounts()
        .iter()
        .map(|account| AccountRow {
            account,
            identity_number: db
                .identities()
                .iter()
                .find(|identity| identity.id == account.identity_id)
                .map(|identity| identity.identity_number),
            read_only: db
                .address_book_entry(&account.address)
                .is_some_and(|entry| entry.read_only),
        })
        .collect()
}

fn render(rows: &[AccountRow<'_>]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                row.account.address.to_string(),
                row.account.name.clone(),
                row.identity_number
                    .map_or_else(|| "-".to_string(), |n| n.to_string()),
                if row.account.is_initial { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    output::table(&["ADDRESS", "NAME", "IDENTITY", "INITIAL"], &cells)
}

pub fn run(store: &CliStore, json: bool) -> eyre::Result<()> {
    let db = store.snapshot()?;
    let rows = rows(&db);
    if json {
        return output::print_json(&rows);
    }
    if rows.is_empty() {
        println!("no accounts in the wallet store");
    } else {
        println!("{}", render(&rows));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use recoverykit_core::{
        AccountAddress, AccountStatus, AddressBookEntry, FsBlobStore, WalletStore,
    };

    use super::*;

    #[test]
    fn test_rows_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::open(FsBlobStore::new(dir.path()).unwrap()).unwrap();
        let address = AccountAddress::new([9; 32]);
        store
            .with_txn(|db| {
                let wallet_id = db.wallet_id_for(b"device");
                let identity = db.insert_identity(recoverykit_core::recovered_identity(wallet_id, 4))?;
                db.import_account(Account {
                    address,
                    name: "Savings".to_string(),
                    identity_id: identity.id,
                    status: AccountStatus::Confirmed,
                    signature_threshold: 1,
                    is_initial: false,
                });
                db.import_address_book_entry(AddressBookEntry {
                    address,
                    name: "Savings".to_string(),
                    note: None,
                    read_only: true,
                });
                Ok(())
            })
            .unwrap();

        let reopened = WalletStore::open(FsBlobStore::new(dir.path()).unwrap()).unwrap();
        let db = reopened.snapshot().unwrap();
        let rows = rows(&db);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].identity_number, Some(4));
        assert!(rows[0].read_only);

        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(json[0]["name"], "Savings");
        assert_eq!(json[0]["identityNumber"], 4);
        assert!(render(&rows).contains("Savings"));
    }
}
