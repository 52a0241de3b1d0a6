//! Merchant identity: name normalization, secret hashing, operator binding.

use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::info;

use crate::db::DbConnection;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::Merchant;

#[derive(Clone)]
pub struct IdentityService {
    db: DbConnection,
}

/// Collapse a raw display name into the identity key: lowercase, `ё`
/// unified with `е`, everything that is not a letter treated as a word
/// separator, runs of separators collapsed to single spaces.
pub fn normalize_name(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(|c| c.to_lowercase()) {
        let c = if c == 'ё' { 'е' } else { c };
        if c.is_alphabetic() {
            cleaned.push(c);
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hash a login secret, salted with the merchant's normalized name so equal
/// secrets do not produce equal hashes.
pub fn hash_secret(normalized_name: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_name.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

impl IdentityService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_normalized_name(&self, name: &str) -> EngineResult<Option<Merchant>> {
        let row = sqlx::query(
            "SELECT id, display_name, normalized_name, secret_hash, operator_handle, territory_tag \
             FROM merchants WHERE normalized_name = ?",
        )
        .bind(normalize_name(name))
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(row_to_merchant))
    }

    pub async fn find_by_id(&self, merchant_id: &str) -> EngineResult<Option<Merchant>> {
        let row = sqlx::query(
            "SELECT id, display_name, normalized_name, secret_hash, operator_handle, territory_tag \
             FROM merchants WHERE id = ?",
        )
        .bind(merchant_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(row_to_merchant))
    }

    pub async fn find_by_operator_handle(&self, handle: &str) -> EngineResult<Option<Merchant>> {
        let row = sqlx::query(
            "SELECT id, display_name, normalized_name, secret_hash, operator_handle, territory_tag \
             FROM merchants WHERE operator_handle = ?",
        )
        .bind(handle)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(row_to_merchant))
    }

    /// Check a login secret against the stored hash.
    pub fn verify_secret(&self, merchant: &Merchant, secret: &str) -> bool {
        hash_secret(&merchant.normalized_name, secret) == merchant.secret_hash
    }

    /// Bind an operator handle to a merchant.
    ///
    /// Binding the already-bound handle is a no-op success; a different
    /// existing handle fails with [`EngineError::AlreadyBoundToOther`]. The
    /// update is a single conditional statement so two concurrent logins
    /// cannot both win.
    pub async fn bind(&self, merchant_id: &str, handle: &str) -> EngineResult<()> {
        let updated = sqlx::query(
            "UPDATE merchants SET operator_handle = ?1 \
             WHERE id = ?2 AND (operator_handle IS NULL OR operator_handle = ?1)",
        )
        .bind(handle)
        .bind(merchant_id)
        .execute(self.db.pool())
        .await?
        .rows_affected();

        if updated > 0 {
            info!(merchant_id, handle, "operator handle bound");
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM merchants WHERE id = ?")
            .bind(merchant_id)
            .fetch_optional(self.db.pool())
            .await?
            .is_some();

        if exists {
            Err(EngineError::AlreadyBoundToOther)
        } else {
            Err(EngineError::NotFound(format!("merchant {merchant_id}")))
        }
    }
}

pub(crate) fn row_to_merchant(row: sqlx::sqlite::SqliteRow) -> Merchant {
    Merchant {
        id: row.get("id"),
        display_name: row.get("display_name"),
        normalized_name: row.get("normalized_name"),
        secret_hash: row.get("secret_hash"),
        operator_handle: row.get("operator_handle"),
        territory_tag: row.get("territory_tag"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingest::IngestService;
    use shared::MerchantRow;

    async fn setup() -> (DbConnection, IdentityService) {
        let db = DbConnection::init_test().await.expect("test db");
        (db.clone(), IdentityService::new(db))
    }

    fn roster_row(name: &str) -> MerchantRow {
        MerchantRow {
            name: name.to_string(),
            secret: "1234".to_string(),
            territory_tag: "north".to_string(),
        }
    }

    #[test]
    fn normalization_unifies_case_yo_and_separators() {
        assert_eq!(normalize_name("Ёлкина  Анна"), normalize_name("елкина анна"));
        assert_eq!(normalize_name("  Иванов-Петров, И. "), "иванов петров и");
        assert_eq!(normalize_name("O'Brien  JOHN"), "o brien john");
    }

    #[tokio::test]
    async fn lookup_matches_any_spelling_that_normalizes_equal() {
        let (db, identity) = setup().await;
        IngestService::new(db)
            .apply_roster(&[roster_row("Ёлкина Анна")])
            .await
            .expect("roster");

        let found = identity
            .find_by_normalized_name("  елкина   АННА!!")
            .await
            .expect("lookup");
        assert!(found.is_some());
        assert_eq!(found.unwrap().display_name, "Ёлкина Анна");
    }

    #[tokio::test]
    async fn secret_verification_uses_salted_hash() {
        let (db, identity) = setup().await;
        IngestService::new(db)
            .apply_roster(&[roster_row("Анна")])
            .await
            .expect("roster");

        let merchant = identity
            .find_by_normalized_name("Анна")
            .await
            .expect("lookup")
            .expect("present");
        assert!(identity.verify_secret(&merchant, "1234"));
        assert!(!identity.verify_secret(&merchant, "4321"));
    }

    #[tokio::test]
    async fn bind_is_idempotent_but_rejects_a_second_handle() {
        let (db, identity) = setup().await;
        IngestService::new(db)
            .apply_roster(&[roster_row("Анна")])
            .await
            .expect("roster");
        let merchant = identity
            .find_by_normalized_name("Анна")
            .await
            .expect("lookup")
            .expect("present");

        identity.bind(&merchant.id, "@anna").await.expect("first bind");
        identity.bind(&merchant.id, "@anna").await.expect("same handle no-op");

        let err = identity.bind(&merchant.id, "@other").await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyBoundToOther));

        let by_handle = identity
            .find_by_operator_handle("@anna")
            .await
            .expect("by handle");
        assert_eq!(by_handle.map(|m| m.id), Some(merchant.id));
    }

    #[tokio::test]
    async fn bind_unknown_merchant_is_not_found() {
        let (_db, identity) = setup().await;
        let err = identity.bind("missing", "@x").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
