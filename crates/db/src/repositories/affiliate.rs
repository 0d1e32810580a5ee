use chrono::Utc;
use sqlx::Row;

use kommo_sync_core::domain::affiliate::Referral;

use super::{AffiliateRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAffiliateRepository {
    pool: DbPool,
}

impl SqlAffiliateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AffiliateRepository for SqlAffiliateRepository {
    async fn find_referral_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Referral>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT referral_id, affiliate_id, reference
            FROM affiliate_referral
            WHERE reference = ?
            ORDER BY created_at, rowid
            LIMIT 1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Referral, RepositoryError> {
            Ok(Referral {
                referral_id: row.try_get("referral_id")?,
                affiliate_id: row.try_get("affiliate_id")?,
                reference: row.try_get("reference")?,
            })
        })
        .transpose()
    }

    async fn payment_email(&self, affiliate_id: i64) -> Result<Option<String>, RepositoryError> {
        let email = sqlx::query_scalar::<_, String>(
            "SELECT payment_email FROM affiliate WHERE affiliate_id = ?",
        )
        .bind(affiliate_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(email.filter(|email| !email.trim().is_empty()))
    }

    async fn record_referral(&self, referral: &Referral) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO affiliate_referral (referral_id, affiliate_id, reference, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(referral_id) DO UPDATE SET
                affiliate_id = excluded.affiliate_id,
                reference = excluded.reference
            "#,
        )
        .bind(&referral.referral_id)
        .bind(referral.affiliate_id)
        .bind(&referral.reference)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_affiliate(
        &self,
        affiliate_id: i64,
        payment_email: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO affiliate (affiliate_id, payment_email) VALUES (?, ?)
            ON CONFLICT(affiliate_id) DO UPDATE SET payment_email = excluded.payment_email
            "#,
        )
        .bind(affiliate_id)
        .bind(payment_email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use kommo_sync_core::domain::affiliate::{AffiliateAttribution, Referral};
    use kommo_sync_core::domain::order::OrderId;

    use super::SqlAffiliateRepository;
    use crate::repositories::AffiliateRepository;
    use crate::{connect_with_settings, migrations::run_pending};

    async fn repo() -> SqlAffiliateRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlAffiliateRepository::new(pool)
    }

    fn referral(referral_id: &str, affiliate_id: i64, reference: &str) -> Referral {
        Referral {
            referral_id: referral_id.to_owned(),
            affiliate_id,
            reference: reference.to_owned(),
        }
    }

    #[tokio::test]
    async fn attribution_resolves_referrer_payment_email() {
        let repo = repo().await;
        repo.save_affiliate(12, "ib@example.com").await.expect("affiliate");
        repo.record_referral(&referral("881", 12, "501")).await.expect("referral");

        let attribution = repo.attribution_for_order(OrderId(501)).await.expect("attribution");
        assert_eq!(
            attribution,
            AffiliateAttribution::new(Some("881".to_owned()), Some("ib@example.com".to_owned()))
        );
    }

    #[tokio::test]
    async fn unknown_affiliate_keeps_sentinel() {
        let repo = repo().await;
        repo.record_referral(&referral("882", 99, "502")).await.expect("referral");

        let attribution = repo.attribution_for_order(OrderId(502)).await.expect("attribution");
        assert_eq!(attribution.ib_code, "882");
        assert_eq!(attribution.affiliate_of, "0");
    }

    #[tokio::test]
    async fn order_without_referral_maps_to_sentinels() {
        let attribution =
            repo().await.attribution_for_order(OrderId(503)).await.expect("attribution");
        assert_eq!(attribution, AffiliateAttribution::default());
    }
}
