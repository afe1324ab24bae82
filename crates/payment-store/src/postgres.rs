use async_trait::async_trait;
use chrono::Utc;
use common::{AccountId, AttemptId, PaymentId, PaymentMethodId, TransactionId};
use domain::{AttemptState, Money, Payment, PaymentAttempt, PaymentTransaction};
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{PaymentStore, Result, StoreError};

const ATTEMPT_COLUMNS: &str = "attempt_id, account_id, payment_id, transaction_id, \
     payment_external_key, transaction_external_key, transaction_type, requested_amount, \
     requested_currency, requested_payment_method_id, submitted_amount, submitted_currency, \
     submitted_payment_method_id, plugin_names, properties, state, sub_attempts, \
     failure_reason, callback_errors, created_at, updated_at";

/// PostgreSQL-backed payment store implementation.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    /// Creates a new PostgreSQL payment store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_attempt(row: PgRow) -> Result<PaymentAttempt> {
        let state: String = row.try_get("state")?;
        let submitted_currency: Option<String> = row.try_get("submitted_currency")?;
        let sub_attempts: i32 = row.try_get("sub_attempts")?;

        Ok(PaymentAttempt {
            attempt_id: AttemptId::from_uuid(row.try_get("attempt_id")?),
            account_id: AccountId::from_uuid(row.try_get("account_id")?),
            payment_id: row
                .try_get::<Option<Uuid>, _>("payment_id")?
                .map(PaymentId::from_uuid),
            transaction_id: row
                .try_get::<Option<Uuid>, _>("transaction_id")?
                .map(TransactionId::from_uuid),
            payment_external_key: row.try_get("payment_external_key")?,
            transaction_external_key: row.try_get("transaction_external_key")?,
            transaction_type: parse_text(row.try_get("transaction_type")?)?,
            requested_amount: Money::from_cents(row.try_get("requested_amount")?),
            requested_currency: parse_text(row.try_get("requested_currency")?)?,
            requested_payment_method_id: row
                .try_get::<Option<Uuid>, _>("requested_payment_method_id")?
                .map(PaymentMethodId::from_uuid),
            submitted_amount: row
                .try_get::<Option<i64>, _>("submitted_amount")?
                .map(Money::from_cents),
            submitted_currency: submitted_currency.map(parse_text).transpose()?,
            submitted_payment_method_id: row
                .try_get::<Option<Uuid>, _>("submitted_payment_method_id")?
                .map(PaymentMethodId::from_uuid),
            plugin_names: serde_json::from_value(row.try_get("plugin_names")?)?,
            properties: serde_json::from_value(row.try_get("properties")?)?,
            state: state
                .parse::<AttemptState>()
                .map_err(StoreError::CorruptRecord)?,
            sub_attempts: u32::try_from(sub_attempts)
                .map_err(|_| StoreError::CorruptRecord(format!("sub_attempts {sub_attempts}")))?,
            failure_reason: row.try_get("failure_reason")?,
            callback_errors: serde_json::from_value(row.try_get("callback_errors")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_transaction(row: PgRow) -> Result<PaymentTransaction> {
        Ok(PaymentTransaction {
            id: TransactionId::from_uuid(row.try_get("id")?),
            attempt_id: row
                .try_get::<Option<Uuid>, _>("attempt_id")?
                .map(AttemptId::from_uuid),
            external_key: row.try_get("external_key")?,
            transaction_type: parse_text(row.try_get("transaction_type")?)?,
            amount: Money::from_cents(row.try_get("amount")?),
            currency: parse_text(row.try_get("currency")?)?,
            payment_method_id: PaymentMethodId::from_uuid(row.try_get("payment_method_id")?),
            status: parse_text(row.try_get("status")?)?,
            gateway_reference: row.try_get("gateway_reference")?,
            gateway_message: row.try_get("gateway_message")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn insert_transaction(
        tx: &mut Transaction<'_, Postgres>,
        payment_id: PaymentId,
        transaction: &PaymentTransaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (id, payment_id, attempt_id, external_key, transaction_type,
                amount, currency, payment_method_id, status, gateway_reference, gateway_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(payment_id.as_uuid())
        .bind(transaction.attempt_id.map(|id| id.as_uuid()))
        .bind(&transaction.external_key)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.amount.cents())
        .bind(transaction.currency.as_str())
        .bind(transaction.payment_method_id.as_uuid())
        .bind(transaction.status.as_str())
        .bind(&transaction.gateway_reference)
        .bind(&transaction.gateway_message)
        .bind(transaction.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn load_transactions(&self, payment_id: PaymentId) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, attempt_id, external_key, transaction_type, amount, currency,
                   payment_method_id, status, gateway_reference, gateway_message, created_at
            FROM payment_transactions
            WHERE payment_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(payment_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn row_to_payment(&self, row: PgRow) -> Result<Payment> {
        let payment_id = PaymentId::from_uuid(row.try_get("id")?);
        let transactions = self.load_transactions(payment_id).await?;

        Ok(Payment::restore(
            payment_id,
            AccountId::from_uuid(row.try_get("account_id")?),
            PaymentMethodId::from_uuid(row.try_get("payment_method_id")?),
            row.try_get("external_key")?,
            parse_text(row.try_get("currency")?)?,
            transactions,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }
}

/// Parses a text column holding a serde-named enum variant.
fn parse_text<T: DeserializeOwned>(value: String) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.clone()))
        .map_err(|_| StoreError::CorruptRecord(format!("unexpected value '{value}'")))
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn save_attempt(&self, attempt: &PaymentAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_attempts (attempt_id, account_id, payment_id, transaction_id,
                payment_external_key, transaction_external_key, transaction_type, requested_amount,
                requested_currency, requested_payment_method_id, submitted_amount, submitted_currency,
                submitted_payment_method_id, plugin_names, properties, state, sub_attempts,
                failure_reason, callback_errors, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (attempt_id) DO UPDATE SET
                payment_id = EXCLUDED.payment_id,
                transaction_id = EXCLUDED.transaction_id,
                submitted_amount = EXCLUDED.submitted_amount,
                submitted_currency = EXCLUDED.submitted_currency,
                submitted_payment_method_id = EXCLUDED.submitted_payment_method_id,
                state = EXCLUDED.state,
                sub_attempts = EXCLUDED.sub_attempts,
                failure_reason = EXCLUDED.failure_reason,
                callback_errors = EXCLUDED.callback_errors,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(attempt.attempt_id.as_uuid())
        .bind(attempt.account_id.as_uuid())
        .bind(attempt.payment_id.map(|id| id.as_uuid()))
        .bind(attempt.transaction_id.map(|id| id.as_uuid()))
        .bind(&attempt.payment_external_key)
        .bind(&attempt.transaction_external_key)
        .bind(attempt.transaction_type.as_str())
        .bind(attempt.requested_amount.cents())
        .bind(attempt.requested_currency.as_str())
        .bind(attempt.requested_payment_method_id.map(|id| id.as_uuid()))
        .bind(attempt.submitted_amount.map(|m| m.cents()))
        .bind(attempt.submitted_currency.map(|c| c.as_str()))
        .bind(attempt.submitted_payment_method_id.map(|id| id.as_uuid()))
        .bind(serde_json::to_value(&attempt.plugin_names)?)
        .bind(serde_json::to_value(&attempt.properties)?)
        .bind(attempt.state.as_str())
        .bind(attempt.sub_attempts as i32)
        .bind(&attempt.failure_reason)
        .bind(serde_json::to_value(&attempt.callback_errors)?)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_attempt(&self, attempt_id: AttemptId) -> Result<Option<PaymentAttempt>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE attempt_id = $1"
        ))
        .bind(attempt_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_attempt).transpose()
    }

    async fn attempts_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentAttempt>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE payment_id = $1 ORDER BY created_at ASC"
        ))
        .bind(payment_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_attempt).collect()
    }

    async fn save_payment(&self, payment: &Payment) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payments (id, account_id, payment_method_id, external_key, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                payment_method_id = EXCLUDED.payment_method_id,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.account_id().as_uuid())
        .bind(payment.payment_method_id().as_uuid())
        .bind(payment.external_key())
        .bind(payment.currency().as_str())
        .bind(payment.created_at())
        .bind(payment.updated_at())
        .execute(&mut *tx)
        .await?;

        for transaction in payment.transactions() {
            Self::insert_transaction(&mut tx, payment.id(), transaction).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_transaction(
        &self,
        payment_id: PaymentId,
        transaction: &PaymentTransaction,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Mirrors Payment::record_transaction: a successful initial
        // transaction pins the payment method.
        let pins_method =
            transaction.is_success() && transaction.transaction_type.is_initial();
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET updated_at = $2,
                payment_method_id = CASE WHEN $3 THEN $4 ELSE payment_method_id END
            WHERE id = $1
            "#,
        )
        .bind(payment_id.as_uuid())
        .bind(Utc::now())
        .bind(pins_method)
        .bind(transaction.payment_method_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::PaymentNotFound(payment_id));
        }

        Self::insert_transaction(&mut tx, payment_id, transaction).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, payment_method_id, external_key, currency, created_at, updated_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(payment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_payment(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_payment_by_external_key(&self, external_key: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, payment_method_id, external_key, currency, created_at, updated_at
            FROM payments
            WHERE external_key = $1
            "#,
        )
        .bind(external_key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_payment(row).await?)),
            None => Ok(None),
        }
    }
}
