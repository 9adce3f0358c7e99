use crate::{
    meals::MealSelection,
    models::{
        Account, AuditLogEntry, AwayEntry, AwayPeriod, Meal, MealCounts, Payment, PaymentRecord,
        Student,
    },
    payments::{PaymentStatus, Settlement},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// The persistence contract used by the extractors and handlers. Handlers only see this
/// trait, which lets tests substitute an in-memory implementation.
///
/// **Send + Sync + async_trait** are required so the trait object (`Arc<dyn Repository>`)
/// can be shared across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Accounts & Identity ---
    async fn get_account(&self, id: Uuid) -> sqlx::Result<Option<Account>>;
    // Names of the legacy groups ("Admin", "Warden", ...) the account belongs to.
    async fn get_account_groups(&self, id: Uuid) -> sqlx::Result<Vec<String>>;
    // Case-insensitive lookup, used to refuse duplicate registrations early.
    async fn get_account_by_email(&self, email: &str) -> sqlx::Result<Option<Account>>;
    async fn create_account(&self, account: Account) -> sqlx::Result<Account>;
    async fn get_student(&self, id: Uuid) -> sqlx::Result<Option<Student>>;

    // --- Meals ---
    async fn get_meal(&self, student_id: Uuid, date: NaiveDate) -> sqlx::Result<Option<Meal>>;
    // Insert or overwrite the day's record. Always clears the away flag.
    async fn upsert_meal(
        &self,
        student_id: Uuid,
        date: NaiveDate,
        selection: MealSelection,
    ) -> sqlx::Result<Meal>;
    async fn get_meals_from(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        limit: i64,
    ) -> sqlx::Result<Vec<Meal>>;

    // --- Away Mode ---
    async fn is_away_on(&self, student_id: Uuid, date: NaiveDate) -> sqlx::Result<bool>;
    // Records the period and forces every meal in the inclusive range to away, atomically.
    async fn create_away_period(
        &self,
        student_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> sqlx::Result<AwayPeriod>;

    // --- Staff Reports ---
    async fn meal_counts(&self, date: NaiveDate) -> sqlx::Result<MealCounts>;
    async fn away_on(&self, date: NaiveDate) -> sqlx::Result<Vec<AwayEntry>>;
    async fn count_students(&self) -> sqlx::Result<i64>;
    // Raw role codes of every staff account (one entry per account).
    async fn staff_role_codes(&self) -> sqlx::Result<Vec<String>>;

    // --- Audit Trail ---
    async fn record_audit(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        detail: &str,
    ) -> sqlx::Result<()>;
    async fn recent_audit_logs(&self, limit: i64) -> sqlx::Result<Vec<AuditLogEntry>>;

    // --- Payments ---
    async fn create_payment(
        &self,
        student_id: Uuid,
        amount: i64,
        phone_number: &str,
        reference: &str,
    ) -> sqlx::Result<Payment>;
    async fn get_payment(&self, id: Uuid) -> sqlx::Result<Option<Payment>>;
    async fn get_payment_by_checkout(
        &self,
        checkout_request_id: &str,
    ) -> sqlx::Result<Option<Payment>>;
    // Newest first.
    async fn list_payments(&self, student_id: Uuid) -> sqlx::Result<Vec<Payment>>;
    async fn record_checkout(&self, id: Uuid, checkout_request_id: &str) -> sqlx::Result<Payment>;
    // Applies the settlement unless the stored status no longer allows it. None when unchanged.
    async fn settle_payment(
        &self,
        id: Uuid,
        settlement: &Settlement,
    ) -> sqlx::Result<Option<Payment>>;
    // Finance listing. `query` matches receipt, student name or university id.
    async fn search_payments(
        &self,
        status: Option<PaymentStatus>,
        query: Option<&str>,
        limit: i64,
    ) -> sqlx::Result<Vec<PaymentRecord>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Queries are checked at runtime,
/// so building the crate never needs a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MEAL_COLUMNS: &str = "student_id, date, breakfast, early, supper, away, submitted_at";
const PAYMENT_COLUMNS: &str = "id, student_id, amount, phone_number, reference, status, \
    checkout_request_id, transaction_id, description, created_at, updated_at";

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_account(&self, id: Uuid) -> sqlx::Result<Option<Account>> {
        sqlx::query_as::<_, Account>(
            "SELECT id, email, is_superuser, staff_role FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_account_groups(&self, id: Uuid) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT group_name FROM account_groups WHERE account_id = $1 ORDER BY group_name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_account_by_email(&self, email: &str) -> sqlx::Result<Option<Account>> {
        sqlx::query_as::<_, Account>(
            "SELECT id, email, is_superuser, staff_role FROM accounts WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// create_account
    ///
    /// Mirrors an account created at the identity provider. The id is the provider's user id.
    async fn create_account(&self, account: Account) -> sqlx::Result<Account> {
        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, email, is_superuser, staff_role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, is_superuser, staff_role
            "#,
        )
        .bind(account.id)
        .bind(account.email)
        .bind(account.is_superuser)
        .bind(account.staff_role)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_student(&self, id: Uuid) -> sqlx::Result<Option<Student>> {
        sqlx::query_as::<_, Student>(
            "SELECT id, university_id, full_name, room_number FROM students WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_meal(&self, student_id: Uuid, date: NaiveDate) -> sqlx::Result<Option<Meal>> {
        sqlx::query_as::<_, Meal>(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE student_id = $1 AND date = $2"
        ))
        .bind(student_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
    }

    async fn upsert_meal(
        &self,
        student_id: Uuid,
        date: NaiveDate,
        selection: MealSelection,
    ) -> sqlx::Result<Meal> {
        sqlx::query_as::<_, Meal>(&format!(
            r#"
            INSERT INTO meals (student_id, date, breakfast, early, supper, away, submitted_at)
            VALUES ($1, $2, $3, $4, $5, false, NOW())
            ON CONFLICT (student_id, date) DO UPDATE
            SET breakfast = EXCLUDED.breakfast,
                early = EXCLUDED.early,
                supper = EXCLUDED.supper,
                away = false,
                submitted_at = NOW()
            RETURNING {MEAL_COLUMNS}
            "#
        ))
        .bind(student_id)
        .bind(date)
        .bind(selection.breakfast)
        .bind(selection.early)
        .bind(selection.supper)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_meals_from(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        limit: i64,
    ) -> sqlx::Result<Vec<Meal>> {
        sqlx::query_as::<_, Meal>(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE student_id = $1 AND date >= $2 ORDER BY date LIMIT $3"
        ))
        .bind(student_id)
        .bind(from)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn is_away_on(&self, student_id: Uuid, date: NaiveDate) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM away_periods
                WHERE student_id = $1 AND start_date <= $2 AND end_date >= $2
            )
            "#,
        )
        .bind(student_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
    }

    /// create_away_period
    ///
    /// Inserts the period and reconciles the meal table in one transaction, using
    /// `generate_series` to touch every day of the range.
    async fn create_away_period(
        &self,
        student_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> sqlx::Result<AwayPeriod> {
        let mut tx = self.pool.begin().await?;

        let period = sqlx::query_as::<_, AwayPeriod>(
            r#"
            INSERT INTO away_periods (id, student_id, start_date, end_date, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, student_id, start_date, end_date, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO meals (student_id, date, breakfast, early, supper, away, submitted_at)
            SELECT $1, day::date, false, false, false, true, NOW()
            FROM generate_series($2::date, $3::date, interval '1 day') AS day
            ON CONFLICT (student_id, date) DO UPDATE
            SET breakfast = false, early = false, supper = false, away = true, submitted_at = NOW()
            "#,
        )
        .bind(student_id)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(period)
    }

    async fn meal_counts(&self, date: NaiveDate) -> sqlx::Result<MealCounts> {
        sqlx::query_as::<_, MealCounts>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE breakfast) AS breakfast,
                COUNT(*) FILTER (WHERE early) AS early,
                COUNT(*) FILTER (WHERE supper) AS supper,
                COUNT(*) FILTER (WHERE away) AS away
            FROM meals
            WHERE date = $1
            "#,
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await
    }

    async fn away_on(&self, date: NaiveDate) -> sqlx::Result<Vec<AwayEntry>> {
        sqlx::query_as::<_, AwayEntry>(
            r#"
            SELECT s.id AS student_id, s.university_id, s.full_name, a.start_date, a.end_date
            FROM away_periods a
            JOIN students s ON s.id = a.student_id
            WHERE a.start_date <= $1 AND a.end_date >= $1
            ORDER BY s.full_name
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
    }

    async fn count_students(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await
    }

    async fn staff_role_codes(&self) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT staff_role FROM accounts WHERE staff_role IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn record_audit(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        detail: &str,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO audit_logs (actor_id, action, detail, created_at) VALUES ($1, $2, $3, NOW())",
        )
        .bind(actor_id)
        .bind(action)
        .bind(detail)
        .execute(&self.pool)
        .await
        .map(|_| ())
    }

    async fn recent_audit_logs(&self, limit: i64) -> sqlx::Result<Vec<AuditLogEntry>> {
        sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT id, actor_id, action, detail, created_at
            FROM audit_logs
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_payment(
        &self,
        student_id: Uuid,
        amount: i64,
        phone_number: &str,
        reference: &str,
    ) -> sqlx::Result<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (id, student_id, amount, phone_number, reference, status)
            VALUES ($1, $2, $3, $4, $5, 'Pending')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(amount)
        .bind(phone_number)
        .bind(reference)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_payment(&self, id: Uuid) -> sqlx::Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_payment_by_checkout(
        &self,
        checkout_request_id: &str,
    ) -> sqlx::Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE checkout_request_id = $1"
        ))
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_payments(&self, student_id: Uuid) -> sqlx::Result<Vec<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE student_id = $1 ORDER BY created_at DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn record_checkout(&self, id: Uuid, checkout_request_id: &str) -> sqlx::Result<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments SET checkout_request_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(checkout_request_id)
        .fetch_one(&self.pool)
        .await
    }

    /// settle_payment
    ///
    /// The WHERE clause repeats the settlement rules, so a callback and a status query
    /// racing on the same payment cannot overwrite a completion.
    async fn settle_payment(
        &self,
        id: Uuid,
        settlement: &Settlement,
    ) -> sqlx::Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = $2,
                description = $3,
                transaction_id = COALESCE($4, transaction_id),
                updated_at = NOW()
            WHERE id = $1
              AND status <> 'Completed'
              AND ($2 = 'Completed' OR status = 'Pending')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(settlement.status)
        .bind(&settlement.description)
        .bind(settlement.receipt.as_deref())
        .fetch_optional(&self.pool)
        .await
    }

    async fn search_payments(
        &self,
        status: Option<PaymentStatus>,
        query: Option<&str>,
        limit: i64,
    ) -> sqlx::Result<Vec<PaymentRecord>> {
        sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT p.id, p.student_id, p.amount, p.phone_number, p.reference, p.status,
                   p.checkout_request_id, p.transaction_id, p.description, p.created_at,
                   p.updated_at, s.university_id, s.full_name
            FROM payments p
            JOIN students s ON s.id = p.student_id
            WHERE ($1::payment_status IS NULL OR p.status = $1)
              AND ($2::text IS NULL
                   OR p.transaction_id ILIKE '%' || $2 || '%'
                   OR s.full_name ILIKE '%' || $2 || '%'
                   OR s.university_id ILIKE '%' || $2 || '%')
            ORDER BY p.created_at DESC
            LIMIT $3
            "#,
        )
        .bind(status)
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
