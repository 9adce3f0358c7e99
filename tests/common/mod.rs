#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::response::Response;
use campuscare_portal::{
    AppState,
    auth::Claims,
    config::AppConfig,
    error::ApiError,
    meals::MealSelection,
    models::{
        Account, AuditLogEntry, AwayEntry, AwayPeriod, Meal, MealCounts, Payment, PaymentRecord,
        Student,
    },
    payments::{
        DEFAULT_REFERENCE, PaymentGateway, PaymentStatus, Settlement, StkPushRequest,
        StkPushResponse, StkQueryResponse,
    },
    repository::Repository,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use uuid::Uuid;

// --- In-Memory Repository ---

// Backs every handler, guard and extractor test. Each table is a plain collection behind a
// mutex so tests can seed it up front and inspect it afterwards.
#[derive(Default)]
pub struct MockRepo {
    pub accounts: Mutex<HashMap<Uuid, Account>>,
    pub groups: Mutex<HashMap<Uuid, Vec<String>>>,
    pub students: Mutex<HashMap<Uuid, Student>>,
    pub meals: Mutex<HashMap<(Uuid, NaiveDate), Meal>>,
    pub away_periods: Mutex<Vec<AwayPeriod>>,
    pub audit: Mutex<Vec<AuditLogEntry>>,
    // Insertion order; listings return newest first.
    pub payments: Mutex<Vec<Payment>>,
}

impl MockRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_account(&self, id: Uuid, is_superuser: bool, staff_role: Option<&str>) {
        self.accounts.lock().unwrap().insert(
            id,
            Account {
                id,
                email: format!("{}@campus.test", id.simple()),
                is_superuser,
                staff_role: staff_role.map(str::to_string),
            },
        );
    }

    /// A plain account with no staff profile.
    pub fn with_account(self, id: Uuid) -> Self {
        self.insert_account(id, false, None);
        self
    }

    /// A staff account whose stored role is `role_code` (not validated, like the column).
    pub fn with_staff(self, id: Uuid, role_code: &str) -> Self {
        self.insert_account(id, false, Some(role_code));
        self
    }

    pub fn with_superuser(self, id: Uuid) -> Self {
        self.insert_account(id, true, None);
        self
    }

    pub fn with_group(self, id: Uuid, group: &str) -> Self {
        self.groups
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push(group.to_string());
        self
    }

    /// An account with a student profile.
    pub fn with_student(self, id: Uuid, full_name: &str) -> Self {
        self.insert_account(id, false, None);
        self.students.lock().unwrap().insert(
            id,
            Student {
                id,
                university_id: format!("S{}", &id.simple().to_string()[..6]),
                full_name: full_name.to_string(),
                room_number: Some("B12".to_string()),
            },
        );
        self
    }

    pub fn with_meal(self, student_id: Uuid, date: NaiveDate, selection: MealSelection) -> Self {
        self.meals
            .lock()
            .unwrap()
            .insert((student_id, date), meal_row(student_id, date, selection, false));
        self
    }

    pub fn with_away_period(self, student_id: Uuid, start: NaiveDate, end: NaiveDate) -> Self {
        self.away_periods.lock().unwrap().push(AwayPeriod {
            id: Uuid::new_v4(),
            student_id,
            start_date: start,
            end_date: end,
            created_at: Utc::now(),
        });
        self
    }

    pub fn with_payment(self, payment: Payment) -> Self {
        self.payments.lock().unwrap().push(payment);
        self
    }

    pub fn stored_payment(&self, id: Uuid) -> Option<Payment> {
        self.payments
            .lock()
            .unwrap()
            .iter()
            .find(|payment| payment.id == id)
            .cloned()
    }

    pub fn meal(&self, student_id: Uuid, date: NaiveDate) -> Option<Meal> {
        self.meals.lock().unwrap().get(&(student_id, date)).cloned()
    }

    pub fn audit_actions(&self) -> Vec<String> {
        self.audit
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.action.clone())
            .collect()
    }
}

/// A payment row as the portal stores it, for seeding.
pub fn payment_row(student_id: Uuid, status: PaymentStatus, checkout: Option<&str>) -> Payment {
    Payment {
        id: Uuid::new_v4(),
        student_id,
        amount: 1500,
        phone_number: "254712345678".to_string(),
        reference: DEFAULT_REFERENCE.to_string(),
        status,
        checkout_request_id: checkout.map(str::to_string),
        transaction_id: None,
        description: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn meal_row(student_id: Uuid, date: NaiveDate, selection: MealSelection, away: bool) -> Meal {
    Meal {
        student_id,
        date,
        breakfast: selection.breakfast,
        early: selection.early,
        supper: selection.supper,
        away,
        submitted_at: Utc::now(),
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn get_account(&self, id: Uuid) -> sqlx::Result<Option<Account>> {
        Ok(self.accounts.lock().unwrap().get(&id).cloned())
    }

    async fn get_account_groups(&self, id: Uuid) -> sqlx::Result<Vec<String>> {
        Ok(self.groups.lock().unwrap().get(&id).cloned().unwrap_or_default())
    }

    async fn get_account_by_email(&self, email: &str) -> sqlx::Result<Option<Account>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|account| account.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_account(&self, account: Account) -> sqlx::Result<Account> {
        self.accounts
            .lock()
            .unwrap()
            .insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_student(&self, id: Uuid) -> sqlx::Result<Option<Student>> {
        Ok(self.students.lock().unwrap().get(&id).cloned())
    }

    async fn get_meal(&self, student_id: Uuid, date: NaiveDate) -> sqlx::Result<Option<Meal>> {
        Ok(self.meal(student_id, date))
    }

    async fn upsert_meal(
        &self,
        student_id: Uuid,
        date: NaiveDate,
        selection: MealSelection,
    ) -> sqlx::Result<Meal> {
        let row = meal_row(student_id, date, selection, false);
        self.meals
            .lock()
            .unwrap()
            .insert((student_id, date), row.clone());
        Ok(row)
    }

    async fn get_meals_from(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        limit: i64,
    ) -> sqlx::Result<Vec<Meal>> {
        let mut meals: Vec<Meal> = self
            .meals
            .lock()
            .unwrap()
            .values()
            .filter(|meal| meal.student_id == student_id && meal.date >= from)
            .cloned()
            .collect();
        meals.sort_by_key(|meal| meal.date);
        meals.truncate(limit as usize);
        Ok(meals)
    }

    async fn is_away_on(&self, student_id: Uuid, date: NaiveDate) -> sqlx::Result<bool> {
        Ok(self.away_periods.lock().unwrap().iter().any(|period| {
            period.student_id == student_id && period.start_date <= date && period.end_date >= date
        }))
    }

    async fn create_away_period(
        &self,
        student_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> sqlx::Result<AwayPeriod> {
        let period = AwayPeriod {
            id: Uuid::new_v4(),
            student_id,
            start_date: start,
            end_date: end,
            created_at: Utc::now(),
        };
        self.away_periods.lock().unwrap().push(period.clone());

        let mut meals = self.meals.lock().unwrap();
        for day in start.iter_days().take_while(|day| *day <= end) {
            meals.insert(
                (student_id, day),
                meal_row(student_id, day, MealSelection::default(), true),
            );
        }
        Ok(period)
    }

    async fn meal_counts(&self, date: NaiveDate) -> sqlx::Result<MealCounts> {
        let meals = self.meals.lock().unwrap();
        let day: Vec<&Meal> = meals.values().filter(|meal| meal.date == date).collect();
        let count = |pick: fn(&Meal) -> bool| day.iter().filter(|meal| pick(meal)).count() as i64;
        Ok(MealCounts {
            breakfast: count(|meal| meal.breakfast),
            early: count(|meal| meal.early),
            supper: count(|meal| meal.supper),
            away: count(|meal| meal.away),
        })
    }

    async fn away_on(&self, date: NaiveDate) -> sqlx::Result<Vec<AwayEntry>> {
        let students = self.students.lock().unwrap();
        let mut entries: Vec<AwayEntry> = self
            .away_periods
            .lock()
            .unwrap()
            .iter()
            .filter(|period| period.start_date <= date && period.end_date >= date)
            .filter_map(|period| {
                students.get(&period.student_id).map(|student| AwayEntry {
                    student_id: student.id,
                    university_id: student.university_id.clone(),
                    full_name: student.full_name.clone(),
                    start_date: period.start_date,
                    end_date: period.end_date,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(entries)
    }

    async fn count_students(&self) -> sqlx::Result<i64> {
        Ok(self.students.lock().unwrap().len() as i64)
    }

    async fn staff_role_codes(&self) -> sqlx::Result<Vec<String>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .filter_map(|account| account.staff_role.clone())
            .collect())
    }

    async fn record_audit(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        detail: &str,
    ) -> sqlx::Result<()> {
        let mut audit = self.audit.lock().unwrap();
        let id = audit.len() as i64 + 1;
        audit.push(AuditLogEntry {
            id,
            actor_id,
            action: action.to_string(),
            detail: detail.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_audit_logs(&self, limit: i64) -> sqlx::Result<Vec<AuditLogEntry>> {
        Ok(self
            .audit
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn create_payment(
        &self,
        student_id: Uuid,
        amount: i64,
        phone_number: &str,
        reference: &str,
    ) -> sqlx::Result<Payment> {
        let payment = Payment {
            amount,
            phone_number: phone_number.to_string(),
            reference: reference.to_string(),
            ..payment_row(student_id, PaymentStatus::Pending, None)
        };
        self.payments.lock().unwrap().push(payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, id: Uuid) -> sqlx::Result<Option<Payment>> {
        Ok(self.stored_payment(id))
    }

    async fn get_payment_by_checkout(
        &self,
        checkout_request_id: &str,
    ) -> sqlx::Result<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .find(|payment| payment.checkout_request_id.as_deref() == Some(checkout_request_id))
            .cloned())
    }

    async fn list_payments(&self, student_id: Uuid) -> sqlx::Result<Vec<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|payment| payment.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn record_checkout(&self, id: Uuid, checkout_request_id: &str) -> sqlx::Result<Payment> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .iter_mut()
            .find(|payment| payment.id == id)
            .ok_or(sqlx::Error::RowNotFound)?;
        payment.checkout_request_id = Some(checkout_request_id.to_string());
        Ok(payment.clone())
    }

    async fn settle_payment(
        &self,
        id: Uuid,
        settlement: &Settlement,
    ) -> sqlx::Result<Option<Payment>> {
        let mut payments = self.payments.lock().unwrap();
        let Some(payment) = payments.iter_mut().find(|payment| payment.id == id) else {
            return Ok(None);
        };
        let allowed = payment.status != PaymentStatus::Completed
            && (settlement.status == PaymentStatus::Completed
                || payment.status == PaymentStatus::Pending);
        if !allowed {
            return Ok(None);
        }
        payment.status = settlement.status;
        payment.description = Some(settlement.description.clone());
        if settlement.receipt.is_some() {
            payment.transaction_id = settlement.receipt.clone();
        }
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn search_payments(
        &self,
        status: Option<PaymentStatus>,
        query: Option<&str>,
        limit: i64,
    ) -> sqlx::Result<Vec<PaymentRecord>> {
        let students = self.students.lock().unwrap();
        let needle = query.map(str::to_lowercase);
        let matches = |text: &str| {
            needle
                .as_deref()
                .is_some_and(|needle| text.to_lowercase().contains(needle))
        };

        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|payment| status.is_none_or(|status| payment.status == status))
            .filter_map(|payment| {
                let student = students.get(&payment.student_id)?;
                let hit = needle.is_none()
                    || matches(payment.transaction_id.as_deref().unwrap_or_default())
                    || matches(&student.full_name)
                    || matches(&student.university_id);
                hit.then(|| PaymentRecord {
                    payment: payment.clone(),
                    university_id: student.university_id.clone(),
                    full_name: student.full_name.clone(),
                })
            })
            .take(limit as usize)
            .collect())
    }
}

// --- Scripted Payment Gateway ---

// Replies with whatever the test scripted and records every call. An unscripted call fails
// the way a gateway without credentials does.
#[derive(Default)]
pub struct MockGateway {
    pub push_reply: Mutex<Option<StkPushResponse>>,
    pub query_reply: Mutex<Option<StkQueryResponse>>,
    pub pushes: Mutex<Vec<StkPushRequest>>,
    pub queries: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts every push under `checkout`.
    pub fn accepting(checkout: &str) -> Self {
        let gateway = Self::new();
        *gateway.push_reply.lock().unwrap() = Some(StkPushResponse {
            response_code: Some("0".to_string()),
            checkout_request_id: Some(checkout.to_string()),
            response_description: Some("Success. Request accepted for processing".to_string()),
            error_message: None,
        });
        gateway
    }

    /// Refuses every push with `description`.
    pub fn refusing(description: &str) -> Self {
        let gateway = Self::new();
        *gateway.push_reply.lock().unwrap() = Some(StkPushResponse {
            response_code: Some("1".to_string()),
            checkout_request_id: None,
            response_description: Some(description.to_string()),
            error_message: None,
        });
        gateway
    }

    /// Answers status queries with an accepted query carrying `result_code`.
    pub fn with_query_result(self, result_code: &str, result_desc: &str) -> Self {
        *self.query_reply.lock().unwrap() = Some(StkQueryResponse {
            response_code: Some("0".to_string()),
            response_description: Some("The service request has been accepted successfully".to_string()),
            result_code: Some(result_code.to_string()),
            result_desc: Some(result_desc.to_string()),
            error_message: None,
        });
        self
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushResponse, ApiError> {
        self.pushes.lock().unwrap().push(request.clone());
        self.push_reply
            .lock()
            .unwrap()
            .clone()
            .ok_or(ApiError::PaymentsUnavailable)
    }

    async fn stk_query(&self, checkout_request_id: &str) -> Result<StkQueryResponse, ApiError> {
        self.queries
            .lock()
            .unwrap()
            .push(checkout_request_id.to_string());
        self.query_reply
            .lock()
            .unwrap()
            .clone()
            .ok_or(ApiError::PaymentsUnavailable)
    }
}

// --- State & Request Helpers ---

pub fn create_test_state(repo: Arc<MockRepo>) -> AppState {
    create_test_state_with(repo, AppConfig::default())
}

pub fn create_test_state_with(repo: Arc<MockRepo>, config: AppConfig) -> AppState {
    AppState {
        repo,
        payments: Arc::new(MockGateway::new()),
        config,
    }
}

pub fn create_payment_state(repo: Arc<MockRepo>, gateway: Arc<MockGateway>) -> AppState {
    AppState {
        repo,
        payments: gateway,
        config: AppConfig::default(),
    }
}

/// Campus-local wall-clock time for the given configuration, as the handlers compute it.
pub fn campus_now(config: &AppConfig) -> NaiveDateTime {
    Utc::now().with_timezone(&config.campus_offset).naive_local()
}

pub fn campus_today(config: &AppConfig) -> NaiveDate {
    campus_now(config).date()
}

/// A bearer token for `sub`, signed with `secret`, expiring `ttl_secs` from now (negative
/// for an already-expired token).
pub fn mint_token(sub: Uuid, secret: &str, ttl_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub,
        exp: (now + ttl_secs) as usize,
        iat: now as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to sign test token")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body is not JSON")
}

pub fn empty() -> Body {
    Body::empty()
}
