use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    meals::MealSelection,
    payments::PaymentStatus,
    roles::{Category, RoleCode},
};

// --- Core Application Schemas (Mapped to Database) ---

/// Account
///
/// A row of the `accounts` table: one per person who can sign in, student or staff.
/// `staff_role` holds the raw role code for staff accounts and is parsed into a
/// [`RoleCode`] when the request identity is built.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub is_superuser: bool,
    pub staff_role: Option<String>,
}

/// Student
///
/// The student profile attached to an account (`students.id` = `accounts.id`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Student {
    pub id: Uuid,
    pub university_id: String,
    pub full_name: String,
    pub room_number: Option<String>,
}

/// Meal
///
/// One student's meal record for one day. `(student_id, date)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Meal {
    pub student_id: Uuid,
    #[ts(type = "string")]
    pub date: NaiveDate,
    pub breakfast: bool,
    pub early: bool,
    pub supper: bool,
    pub away: bool,
    #[ts(type = "string")]
    pub submitted_at: DateTime<Utc>,
}

impl Meal {
    pub fn selection(&self) -> MealSelection {
        MealSelection {
            breakfast: self.breakfast,
            early: self.early,
            supper: self.supper,
        }
    }
}

/// AwayPeriod
///
/// A stretch of days a student will be off campus. Meals in the range are forced to away.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AwayPeriod {
    pub id: Uuid,
    pub student_id: Uuid,
    #[ts(type = "string")]
    pub start_date: NaiveDate,
    #[ts(type = "string")]
    pub end_date: NaiveDate,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// AuditLogEntry
///
/// A row of the `audit_logs` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AuditLogEntry {
    pub id: i64,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub detail: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// MealConfirmationRequest
///
/// Input payload for POST /meals/confirm. Meal flags are flattened into the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MealConfirmationRequest {
    #[ts(type = "string")]
    pub date: NaiveDate,
    #[serde(flatten)]
    pub meals: MealSelection,
}

/// AwayPeriodRequest
///
/// Input payload for POST /meals/away. Both dates are inclusive.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AwayPeriodRequest {
    #[ts(type = "string")]
    pub start_date: NaiveDate,
    #[ts(type = "string")]
    pub end_date: NaiveDate,
}

/// RegisterStaffRequest
///
/// Input payload for POST /register/staff. `role` may be a role code ("ICT_MANAGER") or its
/// label ("ICT Manager"). The password is forwarded to the identity provider only.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterStaffRequest {
    pub email: String,
    pub password: String,
    pub role: String,
}

// --- Output Schemas ---

/// MealConfirmationResponse
///
/// The stored meal record plus whether the breakfast lock overrode the request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MealConfirmationResponse {
    pub meal: Meal,
    pub breakfast_locked: bool,
}

/// AwayModeResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AwayModeResponse {
    pub period: AwayPeriod,
    pub days_marked: i64,
}

/// MealCounts
///
/// Kitchen head-counts for a single day.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq, Eq)]
#[ts(export)]
pub struct MealCounts {
    pub breakfast: i64,
    pub early: i64,
    pub supper: i64,
    pub away: i64,
}

/// DailyMealCounts
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DailyMealCounts {
    #[ts(type = "string")]
    pub date: NaiveDate,
    pub counts: MealCounts,
}

/// KitchenDashboard
///
/// Output schema for GET /manage/dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct KitchenDashboard {
    pub today: DailyMealCounts,
    pub tomorrow: DailyMealCounts,
}

/// AwayEntry
///
/// One student away on the requested day, with the period that covers it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AwayEntry {
    pub student_id: Uuid,
    pub university_id: String,
    pub full_name: String,
    #[ts(type = "string")]
    pub start_date: NaiveDate,
    #[ts(type = "string")]
    pub end_date: NaiveDate,
}

/// CategoryCount
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct CategoryCount {
    pub category: Category,
    pub staff: i64,
}

/// StaffOverview
///
/// Output schema for GET /manage/overview: headcounts across the institution.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StaffOverview {
    pub total_students: i64,
    pub total_staff: i64,
    pub staff_by_category: Vec<CategoryCount>,
}

/// RoleEntry
///
/// One row of the public role catalog (GET /roles).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct RoleEntry {
    #[ts(type = "string")]
    #[schema(value_type = String, example = "ICT_MANAGER")]
    pub code: RoleCode,
    pub label: String,
    pub category: Category,
}

impl From<RoleCode> for RoleEntry {
    fn from(role: RoleCode) -> Self {
        Self {
            code: role,
            label: role.label().to_string(),
            category: role.category(),
        }
    }
}

/// StaffAccount
///
/// Output of staff registration: the mirrored local account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StaffAccount {
    pub id: Uuid,
    pub email: String,
    pub role: RoleEntry,
}

/// AccessSummary
///
/// Output schema for GET /me/access: how the portal sees the caller.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccessSummary {
    pub account_id: Option<Uuid>,
    pub is_superuser: bool,
    pub role: Option<RoleEntry>,
    pub legacy_groups: Vec<String>,
    pub permitted_operations: Vec<String>,
}

// --- Payments ---

/// Payment
///
/// A row of the `payments` table. `checkout_request_id` links the row to the provider's
/// push; `transaction_id` is the M-Pesa receipt, set on completion.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Payment {
    pub id: Uuid,
    pub student_id: Uuid,
    #[ts(type = "number")]
    pub amount: i64,
    pub phone_number: String,
    pub reference: String,
    pub status: PaymentStatus,
    pub checkout_request_id: Option<String>,
    pub transaction_id: Option<String>,
    pub description: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PaymentRecord
///
/// A payment with the paying student, for the finance listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct PaymentRecord {
    #[sqlx(flatten)]
    pub payment: Payment,
    pub university_id: String,
    pub full_name: String,
}

/// PaymentRequest
///
/// Input payload for POST /payments. `amount` is in whole shillings.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PaymentRequest {
    #[ts(type = "number")]
    pub amount: i64,
    #[schema(example = "0712345678")]
    pub phone_number: String,
}

/// PaymentResponse
///
/// The payment after a push or a status check, with the provider's message for the student.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PaymentResponse {
    pub payment: Payment,
    pub message: Option<String>,
}
