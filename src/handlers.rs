use crate::{
    AppState,
    access::StaffIdentity,
    auth::AuthUser,
    error::ApiError,
    meals::{away_day_count, plan_confirmation},
    models::{
        Account, AccessSummary, AuditLogEntry, AwayEntry, AwayModeResponse, AwayPeriodRequest,
        CategoryCount, DailyMealCounts, KitchenDashboard, Meal, MealConfirmationRequest,
        MealConfirmationResponse, Payment, PaymentRecord, PaymentRequest, PaymentResponse,
        RegisterStaffRequest, RoleEntry, StaffAccount, StaffOverview, Student,
    },
    payments::{
        DEFAULT_REFERENCE, PaymentStatus, Resolution, StkCallbackEnvelope, StkPushRequest,
        normalize_phone, validate_amount,
    },
    policy::permitted_operations,
    roles::{Category, RoleCode, classify},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{Days, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

// --- Query Structs ---

/// DateFilter
///
/// Optional `?date=YYYY-MM-DD` for the staff reports. Defaults to today, campus time.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct DateFilter {
    pub date: Option<NaiveDate>,
}

/// AuditFilter
#[derive(Deserialize, utoipa::IntoParams)]
pub struct AuditFilter {
    /// Number of entries to return (default 50, at most 200).
    pub limit: Option<i64>,
}

/// PaymentFilter
#[derive(Deserialize, utoipa::IntoParams)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    /// Matches the M-Pesa receipt, student name or university id.
    pub q: Option<String>,
    /// Number of payments to return (default 50, at most 200).
    pub limit: Option<i64>,
}

const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_AUDIT_LIMIT: i64 = 200;
const UPCOMING_MEALS_LIMIT: i64 = 10;
const DEFAULT_PAYMENT_LIMIT: i64 = 50;
const MAX_PAYMENT_LIMIT: i64 = 200;

/// SupabaseAuthResponse
///
/// The part of the identity provider's signup response we need: the new user's id.
#[derive(Deserialize)]
struct SupabaseAuthResponse {
    id: Uuid,
}

// --- Helpers ---

/// Current campus-local wall-clock time.
fn campus_now(state: &AppState) -> NaiveDateTime {
    Utc::now()
        .with_timezone(&state.config.campus_offset)
        .naive_local()
}

fn campus_today(state: &AppState) -> NaiveDate {
    campus_now(state).date()
}

/// Loads the student profile for a signed-in account, or refuses the request.
async fn require_student(state: &AppState, user: &AuthUser) -> Result<Student, ApiError> {
    state
        .repo
        .get_student(user.id)
        .await?
        .ok_or(ApiError::NotAStudent)
}

/// settle
///
/// Applies a provider resolution to a stored payment. A settlement that loses a race
/// returns the payment as it now stands.
async fn settle(
    state: &AppState,
    payment: Payment,
    resolution: &Resolution,
) -> Result<Payment, ApiError> {
    let Some(settlement) = resolution.settlement(payment.status) else {
        return Ok(payment);
    };

    let settled = match state.repo.settle_payment(payment.id, &settlement).await? {
        Some(settled) => settled,
        None => state
            .repo
            .get_payment(payment.id)
            .await?
            .ok_or(ApiError::PaymentNotFound)?,
    };

    if settled.status == settlement.status {
        tracing::info!(payment_id = %settled.id, status = ?settled.status, "payment settled");
        audit(
            state,
            Some(settled.student_id),
            "payment_settled",
            format!(
                "payment {} of KES {} {:?}: {}",
                settled.id, settled.amount, settled.status, settlement.description
            ),
        )
        .await;
    }
    Ok(settled)
}

/// Writes an audit entry. Failures are logged and never fail the request.
async fn audit(state: &AppState, actor_id: Option<Uuid>, action: &str, detail: String) {
    if let Err(e) = state.repo.record_audit(actor_id, action, &detail).await {
        tracing::error!(action, "failed to write audit entry: {:?}", e);
    }
}

// --- Public Handlers ---

/// list_roles
///
/// [Public Route] The full staff role catalog with labels and derived categories. Used to
/// populate the staff registration form.
#[utoipa::path(
    get,
    path = "/roles",
    responses((status = 200, description = "Role catalog", body = [RoleEntry]))
)]
pub async fn list_roles() -> Json<Vec<RoleEntry>> {
    Json(RoleCode::ALL.iter().copied().map(RoleEntry::from).collect())
}

/// register_staff
///
/// [Public Route] Creates a staff account at the identity provider and mirrors it locally.
///
/// *Flow*: the role is parsed (code or label) and the email checked against local accounts
/// before anything reaches the provider, so a rejected request never leaves a provider
/// account behind. The provider's user id becomes the local account id.
#[utoipa::path(
    post,
    path = "/register/staff",
    request_body = RegisterStaffRequest,
    responses(
        (status = 200, description = "Registered", body = StaffAccount),
        (status = 400, description = "Unknown role or rejected by provider")
    )
)]
pub async fn register_staff(
    State(state): State<AppState>,
    Json(payload): Json<RegisterStaffRequest>,
) -> Result<Json<StaffAccount>, ApiError> {
    let role: RoleCode = payload.role.parse()?;

    if state.repo.get_account_by_email(&payload.email).await?.is_some() {
        tracing::info!("staff signup refused: email already registered");
        return Err(ApiError::RegistrationRejected);
    }

    let (Some(auth_url), Some(auth_key)) = (&state.config.auth_url, &state.config.auth_key) else {
        return Err(ApiError::ProviderUnavailable);
    };

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/auth/v1/signup", auth_url))
        .header("apikey", auth_key)
        .json(&serde_json::json!({ "email": payload.email, "password": payload.password }))
        .send()
        .await?;

    if !response.status().is_success() {
        tracing::info!(status = %response.status(), "identity provider rejected staff signup");
        return Err(ApiError::RegistrationRejected);
    }

    let provider_user = response.json::<SupabaseAuthResponse>().await?;

    let account = state
        .repo
        .create_account(Account {
            id: provider_user.id,
            email: payload.email,
            is_superuser: false,
            staff_role: Some(role.as_str().to_string()),
        })
        .await
        .map_err(|e| {
            // Lost a race with a concurrent signup for the same email.
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                ApiError::RegistrationRejected
            } else {
                ApiError::Database(e)
            }
        })?;

    audit(
        &state,
        Some(account.id),
        "staff_registered",
        format!("{} registered as {}", account.email, role),
    )
    .await;

    Ok(Json(StaffAccount {
        id: account.id,
        email: account.email,
        role: RoleEntry::from(role),
    }))
}

// --- Student Handlers ---

/// get_access_summary
///
/// [Authenticated Route] How the portal sees the caller: role, category, legacy groups and
/// the staff operations they can reach.
#[utoipa::path(
    get,
    path = "/me/access",
    responses((status = 200, description = "Access summary", body = AccessSummary))
)]
pub async fn get_access_summary(user: AuthUser) -> Json<AccessSummary> {
    Json(access_summary(&user.identity))
}

pub fn access_summary(identity: &StaffIdentity) -> AccessSummary {
    AccessSummary {
        account_id: identity.account_id,
        is_superuser: identity.is_superuser,
        role: identity.staff_role.map(RoleEntry::from),
        legacy_groups: identity.legacy_groups.iter().cloned().collect(),
        permitted_operations: permitted_operations(identity),
    }
}

/// get_my_meals
///
/// [Student Route] The student's meal records from today onwards (at most 10).
#[utoipa::path(
    get,
    path = "/me/meals",
    responses(
        (status = 200, description = "Upcoming meals", body = [Meal]),
        (status = 403, description = "Not a student")
    )
)]
pub async fn get_my_meals(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Meal>>, ApiError> {
    let student = require_student(&state, &user).await?;
    let meals = state
        .repo
        .get_meals_from(student.id, campus_today(&state), UPCOMING_MEALS_LIMIT)
        .await?;
    Ok(Json(meals))
}

/// confirm_meals
///
/// [Student Route] Confirms the student's meals for a day.
///
/// *Rules*: a day inside an away period is refused; past days are refused; for today,
/// breakfast and early breakfast are frozen after the configured lock time and keep their
/// stored values while supper still applies.
#[utoipa::path(
    post,
    path = "/meals/confirm",
    request_body = MealConfirmationRequest,
    responses(
        (status = 200, description = "Meals stored", body = MealConfirmationResponse),
        (status = 400, description = "Date already passed"),
        (status = 403, description = "Not a student"),
        (status = 409, description = "Marked away for this date")
    )
)]
pub async fn confirm_meals(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<MealConfirmationRequest>,
) -> Result<Json<MealConfirmationResponse>, ApiError> {
    let student = require_student(&state, &user).await?;

    if state.repo.is_away_on(student.id, payload.date).await? {
        return Err(ApiError::MarkedAway);
    }

    let stored = state
        .repo
        .get_meal(student.id, payload.date)
        .await?
        .map(|meal| meal.selection());

    let plan = plan_confirmation(
        payload.meals,
        stored,
        payload.date,
        campus_now(&state),
        state.config.meal_lock_time,
    )?;

    let meal = state
        .repo
        .upsert_meal(student.id, payload.date, plan.selection)
        .await?;

    audit(
        &state,
        Some(student.id),
        "meals_confirmed",
        format!(
            "{} breakfast={} early={} supper={} locked={}",
            meal.date, meal.breakfast, meal.early, meal.supper, plan.breakfast_locked
        ),
    )
    .await;

    Ok(Json(MealConfirmationResponse {
        meal,
        breakfast_locked: plan.breakfast_locked,
    }))
}

/// set_away_mode
///
/// [Student Route] Marks the student away for an inclusive date range. Every meal in the
/// range is switched to away with all meals cleared.
#[utoipa::path(
    post,
    path = "/meals/away",
    request_body = AwayPeriodRequest,
    responses(
        (status = 200, description = "Away mode set", body = AwayModeResponse),
        (status = 400, description = "End date before start date, or range longer than a year"),
        (status = 403, description = "Not a student")
    )
)]
pub async fn set_away_mode(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<AwayPeriodRequest>,
) -> Result<Json<AwayModeResponse>, ApiError> {
    let student = require_student(&state, &user).await?;
    let days_marked = away_day_count(payload.start_date, payload.end_date)?;

    let period = state
        .repo
        .create_away_period(student.id, payload.start_date, payload.end_date)
        .await?;

    audit(
        &state,
        Some(student.id),
        "away_mode_set",
        format!("{} to {}", period.start_date, period.end_date),
    )
    .await;

    Ok(Json(AwayModeResponse {
        period,
        days_marked,
    }))
}

// --- Staff Handlers (behind ViewGuards) ---

/// get_kitchen_dashboard
///
/// [Staff Route: meal_reports] Meal head-counts for today and tomorrow.
#[utoipa::path(
    get,
    path = "/manage/dashboard",
    responses(
        (status = 200, description = "Dashboard", body = KitchenDashboard),
        (status = 403, description = "Access Denied")
    )
)]
pub async fn get_kitchen_dashboard(
    State(state): State<AppState>,
) -> Result<Json<KitchenDashboard>, ApiError> {
    let today = campus_today(&state);
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);

    Ok(Json(KitchenDashboard {
        today: DailyMealCounts {
            date: today,
            counts: state.repo.meal_counts(today).await?,
        },
        tomorrow: DailyMealCounts {
            date: tomorrow,
            counts: state.repo.meal_counts(tomorrow).await?,
        },
    }))
}

/// get_meal_counts
///
/// [Staff Route: meal_reports] Meal head-counts for one day.
#[utoipa::path(
    get,
    path = "/manage/meals",
    params(DateFilter),
    responses(
        (status = 200, description = "Counts", body = DailyMealCounts),
        (status = 403, description = "Access Denied")
    )
)]
pub async fn get_meal_counts(
    State(state): State<AppState>,
    Query(filter): Query<DateFilter>,
) -> Result<Json<DailyMealCounts>, ApiError> {
    let date = filter.date.unwrap_or_else(|| campus_today(&state));
    let counts = state.repo.meal_counts(date).await?;
    Ok(Json(DailyMealCounts { date, counts }))
}

/// get_away_list
///
/// [Staff Route: away_list] Students away on a given day.
#[utoipa::path(
    get,
    path = "/manage/away",
    params(DateFilter),
    responses(
        (status = 200, description = "Away students", body = [AwayEntry]),
        (status = 403, description = "Access Denied")
    )
)]
pub async fn get_away_list(
    State(state): State<AppState>,
    Query(filter): Query<DateFilter>,
) -> Result<Json<Vec<AwayEntry>>, ApiError> {
    let date = filter.date.unwrap_or_else(|| campus_today(&state));
    Ok(Json(state.repo.away_on(date).await?))
}

/// get_audit_logs
///
/// [Staff Route: audit_logs] The most recent audit entries, newest first.
#[utoipa::path(
    get,
    path = "/manage/audit-logs",
    params(AuditFilter),
    responses(
        (status = 200, description = "Audit entries", body = [AuditLogEntry]),
        (status = 403, description = "Access Denied")
    )
)]
pub async fn get_audit_logs(
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    let limit = filter
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    Ok(Json(state.repo.recent_audit_logs(limit).await?))
}

/// get_staff_overview
///
/// [Staff Route: staff_oversight] Student and staff headcounts, with staff broken down
/// by category. Categories are derived here from the stored role codes.
#[utoipa::path(
    get,
    path = "/manage/overview",
    responses(
        (status = 200, description = "Overview", body = StaffOverview),
        (status = 403, description = "Access Denied")
    )
)]
pub async fn get_staff_overview(
    State(state): State<AppState>,
) -> Result<Json<StaffOverview>, ApiError> {
    let total_students = state.repo.count_students().await?;
    let role_codes = state.repo.staff_role_codes().await?;

    Ok(Json(StaffOverview {
        total_students,
        total_staff: role_codes.len() as i64,
        staff_by_category: count_by_category(&role_codes),
    }))
}

/// Tallies raw role codes per category, every category listed (zeros included).
pub fn count_by_category(role_codes: &[String]) -> Vec<CategoryCount> {
    Category::ALL
        .iter()
        .map(|&category| CategoryCount {
            category,
            staff: role_codes
                .iter()
                .filter(|code| classify(code) == category)
                .count() as i64,
        })
        .collect()
}

// --- Payment Handlers ---

/// initiate_payment
///
/// [Student Route] Records a pending payment and sends the M-Pesa prompt to the student's
/// phone. A push the provider refuses is stored as `Failed` and returned with its reason.
#[utoipa::path(
    post,
    path = "/payments",
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Push sent or refused", body = PaymentResponse),
        (status = 400, description = "Invalid amount or phone number"),
        (status = 403, description = "Not a student"),
        (status = 503, description = "Payments not configured")
    )
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PaymentRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let student = require_student(&state, &user).await?;
    let amount = validate_amount(payload.amount)?;
    let phone = normalize_phone(&payload.phone_number)?;

    let payment = state
        .repo
        .create_payment(student.id, amount, &phone, DEFAULT_REFERENCE)
        .await?;

    let request = StkPushRequest {
        phone,
        amount,
        reference: payment.reference.clone(),
    };

    let response = match state.payments.stk_push(&request).await {
        Ok(response) => response,
        Err(e) => {
            let failure = Resolution::Fail {
                description: e.to_string(),
            };
            settle(&state, payment, &failure).await?;
            return Err(e);
        }
    };

    let message = Some(response.description());
    let payment = match response.accepted_checkout() {
        Some(checkout) => {
            audit(
                &state,
                Some(student.id),
                "payment_initiated",
                format!("payment {} of KES {} sent to {}", payment.id, amount, request.phone),
            )
            .await;
            state.repo.record_checkout(payment.id, checkout).await?
        }
        None => {
            tracing::info!(payment_id = %payment.id, "stk push refused: {}", response.description());
            let refused = Resolution::Fail {
                description: response.description(),
            };
            settle(&state, payment, &refused).await?
        }
    };

    Ok(Json(PaymentResponse { payment, message }))
}

/// list_my_payments
///
/// [Student Route] The student's payment history, newest first.
#[utoipa::path(
    get,
    path = "/payments",
    responses(
        (status = 200, description = "Payment history", body = [Payment]),
        (status = 403, description = "Not a student")
    )
)]
pub async fn list_my_payments(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Payment>>, ApiError> {
    let student = require_student(&state, &user).await?;
    Ok(Json(state.repo.list_payments(student.id).await?))
}

/// verify_payment
///
/// [Student Route] Asks the provider for the state of one of the student's payments, for
/// when the callback never arrived. Completed payments are returned without a query.
#[utoipa::path(
    post,
    path = "/payments/{id}/verify",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Current payment state", body = PaymentResponse),
        (status = 404, description = "No such payment for this student"),
        (status = 409, description = "Payment has no checkout request to query")
    )
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let student = require_student(&state, &user).await?;
    let payment = state
        .repo
        .get_payment(id)
        .await?
        .filter(|payment| payment.student_id == student.id)
        .ok_or(ApiError::PaymentNotFound)?;

    if payment.status == PaymentStatus::Completed {
        return Ok(Json(PaymentResponse {
            payment,
            message: Some("Payment is already completed.".to_string()),
        }));
    }

    let Some(checkout) = payment.checkout_request_id.clone() else {
        return Err(ApiError::PaymentNotVerifiable);
    };

    let response = state.payments.stk_query(&checkout).await?;
    let payment = settle(&state, payment, &response.resolution()).await?;

    Ok(Json(PaymentResponse {
        payment,
        message: response.message(),
    }))
}

/// mpesa_callback
///
/// [Public Route] Receives the provider's result for a push. Unknown checkout ids get 404
/// and leave every payment untouched.
#[utoipa::path(
    post,
    path = "/payments/mpesa/callback",
    request_body = StkCallbackEnvelope,
    responses(
        (status = 200, description = "Result recorded"),
        (status = 400, description = "No CheckoutRequestID"),
        (status = 404, description = "Unknown checkout request")
    )
)]
pub async fn mpesa_callback(
    State(state): State<AppState>,
    Json(envelope): Json<StkCallbackEnvelope>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let callback = envelope.body.stk_callback;
    let checkout = callback
        .checkout_request_id
        .as_deref()
        .ok_or(ApiError::InvalidCallback)?;

    let payment = state
        .repo
        .get_payment_by_checkout(checkout)
        .await?
        .ok_or_else(|| {
            tracing::warn!(checkout, "callback for unknown checkout request");
            ApiError::PaymentNotFound
        })?;

    settle(&state, payment, &callback.resolution()).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// get_payments
///
/// [Staff Route: payments] All payments with the paying student, newest first.
#[utoipa::path(
    get,
    path = "/manage/payments",
    params(PaymentFilter),
    responses(
        (status = 200, description = "Payments", body = [PaymentRecord]),
        (status = 403, description = "Access Denied")
    )
)]
pub async fn get_payments(
    State(state): State<AppState>,
    Query(filter): Query<PaymentFilter>,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    let limit = filter
        .limit
        .unwrap_or(DEFAULT_PAYMENT_LIMIT)
        .clamp(1, MAX_PAYMENT_LIMIT);
    let query = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    Ok(Json(
        state.repo.search_payments(filter.status, query, limit).await?,
    ))
}
