//! M-Pesa STK-push payments.
//!
//! A payment starts `Pending` when the push is sent to the student's phone. It is settled
//! either by the provider's callback or by an explicit status query, and a `Completed`
//! payment is never changed again.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{config::MpesaConfig, error::ApiError};

/// Account reference shown on the student's phone and stored on the payment.
pub const DEFAULT_REFERENCE: &str = "Accommodation";

/// Result codes of a status query that mean the student cancelled, timed out or was
/// unreachable. Any other non-zero code leaves the payment pending.
pub const FAILED_QUERY_CODES: &[&str] = &["1032", "1037", "1"];

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const RECEIPT_ITEM: &str = "MpesaReceiptNumber";
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// PaymentStatus
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "payment_status")]
#[ts(export)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

// --- Validation ---

/// normalize_phone
///
/// Brings a Kenyan mobile number into the `2547XXXXXXXX` form the provider expects.
/// Accepts `07..`, `+2547..` and `2547..`, with spaces or dashes.
pub fn normalize_phone(raw: &str) -> Result<String, ApiError> {
    let mut digits: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if let Some(rest) = digits.strip_prefix('+') {
        digits = rest.to_string();
    }
    if let Some(rest) = digits.strip_prefix('0') {
        digits = format!("254{}", rest);
    }

    let valid = digits.len() == 12
        && digits.starts_with("254")
        && digits.chars().all(|c| c.is_ascii_digit());
    if valid {
        Ok(digits)
    } else {
        Err(ApiError::InvalidPhone)
    }
}

/// Amounts are whole shillings; the provider rejects fractions and zero.
pub fn validate_amount(amount: i64) -> Result<i64, ApiError> {
    if amount > 0 {
        Ok(amount)
    } else {
        Err(ApiError::InvalidAmount)
    }
}

/// The request password: base64 of shortcode, passkey and timestamp, concatenated.
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

// --- Provider Payloads ---

/// Result and response codes arrive as numbers in callbacks and as strings in query
/// responses. Both are read as strings.
fn code_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(code)) => Some(code),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    })
}

/// StkPushRequest
///
/// What the portal asks the provider to charge. `phone` is already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StkPushRequest {
    pub phone: String,
    pub amount: i64,
    pub reference: String,
}

/// StkPushResponse
///
/// The provider's synchronous answer to a push. `ResponseCode` "0" means the prompt was
/// sent to the phone, not that the student paid.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StkPushResponse {
    #[serde(rename = "ResponseCode", default, deserialize_with = "code_string")]
    pub response_code: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseDescription")]
    pub response_description: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl StkPushResponse {
    /// The checkout id of an accepted push.
    pub fn accepted_checkout(&self) -> Option<&str> {
        match (self.response_code.as_deref(), &self.checkout_request_id) {
            (Some("0"), Some(checkout)) => Some(checkout),
            _ => None,
        }
    }

    pub fn description(&self) -> String {
        self.response_description
            .clone()
            .or_else(|| self.error_message.clone())
            .unwrap_or_else(|| "Unknown Error".to_string())
    }
}

/// StkQueryResponse
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode", default, deserialize_with = "code_string")]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    pub response_description: Option<String>,
    #[serde(rename = "ResultCode", default, deserialize_with = "code_string")]
    pub result_code: Option<String>,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl StkQueryResponse {
    pub fn resolution(&self) -> Resolution {
        if self.response_code.as_deref() != Some("0") {
            return Resolution::Pending;
        }
        match self.result_code.as_deref() {
            Some("0") => Resolution::Complete {
                description: self
                    .result_desc
                    .clone()
                    .unwrap_or_else(|| "Verified Manually".to_string()),
                receipt: None,
            },
            Some(code) if FAILED_QUERY_CODES.contains(&code) => Resolution::Fail {
                description: self.result_desc.clone().unwrap_or_default(),
            },
            _ => Resolution::Pending,
        }
    }

    /// Text to show the student after a query, whatever its outcome.
    pub fn message(&self) -> Option<String> {
        if self.response_code.as_deref() == Some("0") {
            self.result_desc.clone()
        } else {
            self.response_description
                .clone()
                .or_else(|| self.error_message.clone())
        }
    }
}

/// StkCallbackEnvelope
///
/// Body posted by the provider to the callback URL once the student acts on the prompt.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body", default)]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback", default)]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StkCallback {
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResultCode", default, deserialize_with = "code_string")]
    #[schema(value_type = Option<i64>)]
    pub result_code: Option<String>,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata")]
    pub metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    #[schema(value_type = Object)]
    pub value: Option<Value>,
}

impl StkCallback {
    /// The M-Pesa receipt number, present on successful callbacks only.
    pub fn receipt(&self) -> Option<String> {
        let item = self
            .metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == RECEIPT_ITEM)?;
        match item.value.as_ref()? {
            Value::String(receipt) => Some(receipt.clone()),
            Value::Number(receipt) => Some(receipt.to_string()),
            _ => None,
        }
    }

    pub fn resolution(&self) -> Resolution {
        if self.result_code.as_deref() == Some("0") {
            Resolution::Complete {
                description: "Success".to_string(),
                receipt: self.receipt(),
            }
        } else {
            Resolution::Fail {
                description: self
                    .result_desc
                    .clone()
                    .unwrap_or_else(|| "Payment failed".to_string()),
            }
        }
    }
}

// --- Settlement Rules ---

/// Resolution
///
/// What the provider says happened to a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Complete {
        description: String,
        receipt: Option<String>,
    },
    Fail {
        description: String,
    },
    Pending,
}

/// Settlement
///
/// The write a resolution causes on a stored payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub status: PaymentStatus,
    pub description: String,
    pub receipt: Option<String>,
}

impl Resolution {
    /// settlement
    ///
    /// The change to apply to a payment currently in `current`, if any. Completed payments
    /// are final. A failed payment can still complete, since the callback may arrive after
    /// a query reported a timeout.
    pub fn settlement(&self, current: PaymentStatus) -> Option<Settlement> {
        match (current, self) {
            (PaymentStatus::Completed, _) | (_, Resolution::Pending) => None,
            (_, Resolution::Complete { description, receipt }) => Some(Settlement {
                status: PaymentStatus::Completed,
                description: description.clone(),
                receipt: receipt.clone(),
            }),
            (PaymentStatus::Failed, Resolution::Fail { .. }) => None,
            (PaymentStatus::Pending, Resolution::Fail { description }) => Some(Settlement {
                status: PaymentStatus::Failed,
                description: description.clone(),
                receipt: None,
            }),
        }
    }
}

// --- Gateway ---

/// PaymentGateway Contract
///
/// The two provider calls the portal makes. Handlers only see this trait, so tests swap
/// in a scripted gateway and deployments without credentials run with payments disabled.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Sends the payment prompt to the student's phone.
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushResponse, ApiError>;

    /// Asks the provider for the current state of an earlier push.
    async fn stk_query(&self, checkout_request_id: &str) -> Result<StkQueryResponse, ApiError>;
}

/// PaymentGatewayState
pub type PaymentGatewayState = Arc<dyn PaymentGateway>;

/// DisabledGateway
///
/// Used when no M-Pesa credentials are configured. Every call fails with 503.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn stk_push(&self, _request: &StkPushRequest) -> Result<StkPushResponse, ApiError> {
        Err(ApiError::PaymentsUnavailable)
    }

    async fn stk_query(&self, _checkout_request_id: &str) -> Result<StkQueryResponse, ApiError> {
        Err(ApiError::PaymentsUnavailable)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// MpesaClient
///
/// The Daraja API client. A fresh OAuth token is fetched for every call.
pub struct MpesaClient {
    http: reqwest::Client,
    config: MpesaConfig,
    campus_offset: FixedOffset,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig, campus_offset: FixedOffset) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("falling back to a default HTTP client: {:?}", e);
                reqwest::Client::new()
            });
        Self {
            http,
            config,
            campus_offset,
        }
    }

    /// Provider timestamps are local time.
    fn timestamp(&self) -> String {
        Utc::now()
            .with_timezone(&self.campus_offset)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    async fn access_token(&self) -> Result<String, ApiError> {
        let response = self
            .http
            .get(format!("{}/oauth/v1/generate", self.config.base_url))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<TokenResponse>().await?.access_token)
    }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushResponse, ApiError> {
        let token = self.access_token().await?;
        let timestamp = self.timestamp();
        let shortcode = &self.config.shortcode;

        let payload = json!({
            "BusinessShortCode": shortcode,
            "Password": stk_password(shortcode, &self.config.passkey, &timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": request.amount,
            "PartyA": request.phone,
            "PartyB": shortcode,
            "PhoneNumber": request.phone,
            "CallBackURL": self.config.callback_url,
            "AccountReference": request.reference,
            "TransactionDesc": DEFAULT_REFERENCE,
        });

        // Rejections come back as JSON with a non-2xx status, so the body is read either way.
        let response = self
            .http
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        Ok(response.json::<StkPushResponse>().await?)
    }

    async fn stk_query(&self, checkout_request_id: &str) -> Result<StkQueryResponse, ApiError> {
        let token = self.access_token().await?;
        let timestamp = self.timestamp();
        let shortcode = &self.config.shortcode;

        let payload = json!({
            "BusinessShortCode": shortcode,
            "Password": stk_password(shortcode, &self.config.passkey, &timestamp),
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_request_id,
        });

        let response = self
            .http
            .post(format!("{}/mpesa/stkpushquery/v1/query", self.config.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        Ok(response.json::<StkQueryResponse>().await?)
    }
}
