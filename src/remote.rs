//! HTTP client for the payments API behind the ledger.
//!
//! The wire format is camelCase JSON with monetary amounts as decimal
//! strings carrying exactly two fraction digits.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    BonusStatus, LedgerError, LedgerMirror, LedgerState, PayoutGateway, PayoutMethod,
    PayoutOrder, PayoutRequest, PayoutStatus, Rail, SettlementReceipt, Transaction,
    TransactionKind, TransactionStatus, WelcomeBonus, money,
};

const MIRROR_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: String,
    pub description: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<String>,
}

impl From<&Transaction> for TransactionDto {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            kind: tx.kind,
            amount: money::format_amount(tx.amount),
            description: tx.description.clone(),
            status: tx.status,
            created_at: tx.created_at,
            reference: tx.reference.clone(),
            fee: tx.fee.map(money::format_amount),
            net_amount: tx.net_amount.map(money::format_amount),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutDto {
    pub id: Uuid,
    pub amount: String,
    pub rail: Rail,
    pub status: PayoutStatus,
    pub fee: String,
    pub net_amount: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub reference: String,
}

impl From<&PayoutRequest> for PayoutDto {
    fn from(payout: &PayoutRequest) -> Self {
        Self {
            id: payout.id,
            amount: money::format_amount(payout.amount),
            rail: payout.rail,
            status: payout.status,
            fee: money::format_amount(payout.fee),
            net_amount: money::format_amount(payout.net_amount),
            requested_at: payout.requested_at,
            completed_at: payout.completed_at,
            reference: payout.reference.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDto {
    pub id: Uuid,
    pub rail: Rail,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    pub is_default: bool,
    pub is_verified: bool,
    pub added_at: DateTime<Utc>,
}

impl From<&PayoutMethod> for MethodDto {
    fn from(method: &PayoutMethod) -> Self {
        Self {
            id: method.id,
            rail: method.rail,
            display_name: method.display_name.clone(),
            last4: method.last4.clone(),
            is_default: method.is_default,
            is_verified: method.is_verified,
            added_at: method.added_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusDto {
    pub id: Uuid,
    pub amount: String,
    pub status: BonusStatus,
    /// Mirrors `status == claimed` for consumers still reading the old flag.
    pub claimed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,
}

impl From<&WelcomeBonus> for BonusDto {
    fn from(bonus: &WelcomeBonus) -> Self {
        Self {
            id: bonus.id,
            amount: money::format_amount(bonus.amount),
            status: bonus.status,
            claimed: bonus.is_claimed(),
            claimed_at: bonus.claimed_at,
            expires_at: bonus.expires_at,
            requirements: bonus.requirements.iter().cloned().collect(),
        }
    }
}

/// Body for `POST /payment-methods`. `token` is the rail-issued credential
/// from the linking flow; display names stay local.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkMethodRequest {
    pub rail: Rail,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

/// Body for `POST /payouts`. The rail is implied by the chosen method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayoutRequest {
    pub amount: String,
    pub payment_method_id: Uuid,
}

impl From<&PayoutOrder> for CreatePayoutRequest {
    fn from(order: &PayoutOrder) -> Self {
        Self {
            amount: money::format_amount(order.amount),
            payment_method_id: order.method_id,
        }
    }
}

/// Verdict from `POST /payouts`. `payout_id` is the rail's identifier and
/// becomes the settlement reference on our side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayoutResponse {
    pub payout_id: String,
    pub amount: String,
    pub fee: String,
    pub net_amount: String,
    pub status: PayoutStatus,
}

/// Full ledger state as pushed to `PUT /ledger/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshotDto {
    pub balance: String,
    pub available_balance: String,
    pub pending_balance: String,
    pub total_earned: String,
    pub total_payouts: String,
    pub transactions: Vec<TransactionDto>,
    pub payout_history: Vec<PayoutDto>,
    pub linked_methods: Vec<MethodDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_bonus: Option<BonusDto>,
    pub synced_at: DateTime<Utc>,
}

impl LedgerSnapshotDto {
    pub fn from_state(state: &LedgerState) -> Self {
        Self {
            balance: money::format_amount(state.balance),
            available_balance: money::format_amount(state.available_balance),
            pending_balance: money::format_amount(state.pending_balance()),
            total_earned: money::format_amount(state.total_earned),
            total_payouts: money::format_amount(state.total_payouts),
            transactions: state.transactions.iter().map(Into::into).collect(),
            payout_history: state.payout_history.iter().map(Into::into).collect(),
            linked_methods: state.linked_methods.iter().map(Into::into).collect(),
            welcome_bonus: state.welcome_bonus.as_ref().map(Into::into),
            synced_at: Utc::now(),
        }
    }
}

/// Client for the hosted payments API. Doubles as the disbursement gateway
/// (`POST /payouts`) and the ledger mirror (`PUT /ledger/{userId}`).
#[derive(Debug, Clone)]
pub struct PaymentApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl PaymentApiClient {
    /// The client is built without a global timeout; reads and mirror pushes
    /// set per-request deadlines instead, leaving payout dispatch unbounded.
    pub fn new(base_url: &str) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LedgerError::Sync(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, LedgerError> {
        let response = self
            .authorized(self.client.get(self.url(path)))
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| LedgerError::Sync(e.to_string()))?;
        let response = expect_success(response, path).await?;
        response
            .json()
            .await
            .map_err(|e| LedgerError::Sync(format!("{path} returned malformed json: {e}")))
    }

    pub async fn list_methods(&self) -> Result<Vec<MethodDto>, LedgerError> {
        self.get_json("/payment-methods").await
    }

    pub async fn create_method(
        &self,
        request: &LinkMethodRequest,
    ) -> Result<MethodDto, LedgerError> {
        let response = self
            .authorized(self.client.post(self.url("/payment-methods")))
            .timeout(READ_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(|e| LedgerError::Sync(e.to_string()))?;
        let response = expect_success(response, "/payment-methods").await?;
        response
            .json()
            .await
            .map_err(|e| LedgerError::Sync(format!("create method response malformed: {e}")))
    }

    pub async fn set_default_method(&self, id: Uuid) -> Result<MethodDto, LedgerError> {
        let path = format!("/payment-methods/{id}/default");
        let response = self
            .authorized(self.client.put(self.url(&path)))
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| LedgerError::Sync(e.to_string()))?;
        let response = expect_success(response, &path).await?;
        response
            .json()
            .await
            .map_err(|e| LedgerError::Sync(format!("{path} returned malformed json: {e}")))
    }

    pub async fn delete_method(&self, id: Uuid) -> Result<(), LedgerError> {
        let path = format!("/payment-methods/{id}");
        let response = self
            .authorized(self.client.delete(self.url(&path)))
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| LedgerError::Sync(e.to_string()))?;
        expect_success(response, &path).await?;
        Ok(())
    }

    pub async fn list_transactions(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<TransactionDto>, LedgerError> {
        self.get_json(&paged("/transactions", limit, offset)).await
    }

    pub async fn list_payouts(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<PayoutDto>, LedgerError> {
        self.get_json(&paged("/payouts", limit, offset)).await
    }
}

fn paged(path: &str, limit: Option<u32>, offset: Option<u32>) -> String {
    let mut query = Vec::new();
    if let Some(limit) = limit {
        query.push(format!("limit={limit}"));
    }
    if let Some(offset) = offset {
        query.push(format!("offset={offset}"));
    }
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", query.join("&"))
    }
}

impl PayoutGateway for PaymentApiClient {
    /// `POST /payouts`. Deliberately carries no timeout: the rail owns the
    /// order once it is sent, and abandoning the request client-side would
    /// strand a processing payout with no verdict. A slow rail therefore
    /// holds the payout in processing for as long as it takes.
    async fn create_payout(&self, order: &PayoutOrder) -> Result<SettlementReceipt, LedgerError> {
        let request = CreatePayoutRequest::from(order);
        let response = self
            .authorized(self.client.post(self.url("/payouts")))
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Gateway(format!(
                "payout {} rejected with {status}: {body}",
                order.reference
            )));
        }
        let body: CreatePayoutResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Gateway(format!("settlement response malformed: {e}")))?;
        if body.status == PayoutStatus::Failed {
            return Err(LedgerError::Gateway(format!(
                "payout {} reported failed by the rail",
                body.payout_id
            )));
        }
        Ok(SettlementReceipt {
            reference: body.payout_id,
            settled_at: Utc::now(),
        })
    }
}

impl LedgerMirror for PaymentApiClient {
    async fn push_snapshot(
        &self,
        user_id: &str,
        state: &LedgerState,
    ) -> Result<(), LedgerError> {
        let path = format!("/ledger/{user_id}");
        let snapshot = LedgerSnapshotDto::from_state(state);
        let response = self
            .authorized(self.client.put(self.url(&path)))
            .timeout(MIRROR_TIMEOUT)
            .json(&snapshot)
            .send()
            .await
            .map_err(|e| LedgerError::Sync(e.to_string()))?;
        expect_success(response, &path).await?;
        Ok(())
    }
}

async fn expect_success(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LedgerError::Sync(format!("{what} returned {status}: {body}")))
}
