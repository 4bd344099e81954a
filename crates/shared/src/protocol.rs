use serde::{Deserialize, Serialize};

use crate::domain::{Address, Amount, BatchId, Recommendation};

/// Body of `POST /api/flashloans/multi/risk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessmentRequest {
    pub initiator: Address,
    pub asset: Address,
    pub total_amount: Amount,
    pub recipients: Vec<Address>,
    pub allocations: Vec<Amount>,
    pub receiver_contract: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Body of `POST /api/flashloans/multi/quote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub asset: Address,
    pub total_amount: Amount,
    pub recipient_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub premium: Amount,
    pub fee_bps: u32,
    pub estimated_gas: u64,
    pub estimated_gas_cost: Amount,
}

/// Body of `POST /api/flashloans/multi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBatchRequest {
    pub initiator: Address,
    pub asset: Address,
    pub total_amount: Amount,
    pub recipients: Vec<Address>,
    pub allocations: Vec<Amount>,
    pub receiver_contract: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBatchResponse {
    pub batch_id: BatchId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// One executed batch as reported by `GET /api/flashloans/multi/user/:address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch_id: BatchId,
    pub asset: Address,
    pub total_amount: Amount,
    pub premium: Amount,
    pub recipients: Vec<Address>,
    pub allocations: Vec<Amount>,
    pub initiator: Address,
    /// Unix seconds.
    pub timestamp: i64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBatchesResponse {
    #[serde(default)]
    pub data: Vec<BatchRecord>,
}
