//! Editable batch form and the synchronous validation that gates every remote call.

use flashloan_shared::{
    domain::{Address, Amount},
    protocol::{
        BatchRecord, ExecuteBatchRequest, ExecuteBatchResponse, QuoteRequest,
        RiskAssessmentRequest,
    },
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_RECIPIENTS: usize = 1;
pub const MAX_RECIPIENTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a valid asset address")]
    InvalidAsset,
    #[error("Please enter a valid total amount greater than 0")]
    InvalidTotalAmount,
    #[error("Number of recipients must be between 1 and 20 (got {0})")]
    RecipientCount(usize),
    #[error("Recipient {}: please enter a valid address", .index + 1)]
    InvalidRecipientAddress { index: usize },
    #[error("Recipient {}: amount must be greater than 0", .index + 1)]
    InvalidRecipientAmount { index: usize },
    #[error("Please enter a valid receiver contract address")]
    InvalidReceiverContract,
    #[error("Sum of recipient amounts ({sum}) must equal total amount ({total})")]
    SumMismatch { sum: Amount, total: Amount },
    #[error("Sum of recipient amounts is too large")]
    SumOverflow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientInput {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub amount: String,
}

impl RecipientInput {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }
}

/// Raw user input for one multi-recipient batch.
///
/// Every mutation bumps `revision`, which the store uses to drop quotes and
/// responses that were computed for an older snapshot of the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchForm {
    asset: String,
    total_amount: String,
    recipients: Vec<RecipientInput>,
    receiver_contract: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<String>,
    #[serde(skip)]
    revision: u64,
}

impl Default for BatchForm {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchForm {
    pub fn new() -> Self {
        Self {
            asset: String::new(),
            total_amount: String::new(),
            recipients: vec![RecipientInput::default()],
            receiver_contract: String::new(),
            params: None,
            revision: 0,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn total_amount(&self) -> &str {
        &self.total_amount
    }

    pub fn recipients(&self) -> &[RecipientInput] {
        &self.recipients
    }

    pub fn receiver_contract(&self) -> &str {
        &self.receiver_contract
    }

    pub fn params(&self) -> Option<&str> {
        self.params.as_deref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn set_revision_floor(&mut self, floor: u64) {
        self.revision = self.revision.max(floor);
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn set_asset(&mut self, asset: impl Into<String>) {
        self.asset = asset.into();
        self.touch();
    }

    pub fn set_total_amount(&mut self, amount: impl Into<String>) {
        self.total_amount = amount.into();
        self.touch();
    }

    pub fn set_receiver_contract(&mut self, receiver: impl Into<String>) {
        self.receiver_contract = receiver.into();
        self.touch();
    }

    pub fn set_params(&mut self, params: Option<String>) {
        self.params = params.filter(|p| !p.trim().is_empty());
        self.touch();
    }

    /// Appends an empty row; refused once the form holds `MAX_RECIPIENTS`.
    pub fn add_recipient(&mut self) -> bool {
        if self.recipients.len() >= MAX_RECIPIENTS {
            return false;
        }
        self.recipients.push(RecipientInput::default());
        self.touch();
        true
    }

    /// Removes a row; the last remaining row is never removed.
    pub fn remove_recipient(&mut self, index: usize) -> bool {
        if self.recipients.len() <= MIN_RECIPIENTS || index >= self.recipients.len() {
            return false;
        }
        self.recipients.remove(index);
        self.touch();
        true
    }

    pub fn set_recipient_address(&mut self, index: usize, address: impl Into<String>) -> bool {
        let Some(row) = self.recipients.get_mut(index) else {
            return false;
        };
        row.address = address.into();
        self.touch();
        true
    }

    pub fn set_recipient_amount(&mut self, index: usize, amount: impl Into<String>) -> bool {
        let Some(row) = self.recipients.get_mut(index) else {
            return false;
        };
        row.amount = amount.into();
        self.touch();
        true
    }

    /// Distributes the total across the current rows in base units.
    pub fn split_evenly(&mut self) -> Result<(), ValidationError> {
        let total = parse_positive(&self.total_amount).ok_or(ValidationError::InvalidTotalAmount)?;
        let shares = total.split_evenly(self.recipients.len());
        for (row, share) in self.recipients.iter_mut().zip(shares) {
            row.amount = share.to_decimal_string();
        }
        self.touch();
        Ok(())
    }

    /// Clears all input back to a single empty row, keeping the revision monotonic.
    pub fn reset(&mut self) {
        let revision = self.revision;
        *self = Self::new();
        self.revision = revision + 1;
    }

    pub fn validate(&self) -> Result<ValidatedBatch, ValidationError> {
        let asset: Address = self
            .asset
            .parse()
            .map_err(|_| ValidationError::InvalidAsset)?;

        let total_amount =
            parse_positive(&self.total_amount).ok_or(ValidationError::InvalidTotalAmount)?;

        if !(MIN_RECIPIENTS..=MAX_RECIPIENTS).contains(&self.recipients.len()) {
            return Err(ValidationError::RecipientCount(self.recipients.len()));
        }

        let mut allocations = Vec::with_capacity(self.recipients.len());
        for (index, row) in self.recipients.iter().enumerate() {
            let address: Address = row
                .address
                .parse()
                .map_err(|_| ValidationError::InvalidRecipientAddress { index })?;
            let amount = parse_positive(&row.amount)
                .ok_or(ValidationError::InvalidRecipientAmount { index })?;
            allocations.push(Allocation { address, amount });
        }

        let receiver_contract: Address = self
            .receiver_contract
            .parse()
            .map_err(|_| ValidationError::InvalidReceiverContract)?;

        let sum = Amount::checked_sum(allocations.iter().map(|a| a.amount))
            .ok_or(ValidationError::SumOverflow)?;
        if sum != total_amount {
            return Err(ValidationError::SumMismatch {
                sum,
                total: total_amount,
            });
        }

        Ok(ValidatedBatch {
            asset,
            total_amount,
            allocations,
            receiver_contract,
            params: self.params.clone(),
        })
    }
}

fn parse_positive(raw: &str) -> Option<Amount> {
    Amount::parse_decimal(raw).ok().filter(|amount| !amount.is_zero())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub address: Address,
    pub amount: Amount,
}

/// A form snapshot that passed validation, in parsed base-unit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBatch {
    pub asset: Address,
    pub total_amount: Amount,
    pub allocations: Vec<Allocation>,
    pub receiver_contract: Address,
    pub params: Option<String>,
}

impl ValidatedBatch {
    fn recipient_addresses(&self) -> Vec<Address> {
        self.allocations.iter().map(|a| a.address).collect()
    }

    fn allocation_amounts(&self) -> Vec<Amount> {
        self.allocations.iter().map(|a| a.amount).collect()
    }

    pub fn risk_request(&self, initiator: Address) -> RiskAssessmentRequest {
        RiskAssessmentRequest {
            initiator,
            asset: self.asset,
            total_amount: self.total_amount,
            recipients: self.recipient_addresses(),
            allocations: self.allocation_amounts(),
            receiver_contract: self.receiver_contract,
        }
    }

    pub fn quote_request(&self) -> QuoteRequest {
        QuoteRequest {
            asset: self.asset,
            total_amount: self.total_amount,
            recipient_count: self.allocations.len(),
        }
    }

    pub fn execute_request(&self, initiator: Address) -> ExecuteBatchRequest {
        ExecuteBatchRequest {
            initiator,
            asset: self.asset,
            total_amount: self.total_amount,
            recipients: self.recipient_addresses(),
            allocations: self.allocation_amounts(),
            receiver_contract: self.receiver_contract,
            params: self.params.clone(),
        }
    }

    /// History entry for a batch the backend accepted.
    pub fn executed_record(
        &self,
        response: &ExecuteBatchResponse,
        initiator: Address,
        premium: Amount,
        timestamp: i64,
    ) -> BatchRecord {
        BatchRecord {
            batch_id: response.batch_id.clone(),
            asset: self.asset,
            total_amount: self.total_amount,
            premium,
            recipients: self.recipient_addresses(),
            allocations: self.allocation_amounts(),
            initiator,
            timestamp,
            success: true,
            failure_reason: None,
            tx_hash: response.tx_hash.clone(),
        }
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
