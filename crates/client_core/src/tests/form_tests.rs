use super::*;

const ASSET: &str = "0x1111111111111111111111111111111111111111";
const ALICE: &str = "0x2222222222222222222222222222222222222222";
const BOB: &str = "0x3333333333333333333333333333333333333333";
const RECEIVER: &str = "0x4444444444444444444444444444444444444444";

fn two_recipient_form(total: &str) -> BatchForm {
    let mut form = BatchForm::new();
    form.set_asset(ASSET);
    form.set_total_amount(total);
    form.set_recipient_address(0, ALICE);
    form.set_recipient_amount(0, "1.5");
    assert!(form.add_recipient());
    form.set_recipient_address(1, BOB);
    form.set_recipient_amount(1, "2.5");
    form.set_receiver_contract(RECEIVER);
    form
}

#[test]
fn matching_sum_passes_validation() {
    let batch = two_recipient_form("4.0").validate().expect("valid batch");
    assert_eq!(batch.total_amount.to_decimal_string(), "4.0");
    assert_eq!(batch.allocations.len(), 2);
    assert_eq!(batch.allocations[1].amount.to_decimal_string(), "2.5");
}

#[test]
fn mismatched_sum_fails_validation() {
    let err = two_recipient_form("4.1").validate().expect_err("sum mismatch");
    assert!(matches!(err, ValidationError::SumMismatch { .. }));
    assert_eq!(
        err.to_string(),
        "Sum of recipient amounts (4.0) must equal total amount (4.1)"
    );
}

#[test]
fn one_base_unit_discrepancy_is_rejected() {
    let mut form = two_recipient_form("4.0");
    form.set_recipient_amount(1, "2.500000000000000001");
    let err = form.validate().expect_err("sum mismatch");
    assert!(matches!(err, ValidationError::SumMismatch { .. }));
}

#[test]
fn checks_run_in_documented_order() {
    let mut form = BatchForm::new();
    assert_eq!(form.validate(), Err(ValidationError::InvalidAsset));

    form.set_asset(ASSET);
    assert_eq!(form.validate(), Err(ValidationError::InvalidTotalAmount));

    form.set_total_amount("0");
    assert_eq!(form.validate(), Err(ValidationError::InvalidTotalAmount));

    form.set_total_amount("1");
    assert_eq!(
        form.validate(),
        Err(ValidationError::InvalidRecipientAddress { index: 0 })
    );

    form.set_recipient_address(0, ALICE);
    assert_eq!(
        form.validate(),
        Err(ValidationError::InvalidRecipientAmount { index: 0 })
    );

    form.set_recipient_amount(0, "1");
    assert_eq!(form.validate(), Err(ValidationError::InvalidReceiverContract));

    form.set_receiver_contract(RECEIVER);
    assert!(form.validate().is_ok());
}

#[test]
fn first_failing_recipient_is_reported_by_position() {
    let mut form = two_recipient_form("4.0");
    form.set_recipient_amount(1, "0");
    form.set_recipient_address(0, "0xnot-an-address");

    let err = form.validate().expect_err("invalid recipient");
    assert_eq!(err, ValidationError::InvalidRecipientAddress { index: 0 });
    assert_eq!(err.to_string(), "Recipient 1: please enter a valid address");

    form.set_recipient_address(0, ALICE);
    let err = form.validate().expect_err("invalid amount");
    assert_eq!(err.to_string(), "Recipient 2: amount must be greater than 0");
}

#[test]
fn recipient_count_outside_bounds_fails() {
    let raw = format!(
        r#"
asset = "{ASSET}"
total_amount = "1"
receiver_contract = "{RECEIVER}"
recipients = []
"#
    );
    let empty: BatchForm = toml::from_str(&raw).expect("form");
    assert_eq!(empty.validate(), Err(ValidationError::RecipientCount(0)));

    let mut rows = String::new();
    for _ in 0..21 {
        rows.push_str(&format!("[[recipients]]\naddress = \"{ALICE}\"\namount = \"1\"\n"));
    }
    let raw = format!(
        "asset = \"{ASSET}\"\ntotal_amount = \"21\"\nreceiver_contract = \"{RECEIVER}\"\n{rows}"
    );
    let crowded: BatchForm = toml::from_str(&raw).expect("form");
    assert_eq!(crowded.validate(), Err(ValidationError::RecipientCount(21)));
}

#[test]
fn add_recipient_stops_at_limit_and_last_row_is_kept() {
    let mut form = BatchForm::new();
    while form.recipients().len() < MAX_RECIPIENTS {
        assert!(form.add_recipient());
    }
    assert!(!form.add_recipient());
    assert_eq!(form.recipients().len(), MAX_RECIPIENTS);

    let mut single = BatchForm::new();
    assert!(!single.remove_recipient(0));
    assert!(!single.set_recipient_amount(3, "1"));
}

#[test]
fn every_mutation_bumps_revision() {
    let mut form = BatchForm::new();
    let start = form.revision();
    form.set_asset(ASSET);
    form.set_total_amount("1");
    form.add_recipient();
    form.remove_recipient(1);
    form.set_params(Some("0x".into()));
    assert_eq!(form.revision(), start + 5);

    let before_reset = form.revision();
    form.reset();
    assert!(form.revision() > before_reset);
    assert_eq!(form.asset(), "");
    assert_eq!(form.recipients().len(), 1);
}

#[test]
fn split_evenly_produces_valid_batch() {
    let mut form = two_recipient_form("1");
    form.add_recipient();
    form.set_recipient_address(2, ALICE);
    form.split_evenly().expect("split");

    let amounts: Vec<&str> = form.recipients().iter().map(|r| r.amount.as_str()).collect();
    assert_eq!(
        amounts,
        vec!["0.333333333333333333", "0.333333333333333333", "0.333333333333333334"]
    );
    assert!(form.validate().is_ok());
}

#[test]
fn split_evenly_requires_total() {
    let mut form = BatchForm::new();
    assert_eq!(form.split_evenly(), Err(ValidationError::InvalidTotalAmount));
}

#[test]
fn validated_batch_builds_wire_requests() {
    let batch = two_recipient_form("4").validate().expect("valid");
    let initiator: Address = RECEIVER.parse().expect("address");

    let quote = batch.quote_request();
    assert_eq!(quote.recipient_count, 2);

    let risk = batch.risk_request(initiator);
    assert_eq!(risk.recipients.len(), risk.allocations.len());
    assert_eq!(risk.initiator, initiator);

    let execute = batch.execute_request(initiator);
    assert_eq!(execute.allocations, risk.allocations);
    assert!(execute.params.is_none());
}
