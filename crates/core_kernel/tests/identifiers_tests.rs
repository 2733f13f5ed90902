//! Unit tests for the Identifiers module

use core_kernel::{
    AppointmentId, ClientId, ContractId, EmployeeId, IdParseError, InvoiceId,
    InvoiceLineId, PaymentId,
};

#[test]
fn test_prefixes_are_distinct() {
    let prefixes = [
        ClientId::prefix(),
        ContractId::prefix(),
        AppointmentId::prefix(),
        EmployeeId::prefix(),
        InvoiceId::prefix(),
        InvoiceLineId::prefix(),
        PaymentId::prefix(),
    ];
    let mut sorted = prefixes.to_vec();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), prefixes.len());
}

#[test]
fn test_display_parse_round_trip() {
    let id = EmployeeId::new(1234);
    let parsed: EmployeeId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn test_wrong_prefix_is_rejected() {
    let result = "PAY-5".parse::<InvoiceId>();
    assert_eq!(
        result,
        Err(IdParseError { kind: "INV", value: "PAY-5".to_string() })
    );
}

#[test]
fn test_i64_conversion() {
    let id = ClientId::from(77);
    let raw: i64 = id.into();
    assert_eq!(raw, 77);
}

#[test]
fn test_ordering_follows_key() {
    assert!(PaymentId::new(1) < PaymentId::new(2));
}
