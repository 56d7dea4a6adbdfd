mod common;

use common::{emission_date, issuer, minimal_invoice, numeric_code, SCENARIO_KEY};
use sri_core::access_key::{
    compute_check_digit, AccessKey, AccessKeyFields, MalformedFieldError, NumericCode,
};
use sri_core::config::Environment;
use sri_core::document::{Document, TaxInfo};

fn scenario_fields() -> AccessKeyFields {
    AccessKeyFields {
        emission_date: "06012026".into(),
        document_type: "01".into(),
        ruc: "0999999999001".into(),
        environment: "1".into(),
        series: "001001".into(),
        sequential: "000000001".into(),
        numeric_code: "12345678".into(),
        emission_type: "1".into(),
    }
}

#[test]
fn scenario_key_is_fields_plus_check_digit() {
    let key = AccessKey::generate(&scenario_fields()).unwrap();
    assert_eq!(key.as_str(), SCENARIO_KEY);
    assert_eq!(
        &key.as_str()[..48],
        "060120260109999999990011001001000000001123456781"
    );
    assert_eq!(key.check_digit(), 7);
    assert_eq!(key.emission_date(), "06012026");
    assert_eq!(key.series(), "001001");
    assert_eq!(key.numeric_code(), "12345678");
}

#[test]
fn check_digit_matches_the_parsed_key() {
    let key = AccessKey::parse(SCENARIO_KEY).unwrap();
    assert_eq!(compute_check_digit(&SCENARIO_KEY[..48]).unwrap(), 7);
    assert_eq!(key, SCENARIO_KEY.parse::<AccessKey>().unwrap());
}

#[test]
fn tampered_key_fails_to_parse() {
    let mut tampered = SCENARIO_KEY.to_string();
    tampered.replace_range(20..21, "8");
    assert!(matches!(
        AccessKey::parse(tampered),
        Err(MalformedFieldError::CheckDigit { .. })
    ));
}

#[test]
fn short_ruc_is_rejected_before_concatenation() {
    let mut fields = scenario_fields();
    fields.ruc = "099999999900".into();
    assert!(matches!(
        AccessKey::generate(&fields),
        Err(MalformedFieldError::Length { .. })
    ));
}

#[test]
fn random_codes_always_yield_parseable_keys() {
    for _ in 0..200 {
        let code = NumericCode::random();
        assert_eq!(code.as_str().len(), 8);
        let mut fields = scenario_fields();
        fields.numeric_code = code.as_str().to_string();
        let key = AccessKey::generate(&fields).unwrap();
        assert_eq!(AccessKey::parse(key.as_str()).unwrap(), key);
    }
}

#[test]
fn document_key_uses_issuer_series_and_emission_date() {
    let mut document = minimal_invoice();
    if let Document::Invoice(invoice) = &mut document {
        invoice.tax_info = TaxInfo::from_issuer(&issuer(), Environment::Production, "000000042");
    }
    let key = document.assign_access_key(&numeric_code()).unwrap().clone();

    assert_eq!(key.emission_date(), emission_date().format("%d%m%Y").to_string());
    assert_eq!(key.environment(), "2");
    assert_eq!(key.sequential(), "000000042");
    assert_eq!(key.series(), issuer().series());
}

#[test]
fn numeric_code_deserialization_validates() {
    assert!(serde_json::from_str::<NumericCode>(r#""1234""#).is_err());
    assert!(serde_json::from_str::<NumericCode>(r#""1234567a""#).is_err());

    let code: NumericCode = serde_json::from_str(r#""12345678""#).unwrap();
    assert_eq!(code, numeric_code());
    assert_eq!(serde_json::to_string(&code).unwrap(), r#""12345678""#);
}
