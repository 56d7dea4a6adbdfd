use async_trait::async_trait;
use chrono::NaiveDate;
use sri_core::access_key::{AccessKey, NumericCode};
use sri_core::api::{
    AuthorizationResponse, AuthorizationStatus, GatewayError, ReceptionResponse,
    ReceptionStatus, SriGateway,
};
use sri_core::config::{CredentialBundle, Environment, IssuerIdentity};
use sri_core::document::{
    CarriedItem, Document, IdentificationType, InvoiceBuilder, InvoiceLine, LineTax, Recipient,
    RequiredInvoiceFields, RequiredWaybillFields, TaxInfo, TaxTotal, WaybillBuilder,
};
use sri_core::sign::{SigningError, XmlSigner};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[allow(dead_code)]
pub const SCENARIO_KEY: &str = "0601202601099999999900110010010000000011234567817";

#[allow(dead_code)]
pub fn issuer() -> IssuerIdentity {
    IssuerIdentity {
        ruc: "0999999999001".into(),
        legal_name: "EMPRESA DE PRUEBAS S.A.".into(),
        commercial_name: None,
        head_office_address: "AV. PRINCIPAL 123".into(),
        establishment: "001".into(),
        emission_point: "001".into(),
        accounting_obligation: None,
        special_taxpayer: None,
    }
}

#[allow(dead_code)]
pub fn emission_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 6).expect("valid date")
}

#[allow(dead_code)]
pub fn numeric_code() -> NumericCode {
    NumericCode::new("12345678").expect("8 digits")
}

#[allow(dead_code)]
pub fn scenario_key() -> AccessKey {
    AccessKey::parse(SCENARIO_KEY).expect("valid key")
}

/// Smallest invoice the authority accepts: one line, one tax, no payments.
#[allow(dead_code)]
pub fn minimal_invoice() -> Document {
    invoice_with_lines(vec![InvoiceLine::new("P001", "Servicio", 1.0, 10.0)
        .tax(LineTax::from_rate("2", "4", 15.0, 10.0))])
}

#[allow(dead_code)]
pub fn invoice_with_lines(lines: Vec<InvoiceLine>) -> Document {
    let tax_info = TaxInfo::from_issuer(&issuer(), Environment::Test, "000000001");
    InvoiceBuilder::new(RequiredInvoiceFields {
        tax_info,
        emission_date: emission_date(),
        buyer_id_type: IdentificationType::FinalConsumer,
        buyer_name: "CONSUMIDOR FINAL".into(),
        buyer_id: "9999999999999".into(),
        total_without_taxes: 10.0,
        tax_totals: vec![TaxTotal::new("2", "4", 10.0, 1.5)],
        grand_total: 11.5,
        lines,
    })
    .build()
    .expect("build invoice")
    .into()
}

#[allow(dead_code)]
pub fn keyed(mut document: Document) -> Document {
    document
        .assign_access_key(&numeric_code())
        .expect("assign key");
    document
}

#[allow(dead_code)]
pub fn minimal_waybill() -> Document {
    let tax_info = TaxInfo::from_issuer(&issuer(), Environment::Test, "000000010");
    WaybillBuilder::new(RequiredWaybillFields {
        tax_info,
        emission_date: emission_date(),
        departure_address: "BODEGA CENTRAL".into(),
        carrier_name: "TRANSPORTES ANDINOS".into(),
        carrier_id_type: IdentificationType::Ruc,
        carrier_ruc: "1799999999001".into(),
        transport_start: emission_date(),
        transport_end: NaiveDate::from_ymd_opt(2026, 1, 7).expect("valid date"),
        plate: "PBA1234".into(),
    })
    .recipient(
        Recipient::new("0912345678", "CLIENTE", "AV. AMAZONAS", "VENTA")
            .item(CarriedItem::new("A-1", "Cajas", 3.0)),
    )
    .build()
    .expect("build waybill")
    .into()
}

#[allow(dead_code)]
pub fn credentials() -> CredentialBundle {
    CredentialBundle::new("certs/firma.p12", "secret")
}

/// Appends a marker instead of a real enveloped signature.
#[allow(dead_code)]
#[derive(Default)]
pub struct MarkerSigner {
    pub calls: AtomicUsize,
}

#[async_trait]
impl XmlSigner for MarkerSigner {
    async fn sign(
        &self,
        xml: &[u8],
        _credentials: &CredentialBundle,
    ) -> Result<Vec<u8>, SigningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut signed = xml.to_vec();
        signed.extend_from_slice(b"<!--signed-->");
        Ok(signed)
    }
}

#[allow(dead_code)]
pub struct FailingSigner;

#[async_trait]
impl XmlSigner for FailingSigner {
    async fn sign(
        &self,
        _xml: &[u8],
        _credentials: &CredentialBundle,
    ) -> Result<Vec<u8>, SigningError> {
        Err(SigningError::Credential("wrong PKCS#12 password".into()))
    }
}

/// Gateway that replays queued answers and counts calls.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedGateway {
    receptions: Mutex<VecDeque<Result<ReceptionResponse, GatewayError>>>,
    authorizations: Mutex<VecDeque<Result<AuthorizationResponse, GatewayError>>>,
    delay: Option<Duration>,
    pub reception_calls: AtomicUsize,
    pub authorization_calls: AtomicUsize,
    pub last_payload: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reception(self, status: ReceptionStatus) -> Self {
        self.reception_result(Ok(ReceptionResponse::new(status, Vec::new())))
    }

    pub fn reception_result(self, result: Result<ReceptionResponse, GatewayError>) -> Self {
        self.receptions.lock().unwrap().push_back(result);
        self
    }

    pub fn authorization(self, response: AuthorizationResponse) -> Self {
        self.authorization_result(Ok(response))
    }

    pub fn authorization_result(self, result: Result<AuthorizationResponse, GatewayError>) -> Self {
        self.authorizations.lock().unwrap().push_back(result);
        self
    }

    pub fn authorized(self) -> Self {
        self.authorization(
            AuthorizationResponse::new(AuthorizationStatus::Authorized)
                .with_authorization_number(SCENARIO_KEY)
                .with_authorization_date("2026-01-06T10:15:00-05:00")
                .with_document("<factura id=\"comprobante\"/>"),
        )
    }

    pub fn receptions(&self) -> usize {
        self.reception_calls.load(Ordering::SeqCst)
    }

    pub fn authorizations(&self) -> usize {
        self.authorization_calls.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SriGateway for ScriptedGateway {
    async fn submit_receipt(
        &self,
        signed_xml_base64: &str,
    ) -> Result<ReceptionResponse, GatewayError> {
        self.reception_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_payload.lock().unwrap() = Some(signed_xml_base64.to_string());
        self.wait().await;
        let next = self.receptions.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(GatewayError::Network("no scripted reception".into())))
    }

    async fn query_authorization(
        &self,
        _access_key: &AccessKey,
    ) -> Result<AuthorizationResponse, GatewayError> {
        self.authorization_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let next = self.authorizations.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(GatewayError::Network("no scripted authorization".into())))
    }
}
