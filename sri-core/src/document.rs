//! Electronic document domain types.
mod invoice;
pub mod validation;
mod waybill;
pub mod xml;

pub use invoice::{
    Invoice, InvoiceBuilder, InvoiceLine, LineTax, Payment, RequiredInvoiceFields, TaxTotal,
    Withholding, CURRENCY, DEFAULT_PAYMENT_METHOD,
};
pub use waybill::{
    CarriedItem, Recipient, RequiredWaybillFields, SupportingDocument, Waybill, WaybillBuilder,
};

use crate::access_key::{AccessKey, AccessKeyFields, MalformedFieldError, NumericCode};
use crate::config::{Environment, IssuerIdentity};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Emission type written into keys and headers. Only normal emission exists.
pub const NORMAL_EMISSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("invoice must contain at least one line item")]
    MissingLineItems,
    #[error("invoice must contain at least one tax total")]
    MissingTaxTotals,
    #[error("waybill must contain at least one recipient")]
    MissingRecipients,
    #[error("recipient {index} carries no goods")]
    RecipientWithoutGoods { index: usize },
}

/// Document kind and its SRI `codDoc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    Invoice,
    Waybill,
}

impl DocumentType {
    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "01",
            DocumentType::Waybill => "06",
        }
    }

    /// Root element name in the authority schema.
    pub fn root_element(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "factura",
            DocumentType::Waybill => "guiaRemision",
        }
    }
}

/// `SI` / `NO` flag for the accounting obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountingObligation {
    #[serde(rename = "SI")]
    Si,
    #[serde(rename = "NO")]
    No,
}

impl AccountingObligation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountingObligation::Si => "SI",
            AccountingObligation::No => "NO",
        }
    }
}

/// Identification type of a buyer or carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentificationType {
    #[serde(rename = "04")]
    Ruc,
    #[serde(rename = "05")]
    Cedula,
    #[serde(rename = "06")]
    Passport,
    #[serde(rename = "07")]
    FinalConsumer,
}

impl IdentificationType {
    pub fn code(&self) -> &'static str {
        match self {
            IdentificationType::Ruc => "04",
            IdentificationType::Cedula => "05",
            IdentificationType::Passport => "06",
            IdentificationType::FinalConsumer => "07",
        }
    }
}

/// Name/value pair attached to a line (`detAdicional`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDetail {
    pub name: String,
    pub value: String,
}

impl AdditionalDetail {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Free-form `campoAdicional` at the end of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalField {
    pub name: String,
    pub value: String,
}

impl AdditionalField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// `infoTributaria` header shared by every document type.
///
/// Fixed-width fields are plain strings; widths are checked by
/// [`validation::validate_xml`] rather than at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxInfo {
    pub environment: Environment,
    pub emission_type: String,
    pub legal_name: String,
    pub commercial_name: Option<String>,
    pub ruc: String,
    pub access_key: Option<AccessKey>,
    pub establishment: String,
    pub emission_point: String,
    pub sequential: String,
    pub head_office_address: String,
}

impl TaxInfo {
    /// Header for the given issuer; the access key slot starts empty.
    pub fn from_issuer(
        issuer: &IssuerIdentity,
        environment: Environment,
        sequential: impl Into<String>,
    ) -> Self {
        Self {
            environment,
            emission_type: NORMAL_EMISSION.to_string(),
            legal_name: issuer.legal_name.clone(),
            commercial_name: issuer.commercial_name.clone(),
            ruc: issuer.ruc.clone(),
            access_key: None,
            establishment: issuer.establishment.clone(),
            emission_point: issuer.emission_point.clone(),
            sequential: sequential.into(),
            head_office_address: issuer.head_office_address.clone(),
        }
    }

    pub fn access_key(&self) -> Option<&AccessKey> {
        self.access_key.as_ref()
    }

    /// `estab-ptoEmi-secuencial`, the printed document number.
    pub fn document_number(&self) -> String {
        format!(
            "{}-{}-{}",
            self.establishment, self.emission_point, self.sequential
        )
    }

    fn key_fields(
        &self,
        document_type: DocumentType,
        emission_date: NaiveDate,
        numeric_code: &NumericCode,
    ) -> AccessKeyFields {
        AccessKeyFields {
            emission_date: emission_date.format("%d%m%Y").to_string(),
            document_type: document_type.code().to_string(),
            ruc: self.ruc.clone(),
            environment: self.environment.code().to_string(),
            series: format!("{}{}", self.establishment, self.emission_point),
            sequential: self.sequential.clone(),
            numeric_code: numeric_code.as_str().to_string(),
            emission_type: self.emission_type.clone(),
        }
    }
}

/// A tax document ready to be keyed, serialized and submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    Invoice(Invoice),
    Waybill(Waybill),
}

impl Document {
    pub fn document_type(&self) -> DocumentType {
        match self {
            Document::Invoice(_) => DocumentType::Invoice,
            Document::Waybill(_) => DocumentType::Waybill,
        }
    }

    pub fn tax_info(&self) -> &TaxInfo {
        match self {
            Document::Invoice(invoice) => &invoice.tax_info,
            Document::Waybill(waybill) => &waybill.tax_info,
        }
    }

    fn tax_info_mut(&mut self) -> &mut TaxInfo {
        match self {
            Document::Invoice(invoice) => &mut invoice.tax_info,
            Document::Waybill(waybill) => &mut waybill.tax_info,
        }
    }

    /// Date used for the access key.
    pub fn emission_date(&self) -> NaiveDate {
        match self {
            Document::Invoice(invoice) => invoice.emission_date,
            Document::Waybill(waybill) => waybill.emission_date,
        }
    }

    pub fn access_key(&self) -> Option<&AccessKey> {
        self.tax_info().access_key()
    }

    /// Fill `obligadoContabilidad` and `contribuyenteEspecial` from the issuer where
    /// the document leaves them unset.
    pub fn apply_issuer_defaults(&mut self, issuer: &IssuerIdentity) {
        let (obligation, special) = match self {
            Document::Invoice(invoice) => (
                &mut invoice.accounting_obligation,
                &mut invoice.special_taxpayer,
            ),
            Document::Waybill(waybill) => (
                &mut waybill.accounting_obligation,
                &mut waybill.special_taxpayer,
            ),
        };
        if obligation.is_none() {
            *obligation = issuer.accounting_obligation;
        }
        if special.is_none() {
            special.clone_from(&issuer.special_taxpayer);
        }
    }

    /// Derive and store the access key. A key that is already present is kept as is.
    ///
    /// # Errors
    /// Returns [`MalformedFieldError`] when the header fields cannot form a key.
    pub fn assign_access_key(
        &mut self,
        numeric_code: &NumericCode,
    ) -> Result<&AccessKey, MalformedFieldError> {
        let document_type = self.document_type();
        let emission_date = self.emission_date();
        let info = self.tax_info_mut();
        let key = match info.access_key.take() {
            Some(existing) => existing,
            None => {
                let fields = info.key_fields(document_type, emission_date, numeric_code);
                AccessKey::generate(&fields)?
            }
        };
        Ok(&*info.access_key.insert(key))
    }
}

impl From<Invoice> for Document {
    fn from(invoice: Invoice) -> Self {
        Document::Invoice(invoice)
    }
}

impl From<Waybill> for Document {
    fn from(waybill: Waybill) -> Self {
        Document::Waybill(waybill)
    }
}
