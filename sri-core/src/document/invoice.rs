use super::{
    AccountingObligation, AdditionalDetail, AdditionalField, DocumentError, IdentificationType,
    TaxInfo,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Only currency the authority accepts.
pub const CURRENCY: &str = "DOLAR";

/// Payment method written when the caller supplies no payments ("sin utilización del
/// sistema financiero").
pub const DEFAULT_PAYMENT_METHOD: &str = "01";

fn default_currency() -> String {
    CURRENCY.to_string()
}

/// Invoice (`factura`, document code `01`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub tax_info: TaxInfo,
    pub emission_date: NaiveDate,
    #[serde(default)]
    pub establishment_address: Option<String>,
    #[serde(default)]
    pub special_taxpayer: Option<String>,
    #[serde(default)]
    pub accounting_obligation: Option<AccountingObligation>,
    pub buyer_id_type: IdentificationType,
    #[serde(default)]
    pub waybill_reference: Option<String>,
    pub buyer_name: String,
    pub buyer_id: String,
    #[serde(default)]
    pub buyer_address: Option<String>,
    pub total_without_taxes: f64,
    #[serde(default)]
    pub total_discount: f64,
    pub tax_totals: Vec<TaxTotal>,
    #[serde(default)]
    pub tip: f64,
    pub grand_total: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub vat_withholding: Option<f64>,
    #[serde(default)]
    pub income_tax_withholding: Option<f64>,
    pub lines: Vec<InvoiceLine>,
    #[serde(default)]
    pub withholdings: Vec<Withholding>,
    #[serde(default)]
    pub additional_fields: Vec<AdditionalField>,
}

/// `totalImpuesto` entry of `totalConImpuestos`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTotal {
    pub code: String,
    pub percentage_code: String,
    #[serde(default)]
    pub additional_discount: Option<f64>,
    pub taxable_base: f64,
    pub value: f64,
}

impl TaxTotal {
    pub fn new(
        code: impl Into<String>,
        percentage_code: impl Into<String>,
        taxable_base: f64,
        value: f64,
    ) -> Self {
        Self {
            code: code.into(),
            percentage_code: percentage_code.into(),
            additional_discount: None,
            taxable_base,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub method: String,
    pub total: f64,
    #[serde(default)]
    pub term: Option<u32>,
    #[serde(default)]
    pub time_unit: Option<String>,
}

impl Payment {
    pub fn new(method: impl Into<String>, total: f64) -> Self {
        Self {
            method: method.into(),
            total,
            term: None,
            time_unit: None,
        }
    }

    pub fn with_term(mut self, term: u32, time_unit: impl Into<String>) -> Self {
        self.term = Some(term);
        self.time_unit = Some(time_unit.into());
        self
    }
}

/// Single `detalle` of an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub main_code: String,
    #[serde(default)]
    pub auxiliary_code: Option<String>,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub discount: f64,
    pub total_without_tax: f64,
    #[serde(default)]
    pub additional_details: Vec<AdditionalDetail>,
    pub taxes: Vec<LineTax>,
}

impl InvoiceLine {
    /// Line with no discount; the total is `quantity * unit_price`.
    pub fn new(
        main_code: impl Into<String>,
        description: impl Into<String>,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self {
            main_code: main_code.into(),
            auxiliary_code: None,
            description: description.into(),
            quantity,
            unit_price,
            discount: 0.0,
            total_without_tax: quantity * unit_price,
            additional_details: Vec::new(),
            taxes: Vec::new(),
        }
    }

    pub fn auxiliary_code(mut self, code: impl Into<String>) -> Self {
        self.auxiliary_code = Some(code.into());
        self
    }

    /// Applies a discount and recomputes the line total.
    pub fn discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self.total_without_tax = self.quantity * self.unit_price - discount;
        self
    }

    pub fn detail(mut self, detail: AdditionalDetail) -> Self {
        self.additional_details.push(detail);
        self
    }

    pub fn tax(mut self, tax: LineTax) -> Self {
        self.taxes.push(tax);
        self
    }
}

/// `impuesto` of a line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTax {
    pub code: String,
    pub percentage_code: String,
    pub rate: f64,
    pub taxable_base: f64,
    pub value: f64,
}

impl LineTax {
    /// Tax whose value is `taxable_base * rate / 100`.
    pub fn from_rate(
        code: impl Into<String>,
        percentage_code: impl Into<String>,
        rate: f64,
        taxable_base: f64,
    ) -> Self {
        Self {
            code: code.into(),
            percentage_code: percentage_code.into(),
            rate,
            taxable_base,
            value: taxable_base * rate / 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withholding {
    pub code: String,
    pub percentage_code: String,
    pub rate: f64,
    pub value: f64,
}

/// Mandatory inputs for [`InvoiceBuilder::new`].
#[derive(Debug, Clone)]
pub struct RequiredInvoiceFields {
    pub tax_info: TaxInfo,
    pub emission_date: NaiveDate,
    pub buyer_id_type: IdentificationType,
    pub buyer_name: String,
    pub buyer_id: String,
    pub total_without_taxes: f64,
    pub tax_totals: Vec<TaxTotal>,
    pub grand_total: f64,
    pub lines: Vec<InvoiceLine>,
}

pub struct InvoiceBuilder {
    invoice: Invoice,
}

impl InvoiceBuilder {
    pub fn new(required: RequiredInvoiceFields) -> Self {
        let RequiredInvoiceFields {
            tax_info,
            emission_date,
            buyer_id_type,
            buyer_name,
            buyer_id,
            total_without_taxes,
            tax_totals,
            grand_total,
            lines,
        } = required;
        Self {
            invoice: Invoice {
                tax_info,
                emission_date,
                establishment_address: None,
                special_taxpayer: None,
                accounting_obligation: None,
                buyer_id_type,
                waybill_reference: None,
                buyer_name,
                buyer_id,
                buyer_address: None,
                total_without_taxes,
                total_discount: 0.0,
                tax_totals,
                tip: 0.0,
                grand_total,
                currency: default_currency(),
                payments: Vec::new(),
                vat_withholding: None,
                income_tax_withholding: None,
                lines,
                withholdings: Vec::new(),
                additional_fields: Vec::new(),
            },
        }
    }

    pub fn establishment_address(mut self, address: impl Into<String>) -> Self {
        self.invoice.establishment_address = Some(address.into());
        self
    }

    pub fn special_taxpayer(mut self, number: impl Into<String>) -> Self {
        self.invoice.special_taxpayer = Some(number.into());
        self
    }

    pub fn accounting_obligation(mut self, obligation: AccountingObligation) -> Self {
        self.invoice.accounting_obligation = Some(obligation);
        self
    }

    pub fn waybill_reference(mut self, number: impl Into<String>) -> Self {
        self.invoice.waybill_reference = Some(number.into());
        self
    }

    pub fn buyer_address(mut self, address: impl Into<String>) -> Self {
        self.invoice.buyer_address = Some(address.into());
        self
    }

    pub fn total_discount(mut self, discount: f64) -> Self {
        self.invoice.total_discount = discount;
        self
    }

    pub fn tip(mut self, tip: f64) -> Self {
        self.invoice.tip = tip;
        self
    }

    pub fn payment(mut self, payment: Payment) -> Self {
        self.invoice.payments.push(payment);
        self
    }

    pub fn withheld_vat(mut self, value: f64) -> Self {
        self.invoice.vat_withholding = Some(value);
        self
    }

    pub fn withheld_income_tax(mut self, value: f64) -> Self {
        self.invoice.income_tax_withholding = Some(value);
        self
    }

    pub fn withholding(mut self, withholding: Withholding) -> Self {
        self.invoice.withholdings.push(withholding);
        self
    }

    pub fn additional_field(mut self, field: AdditionalField) -> Self {
        self.invoice.additional_fields.push(field);
        self
    }

    pub fn build(self) -> Result<Invoice, DocumentError> {
        if self.invoice.lines.is_empty() {
            return Err(DocumentError::MissingLineItems);
        }
        if self.invoice.tax_totals.is_empty() {
            return Err(DocumentError::MissingTaxTotals);
        }
        Ok(self.invoice)
    }
}

impl Invoice {
    /// Payments as they will be serialized: the caller's list, or a single
    /// [`DEFAULT_PAYMENT_METHOD`] payment for the grand total when none were given.
    pub fn effective_payments(&self) -> Vec<Payment> {
        if self.payments.is_empty() {
            vec![Payment::new(DEFAULT_PAYMENT_METHOD, self.grand_total)]
        } else {
            self.payments.clone()
        }
    }
}
