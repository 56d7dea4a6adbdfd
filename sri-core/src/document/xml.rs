//! Canonical XML for SRI documents.
//!
//! Output is compact, deterministic and follows the element order of the authority
//! schemas (`factura` 1.0.0 and `guiaRemision` 1.0.0).
use super::{
    AdditionalDetail, AdditionalField, CarriedItem, Document, DocumentType, Invoice, InvoiceLine,
    LineTax, Payment, Recipient, TaxInfo, TaxTotal, Waybill, Withholding,
};
use crate::access_key::AccessKey;

use amounts::{Amount, Trimmed};
use chrono::NaiveDate;
use quick_xml::se::{SeError, Serializer as QuickXmlSerializer};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;
use thiserror::Error;

/// Value of the root `version` attribute.
pub const SCHEMA_VERSION: &str = "1.0.0";
/// Value of the root `id` attribute.
pub const ROOT_ID: &str = "comprobante";
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Structurally required data is missing, or the serializer failed.
#[derive(Debug, Error)]
pub enum SchemaMappingError {
    #[error("document has no access key")]
    MissingAccessKey,
    #[error("invoice has no tax totals")]
    MissingTaxTotals,
    #[error("invoice has no line items")]
    MissingLineItems,
    #[error("line item {index} has no taxes")]
    LineWithoutTaxes { index: usize },
    #[error("waybill has no recipients")]
    MissingRecipients,
    #[error("recipient {index} carries no goods")]
    RecipientWithoutGoods { index: usize },
    #[error("failed to serialize document to XML: {source}")]
    Serialize {
        #[from]
        source: SeError,
    },
}

/// XML formatting options. Only [`XmlFormat::Compact`] is canonical.
#[derive(Debug, Clone, Copy, Default)]
pub enum XmlFormat {
    #[default]
    Compact,
    Pretty {
        indent_char: char,
        indent_size: usize,
    },
}

/// Serialized, unsigned document together with its access key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalXml {
    xml: String,
    access_key: AccessKey,
    document_type: DocumentType,
}

impl CanonicalXml {
    pub fn as_str(&self) -> &str {
        &self.xml
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.xml.as_bytes()
    }

    pub fn access_key(&self) -> &AccessKey {
        &self.access_key
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn into_string(self) -> String {
        self.xml
    }
}

impl fmt::Display for CanonicalXml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.xml)
    }
}

impl AsRef<[u8]> for CanonicalXml {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Build the canonical XML of a keyed document.
///
/// # Errors
/// Returns [`SchemaMappingError`] when the access key or any structurally required
/// block is missing.
///
/// # Examples
/// ```rust,no_run
/// use sri_core::document::{xml, Document};
///
/// let document: Document = unimplemented!();
/// let canonical = xml::build(&document)?;
/// assert!(canonical.as_str().starts_with("<?xml"));
/// # Ok::<(), sri_core::document::xml::SchemaMappingError>(())
/// ```
pub fn build(document: &Document) -> Result<CanonicalXml, SchemaMappingError> {
    build_with_format(document, XmlFormat::Compact)
}

pub fn build_with_format(
    document: &Document,
    format: XmlFormat,
) -> Result<CanonicalXml, SchemaMappingError> {
    let access_key = document
        .access_key()
        .cloned()
        .ok_or(SchemaMappingError::MissingAccessKey)?;
    match document {
        Document::Invoice(invoice) => check_invoice(invoice)?,
        Document::Waybill(waybill) => check_waybill(waybill)?,
    }

    let mut buffer = String::with_capacity(4096);
    buffer.push_str(XML_DECLARATION);
    {
        let mut serializer = QuickXmlSerializer::new(&mut buffer);
        if let XmlFormat::Pretty {
            indent_char,
            indent_size,
        } = format
        {
            serializer.indent(indent_char, indent_size);
        }
        match document {
            Document::Invoice(invoice) => InvoiceXml(invoice).serialize(serializer)?,
            Document::Waybill(waybill) => WaybillXml(waybill).serialize(serializer)?,
        };
    }

    Ok(CanonicalXml {
        xml: buffer,
        access_key,
        document_type: document.document_type(),
    })
}

fn check_invoice(invoice: &Invoice) -> Result<(), SchemaMappingError> {
    if invoice.tax_totals.is_empty() {
        return Err(SchemaMappingError::MissingTaxTotals);
    }
    if invoice.lines.is_empty() {
        return Err(SchemaMappingError::MissingLineItems);
    }
    if let Some(index) = invoice.lines.iter().position(|line| line.taxes.is_empty()) {
        return Err(SchemaMappingError::LineWithoutTaxes { index });
    }
    Ok(())
}

fn check_waybill(waybill: &Waybill) -> Result<(), SchemaMappingError> {
    if waybill.recipients.is_empty() {
        return Err(SchemaMappingError::MissingRecipients);
    }
    if let Some(index) = waybill
        .recipients
        .iter()
        .position(|recipient| recipient.items.is_empty())
    {
        return Err(SchemaMappingError::RecipientWithoutGoods { index });
    }
    Ok(())
}

/// Dates travel as `dd/mm/yyyy`.
fn date(value: NaiveDate) -> String {
    value.format("%d/%m/%Y").to_string()
}

mod amounts {
    use serde::ser::{Serialize, Serializer};
    use std::fmt::{self, Display, Formatter};

    /// Digits printed when probing for an exact tie. Any f64 that is not exactly
    /// halfway between two cents differs from the halfway point well before this.
    const EXACT_DIGITS: usize = 30;

    /// Two decimals from the exact binary value (`2.675` → `2.67`). Only exact ties
    /// (`0.125`) round half away from zero. Negative zero folds to zero.
    pub(super) fn fixed2(value: f64) -> String {
        if !value.is_finite() {
            return format!("{value:.2}");
        }
        let magnitude = value.abs();
        let digits = if is_exact_tie(magnitude) {
            round_tie_up(magnitude)
        } else {
            format!("{magnitude:.2}")
        };
        if value.is_sign_negative() && digits.bytes().any(|b| matches!(b, b'1'..=b'9')) {
            format!("-{digits}")
        } else {
            digits
        }
    }

    fn is_exact_tie(magnitude: f64) -> bool {
        let expanded = format!("{:.*}", EXACT_DIGITS, magnitude);
        let Some((_, fraction)) = expanded.split_once('.') else {
            return false;
        };
        let fraction = fraction.as_bytes();
        fraction[2] == b'5' && fraction[3..].iter().all(|b| *b == b'0')
    }

    /// Truncate to cents and add one cent, in decimal.
    fn round_tie_up(magnitude: f64) -> String {
        let expanded = format!("{:.*}", EXACT_DIGITS, magnitude);
        let mut digits: Vec<u8> = expanded.bytes().take_while(|b| *b != b'.').collect();
        let whole_len = digits.len();
        digits.extend(expanded.bytes().skip(whole_len + 1).take(2));

        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if !carry {
                break;
            }
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
        let split = digits.len() - 2;
        let (whole, cents) = digits.split_at(split);
        format!(
            "{}.{}",
            String::from_utf8_lossy(whole),
            String::from_utf8_lossy(cents)
        )
    }

    /// Exactly two decimals (`10` → `10.00`).
    pub(super) struct Amount(pub(super) f64);

    impl Display for Amount {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str(&fixed2(self.0))
        }
    }

    impl Serialize for Amount {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_str(self)
        }
    }

    /// Two-decimal rounding without insignificant zeros (`50.00` → `50`, `12.50` → `12.5`).
    pub(super) struct Trimmed(pub(super) f64);

    impl Display for Trimmed {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            let fixed = fixed2(self.0);
            match fixed.split_once('.') {
                Some((whole, cents)) => match cents.trim_end_matches('0') {
                    "" => f.write_str(whole),
                    cents => write!(f, "{whole}.{cents}"),
                },
                None => f.write_str(&fixed),
            }
        }
    }

    impl Serialize for Trimmed {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_str(self)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn fixed_amounts_keep_two_decimals() {
            assert_eq!(Amount(10.0).to_string(), "10.00");
            assert_eq!(Amount(1.5).to_string(), "1.50");
            assert_eq!(Amount(0.125).to_string(), "0.13");
            assert_eq!(Amount(-0.125).to_string(), "-0.13");
            assert_eq!(Amount(-0.001).to_string(), "0.00");
            assert_eq!(Amount(9.995).to_string(), "9.99");
            assert_eq!(Amount(99.875).to_string(), "99.88");
            assert_eq!(Amount(0.995).to_string(), "0.99");
        }

        #[test]
        fn amounts_round_the_exact_binary_value() {
            assert_eq!(Amount(2.675).to_string(), "2.67");
            assert_eq!(Amount(1.045).to_string(), "1.04");
            assert_eq!(Amount(1.325).to_string(), "1.32");
            assert_eq!(Amount(10.235).to_string(), "10.23");
            assert_eq!(Amount(1.115).to_string(), "1.11");
            assert_eq!(Trimmed(2.675).to_string(), "2.67");
            assert_eq!(Trimmed(1.045).to_string(), "1.04");
            assert_eq!(Trimmed(1.325).to_string(), "1.32");
        }

        #[test]
        fn exact_ties_round_away_from_zero() {
            assert_eq!(fixed2(0.375), "0.38");
            assert_eq!(fixed2(0.625), "0.63");
            assert_eq!(fixed2(-2.875), "-2.88");
            assert_eq!(fixed2(9.999), "10.00");
        }

        #[test]
        fn trimmed_amounts_drop_trailing_zeros() {
            assert_eq!(Trimmed(50.0).to_string(), "50");
            assert_eq!(Trimmed(12.5).to_string(), "12.5");
            assert_eq!(Trimmed(3.14159).to_string(), "3.14");
            assert_eq!(Trimmed(0.004).to_string(), "0");
            assert_eq!(Trimmed(0.125).to_string(), "0.13");
        }
    }
}

struct InfoTributariaXml<'a>(&'a TaxInfo, DocumentType);

impl<'a> Serialize for InfoTributariaXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (info, document_type) = (self.0, self.1);
        let mut st = s.serialize_struct("infoTributaria", 0)?;
        st.serialize_field("ambiente", info.environment.code())?;
        st.serialize_field("tipoEmision", &info.emission_type)?;
        st.serialize_field("razonSocial", &info.legal_name)?;
        if let Some(commercial_name) = &info.commercial_name {
            st.serialize_field("nombreComercial", commercial_name)?;
        }
        st.serialize_field("ruc", &info.ruc)?;
        if let Some(key) = &info.access_key {
            st.serialize_field("claveAcceso", key.as_str())?;
        }
        st.serialize_field("codDoc", document_type.code())?;
        st.serialize_field("estab", &info.establishment)?;
        st.serialize_field("ptoEmi", &info.emission_point)?;
        st.serialize_field("secuencial", &info.sequential)?;
        st.serialize_field("dirMatriz", &info.head_office_address)?;
        st.end()
    }
}

struct InvoiceXml<'a>(&'a Invoice);

impl<'a> Serialize for InvoiceXml<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let invoice = self.0;
        let mut root = serializer.serialize_struct(DocumentType::Invoice.root_element(), 0)?;
        root.serialize_field("@id", ROOT_ID)?;
        root.serialize_field("@version", SCHEMA_VERSION)?;
        root.serialize_field(
            "infoTributaria",
            &InfoTributariaXml(&invoice.tax_info, DocumentType::Invoice),
        )?;
        root.serialize_field("infoFactura", &InfoFacturaXml(invoice))?;
        root.serialize_field("detalles", &DetallesXml(&invoice.lines))?;
        if !invoice.withholdings.is_empty() {
            root.serialize_field("retenciones", &RetencionesXml(&invoice.withholdings))?;
        }
        if !invoice.additional_fields.is_empty() {
            root.serialize_field("infoAdicional", &InfoAdicionalXml(&invoice.additional_fields))?;
        }
        root.end()
    }
}

struct InfoFacturaXml<'a>(&'a Invoice);

impl<'a> Serialize for InfoFacturaXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let invoice = self.0;
        let mut st = s.serialize_struct("infoFactura", 0)?;
        st.serialize_field("fechaEmision", &date(invoice.emission_date))?;
        if let Some(address) = &invoice.establishment_address {
            st.serialize_field("dirEstablecimiento", address)?;
        }
        if let Some(number) = &invoice.special_taxpayer {
            st.serialize_field("contribuyenteEspecial", number)?;
        }
        if let Some(obligation) = &invoice.accounting_obligation {
            st.serialize_field("obligadoContabilidad", obligation.as_str())?;
        }
        st.serialize_field("tipoIdentificacionComprador", invoice.buyer_id_type.code())?;
        if let Some(waybill) = &invoice.waybill_reference {
            st.serialize_field("guiaRemision", waybill)?;
        }
        st.serialize_field("razonSocialComprador", &invoice.buyer_name)?;
        st.serialize_field("identificacionComprador", &invoice.buyer_id)?;
        if let Some(address) = &invoice.buyer_address {
            st.serialize_field("direccionComprador", address)?;
        }
        st.serialize_field("totalSinImpuestos", &Amount(invoice.total_without_taxes))?;
        st.serialize_field("totalDescuento", &Amount(invoice.total_discount))?;
        st.serialize_field("totalConImpuestos", &TotalConImpuestosXml(&invoice.tax_totals))?;
        st.serialize_field("propina", &Amount(invoice.tip))?;
        st.serialize_field("importeTotal", &Amount(invoice.grand_total))?;
        st.serialize_field("moneda", &invoice.currency)?;
        st.serialize_field("pagos", &PagosXml(&invoice.effective_payments()))?;
        if let Some(value) = invoice.vat_withholding {
            st.serialize_field("valorRetIva", &Amount(value))?;
        }
        if let Some(value) = invoice.income_tax_withholding {
            st.serialize_field("valorRetRenta", &Amount(value))?;
        }
        st.end()
    }
}

struct TotalConImpuestosXml<'a>(&'a [TaxTotal]);

impl<'a> Serialize for TotalConImpuestosXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("totalConImpuestos", 0)?;
        for total in self.0 {
            st.serialize_field("totalImpuesto", &TotalImpuestoXml(total))?;
        }
        st.end()
    }
}

struct TotalImpuestoXml<'a>(&'a TaxTotal);

impl<'a> Serialize for TotalImpuestoXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let total = self.0;
        let mut st = s.serialize_struct("totalImpuesto", 0)?;
        st.serialize_field("codigo", &total.code)?;
        st.serialize_field("codigoPorcentaje", &total.percentage_code)?;
        if let Some(discount) = total.additional_discount {
            st.serialize_field("descuentoAdicional", &Amount(discount))?;
        }
        st.serialize_field("baseImponible", &Amount(total.taxable_base))?;
        st.serialize_field("valor", &Amount(total.value))?;
        st.end()
    }
}

struct PagosXml<'a>(&'a [Payment]);

impl<'a> Serialize for PagosXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("pagos", 0)?;
        for payment in self.0 {
            st.serialize_field("pago", &PagoXml(payment))?;
        }
        st.end()
    }
}

struct PagoXml<'a>(&'a Payment);

impl<'a> Serialize for PagoXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let payment = self.0;
        let mut st = s.serialize_struct("pago", 0)?;
        st.serialize_field("formaPago", &payment.method)?;
        st.serialize_field("total", &Amount(payment.total))?;
        if let Some(term) = payment.term {
            st.serialize_field("plazo", &term)?;
        }
        if let Some(unit) = &payment.time_unit {
            st.serialize_field("unidadTiempo", unit)?;
        }
        st.end()
    }
}

struct DetallesXml<'a>(&'a [InvoiceLine]);

impl<'a> Serialize for DetallesXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("detalles", 0)?;
        for line in self.0 {
            st.serialize_field("detalle", &DetalleXml(line))?;
        }
        st.end()
    }
}

struct DetalleXml<'a>(&'a InvoiceLine);

impl<'a> Serialize for DetalleXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let line = self.0;
        let mut st = s.serialize_struct("detalle", 0)?;
        st.serialize_field("codigoPrincipal", &line.main_code)?;
        if let Some(code) = &line.auxiliary_code {
            st.serialize_field("codigoAuxiliar", code)?;
        }
        st.serialize_field("descripcion", &line.description)?;
        st.serialize_field("cantidad", &Trimmed(line.quantity))?;
        st.serialize_field("precioUnitario", &Trimmed(line.unit_price))?;
        st.serialize_field("descuento", &Trimmed(line.discount))?;
        st.serialize_field("precioTotalSinImpuesto", &Trimmed(line.total_without_tax))?;
        if !line.additional_details.is_empty() {
            st.serialize_field(
                "detallesAdicionales",
                &DetallesAdicionalesXml(&line.additional_details),
            )?;
        }
        st.serialize_field("impuestos", &ImpuestosXml(&line.taxes))?;
        st.end()
    }
}

struct DetallesAdicionalesXml<'a>(&'a [AdditionalDetail]);

impl<'a> Serialize for DetallesAdicionalesXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("detallesAdicionales", 0)?;
        for detail in self.0 {
            st.serialize_field("detAdicional", &DetAdicionalXml(detail))?;
        }
        st.end()
    }
}

struct DetAdicionalXml<'a>(&'a AdditionalDetail);

impl<'a> Serialize for DetAdicionalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("detAdicional", 2)?;
        st.serialize_field("@nombre", &self.0.name)?;
        st.serialize_field("@valor", &self.0.value)?;
        st.end()
    }
}

struct ImpuestosXml<'a>(&'a [LineTax]);

impl<'a> Serialize for ImpuestosXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("impuestos", 0)?;
        for tax in self.0 {
            st.serialize_field("impuesto", &ImpuestoXml(tax))?;
        }
        st.end()
    }
}

struct ImpuestoXml<'a>(&'a LineTax);

impl<'a> Serialize for ImpuestoXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let tax = self.0;
        let mut st = s.serialize_struct("impuesto", 0)?;
        st.serialize_field("codigo", &tax.code)?;
        st.serialize_field("codigoPorcentaje", &tax.percentage_code)?;
        st.serialize_field("tarifa", &Amount(tax.rate))?;
        st.serialize_field("baseImponible", &Amount(tax.taxable_base))?;
        st.serialize_field("valor", &Amount(tax.value))?;
        st.end()
    }
}

struct RetencionesXml<'a>(&'a [Withholding]);

impl<'a> Serialize for RetencionesXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("retenciones", 0)?;
        for withholding in self.0 {
            st.serialize_field("retencion", &RetencionXml(withholding))?;
        }
        st.end()
    }
}

struct RetencionXml<'a>(&'a Withholding);

impl<'a> Serialize for RetencionXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let withholding = self.0;
        let mut st = s.serialize_struct("retencion", 0)?;
        st.serialize_field("codigo", &withholding.code)?;
        st.serialize_field("codigoPorcentaje", &withholding.percentage_code)?;
        st.serialize_field("tarifa", &Amount(withholding.rate))?;
        st.serialize_field("valor", &Amount(withholding.value))?;
        st.end()
    }
}

struct InfoAdicionalXml<'a>(&'a [AdditionalField]);

impl<'a> Serialize for InfoAdicionalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("infoAdicional", 0)?;
        for field in self.0 {
            st.serialize_field("campoAdicional", &CampoAdicionalXml(field))?;
        }
        st.end()
    }
}

struct CampoAdicionalXml<'a>(&'a AdditionalField);

impl<'a> Serialize for CampoAdicionalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("campoAdicional", 2)?;
        st.serialize_field("@nombre", &self.0.name)?;
        st.serialize_field("$text", &self.0.value)?;
        st.end()
    }
}

struct WaybillXml<'a>(&'a Waybill);

impl<'a> Serialize for WaybillXml<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let waybill = self.0;
        let mut root = serializer.serialize_struct(DocumentType::Waybill.root_element(), 0)?;
        root.serialize_field("@id", ROOT_ID)?;
        root.serialize_field("@version", SCHEMA_VERSION)?;
        root.serialize_field(
            "infoTributaria",
            &InfoTributariaXml(&waybill.tax_info, DocumentType::Waybill),
        )?;
        root.serialize_field("infoGuiaRemision", &InfoGuiaRemisionXml(waybill))?;
        root.serialize_field("destinatarios", &DestinatariosXml(&waybill.recipients))?;
        if !waybill.additional_fields.is_empty() {
            root.serialize_field("infoAdicional", &InfoAdicionalXml(&waybill.additional_fields))?;
        }
        root.end()
    }
}

struct InfoGuiaRemisionXml<'a>(&'a Waybill);

impl<'a> Serialize for InfoGuiaRemisionXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let waybill = self.0;
        let mut st = s.serialize_struct("infoGuiaRemision", 0)?;
        if let Some(address) = &waybill.establishment_address {
            st.serialize_field("dirEstablecimiento", address)?;
        }
        st.serialize_field("dirPartida", &waybill.departure_address)?;
        st.serialize_field("razonSocialTransportista", &waybill.carrier_name)?;
        st.serialize_field(
            "tipoIdentificacionTransportista",
            waybill.carrier_id_type.code(),
        )?;
        st.serialize_field("rucTransportista", &waybill.carrier_ruc)?;
        if let Some(rise) = &waybill.rise {
            st.serialize_field("rise", rise)?;
        }
        if let Some(obligation) = &waybill.accounting_obligation {
            st.serialize_field("obligadoContabilidad", obligation.as_str())?;
        }
        if let Some(number) = &waybill.special_taxpayer {
            st.serialize_field("contribuyenteEspecial", number)?;
        }
        st.serialize_field("fechaIniTransporte", &date(waybill.transport_start))?;
        st.serialize_field("fechaFinTransporte", &date(waybill.transport_end))?;
        st.serialize_field("placa", &waybill.plate)?;
        st.end()
    }
}

struct DestinatariosXml<'a>(&'a [Recipient]);

impl<'a> Serialize for DestinatariosXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("destinatarios", 0)?;
        for recipient in self.0 {
            st.serialize_field("destinatario", &DestinatarioXml(recipient))?;
        }
        st.end()
    }
}

struct DestinatarioXml<'a>(&'a Recipient);

impl<'a> Serialize for DestinatarioXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let recipient = self.0;
        let mut st = s.serialize_struct("destinatario", 0)?;
        st.serialize_field("identificacionDestinatario", &recipient.id)?;
        st.serialize_field("razonSocialDestinatario", &recipient.name)?;
        st.serialize_field("dirDestinatario", &recipient.address)?;
        st.serialize_field("motivoTraslado", &recipient.transfer_reason)?;
        if let Some(number) = &recipient.customs_document {
            st.serialize_field("docAduaneroUnico", number)?;
        }
        if let Some(code) = &recipient.destination_establishment {
            st.serialize_field("codEstabDestino", code)?;
        }
        if let Some(route) = &recipient.route {
            st.serialize_field("ruta", route)?;
        }
        if let Some(support) = &recipient.supporting_document {
            if let Some(code) = &support.code {
                st.serialize_field("codDocSustento", code)?;
            }
            if let Some(number) = &support.number {
                st.serialize_field("numDocSustento", number)?;
            }
            if let Some(authorization) = &support.authorization_number {
                st.serialize_field("numAutDocSustento", authorization)?;
            }
            if let Some(emitted) = support.emission_date {
                st.serialize_field("fechaEmisionDocSustento", &date(emitted))?;
            }
        }
        st.serialize_field("detalles", &GoodsXml(recipient))?;
        st.end()
    }
}

struct GoodsXml<'a>(&'a Recipient);

impl<'a> Serialize for GoodsXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("detalles", 0)?;
        for item in &self.0.items {
            st.serialize_field("detalle", &GoodsLineXml(item))?;
        }
        st.end()
    }
}

struct GoodsLineXml<'a>(&'a CarriedItem);

impl<'a> Serialize for GoodsLineXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let item = self.0;
        let mut st = s.serialize_struct("detalle", 0)?;
        st.serialize_field("codigoInterno", &item.internal_code)?;
        if let Some(code) = &item.additional_code {
            st.serialize_field("codigoAdicional", code)?;
        }
        st.serialize_field("descripcion", &item.description)?;
        st.serialize_field("cantidad", &Amount(item.quantity))?;
        if !item.additional_details.is_empty() {
            st.serialize_field(
                "detallesAdicionales",
                &DetallesAdicionalesXml(&item.additional_details),
            )?;
        }
        st.end()
    }
}
