//! Pre-flight checks on documents and their rendered XML.
//!
//! Neither pass fails: problems come back as a list of [`ValidationIssue`], and an
//! empty list means the document may be signed.
use super::{Document, DocumentType, Invoice, Waybill, CURRENCY};
use crate::document::xml::{ROOT_ID, SCHEMA_VERSION};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

const NAME_MAX: usize = 300;
const ADDRESS_MAX: usize = 300;
const IDENTIFICATION_MAX: usize = 20;

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Length ceilings on the in-memory document.
pub fn validate_model(document: &Document) -> Vec<ValidationIssue> {
    let info = document.tax_info();
    let mut checks: Vec<LengthCheck<'_>> = vec![
        ("razonSocial", Some(info.legal_name.as_str()), NAME_MAX),
        ("nombreComercial", info.commercial_name.as_deref(), NAME_MAX),
        ("dirMatriz", Some(info.head_office_address.as_str()), ADDRESS_MAX),
    ];
    match document {
        Document::Invoice(invoice) => invoice_lengths(invoice, &mut checks),
        Document::Waybill(waybill) => waybill_lengths(waybill, &mut checks),
    }

    checks
        .into_iter()
        .filter_map(|(field, value, max)| {
            let value = value?;
            (value.chars().count() > max).then(|| {
                ValidationIssue::new(
                    field,
                    format!("{field} exceeds the maximum length of {max} characters"),
                )
            })
        })
        .collect()
}

type LengthCheck<'a> = (&'static str, Option<&'a str>, usize);

fn invoice_lengths<'a>(invoice: &'a Invoice, checks: &mut Vec<LengthCheck<'a>>) {
    checks.push(("razonSocialComprador", Some(invoice.buyer_name.as_str()), NAME_MAX));
    checks.push((
        "identificacionComprador",
        Some(invoice.buyer_id.as_str()),
        IDENTIFICATION_MAX,
    ));
    checks.push((
        "direccionComprador",
        invoice.buyer_address.as_deref(),
        ADDRESS_MAX,
    ));
}

fn waybill_lengths<'a>(waybill: &'a Waybill, checks: &mut Vec<LengthCheck<'a>>) {
    checks.push(("dirPartida", Some(waybill.departure_address.as_str()), ADDRESS_MAX));
    checks.push((
        "razonSocialTransportista",
        Some(waybill.carrier_name.as_str()),
        NAME_MAX,
    ));
    checks.push((
        "rucTransportista",
        Some(waybill.carrier_ruc.as_str()),
        IDENTIFICATION_MAX,
    ));
    for recipient in &waybill.recipients {
        checks.push((
            "identificacionDestinatario",
            Some(recipient.id.as_str()),
            IDENTIFICATION_MAX,
        ));
        checks.push(("razonSocialDestinatario", Some(recipient.name.as_str()), NAME_MAX));
        checks.push(("dirDestinatario", Some(recipient.address.as_str()), ADDRESS_MAX));
        checks.push(("motivoTraslado", Some(recipient.transfer_reason.as_str()), NAME_MAX));
    }
}

/// Flat view of a rendered document: root, root attributes, and the first text
/// value of every element name.
#[derive(Debug, Default)]
struct Scan {
    root: Option<String>,
    root_attributes: HashMap<String, String>,
    texts: HashMap<String, String>,
    present: HashSet<String>,
}

impl Scan {
    fn text(&self, element: &str) -> Option<&str> {
        self.texts.get(element).map(String::as_str)
    }

    fn has(&self, element: &str) -> bool {
        self.present.contains(element)
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn scan(xml: &str) -> Result<Scan, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut result = Scan::default();
    let mut stack: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = local_name(&start);
                if result.root.is_none() {
                    read_root(&start, &mut result)?;
                }
                result.present.insert(name.clone());
                stack.push(name);
            }
            Ok(Event::Empty(start)) => {
                if result.root.is_none() {
                    read_root(&start, &mut result)?;
                }
                result.present.insert(local_name(&start));
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(text)) => {
                if let Some(current) = stack.last() {
                    if !result.texts.contains_key(current) {
                        let value = text.unescape().map_err(|e| e.to_string())?;
                        result.texts.insert(current.clone(), value.into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "error near position {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("element <{open}> is never closed"));
    }
    if result.root.is_none() {
        return Err("document has no root element".to_string());
    }
    Ok(result)
}

fn read_root(start: &BytesStart<'_>, scan: &mut Scan) -> Result<(), String> {
    scan.root = Some(local_name(start));
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(|e| e.to_string())?;
        scan.root_attributes.insert(key, value.into_owned());
    }
    Ok(())
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn digits_of_len(value: Option<&str>, len: usize) -> bool {
    value.is_some_and(|v| v.len() == len && is_digits(v))
}

/// `dd/mm/yyyy`, shape only.
fn is_slash_date(value: Option<&str>) -> bool {
    let Some(value) = value else {
        return false;
    };
    let parts: Vec<&str> = value.split('/').collect();
    matches!(parts.as_slice(), [d, m, y]
        if d.len() == 2 && m.len() == 2 && y.len() == 4
            && is_digits(d) && is_digits(m) && is_digits(y))
}

fn document_type_for_root(root: &str) -> Option<DocumentType> {
    [DocumentType::Invoice, DocumentType::Waybill]
        .into_iter()
        .find(|kind| kind.root_element() == root)
}

/// Pattern checks on rendered XML. Malformed XML yields a single issue on the root.
pub fn validate_xml(xml: &str) -> Vec<ValidationIssue> {
    let scan = match scan(xml) {
        Ok(scan) => scan,
        Err(reason) => {
            return vec![ValidationIssue::new(
                ROOT_ID,
                format!("document is not well-formed XML ({reason})"),
            )]
        }
    };
    let root = scan.root.as_deref().unwrap_or_default();
    let document_type = document_type_for_root(root);
    let mut issues = Vec::new();

    if scan.root_attributes.get("version").map(String::as_str) != Some(SCHEMA_VERSION) {
        issues.push(ValidationIssue::new(
            format!("{root}@version"),
            format!("version must be {SCHEMA_VERSION}"),
        ));
    }
    if scan.root_attributes.get("id").map(String::as_str) != Some(ROOT_ID) {
        issues.push(ValidationIssue::new(
            format!("{root}@id"),
            format!("id attribute must be \"{ROOT_ID}\""),
        ));
    }
    if !digits_of_len(scan.text("claveAcceso"), 49) {
        issues.push(ValidationIssue::new(
            "claveAcceso",
            "access key must have exactly 49 digits",
        ));
    }
    if !digits_of_len(scan.text("ruc"), 13) {
        issues.push(ValidationIssue::new("ruc", "RUC must have exactly 13 digits"));
    }
    if !matches!(scan.text("ambiente"), Some("1" | "2")) {
        issues.push(ValidationIssue::new(
            "ambiente",
            "environment must be 1 (test) or 2 (production)",
        ));
    }
    if scan.text("tipoEmision") != Some("1") {
        issues.push(ValidationIssue::new(
            "tipoEmision",
            "emission type must be 1 (normal)",
        ));
    }
    match document_type {
        Some(kind) if scan.text("codDoc") == Some(kind.code()) => {}
        Some(kind) => issues.push(ValidationIssue::new(
            "codDoc",
            format!("document code must be {} for {root}", kind.code()),
        )),
        None => issues.push(ValidationIssue::new(
            "codDoc",
            format!("unsupported document root <{root}>"),
        )),
    }
    if !digits_of_len(scan.text("estab"), 3) {
        issues.push(ValidationIssue::new(
            "estab",
            "establishment must have 3 digits",
        ));
    }
    if !digits_of_len(scan.text("ptoEmi"), 3) {
        issues.push(ValidationIssue::new(
            "ptoEmi",
            "emission point must have 3 digits",
        ));
    }
    if !digits_of_len(scan.text("secuencial"), 9) {
        issues.push(ValidationIssue::new(
            "secuencial",
            "sequential must have 9 digits",
        ));
    }

    let date_fields: &[&str] = match document_type {
        Some(DocumentType::Waybill) => &["fechaIniTransporte", "fechaFinTransporte"],
        _ => &["fechaEmision"],
    };
    for field in date_fields {
        if !is_slash_date(scan.text(field)) {
            issues.push(ValidationIssue::new(
                *field,
                "date must use the dd/mm/yyyy format",
            ));
        }
    }

    if scan.has("obligadoContabilidad")
        && !matches!(scan.text("obligadoContabilidad"), Some("SI" | "NO"))
    {
        issues.push(ValidationIssue::new(
            "obligadoContabilidad",
            "obligadoContabilidad must be SI or NO",
        ));
    }
    if scan.has("moneda") && scan.text("moneda") != Some(CURRENCY) {
        issues.push(ValidationIssue::new(
            "moneda",
            format!("currency must be {CURRENCY}"),
        ));
    }
    if document_type != Some(DocumentType::Waybill) && !scan.has("pagos") {
        issues.push(ValidationIssue::new("pagos", "payments block is required"));
    }

    issues
}
