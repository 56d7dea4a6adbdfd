mod common;

use common::{invoice_with_lines, keyed, minimal_invoice, minimal_waybill, SCENARIO_KEY};
use quick_xml::events::Event;
use quick_xml::Reader;
use sri_core::document::xml::{build, SchemaMappingError};
use sri_core::document::{
    AccountingObligation, AdditionalDetail, AdditionalField, Document, InvoiceLine, LineTax,
    Payment, Withholding,
};

const MINIMAL_INVOICE_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<factura id="comprobante" version="1.0.0">"#,
    "<infoTributaria><ambiente>1</ambiente><tipoEmision>1</tipoEmision>",
    "<razonSocial>EMPRESA DE PRUEBAS S.A.</razonSocial><ruc>0999999999001</ruc>",
    "<claveAcceso>0601202601099999999900110010010000000011234567817</claveAcceso>",
    "<codDoc>01</codDoc><estab>001</estab><ptoEmi>001</ptoEmi>",
    "<secuencial>000000001</secuencial><dirMatriz>AV. PRINCIPAL 123</dirMatriz></infoTributaria>",
    "<infoFactura><fechaEmision>06/01/2026</fechaEmision>",
    "<tipoIdentificacionComprador>07</tipoIdentificacionComprador>",
    "<razonSocialComprador>CONSUMIDOR FINAL</razonSocialComprador>",
    "<identificacionComprador>9999999999999</identificacionComprador>",
    "<totalSinImpuestos>10.00</totalSinImpuestos><totalDescuento>0.00</totalDescuento>",
    "<totalConImpuestos><totalImpuesto><codigo>2</codigo><codigoPorcentaje>4</codigoPorcentaje>",
    "<baseImponible>10.00</baseImponible><valor>1.50</valor></totalImpuesto></totalConImpuestos>",
    "<propina>0.00</propina><importeTotal>11.50</importeTotal><moneda>DOLAR</moneda>",
    "<pagos><pago><formaPago>01</formaPago><total>11.50</total></pago></pagos></infoFactura>",
    "<detalles><detalle><codigoPrincipal>P001</codigoPrincipal><descripcion>Servicio</descripcion>",
    "<cantidad>1</cantidad><precioUnitario>10</precioUnitario><descuento>0</descuento>",
    "<precioTotalSinImpuesto>10</precioTotalSinImpuesto><impuestos><impuesto><codigo>2</codigo>",
    "<codigoPorcentaje>4</codigoPorcentaje><tarifa>15.00</tarifa><baseImponible>10.00</baseImponible>",
    "<valor>1.50</valor></impuesto></impuestos></detalle></detalles></factura>",
);

/// Text of every element named `name`, in document order.
fn texts(xml: &str, name: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;
    let mut found = Vec::new();
    loop {
        match reader.read_event().expect("well-formed XML") {
            Event::Start(start) if start.local_name().as_ref() == name.as_bytes() => inside = true,
            Event::End(end) if end.local_name().as_ref() == name.as_bytes() => inside = false,
            Event::Text(text) if inside => found.push(text.unescape().unwrap().into_owned()),
            Event::Eof => break,
            _ => {}
        }
    }
    found
}

fn first(xml: &str, name: &str) -> String {
    texts(xml, name).into_iter().next().unwrap_or_default()
}

#[test]
fn minimal_invoice_matches_canonical_form() {
    let xml = build(&keyed(minimal_invoice())).unwrap();
    assert_eq!(xml.as_str(), MINIMAL_INVOICE_XML);
    assert_eq!(xml.access_key().as_str(), SCENARIO_KEY);
}

#[test]
fn repeated_builds_are_byte_identical() {
    let document = keyed(minimal_invoice());
    let first_build = build(&document).unwrap();
    let second_build = build(&document.clone()).unwrap();
    assert_eq!(first_build.as_bytes(), second_build.as_bytes());

    let waybill = keyed(minimal_waybill());
    assert_eq!(
        build(&waybill).unwrap().as_bytes(),
        build(&waybill).unwrap().as_bytes()
    );
}

#[test]
fn header_fields_round_trip() {
    let document = keyed(minimal_invoice());
    let xml = build(&document).unwrap();
    let info = document.tax_info();

    assert_eq!(first(xml.as_str(), "ambiente"), info.environment.code());
    assert_eq!(first(xml.as_str(), "tipoEmision"), info.emission_type);
    assert_eq!(first(xml.as_str(), "razonSocial"), info.legal_name);
    assert_eq!(first(xml.as_str(), "ruc"), info.ruc);
    assert_eq!(
        first(xml.as_str(), "claveAcceso"),
        info.access_key().unwrap().as_str()
    );
    assert_eq!(first(xml.as_str(), "codDoc"), "01");
    assert_eq!(first(xml.as_str(), "estab"), info.establishment);
    assert_eq!(first(xml.as_str(), "ptoEmi"), info.emission_point);
    assert_eq!(first(xml.as_str(), "secuencial"), info.sequential);
    assert_eq!(first(xml.as_str(), "dirMatriz"), info.head_office_address);
}

#[test]
fn missing_payments_synthesize_one_cash_payment() {
    let xml = build(&keyed(minimal_invoice())).unwrap();
    assert_eq!(xml.as_str().matches("<pago>").count(), 1);
    assert_eq!(texts(xml.as_str(), "formaPago"), ["01"]);
    assert_eq!(
        first(xml.as_str(), "total"),
        first(xml.as_str(), "importeTotal")
    );
}

#[test]
fn supplied_payments_are_kept_in_order() {
    let mut document = keyed(minimal_invoice());
    if let Document::Invoice(invoice) = &mut document {
        invoice.payments = vec![
            Payment::new("19", 5.0).with_term(30, "dias"),
            Payment::new("20", 6.5),
        ];
    }
    let xml = build(&document).unwrap();
    assert_eq!(texts(xml.as_str(), "formaPago"), ["19", "20"]);
    assert!(xml
        .as_str()
        .contains("<pago><formaPago>19</formaPago><total>5.00</total><plazo>30</plazo><unidadTiempo>dias</unidadTiempo></pago>"));
}

#[test]
fn line_amounts_drop_insignificant_zeros_while_totals_keep_two_decimals() {
    let line = InvoiceLine::new("P002", "Tornillos", 50.0, 12.5)
        .tax(LineTax::from_rate("2", "4", 15.0, 625.0));
    let xml = build(&keyed(invoice_with_lines(vec![line]))).unwrap();
    let text = xml.as_str();

    assert!(text.contains("<cantidad>50</cantidad>"));
    assert!(text.contains("<precioUnitario>12.5</precioUnitario>"));
    assert!(text.contains("<precioTotalSinImpuesto>625</precioTotalSinImpuesto>"));
    assert!(text.contains("<tarifa>15.00</tarifa><baseImponible>625.00</baseImponible><valor>93.75</valor>"));
    assert!(!text.contains("<cantidad>50.00</cantidad>"));
}

#[test]
fn optional_blocks_follow_schema_order() {
    let line = InvoiceLine::new("P003", "Cable", 2.0, 3.0)
        .auxiliary_code("AUX-3")
        .detail(AdditionalDetail::new("color", "negro"))
        .tax(LineTax::from_rate("2", "4", 15.0, 6.0));
    let mut document = invoice_with_lines(vec![line]);
    if let Document::Invoice(invoice) = &mut document {
        invoice.accounting_obligation = Some(AccountingObligation::Si);
        invoice.establishment_address = Some("SUCURSAL NORTE".into());
        invoice.buyer_address = Some("GUAYAQUIL".into());
        invoice.vat_withholding = Some(0.45);
        invoice.withholdings.push(Withholding {
            code: "4".into(),
            percentage_code: "327".into(),
            rate: 30.0,
            value: 0.27,
        });
        invoice
            .additional_fields
            .push(AdditionalField::new("email", "cliente@example.com"));
    }
    let xml = build(&keyed(document)).unwrap();
    let text = xml.as_str();

    let position = |needle: &str| text.find(needle).unwrap_or_else(|| panic!("{needle} missing"));
    assert!(position("<dirEstablecimiento>") < position("<obligadoContabilidad>"));
    assert!(position("<obligadoContabilidad>SI") < position("<tipoIdentificacionComprador>"));
    assert!(position("<identificacionComprador>") < position("<direccionComprador>"));
    assert!(position("<pagos>") < position("<valorRetIva>0.45</valorRetIva>"));
    assert!(position("<codigoAuxiliar>AUX-3") < position("<descripcion>Cable"));
    assert!(text.contains(r#"<detallesAdicionales><detAdicional nombre="color" valor="negro"/></detallesAdicionales><impuestos>"#));
    assert!(position("</detalles>") < position("<retenciones>"));
    assert!(text.contains("<retencion><codigo>4</codigo><codigoPorcentaje>327</codigoPorcentaje><tarifa>30.00</tarifa><valor>0.27</valor></retencion>"));
    assert!(position("</retenciones>") < position("<infoAdicional>"));
    assert!(text.ends_with(r#"<infoAdicional><campoAdicional nombre="email">cliente@example.com</campoAdicional></infoAdicional></factura>"#));
    assert!(!text.contains("nombreComercial"));
    assert!(!text.contains("guiaRemision"));
}

#[test]
fn structurally_incomplete_documents_are_rejected() {
    assert!(matches!(
        build(&minimal_invoice()),
        Err(SchemaMappingError::MissingAccessKey)
    ));

    let mut no_totals = keyed(minimal_invoice());
    if let Document::Invoice(invoice) = &mut no_totals {
        invoice.tax_totals.clear();
    }
    assert!(matches!(
        build(&no_totals),
        Err(SchemaMappingError::MissingTaxTotals)
    ));

    let untaxed = keyed(invoice_with_lines(vec![InvoiceLine::new(
        "P004", "Sin impuesto", 1.0, 1.0,
    )]));
    assert!(matches!(
        build(&untaxed),
        Err(SchemaMappingError::LineWithoutTaxes { index: 0 })
    ));

    let mut empty_waybill = keyed(minimal_waybill());
    if let Document::Waybill(waybill) = &mut empty_waybill {
        waybill.recipients[0].items.clear();
    }
    assert!(matches!(
        build(&empty_waybill),
        Err(SchemaMappingError::RecipientWithoutGoods { index: 0 })
    ));
}

#[test]
fn waybill_uses_its_own_root_and_code() {
    let xml = build(&keyed(minimal_waybill())).unwrap();
    let text = xml.as_str();
    assert!(text.contains(r#"<guiaRemision id="comprobante" version="1.0.0">"#));
    assert_eq!(first(text, "codDoc"), "06");
    assert_eq!(first(text, "secuencial"), "000000010");
    assert_eq!(first(text, "fechaFinTransporte"), "07/01/2026");
    assert_eq!(first(text, "rucTransportista"), "1799999999001");
    assert!(!text.contains("<pagos>"));
    assert_eq!(&xml.access_key().as_str()[8..10], "06");
}

#[test]
fn amounts_follow_the_exact_binary_value() {
    let mut document = keyed(minimal_invoice());
    if let Document::Invoice(invoice) = &mut document {
        invoice.grand_total = 2.675;
        invoice.tax_totals[0].value = 1.045;
    }
    let xml = build(&document).unwrap();
    assert_eq!(first(xml.as_str(), "importeTotal"), "2.67");
    assert_eq!(texts(xml.as_str(), "valor")[0], "1.04");
    assert_eq!(first(xml.as_str(), "total"), "2.67");
}
