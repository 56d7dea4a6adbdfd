use super::{
    AccountingObligation, AdditionalDetail, AdditionalField, DocumentError, IdentificationType,
    TaxInfo,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Waybill (`guiaRemision`, document code `06`).
///
/// The emission date only feeds the access key; the XML body carries the transport
/// window instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waybill {
    pub tax_info: TaxInfo,
    pub emission_date: NaiveDate,
    #[serde(default)]
    pub establishment_address: Option<String>,
    pub departure_address: String,
    pub carrier_name: String,
    pub carrier_id_type: IdentificationType,
    pub carrier_ruc: String,
    #[serde(default)]
    pub rise: Option<String>,
    #[serde(default)]
    pub accounting_obligation: Option<AccountingObligation>,
    #[serde(default)]
    pub special_taxpayer: Option<String>,
    pub transport_start: NaiveDate,
    pub transport_end: NaiveDate,
    pub plate: String,
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub additional_fields: Vec<AdditionalField>,
}

/// `destinatario` of a waybill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub name: String,
    pub address: String,
    pub transfer_reason: String,
    #[serde(default)]
    pub customs_document: Option<String>,
    #[serde(default)]
    pub destination_establishment: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub supporting_document: Option<SupportingDocument>,
    pub items: Vec<CarriedItem>,
}

impl Recipient {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        transfer_reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            transfer_reason: transfer_reason.into(),
            customs_document: None,
            destination_establishment: None,
            route: None,
            supporting_document: None,
            items: Vec::new(),
        }
    }

    pub fn customs_document(mut self, number: impl Into<String>) -> Self {
        self.customs_document = Some(number.into());
        self
    }

    pub fn destination_establishment(mut self, code: impl Into<String>) -> Self {
        self.destination_establishment = Some(code.into());
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn supporting_document(mut self, document: SupportingDocument) -> Self {
        self.supporting_document = Some(document);
        self
    }

    pub fn item(mut self, item: CarriedItem) -> Self {
        self.items.push(item);
        self
    }
}

/// Document that justifies the transfer, usually the invoice being delivered.
/// Each part is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportingDocument {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub authorization_number: Option<String>,
    #[serde(default)]
    pub emission_date: Option<NaiveDate>,
}

/// Goods line (`detalle`) of a recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarriedItem {
    pub internal_code: String,
    #[serde(default)]
    pub additional_code: Option<String>,
    pub description: String,
    pub quantity: f64,
    #[serde(default)]
    pub additional_details: Vec<AdditionalDetail>,
}

impl CarriedItem {
    pub fn new(internal_code: impl Into<String>, description: impl Into<String>, quantity: f64) -> Self {
        Self {
            internal_code: internal_code.into(),
            additional_code: None,
            description: description.into(),
            quantity,
            additional_details: Vec::new(),
        }
    }

    pub fn additional_code(mut self, code: impl Into<String>) -> Self {
        self.additional_code = Some(code.into());
        self
    }

    pub fn detail(mut self, detail: AdditionalDetail) -> Self {
        self.additional_details.push(detail);
        self
    }
}

/// Mandatory inputs for [`WaybillBuilder::new`].
#[derive(Debug, Clone)]
pub struct RequiredWaybillFields {
    pub tax_info: TaxInfo,
    pub emission_date: NaiveDate,
    pub departure_address: String,
    pub carrier_name: String,
    pub carrier_id_type: IdentificationType,
    pub carrier_ruc: String,
    pub transport_start: NaiveDate,
    pub transport_end: NaiveDate,
    pub plate: String,
}

pub struct WaybillBuilder {
    waybill: Waybill,
}

impl WaybillBuilder {
    pub fn new(required: RequiredWaybillFields) -> Self {
        let RequiredWaybillFields {
            tax_info,
            emission_date,
            departure_address,
            carrier_name,
            carrier_id_type,
            carrier_ruc,
            transport_start,
            transport_end,
            plate,
        } = required;
        Self {
            waybill: Waybill {
                tax_info,
                emission_date,
                establishment_address: None,
                departure_address,
                carrier_name,
                carrier_id_type,
                carrier_ruc,
                rise: None,
                accounting_obligation: None,
                special_taxpayer: None,
                transport_start,
                transport_end,
                plate,
                recipients: Vec::new(),
                additional_fields: Vec::new(),
            },
        }
    }

    pub fn establishment_address(mut self, address: impl Into<String>) -> Self {
        self.waybill.establishment_address = Some(address.into());
        self
    }

    pub fn rise(mut self, rise: impl Into<String>) -> Self {
        self.waybill.rise = Some(rise.into());
        self
    }

    pub fn accounting_obligation(mut self, obligation: AccountingObligation) -> Self {
        self.waybill.accounting_obligation = Some(obligation);
        self
    }

    pub fn special_taxpayer(mut self, number: impl Into<String>) -> Self {
        self.waybill.special_taxpayer = Some(number.into());
        self
    }

    pub fn recipient(mut self, recipient: Recipient) -> Self {
        self.waybill.recipients.push(recipient);
        self
    }

    pub fn additional_field(mut self, field: AdditionalField) -> Self {
        self.waybill.additional_fields.push(field);
        self
    }

    pub fn build(self) -> Result<Waybill, DocumentError> {
        if self.waybill.recipients.is_empty() {
            return Err(DocumentError::MissingRecipients);
        }
        if let Some(index) = self
            .waybill
            .recipients
            .iter()
            .position(|recipient| recipient.items.is_empty())
        {
            return Err(DocumentError::RecipientWithoutGoods { index });
        }
        Ok(self.waybill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    fn required() -> RequiredWaybillFields {
        RequiredWaybillFields {
            tax_info: TaxInfo {
                environment: Environment::Test,
                emission_type: "1".into(),
                legal_name: "EMPRESA DE PRUEBAS S.A.".into(),
                commercial_name: None,
                ruc: "0999999999001".into(),
                access_key: None,
                establishment: "001".into(),
                emission_point: "001".into(),
                sequential: "000000010".into(),
                head_office_address: "AV. PRINCIPAL 123".into(),
            },
            emission_date: NaiveDate::from_ymd_opt(2026, 1, 6).unwrap(),
            departure_address: "BODEGA CENTRAL".into(),
            carrier_name: "TRANSPORTES ANDINOS".into(),
            carrier_id_type: IdentificationType::Ruc,
            carrier_ruc: "1799999999001".into(),
            transport_start: NaiveDate::from_ymd_opt(2026, 1, 6).unwrap(),
            transport_end: NaiveDate::from_ymd_opt(2026, 1, 7).unwrap(),
            plate: "PBA1234".into(),
        }
    }

    #[test]
    fn builder_requires_recipients_with_goods() {
        assert_eq!(
            WaybillBuilder::new(required()).build().unwrap_err(),
            DocumentError::MissingRecipients
        );

        let empty = Recipient::new("0912345678", "CLIENTE", "QUITO", "VENTA");
        assert_eq!(
            WaybillBuilder::new(required())
                .recipient(empty)
                .build()
                .unwrap_err(),
            DocumentError::RecipientWithoutGoods { index: 0 }
        );

        let loaded = Recipient::new("0912345678", "CLIENTE", "QUITO", "VENTA")
            .item(CarriedItem::new("A-1", "Cajas", 3.0));
        let waybill = WaybillBuilder::new(required())
            .recipient(loaded)
            .rise("RISE-1")
            .build()
            .unwrap();
        assert_eq!(waybill.recipients.len(), 1);
        assert_eq!(waybill.rise.as_deref(), Some("RISE-1"));
    }
}
