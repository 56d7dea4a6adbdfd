//! SRI web service port and response types.
//!
//! Transport lives behind [`SriGateway`]. This module only knows the shape of the
//! two offline services (`RecepcionComprobantesOffline`, `AutorizacionComprobantesOffline`)
//! and how to decode their SOAP bodies.
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::access_key::AccessKey;

/// Identifier used for messages synthesized on transport failure.
pub const CONNECTION_ERROR_ID: &str = "ERR_CONNECTION";

/// Errors raised by a gateway implementation.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("SOAP fault {code}: {message}")]
    Fault { code: String, message: String },
    #[error("Invalid response from SRI: {0}")]
    Decode(#[from] ResponseDecodeError),
}

/// SOAP body could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseDecodeError {
    #[error("malformed XML: {0}")]
    Xml(String),
    #[error("missing element <{0}>")]
    MissingElement(&'static str),
    #[error("SOAP fault {code}: {message}")]
    Fault { code: String, message: String },
}

impl From<quick_xml::Error> for ResponseDecodeError {
    fn from(err: quick_xml::Error) -> Self {
        ResponseDecodeError::Xml(err.to_string())
    }
}

/// Message attached by the authority to a verdict, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorityMessage {
    pub identifier: Option<String>,
    pub message: String,
    pub additional_info: Option<String>,
    /// `ERROR`, `ADVERTENCIA` or `INFORMATIVO` on the wire.
    pub kind: Option<String>,
}

impl AuthorityMessage {
    pub fn new(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            message: message.into(),
            additional_info: None,
            kind: None,
        }
    }

    /// Message reported when the remote call itself failed.
    pub fn connection_error(detail: impl fmt::Display) -> Self {
        Self {
            identifier: Some(CONNECTION_ERROR_ID.to_string()),
            message: format!("Connection error: {detail}"),
            additional_info: None,
            kind: Some("ERROR".to_string()),
        }
    }

    pub fn with_additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

impl fmt::Display for AuthorityMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(identifier) = &self.identifier {
            write!(f, "[{identifier}] ")?;
        }
        f.write_str(&self.message)?;
        if let Some(info) = &self.additional_info {
            write!(f, " ({info})")?;
        }
        Ok(())
    }
}

/// Verdict of the reception service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceptionStatus {
    /// `RECIBIDA`
    Received,
    /// `DEVUELTA`
    Returned,
    /// Anything else, including the `ERROR` placeholder for a missing status.
    Other(String),
}

impl ReceptionStatus {
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "RECIBIDA" => ReceptionStatus::Received,
            "DEVUELTA" => ReceptionStatus::Returned,
            other => ReceptionStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReceptionStatus::Received => "RECIBIDA",
            ReceptionStatus::Returned => "DEVUELTA",
            ReceptionStatus::Other(value) => value,
        }
    }
}

/// Verdict of the authorization service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    /// `AUTORIZADO`
    Authorized,
    /// `NO AUTORIZADO`
    NotAuthorized,
    /// `EN PROCESAMIENTO`
    Processing,
    Other(String),
}

impl AuthorizationStatus {
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "AUTORIZADO" => AuthorizationStatus::Authorized,
            "NO AUTORIZADO" => AuthorizationStatus::NotAuthorized,
            "EN PROCESAMIENTO" => AuthorizationStatus::Processing,
            other => AuthorizationStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthorizationStatus::Authorized => "AUTORIZADO",
            AuthorizationStatus::NotAuthorized => "NO AUTORIZADO",
            AuthorizationStatus::Processing => "EN PROCESAMIENTO",
            AuthorizationStatus::Other(value) => value,
        }
    }
}

/// Reception service answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionResponse {
    status: ReceptionStatus,
    messages: Vec<AuthorityMessage>,
}

impl ReceptionResponse {
    pub fn new(status: ReceptionStatus, messages: Vec<AuthorityMessage>) -> Self {
        Self { status, messages }
    }

    pub fn status(&self) -> &ReceptionStatus {
        &self.status
    }

    pub fn messages(&self) -> &[AuthorityMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<AuthorityMessage> {
        self.messages
    }

    /// Decode a `validarComprobanteResponse` SOAP body.
    ///
    /// A missing `<estado>` decodes as the `ERROR` status, so it never reads as success.
    pub fn from_soap(xml: &str) -> Result<Self, ResponseDecodeError> {
        let tree = SoapTree::parse(xml)?;
        let response = tree
            .find("RespuestaRecepcionComprobante")
            .ok_or(ResponseDecodeError::MissingElement(
                "RespuestaRecepcionComprobante",
            ))?;
        let status = response
            .child_text("estado")
            .map(ReceptionStatus::from_wire)
            .unwrap_or_else(|| ReceptionStatus::Other("ERROR".to_string()));
        let messages = response
            .child("comprobantes")
            .and_then(|c| c.child("comprobante"))
            .map(collect_messages)
            .unwrap_or_default();
        Ok(Self { status, messages })
    }
}

/// Authorization service answer for one access key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    status: AuthorizationStatus,
    authorization_number: Option<String>,
    authorization_date: Option<String>,
    environment: Option<String>,
    document: Option<String>,
    messages: Vec<AuthorityMessage>,
}

impl AuthorizationResponse {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self {
            status,
            authorization_number: None,
            authorization_date: None,
            environment: None,
            document: None,
            messages: Vec::new(),
        }
    }

    pub fn with_authorization_number(mut self, number: impl Into<String>) -> Self {
        self.authorization_number = Some(number.into());
        self
    }

    pub fn with_authorization_date(mut self, date: impl Into<String>) -> Self {
        self.authorization_date = Some(date.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_document(mut self, xml: impl Into<String>) -> Self {
        self.document = Some(xml.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<AuthorityMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn status(&self) -> &AuthorizationStatus {
        &self.status
    }

    pub fn authorization_number(&self) -> Option<&str> {
        self.authorization_number.as_deref()
    }

    pub fn authorization_date(&self) -> Option<&str> {
        self.authorization_date.as_deref()
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Authorized XML as returned by the authority.
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn messages(&self) -> &[AuthorityMessage] {
        &self.messages
    }

    /// Decode an `autorizacionComprobanteResponse` SOAP body.
    ///
    /// Only the first `<autorizacion>` is read. A response without one decodes as
    /// `NO AUTORIZADO` with no messages.
    pub fn from_soap(xml: &str) -> Result<Self, ResponseDecodeError> {
        let tree = SoapTree::parse(xml)?;
        let response = tree
            .find("RespuestaAutorizacionComprobante")
            .ok_or(ResponseDecodeError::MissingElement(
                "RespuestaAutorizacionComprobante",
            ))?;
        let Some(record) = response
            .child("autorizaciones")
            .and_then(|list| list.child("autorizacion"))
        else {
            return Ok(Self::new(AuthorizationStatus::NotAuthorized));
        };

        let status = record
            .child_text("estado")
            .map(AuthorizationStatus::from_wire)
            .unwrap_or(AuthorizationStatus::NotAuthorized);
        Ok(Self {
            status,
            authorization_number: record.child_text("numeroAutorizacion").map(str::to_string),
            authorization_date: record.child_text("fechaAutorizacion").map(str::to_string),
            environment: record.child_text("ambiente").map(str::to_string),
            document: record.child_text("comprobante").map(str::to_string),
            messages: collect_messages(record),
        })
    }
}

fn collect_messages(parent: &Node) -> Vec<AuthorityMessage> {
    let Some(list) = parent.child("mensajes") else {
        return Vec::new();
    };
    list.children_named("mensaje")
        .map(|node| AuthorityMessage {
            identifier: node.child_text("identificador").map(str::to_string),
            message: node.child_text("mensaje").unwrap_or_default().to_string(),
            additional_info: node
                .child_text("informacionAdicional")
                .map(str::to_string),
            kind: node.child_text("tipo").map(str::to_string),
        })
        .collect()
}

/// Minimal element tree over a SOAP response, namespace prefixes dropped.
#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|text| !text.is_empty())
    }

    /// Depth-first search including `self`.
    fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

struct SoapTree {
    root: Node,
}

impl SoapTree {
    fn parse(xml: &str) -> Result<Self, ResponseDecodeError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Node> = vec![Node::default()];
        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Node {
                    name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                    ..Node::default()
                }),
                Event::Empty(start) => {
                    let node = Node {
                        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                        ..Node::default()
                    };
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(node);
                    }
                }
                Event::End(_) => {
                    if stack.len() < 2 {
                        return Err(ResponseDecodeError::Xml("unbalanced end tag".to_string()));
                    }
                    if let (Some(node), Some(parent)) = (stack.pop(), stack.last_mut()) {
                        parent.children.push(node);
                    }
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if stack.len() != 1 {
            return Err(ResponseDecodeError::Xml("unexpected end of document".to_string()));
        }
        let root = stack.pop().unwrap_or_default();

        if let Some(fault) = root.find("Fault") {
            return Err(ResponseDecodeError::Fault {
                code: fault.child_text("faultcode").unwrap_or_default().to_string(),
                message: fault.child_text("faultstring").unwrap_or_default().to_string(),
            });
        }
        Ok(Self { root })
    }

    fn find(&self, name: &str) -> Option<&Node> {
        self.root.find(name)
    }
}

/// Remote operations of the authority.
///
/// One call is one network round trip. Implementations must not retry on their own;
/// retry policy belongs to the caller.
#[async_trait]
pub trait SriGateway: Send + Sync {
    /// `validarComprobante` with the base64-encoded signed XML.
    async fn submit_receipt(&self, signed_xml_base64: &str)
        -> Result<ReceptionResponse, GatewayError>;

    /// `autorizacionComprobante` for one access key.
    async fn query_authorization(
        &self,
        access_key: &AccessKey,
    ) -> Result<AuthorizationResponse, GatewayError>;
}

#[async_trait]
impl<G> SriGateway for &G
where
    G: SriGateway + ?Sized,
{
    async fn submit_receipt(
        &self,
        signed_xml_base64: &str,
    ) -> Result<ReceptionResponse, GatewayError> {
        (**self).submit_receipt(signed_xml_base64).await
    }

    async fn query_authorization(
        &self,
        access_key: &AccessKey,
    ) -> Result<AuthorizationResponse, GatewayError> {
        (**self).query_authorization(access_key).await
    }
}

#[async_trait]
impl<G> SriGateway for Arc<G>
where
    G: SriGateway + ?Sized,
{
    async fn submit_receipt(
        &self,
        signed_xml_base64: &str,
    ) -> Result<ReceptionResponse, GatewayError> {
        (**self).submit_receipt(signed_xml_base64).await
    }

    async fn query_authorization(
        &self,
        access_key: &AccessKey,
    ) -> Result<AuthorizationResponse, GatewayError> {
        (**self).query_authorization(access_key).await
    }
}
