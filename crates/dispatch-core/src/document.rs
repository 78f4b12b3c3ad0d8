//! The document envelope carried by every transport.
//!
//! A [`Document`] is both the request and the response: the engine reads
//! routing keys, form and security from the inbound document and writes
//! type, output or error into the one it returns.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Raw request payload before validation.
pub type Form = Map<String, Value>;

/// Output field name to alias, applied before output feeds the next stage.
pub type ChainRequestOption = BTreeMap<String, String>;

/// Discriminator of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    /// Successful invocation; `output` holds the handler response.
    Result,
    /// Failed node; `error` holds the message.
    Error,
    /// Shape description request or reply.
    Procedure,
    /// Plain invocation request.
    Dispatch,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Result => "Result",
            DocumentType::Error => "Error",
            DocumentType::Procedure => "Procedure",
            DocumentType::Dispatch => "Dispatch",
        }
    }

    /// Lenient parse. Unknown and empty values count as a plain invocation.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "result" => DocumentType::Result,
            "error" => DocumentType::Error,
            "procedure" => DocumentType::Procedure,
            _ => DocumentType::Dispatch,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DocumentType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DocumentType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(DocumentType::parse(&raw))
    }
}

/// Licence token and verify code travelling with a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub licence: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verify_code: String,
}

impl Security {
    pub fn is_empty(&self) -> bool {
        self.licence.is_empty() && self.verify_code.is_empty()
    }
}

/// Security requirements a transaction declares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityOptions {
    #[serde(default)]
    pub licence_checker: bool,
}

/// Options a transaction declares, echoed back for introspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOptions {
    #[serde(default)]
    pub security: SecurityOptions,
    /// Response headers the HTTP adapter copies onto its reply.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,
}

impl TransactionOptions {
    pub fn licence_required(&self) -> bool {
        self.security.licence_checker
    }
}

/// Universal message envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub department: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transaction: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocumentType>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Map::is_empty"
    )]
    pub form: Form,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub dispatchings: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_request_option: Option<ChainRequestOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<TransactionOptions>,
}

impl Document {
    /// Invocation request for `department`/`transaction`.
    pub fn new(department: impl Into<String>, transaction: impl Into<String>) -> Self {
        Self {
            department: department.into(),
            transaction: transaction.into(),
            ..Default::default()
        }
    }

    /// Terminal error document with no routing keys.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            doc_type: Some(DocumentType::Error),
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_form(mut self, form: Form) -> Self {
        self.form = form;
        self
    }

    pub fn with_type(mut self, doc_type: DocumentType) -> Self {
        self.doc_type = Some(doc_type);
        self
    }

    pub fn with_licence(mut self, licence: impl Into<String>) -> Self {
        self.security.get_or_insert_with(Security::default).licence = licence.into();
        self
    }

    pub fn with_verify_code(mut self, code: impl Into<String>) -> Self {
        self.security.get_or_insert_with(Security::default).verify_code = code.into();
        self
    }

    pub fn with_dispatching(mut self, child: Document) -> Self {
        self.dispatchings.push(child);
        self
    }

    pub fn with_chain_alias(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.chain_request_option
            .get_or_insert_with(BTreeMap::new)
            .insert(field.into(), alias.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.doc_type == Some(DocumentType::Error)
    }

    pub fn is_procedure(&self) -> bool {
        self.doc_type == Some(DocumentType::Procedure)
    }

    /// Licence token, if one is present and non-empty.
    pub fn licence(&self) -> Option<&str> {
        self.security
            .as_ref()
            .map(|s| s.licence.as_str())
            .filter(|l| !l.is_empty())
    }

    /// Verify code, if one is present and non-empty.
    pub fn verify_code(&self) -> Option<&str> {
        self.security
            .as_ref()
            .map(|s| s.verify_code.as_str())
            .filter(|c| !c.is_empty())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
