use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Itinerary,
    Invoice,
    Receipt,
    Quote,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Itinerary => "ITINERARY",
            Self::Invoice => "INVOICE",
            Self::Receipt => "RECEIPT",
            Self::Quote => "QUOTE",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ITINERARY" => Some(Self::Itinerary),
            "INVOICE" => Some(Self::Invoice),
            "RECEIPT" => Some(Self::Receipt),
            "QUOTE" => Some(Self::Quote),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotForwardableReason {
    NotAnInvoice,
    AlreadyForwarded,
}

impl fmt::Display for NotForwardableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnInvoice => f.write_str("only invoice documents go to finance"),
            Self::AlreadyForwarded => f.write_str("already forwarded to finance"),
        }
    }
}

/// Metadata describing an uploaded file. File bytes live elsewhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub request_id: RequestId,
    pub doc_type: DocumentType,
    pub file_name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub forwarded_to_finance: bool,
    #[serde(default)]
    pub forwarded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub forwarded_by: Option<String>,
    #[serde(default)]
    pub version: u64,
}

impl Document {
    pub fn is_pending_finance(&self) -> bool {
        self.doc_type == DocumentType::Invoice && !self.forwarded_to_finance
    }

    /// One-way flag flip. A refused forward leaves the document untouched.
    pub fn forward_to_finance(&mut self, by: &str, at: DateTime<Utc>) -> Result<(), WorkflowError> {
        let reason = if self.doc_type != DocumentType::Invoice {
            Some(NotForwardableReason::NotAnInvoice)
        } else if self.forwarded_to_finance {
            Some(NotForwardableReason::AlreadyForwarded)
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(WorkflowError::NotForwardable { document_id: self.id.clone(), reason });
        }

        self.forwarded_to_finance = true;
        self.forwarded_at = Some(at);
        self.forwarded_by = Some(by.to_string());
        Ok(())
    }
}

/// Caller-supplied upload description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub doc_type: DocumentType,
    pub file_name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DocumentUpload {
    pub fn new(doc_type: DocumentType, file_name: impl Into<String>) -> Self {
        Self { doc_type, file_name: file_name.into(), metadata: BTreeMap::new() }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.file_name.trim().is_empty() {
            return Err(WorkflowError::validation("document file name is required"));
        }
        Ok(())
    }

    pub fn into_document(self, request_id: RequestId, by: &str, at: DateTime<Utc>) -> Document {
        Document {
            id: DocumentId(String::new()),
            request_id,
            doc_type: self.doc_type,
            file_name: self.file_name.trim().to_string(),
            metadata: self.metadata,
            uploaded_by: by.to_string(),
            uploaded_at: at,
            forwarded_to_finance: false,
            forwarded_at: None,
            forwarded_by: None,
            version: 0,
        }
    }
}
