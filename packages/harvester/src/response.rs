//! Decoding of OAI-PMH response documents.
//!
//! Every response is an `<OAI-PMH>` envelope holding either a verb element
//! (`<ListIdentifiers>`, `<GetRecord>`, ...) or one or more `<error>` elements.
//! A protocol error arrives with HTTP 200, so it is returned alongside the
//! payload rather than as a decode failure.
//!
//! Decoding is lenient: unknown elements and attributes are ignored, namespaces
//! are not checked, DTDs are accepted, and bare `&` or undeclared entities such
//! as `&eacute;` are kept as literal text.

use std::fmt;

use roxmltree::{Document, Node, ParsingOptions};
use thiserror::Error;

use crate::xml::{
    child_text, children_text, escape_stray_ampersands, find_child, find_children, get_tag_name,
    get_text,
};

/// Root element of every OAI-PMH response.
const ROOT_ELEMENT: &str = "OAI-PMH";

/// The six OAI-PMH request verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Identify,
    ListIdentifiers,
    ListRecords,
    GetRecord,
    ListSets,
    ListMetadataFormats,
}

impl Verb {
    /// Verb name as used in the `verb` query parameter and the response element.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identify => "Identify",
            Self::ListIdentifiers => "ListIdentifiers",
            Self::ListRecords => "ListRecords",
            Self::GetRecord => "GetRecord",
            Self::ListSets => "ListSets",
            Self::ListMetadataFormats => "ListMetadataFormats",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAI-PMH error codes.
///
/// `IdDoesNotExist` is the only code the harvester treats as benign; anything
/// the protocol does not define lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    BadArgument,
    BadResumptionToken,
    BadVerb,
    CannotDisseminateFormat,
    IdDoesNotExist,
    NoRecordsMatch,
    NoMetadataFormats,
    NoSetHierarchy,
    Other(String),
}

impl ErrorCode {
    /// Classify a raw `code` attribute.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "badArgument" => Self::BadArgument,
            "badResumptionToken" => Self::BadResumptionToken,
            "badVerb" => Self::BadVerb,
            "cannotDisseminateFormat" => Self::CannotDisseminateFormat,
            "idDoesNotExist" => Self::IdDoesNotExist,
            "noRecordsMatch" => Self::NoRecordsMatch,
            "noMetadataFormats" => Self::NoMetadataFormats,
            "noSetHierarchy" => Self::NoSetHierarchy,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::BadArgument => "badArgument",
            Self::BadResumptionToken => "badResumptionToken",
            Self::BadVerb => "badVerb",
            Self::CannotDisseminateFormat => "cannotDisseminateFormat",
            Self::IdDoesNotExist => "idDoesNotExist",
            Self::NoRecordsMatch => "noRecordsMatch",
            Self::NoMetadataFormats => "noMetadataFormats",
            Self::NoSetHierarchy => "noSetHierarchy",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol error reported inside an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("oai: {code} {message}")]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
}

/// Failure to turn a response body into a [`Response`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Body is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Document is XML but not an OAI-PMH response.
    #[error("unexpected root element <{0}>, expected <OAI-PMH>")]
    UnexpectedRoot(String),

    /// Response carries neither the verb element nor an error.
    #[error("response has no <{0}> element")]
    MissingVerb(Verb),
}

/// Record header as listed by `ListIdentifiers` and embedded in records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub identifier: String,
    pub datestamp: Option<String>,
    pub set_specs: Vec<String>,
    /// `status="deleted"` on the header.
    pub deleted: bool,
}

/// Flow-control token of a list response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumptionToken {
    pub value: String,
    pub cursor: Option<u64>,
    pub complete_list_size: Option<u64>,
}

impl ResumptionToken {
    /// An empty token marks the last page of a list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// One page of a `ListIdentifiers` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub headers: Vec<Header>,
    pub resumption_token: Option<ResumptionToken>,
}

impl ListingPage {
    /// Token for the next page, or `None` when this page is the last one.
    #[must_use]
    pub fn next_token(&self) -> Option<&str> {
        self.resumption_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| t.value.as_str())
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter().map(|h| h.identifier.as_str())
    }
}

/// A single record with its metadata kept as raw XML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub header: Header,
    pub metadata: Option<String>,
}

/// Repository description returned by `Identify`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identify {
    pub repository_name: String,
    pub base_url: String,
    pub protocol_version: String,
    pub admin_emails: Vec<String>,
    pub earliest_datestamp: Option<String>,
    pub deleted_record: Option<String>,
    pub granularity: Option<String>,
    pub compression: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Set {
    pub spec: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFormat {
    pub prefix: String,
    pub schema: Option<String>,
    pub namespace: Option<String>,
}

/// Verb-specific content of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Identify(Identify),
    ListIdentifiers(ListingPage),
    ListRecords {
        records: Vec<Record>,
        resumption_token: Option<ResumptionToken>,
    },
    GetRecord(Record),
    ListSets {
        sets: Vec<Set>,
        resumption_token: Option<ResumptionToken>,
    },
    ListMetadataFormats(Vec<MetadataFormat>),
    /// The response carried an error instead of a verb element.
    Empty,
}

/// A decoded OAI-PMH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub response_date: Option<String>,
    pub payload: Payload,
    pub error: Option<ProtocolError>,
}

/// Decode a raw response body for the given verb.
///
/// # Examples
/// ```
/// use oai_harvester::response::{decode, ErrorCode, Verb};
///
/// let body = br#"<OAI-PMH><error code="idDoesNotExist">gone</error></OAI-PMH>"#;
/// let response = decode(body, Verb::GetRecord).unwrap();
/// assert_eq!(response.error.unwrap().code, ErrorCode::IdDoesNotExist);
/// ```
pub fn decode(body: &[u8], verb: Verb) -> std::result::Result<Response, DecodeError> {
    let lossy = String::from_utf8_lossy(body);
    let text = escape_stray_ampersands(&lossy);
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(&text, options)?;
    let root = doc.root_element();

    if get_tag_name(root) != ROOT_ELEMENT {
        return Err(DecodeError::UnexpectedRoot(get_tag_name(root).to_string()));
    }

    let response_date = child_text(root, "responseDate");
    // Several <error> elements are allowed; the first one decides.
    let error = find_child(root, "error").map(parse_error);

    let payload = match find_child(root, verb.as_str()) {
        Some(node) => parse_payload(node, verb, &text),
        None if error.is_some() => Payload::Empty,
        None => return Err(DecodeError::MissingVerb(verb)),
    };

    Ok(Response {
        response_date,
        payload,
        error,
    })
}

fn parse_payload(node: Node<'_, '_>, verb: Verb, text: &str) -> Payload {
    match verb {
        Verb::Identify => Payload::Identify(parse_identify(node)),
        Verb::ListIdentifiers => Payload::ListIdentifiers(ListingPage {
            headers: find_children(node, "header").map(parse_header).collect(),
            resumption_token: find_child(node, "resumptionToken").map(parse_token),
        }),
        Verb::ListRecords => Payload::ListRecords {
            records: find_children(node, "record")
                .map(|r| parse_record(r, text))
                .collect(),
            resumption_token: find_child(node, "resumptionToken").map(parse_token),
        },
        Verb::GetRecord => Payload::GetRecord(
            find_child(node, "record")
                .map(|r| parse_record(r, text))
                .unwrap_or_default(),
        ),
        Verb::ListSets => Payload::ListSets {
            sets: find_children(node, "set")
                .map(|s| Set {
                    spec: child_text(s, "setSpec").unwrap_or_default(),
                    name: child_text(s, "setName").unwrap_or_default(),
                })
                .collect(),
            resumption_token: find_child(node, "resumptionToken").map(parse_token),
        },
        Verb::ListMetadataFormats => Payload::ListMetadataFormats(
            find_children(node, "metadataFormat")
                .map(|f| MetadataFormat {
                    prefix: child_text(f, "metadataPrefix").unwrap_or_default(),
                    schema: child_text(f, "schema"),
                    namespace: child_text(f, "metadataNamespace"),
                })
                .collect(),
        ),
    }
}

fn parse_error(node: Node<'_, '_>) -> ProtocolError {
    ProtocolError {
        code: ErrorCode::from_code(node.attribute("code").unwrap_or_default()),
        message: get_text(node),
    }
}

fn parse_header(node: Node<'_, '_>) -> Header {
    Header {
        identifier: child_text(node, "identifier").unwrap_or_default(),
        datestamp: child_text(node, "datestamp"),
        set_specs: children_text(node, "setSpec"),
        deleted: node.attribute("status") == Some("deleted"),
    }
}

fn parse_token(node: Node<'_, '_>) -> ResumptionToken {
    ResumptionToken {
        value: get_text(node),
        cursor: node.attribute("cursor").and_then(|v| v.trim().parse().ok()),
        complete_list_size: node
            .attribute("completeListSize")
            .and_then(|v| v.trim().parse().ok()),
    }
}

fn parse_record(node: Node<'_, '_>, text: &str) -> Record {
    Record {
        header: find_child(node, "header")
            .map(parse_header)
            .unwrap_or_default(),
        metadata: find_child(node, "metadata")
            .and_then(|m| m.first_element_child())
            .and_then(|inner| text.get(inner.range()))
            .map(str::to_string),
    }
}

fn parse_identify(node: Node<'_, '_>) -> Identify {
    Identify {
        repository_name: child_text(node, "repositoryName").unwrap_or_default(),
        base_url: child_text(node, "baseURL").unwrap_or_default(),
        protocol_version: child_text(node, "protocolVersion").unwrap_or_default(),
        admin_emails: children_text(node, "adminEmail"),
        earliest_datestamp: child_text(node, "earliestDatestamp"),
        deleted_record: child_text(node, "deletedRecord"),
        granularity: child_text(node, "granularity"),
        compression: children_text(node, "compression"),
    }
}
