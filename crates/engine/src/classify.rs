// Per-document status inspection and classification.
//
// A document is accepted when its authorization status (cStat) is 100
// (authorized) or 150 (authorized out of deadline). Accepted documents are
// split by emission type (tpEmis): 1 is the normal online channel, anything
// else was issued in contingency and goes to separate review.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Outcome category for one document entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Approved,
    Contingency,
    Rejected,
}

impl Category {
    /// Folder this category maps to in the output archive.
    pub fn folder(&self) -> &'static str {
        match self {
            Category::Approved => "aprovados",
            Category::Contingency => "contingencia",
            Category::Rejected => "rejeitados",
        }
    }
}

/// Authorization codes accepted by the issuing authority.
const ACCEPTED_STATUS_CODES: [&str; 2] = ["100", "150"];

/// Emission-type code for the normal online channel.
const NORMAL_EMISSION: &str = "1";

/// Sentinel status code recorded for documents that fail to parse.
pub const PARSE_ERROR_CODE: &str = "ERRO_PARSE";

/// Fixed reason recorded for documents that fail to parse.
pub const PARSE_ERROR_REASON: &str = "Arquivo XML inválido ou corrompido";

/// Status code reported in the rejection report when cStat is absent.
pub const MISSING_STATUS_CODE: &str = "N/A";

/// Reason reported in the rejection report when xMotivo is absent.
pub const MISSING_REASON: &str = "Motivo não encontrado";

/// Classification of one document entry. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub category: Category,
    /// Text of the first cStat element, if the document carried one.
    pub status_code: Option<String>,
    /// Text of the first xMotivo element, if the document carried one.
    pub reason: Option<String>,
}

impl ClassificationResult {
    /// Fixed result for entries whose bytes are not a well-formed document.
    pub fn parse_failure() -> Self {
        Self {
            category: Category::Rejected,
            status_code: Some(PARSE_ERROR_CODE.to_string()),
            reason: Some(PARSE_ERROR_REASON.to_string()),
        }
    }
}

/// One entry's bytes are not a well-formed XML document.
#[derive(Debug)]
pub struct DocumentError(String);

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed XML document: {}", self.0)
    }
}

impl std::error::Error for DocumentError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Status,
    Reason,
    Emission,
}

/// Map an element's local name (namespace prefix already split off) to the
/// status field it carries, if any.
fn field_for(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"cStat" => Some(Field::Status),
        b"xMotivo" => Some(Field::Reason),
        b"tpEmis" => Some(Field::Emission),
        _ => None,
    }
}

/// The three status fields, each taken from the first matching element in
/// document order. Later duplicates are ignored.
#[derive(Debug, Default, PartialEq, Eq)]
struct StatusFields {
    status_code: Option<String>,
    reason: Option<String>,
    emission_type: Option<String>,
}

impl StatusFields {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Status => &mut self.status_code,
            Field::Reason => &mut self.reason,
            Field::Emission => &mut self.emission_type,
        }
    }

    fn is_set(&self, field: Field) -> bool {
        match field {
            Field::Status => self.status_code.is_some(),
            Field::Reason => self.reason.is_some(),
            Field::Emission => self.emission_type.is_some(),
        }
    }

    fn set(&mut self, field: Field, text: String) {
        let slot = self.slot(field);
        if slot.is_none() {
            *slot = Some(text);
        }
    }
}

/// Scan the element tree for cStat, xMotivo and tpEmis, matching by local
/// name only so that namespace-qualified documents resolve the same way.
fn extract_status_fields(bytes: &[u8]) -> Result<StatusFields, DocumentError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut fields = StatusFields::default();
    let mut saw_element = false;
    // Field element currently open, with the text collected so far.
    let mut pending: Option<(Field, String)> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                saw_element = true;
                pending = match field_for(e.local_name().as_ref()) {
                    Some(field) if !fields.is_set(field) => Some((field, String::new())),
                    _ => None,
                };
            }
            Ok(Event::Empty(ref e)) => {
                saw_element = true;
                pending = None;
                if let Some(field) = field_for(e.local_name().as_ref()) {
                    fields.set(field, String::new());
                }
            }
            Ok(Event::Text(ref t)) => {
                if let Some((_, text)) = pending.as_mut() {
                    text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(Event::CData(ref t)) => {
                if let Some((_, text)) = pending.as_mut() {
                    text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(Event::End(_)) => {
                if let Some((field, text)) = pending.take() {
                    fields.set(field, text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DocumentError(e.to_string())),
        }
        buf.clear();
    }

    if !saw_element {
        return Err(DocumentError("no XML element found".to_string()));
    }

    Ok(fields)
}

/// Classify one document entry's bytes.
///
/// Pure function of the content: the same bytes always yield the same
/// category and diagnostic. Bytes that are not a well-formed document fail
/// with `DocumentError`; the batch loop converts that into a rejection.
pub fn classify(bytes: &[u8]) -> Result<ClassificationResult, DocumentError> {
    let fields = extract_status_fields(bytes)?;

    let authorized = fields
        .status_code
        .as_deref()
        .map(|code| ACCEPTED_STATUS_CODES.contains(&code))
        .unwrap_or(false);

    let category = if !authorized {
        Category::Rejected
    } else if fields.emission_type.as_deref() == Some(NORMAL_EMISSION) {
        Category::Approved
    } else {
        Category::Contingency
    };

    Ok(ClassificationResult {
        category,
        status_code: fields.status_code,
        reason: fields.reason,
    })
}
