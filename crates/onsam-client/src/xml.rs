use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The `<xConnection>` wire shape spoken to the controller.
///
/// `instance_id` carries the deterministic xconn id; the controller echoes it
/// back on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "xConnection", rename_all = "camelCase")]
pub struct XConnection {
    #[serde(rename = "instanceID")]
    pub instance_id: String,
    pub src_end_point_id: String,
    pub src_label_id: String,
    pub dst_end_point_id: String,
    pub dst_label_id: String,
}

impl XConnection {
    pub fn to_xml(&self) -> Result<String, quick_xml::SeError> {
        quick_xml::se::to_string(self)
    }

    /// Decode a single-connection response. A parse failure is logged and
    /// downgraded to `None`, matching the list decoders' behavior.
    pub fn from_xml(xml: &str) -> Option<Self> {
        match quick_xml::de::from_str(xml) {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!(error = %e, "undecodable xConnection body");
                None
            }
        }
    }
}

/// Collect the text of every `<entry>` element, regardless of the root
/// element's name. Malformed XML decodes to an empty list.
pub fn decode_entries(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut result = Vec::new();
    let mut depth: usize = 0; // 0 = not inside an <entry>

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if depth == 0 && e.local_name().as_ref() == b"entry" {
                    depth = 1;
                } else if depth > 0 {
                    depth += 1;
                }
            }
            Ok(Event::End(_)) => {
                if depth > 0 {
                    depth -= 1;
                }
            }
            Ok(Event::Text(e)) if depth == 1 => {
                if let Ok(s) = e.unescape() {
                    result.push(s.trim().to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "undecodable entry list");
                return Vec::new();
            }
            _ => {}
        }
    }
    result
}

/// Scan a queue-execute response for `<responses>` blocks whose `<status>`
/// reports an error; returns the offending `<actionID>` if one is found.
pub fn queue_error(xml: &str) -> Option<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Field {
        None,
        Status,
        ActionId,
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut in_responses = false;
    let mut field = Field::None;
    let mut status: Option<String> = None;
    let mut action_id: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"responses" => {
                    in_responses = true;
                    status = None;
                    action_id = None;
                }
                b"status" if in_responses => field = Field::Status,
                b"actionID" if in_responses => field = Field::ActionId,
                _ => field = Field::None,
            },
            Ok(Event::Text(e)) => {
                if let Ok(s) = e.unescape() {
                    match field {
                        Field::Status => status = Some(s.trim().to_string()),
                        Field::ActionId => action_id = Some(s.trim().to_string()),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"responses" {
                    if matches!(status.as_deref(), Some("ERROR") | Some("error")) {
                        return Some(action_id.unwrap_or_else(|| "unknown".to_string()));
                    }
                    in_responses = false;
                }
                field = Field::None;
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    None
}
