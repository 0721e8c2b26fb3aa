//! Decoding of the XML payloads devices push at the listener.
//!
//! Two document shapes arrive here: the UPnP event notification (a
//! `propertyset` with repeated `property` children, one element per changed
//! state variable) and the `BinaryState` control body a device POSTs when a
//! long-press rule fires. Both are tiny, so they are walked with the
//! `quick-xml` event reader rather than deserialized into fixed structs;
//! notification payloads carry arbitrary element names.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Error decoding an inbound payload.
///
/// Callers treat this as "drop the event": the device is still acknowledged
/// so it does not go into a retry storm.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The body was not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// One changed state variable extracted from a notification body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Element tag, e.g. `BinaryState`.
    pub name: String,
    /// Element text; empty when the device sent an empty element.
    pub value: String,
}

/// Extract the changed state variables from an event notification.
///
/// The document root is a namespace-scoped `propertyset`; each `property`
/// child wraps one element per changed variable (tag = variable name,
/// text = new value). Changes are returned in document order. Namespace
/// prefixes are ignored, matching what devices actually send more
/// faithfully than strict qualification would.
pub fn parse_property_set(xml: &str) -> Result<Vec<PropertyChange>, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut changes = Vec::new();
    let mut in_property = false;
    let mut current: Option<PropertyChange> = None;
    // Markup nested inside a value element is skipped; only its direct text
    // is the value.
    let mut nested = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if !in_property {
                    if local_name(&e) == "property" {
                        in_property = true;
                    }
                } else if current.is_none() {
                    current = Some(PropertyChange {
                        name: local_name(&e),
                        value: String::new(),
                    });
                } else {
                    nested += 1;
                }
            }
            Event::Empty(e) => {
                if in_property && current.is_none() {
                    changes.push(PropertyChange {
                        name: local_name(&e),
                        value: String::new(),
                    });
                }
            }
            Event::Text(t) => {
                if let Some(change) = current.as_mut() {
                    if nested == 0 {
                        change.value.push_str(&t.unescape()?);
                    }
                }
            }
            Event::CData(t) => {
                if let Some(change) = current.as_mut() {
                    if nested == 0 {
                        change
                            .value
                            .push_str(&String::from_utf8_lossy(&t.into_inner()));
                    }
                }
            }
            Event::End(_) => {
                if nested > 0 {
                    nested -= 1;
                } else if let Some(change) = current.take() {
                    changes.push(change);
                } else if in_property {
                    in_property = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(changes)
}

/// Extract the text of the first `BinaryState` element, if any.
///
/// Control bodies bury the element inside a SOAP envelope, so it is matched
/// anywhere in the document.
pub fn parse_binary_state(xml: &str) -> Result<Option<String>, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut capture = false;
    let mut value = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if !capture && local_name(&e) == "BinaryState" => {
                capture = true;
            }
            Event::Empty(e) if !capture && local_name(&e) == "BinaryState" => {
                return Ok(Some(String::new()));
            }
            Event::Text(t) if capture => value.push_str(&t.unescape()?),
            Event::CData(t) if capture => {
                value.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::End(e) if capture && end_local_name(&e) == "BinaryState" => {
                return Ok(Some(value));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(None)
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn end_local_name(e: &BytesEnd) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_set_preserves_document_order() {
        let xml = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <BinaryState>1</BinaryState>
  </e:property>
  <e:property>
    <Brightness>50</Brightness>
  </e:property>
</e:propertyset>"#;

        let changes = parse_property_set(xml).unwrap();
        assert_eq!(
            changes,
            vec![
                PropertyChange {
                    name: "BinaryState".to_string(),
                    value: "1".to_string(),
                },
                PropertyChange {
                    name: "Brightness".to_string(),
                    value: "50".to_string(),
                },
            ]
        );
    }

    #[test]
    fn property_with_multiple_children_yields_one_change_each() {
        let xml = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <BinaryState>0</BinaryState>
    <InsightParams>8|1234</InsightParams>
  </e:property>
</e:propertyset>"#;

        let changes = parse_property_set(xml).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].name, "BinaryState");
        assert_eq!(changes[1].name, "InsightParams");
        assert_eq!(changes[1].value, "8|1234");
    }

    #[test]
    fn empty_property_element_becomes_empty_value() {
        let xml = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><BinaryState/></e:property>
</e:propertyset>"#;

        let changes = parse_property_set(xml).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].value, "");
    }

    #[test]
    fn escaped_text_is_unescaped() {
        let xml = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><FriendlyName>Kitchen &amp; Hall</FriendlyName></e:property>
</e:propertyset>"#;

        let changes = parse_property_set(xml).unwrap();
        assert_eq!(changes[0].value, "Kitchen & Hall");
    }

    #[test]
    fn document_without_properties_yields_nothing() {
        let changes = parse_property_set("<root><other>1</other></root>").unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_property_set("<e:propertyset><unclosed").is_err());
    }

    #[test]
    fn binary_state_found_inside_soap_envelope() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:SetBinaryState xmlns:u="urn:Belkin:service:basicevent:1">
      <BinaryState>1</BinaryState>
    </u:SetBinaryState>
  </s:Body>
</s:Envelope>"#;

        assert_eq!(parse_binary_state(xml).unwrap(), Some("1".to_string()));
    }

    #[test]
    fn missing_binary_state_is_none() {
        assert_eq!(parse_binary_state("<root><Other>1</Other></root>").unwrap(), None);
    }
}
