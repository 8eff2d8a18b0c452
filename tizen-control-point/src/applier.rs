//! Event applier: change documents and their effect on a service's state table.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{ControlPointError, Result};
use crate::model::Service;

/// The `(variable, value)` pairs carried by one GENA property set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDocument {
    properties: Vec<(String, String)>,
}

impl ChangeDocument {
    /// Parse a `<e:propertyset>` document.
    ///
    /// Each direct child of a `property` element becomes one pair, matched by
    /// local name so the namespace prefix does not matter.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut properties = Vec::new();
        let mut depth = 0usize;
        let mut property_depth: Option<usize> = None;
        let mut current: Option<(String, String)> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                ControlPointError::InvalidChangeDocument(format!(
                    "at position {}: {e}",
                    reader.buffer_position()
                ))
            })?;

            match event {
                Event::Start(e) => {
                    depth += 1;
                    let name = local_name(e.local_name().as_ref())?;
                    match property_depth {
                        None if name == "property" => property_depth = Some(depth),
                        Some(p) if depth == p + 1 => current = Some((name, String::new())),
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    if property_depth == Some(depth) {
                        properties.push((local_name(e.local_name().as_ref())?, String::new()));
                    }
                }
                Event::Text(t) => {
                    if let (Some((_, value)), Some(p)) = (current.as_mut(), property_depth) {
                        if depth == p + 1 {
                            let text = t.unescape().map_err(|e| {
                                ControlPointError::InvalidChangeDocument(e.to_string())
                            })?;
                            value.push_str(&text);
                        }
                    }
                }
                Event::CData(c) => {
                    if let (Some((_, value)), Some(p)) = (current.as_mut(), property_depth) {
                        if depth == p + 1 {
                            value.push_str(&String::from_utf8_lossy(&c.into_inner()));
                        }
                    }
                }
                Event::End(_) => {
                    if let Some(p) = property_depth {
                        if depth == p + 1 {
                            if let Some(pair) = current.take() {
                                properties.push(pair);
                            }
                        } else if depth == p {
                            property_depth = None;
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self { properties })
    }

    /// Build a document from pairs directly
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `name`; the last occurrence wins
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

fn local_name(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| ControlPointError::InvalidChangeDocument(e.to_string()))
}

/// Apply a change document to a service's state table.
///
/// Only declared variables that appear with a non-empty value are
/// overwritten; everything else keeps its previous value.
///
/// # Returns
///
/// The `(variable, new value)` pairs that were written, in slot order.
pub fn apply_changes(service: &mut Service, changes: &ChangeDocument) -> Vec<(&'static str, String)> {
    let mut applied = Vec::new();
    for (slot, name) in service.kind.variables().iter().enumerate() {
        let Some(value) = changes.get(name).filter(|v| !v.is_empty()) else {
            continue;
        };
        if let Some(stored) = service.variables.get_mut(slot) {
            stored.clear();
            stored.push_str(value);
            applied.push((*name, value.to_string()));
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceKind;
    use rstest::rstest;

    const PROPERTY_SET: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><Power>1</Power></e:property>
  <e:property><Volume>12</Volume></e:property>
  <e:property><Channel/></e:property>
</e:propertyset>"#;

    #[test]
    fn test_parse_property_set() {
        let doc = ChangeDocument::parse(PROPERTY_SET).unwrap();
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.get("Power"), Some("1"));
        assert_eq!(doc.get("Volume"), Some("12"));
        assert_eq!(doc.get("Channel"), Some(""));
        assert_eq!(doc.get("Tint"), None);
    }

    #[test]
    fn test_parse_unescapes_and_keeps_last() {
        let xml = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><Text>Fish &amp; Chips</Text></e:property>
  <e:property><Text><![CDATA[<b>late</b>]]></Text></e:property>
</e:propertyset>"#;

        let doc = ChangeDocument::parse(xml).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.iter().next(), Some(("Text", "Fish & Chips")));
        assert_eq!(doc.get("Text"), Some("<b>late</b>"));
    }

    #[test]
    fn test_parse_ignores_elements_outside_property() {
        let xml = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <Power>0</Power>
  <e:property><Volume>3</Volume></e:property>
</e:propertyset>"#;
        let doc = ChangeDocument::parse(xml).unwrap();
        assert_eq!(doc.get("Power"), None);
        assert_eq!(doc.get("Volume"), Some("3"));
    }

    #[rstest]
    #[case::mismatched("<e:propertyset><e:property><Power>1</Volume></e:property></e:propertyset>")]
    #[case::bad_entity("<e:propertyset><e:property><Power>&nope;</Power></e:property></e:propertyset>")]
    fn test_parse_rejects_malformed(#[case] xml: &str) {
        assert!(matches!(
            ChangeDocument::parse(xml),
            Err(ControlPointError::InvalidChangeDocument(_))
        ));
    }

    #[test]
    fn test_partial_update_preserves_untouched_variables() {
        let mut service = Service::unresolved(ServiceKind::Control);
        service.set_variable("Power", "On");
        service.set_variable("Volume", "5");

        let applied = apply_changes(&mut service, &ChangeDocument::from_pairs([("Volume", "9")]));

        assert_eq!(applied, vec![("Volume", "9".to_string())]);
        assert_eq!(service.variable("Power"), Some("On"));
        assert_eq!(service.variable("Volume"), Some("9"));
        assert_eq!(service.variable("Channel"), Some(""));
    }

    #[test]
    fn test_empty_and_undeclared_values_are_skipped() {
        let mut service = Service::unresolved(ServiceKind::Picture);
        service.set_variable("Tint", "4");

        let changes = ChangeDocument::from_pairs([("Tint", ""), ("Volume", "3"), ("Color", "8")]);
        let applied = apply_changes(&mut service, &changes);

        assert_eq!(applied, vec![("Color", "8".to_string())]);
        assert_eq!(service.variable("Tint"), Some("4"));
    }
}
