//! Flattening of receiver XML documents
//!
//! Both vendor firmwares answer with a flat document whose interesting
//! children wrap their payload in one or more `<value>` elements:
//!
//! ```xml
//! <item>
//!   <ZonePower><value>ON</value></ZonePower>
//!   <MasterVolume><value>-40.0</value></MasterVolume>
//! </item>
//! ```
//!
//! [`flatten`] turns such a document into a [`FlatFields`] map where the
//! wrapper has been removed, so that callers can read `ZonePower` directly.

use std::collections::BTreeMap;

use xmltree::{Element, XMLNode};

/// Body substring the receivers return when a feature or zone is not
/// available on the queried endpoint.
pub const UNSUPPORTED_MARKER: &str = "Error 403";

/// A flattened field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A single scalar (one `<value>` wrapper or plain text)
    Text(String),
    /// Several `<value>` wrappers under the same field
    List(Vec<String>),
    /// Values keyed by their `index` attribute
    Indexed(BTreeMap<String, String>),
}

impl FieldValue {
    /// Scalar view of the value.
    ///
    /// Lists yield their first entry, indexed maps yield nothing.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text.as_str()),
            FieldValue::List(items) => items.first().map(String::as_str),
            FieldValue::Indexed(_) => None,
        }
    }
}

/// Flattened view of a receiver XML document, keyed by element name
pub type FlatFields = BTreeMap<String, FieldValue>;

/// Returns true when the body carries the "unsupported here" marker
pub fn is_unsupported(body: &str) -> bool {
    body.contains(UNSUPPORTED_MARKER)
}

/// Flatten the direct children of `root`.
///
/// Children wrapping `<value>` elements collapse to their text (or to a
/// list when more than one wrapper is present). Leaf children keep their
/// own text. Children with other nested structure are skipped.
pub fn flatten(root: &Element) -> FlatFields {
    let mut fields = FlatFields::new();

    for child in child_elements(root) {
        let values: Vec<String> = child_elements(child)
            .filter(|e| e.name == "value")
            .map(element_text)
            .collect();

        let flattened = match values.len() {
            0 if child_elements(child).next().is_none() => FieldValue::Text(element_text(child)),
            0 => continue,
            1 => FieldValue::Text(values.into_iter().next().unwrap_or_default()),
            _ => FieldValue::List(values),
        };

        fields.insert(child.name.clone(), flattened);
    }

    fields
}

/// Collect the `<value index="..">` entries of the child named `field`.
///
/// Entries without an `index` attribute are ignored.
pub fn indexed_values(root: &Element, field: &str) -> BTreeMap<String, String> {
    root.get_child(field)
        .map(|list| {
            child_elements(list)
                .filter(|e| e.name == "value")
                .filter_map(|e| {
                    e.attributes
                        .get("index")
                        .map(|index| (index.clone(), element_text(e)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Trimmed text content of an element, empty when it has none
pub fn element_text(element: &Element) -> String {
    element
        .get_text()
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Iterate over the element children of `element`, skipping text and comments
pub fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}
