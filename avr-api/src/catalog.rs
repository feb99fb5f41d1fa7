//! Input catalogs
//!
//! An [`InputCatalog`] maps raw vendor input codes (`SAT/CBL`, `MPLAY`, ...)
//! to display names. Standard-protocol receivers get a static catalog picked
//! by model family; HEOS receivers report their own rename and delete lists,
//! which [`live_catalog`] turns into a catalog on every configuration apply.

use http_client::xml::{child_elements, element_text};
use serde::{Deserialize, Serialize};
use xmltree::Element;

/// One selectable input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEntry {
    /// Raw vendor input code sent to the receiver
    pub code: String,
    /// Display name
    pub name: String,
    /// Whether the receiver lists the input as in use
    pub visible: bool,
}

/// Ordered mapping of raw input codes to display names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCatalog {
    entries: Vec<InputEntry>,
}

impl InputCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog of visible entries from `(code, name)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut catalog = Self::new();
        for (code, name) in pairs {
            catalog.insert(code, name, true);
        }
        catalog
    }

    /// Insert an entry, replacing an existing entry with the same code in place
    pub fn insert(&mut self, code: impl Into<String>, name: impl Into<String>, visible: bool) {
        let entry = InputEntry {
            code: code.into(),
            name: name.into(),
            visible,
        };
        match self.entries.iter_mut().find(|e| e.code == entry.code) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn entries(&self) -> &[InputEntry] {
        &self.entries
    }

    pub fn get(&self, code: &str) -> Option<&InputEntry> {
        self.entries.iter().find(|e| e.code == code)
    }

    /// Display name for a raw code
    pub fn display_name(&self, code: &str) -> Option<&str> {
        self.get(code).map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const FAMILY_1: &[(&str, &str)] = &[
    ("SAT/CBL", "CBL/SAT"),
    ("DVD", "DVD/Blu-ray"),
    ("BD", "Blu-ray"),
    ("GAME", "Game"),
    ("AUX1", "AUX"),
    ("MPLAY", "Media Player"),
    ("USB/IPOD", "iPod/USB"),
    ("TV", "TV Audio"),
    ("TUNER", "Tuner"),
    ("NETHOME", "Online Music"),
    ("BT", "Bluetooth"),
    ("IRP", "Internet Radio"),
];

const FAMILY_7: &[(&str, &str)] = &[
    ("SAT/CBL", "CBL/SAT"),
    ("DVD", "DVD/Blu-ray"),
    ("GAME", "Game"),
    ("AUX1", "AUX"),
    ("MPLAY", "Media Player"),
    ("USB/IPOD", "iPod/USB"),
    ("TV", "TV Audio"),
    ("TUNER", "Tuner"),
    ("NETHOME", "Online Music"),
    ("BT", "Bluetooth"),
    ("IRP", "Internet Radio"),
    ("CD", "CD"),
];

const FAMILY_2: &[(&str, &str)] = &[
    ("SAT/CBL", "CBL/SAT"),
    ("DVD", "DVD/Blu-ray"),
    ("BD", "Blu-ray"),
    ("GAME", "Game"),
    ("AUX1", "AUX1"),
    ("AUX2", "AUX2"),
    ("MPLAY", "Media Player"),
    ("USB/IPOD", "iPod/USB"),
    ("TV", "TV Audio"),
    ("TUNER", "Tuner"),
    ("NETHOME", "Online Music"),
    ("BT", "Bluetooth"),
    ("IRP", "Internet Radio"),
    ("CD", "CD"),
    ("SERVER", "Media Server"),
];

// Families 4 and 10 share one table.
const FAMILY_10: &[(&str, &str)] = &[
    ("SAT/CBL", "CBL/SAT"),
    ("DVD", "DVD/Blu-ray"),
    ("BD", "Blu-ray"),
    ("GAME", "Game"),
    ("AUX1", "AUX1"),
    ("AUX2", "AUX2"),
    ("MPLAY", "Media Player"),
    ("USB/IPOD", "iPod/USB"),
    ("TV", "TV Audio"),
    ("TUNER", "Tuner"),
    ("NETHOME", "Online Music"),
    ("BT", "Bluetooth"),
    ("IRP", "Internet Radio"),
    ("CD", "CD"),
    ("PHONO", "Phono"),
];

const FAMILY_5: &[(&str, &str)] = &[
    ("SAT/CBL", "CBL/SAT"),
    ("DVD", "DVD/Blu-ray"),
    ("BD", "Blu-ray"),
    ("GAME", "Game"),
    ("AUX1", "AUX1"),
    ("AUX2", "AUX2"),
    ("MPLAY", "Media Player"),
    ("USB/IPOD", "iPod/USB"),
    ("TV", "TV Audio"),
    ("NETHOME", "Online Music"),
    ("BT", "Bluetooth"),
    ("IRP", "Internet Radio"),
    ("CD", "CD"),
    ("PHONO", "Phono"),
];

/// Vendor source names reported by HEOS receivers that differ from the
/// input code the direct-command endpoint expects
const HEOS_SOURCE_ALIASES: &[(&str, &str)] = &[
    ("CBL/SAT", "SAT/CBL"),
    ("BLU-RAY", "BD"),
    ("TV AUDIO", "TV"),
    ("MEDIA PLAYER", "MPLAY"),
    ("BLUETOOTH", "BT"),
];

/// Collapse sibling SKUs onto the family that carries their input table
pub fn canonical_family(model_id: &str) -> String {
    let model_id = model_id.trim();
    match model_id {
        "3" | "8" | "9" => "2".to_string(),
        "6" | "11" | "12" | "13" => "5".to_string(),
        other => other.to_string(),
    }
}

/// Static catalog of a canonical model family, empty for unknown families
pub fn static_catalog(family: &str) -> InputCatalog {
    let table: &[(&str, &str)] = match family {
        "1" => FAMILY_1,
        "2" => FAMILY_2,
        "4" | "10" => FAMILY_10,
        "5" => FAMILY_5,
        "7" => FAMILY_7,
        _ => &[],
    };
    InputCatalog::from_pairs(table.iter().copied())
}

/// Static catalog for a raw `ModelId` as reported by the receiver
pub fn catalog_for_model(model_id: &str) -> InputCatalog {
    static_catalog(&canonical_family(model_id))
}

/// Display name of a raw input code in a model family
pub fn resolve_input(family: &str, code: &str) -> Option<String> {
    static_catalog(family).display_name(code).map(str::to_string)
}

/// Map a HEOS source name to the input code of the direct-command endpoint
pub fn heos_input_code(source_name: &str) -> String {
    let upper = source_name.trim().to_uppercase();
    HEOS_SOURCE_ALIASES
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, code)| code.to_string())
        .unwrap_or(upper)
}

/// Build a catalog from the `GetRenameSource` and `GetDeletedSource`
/// answers of a HEOS receiver.
///
/// Both arguments are the `cmd` element of the respective answer. Sources
/// missing from the delete list stay visible.
pub fn live_catalog(rename: Option<&Element>, delete: Option<&Element>) -> InputCatalog {
    let mut catalog = InputCatalog::new();
    let Some(rename) = rename else {
        return catalog;
    };

    let usage: Vec<(String, String)> = delete
        .and_then(|cmd| cmd.get_child("functiondelete"))
        .map(|list| {
            child_elements(list)
                .filter(|e| e.name == "list")
                .map(|e| (child_text(e, "name"), child_text(e, "use")))
                .collect()
        })
        .unwrap_or_default();

    let Some(sources) = rename.get_child("functionrename") else {
        return catalog;
    };

    for source in child_elements(sources).filter(|e| e.name == "list") {
        let raw_name = child_text(source, "name");
        if raw_name.is_empty() {
            continue;
        }
        let visible = usage
            .iter()
            .find(|(name, _)| *name == raw_name)
            .map(|(_, used)| used == "1")
            .unwrap_or(true);
        let renamed = child_text(source, "rename");
        let display_name = if renamed.is_empty() { raw_name.clone() } else { renamed };

        tracing::debug!(
            "source '{}': '{}' [{}] visible={}",
            raw_name,
            display_name,
            heos_input_code(&raw_name),
            visible
        );
        catalog.insert(heos_input_code(&raw_name), display_name, visible);
    }

    catalog
}

fn child_text(element: &Element, name: &str) -> String {
    element.get_child(name).map(element_text).unwrap_or_default()
}
