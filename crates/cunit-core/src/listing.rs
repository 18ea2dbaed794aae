//! Device listing announced to presentation clients
//!
//! Format: `DevCount: <n>\r\n` followed by one
//! `;<br>Dev<index>: address=<n>: type=<tag>\r\n` entry per device.

use crate::device::DeviceInfo;
use crate::Address;

/// One device line of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub index: usize,
    pub address: Address,
    pub type_tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceListing {
    pub entries: Vec<ListingEntry>,
}

impl DeviceListing {
    pub fn from_devices(devices: &[DeviceInfo]) -> Self {
        let entries = devices
            .iter()
            .enumerate()
            .map(|(index, info)| ListingEntry {
                index,
                address: info.address,
                type_tag: info.device_type.clone(),
            })
            .collect();
        Self { entries }
    }

    /// Parse a listing produced by [`DeviceListing::render`].
    ///
    /// Segments that do not look like a device entry (the count header,
    /// malformed lines) are skipped.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();

        for segment in text.split("<br>") {
            let fields: Vec<&str> = segment.split(':').collect();
            if fields.len() != 3 {
                continue;
            }

            let index = fields[0]
                .trim()
                .strip_prefix("Dev")
                .and_then(|i| i.parse::<usize>().ok());
            let address = value_of(fields[1]).and_then(|a| a.parse::<Address>().ok());
            let type_tag = value_of(fields[2]);

            if let (Some(index), Some(address), Some(type_tag)) = (index, address, type_tag) {
                entries.push(ListingEntry {
                    index,
                    address,
                    type_tag: type_tag.to_string(),
                });
            }
        }

        Self { entries }
    }

    pub fn render(&self) -> String {
        let mut out = format!("DevCount: {}\r\n", self.entries.len());
        for entry in &self.entries {
            out.push_str(";<br>");
            out.push_str(&format!(
                "Dev{}: address={}: type={}\r\n",
                entry.index, entry.address, entry.type_tag
            ));
        }
        out
    }
}

impl std::fmt::Display for DeviceListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Value of a `key=value` field, trimmed of whitespace and entry separators
fn value_of(field: &str) -> Option<&str> {
    field
        .split_once('=')
        .map(|(_, v)| v.trim_matches(|c: char| c.is_whitespace() || c == ';'))
        .filter(|v| !v.is_empty())
}
