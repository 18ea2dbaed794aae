//! Device records tracked by the registry

use serde::{Deserialize, Serialize};

use crate::Address;

/// Unique hardware identifier reported by a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Udid(pub String);

impl Udid {
    pub fn new(udid: impl Into<String>) -> Self {
        Self(udid.into())
    }

    /// Render raw identifier bytes as lowercase hex
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Raw identifier bytes, if the identifier is a hex string
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        hex::decode(&self.0).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Udid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instrument family derived from a device type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Single-photon detector driver (CU4SDM0, CU4SDM1)
    Sspd,
    /// Temperature controller (CU4TDM0, CU4TDM1)
    Temperature,
    /// Heater (CU4HTM)
    Heater,
    #[default]
    Unknown,
}

impl DeviceKind {
    /// Classify a type tag. Tags may carry suffixes, so this is a substring match.
    pub fn from_type_tag(tag: &str) -> Self {
        if tag.contains("CU4SDM0") || tag.contains("CU4SDM1") {
            Self::Sspd
        } else if tag.contains("CU4TDM0") || tag.contains("CU4TDM1") {
            Self::Temperature
        } else if tag.contains("CU4HTM") {
            Self::Heater
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sspd => "sspd",
            Self::Temperature => "temperature",
            Self::Heater => "heater",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Identity and version profile of one addressed device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Bus address
    pub address: Address,
    /// Unique hardware identifier
    pub udid: Udid,
    /// Type tag (e.g. "CU4SDM1")
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub hardware_version: String,
    #[serde(default)]
    pub firmware_version: String,
    #[serde(default)]
    pub modification_version: String,
    #[serde(default)]
    pub description: String,
}

impl DeviceInfo {
    /// Create a record with only the fields needed for startup verification
    pub fn new(address: Address, udid: Udid, device_type: impl Into<String>) -> Self {
        Self {
            address,
            udid,
            device_type: device_type.into(),
            ..Default::default()
        }
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::from_type_tag(&self.device_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udid_from_bytes() {
        let udid = Udid::from_bytes(&[0x12, 0x34, 0xab, 0x0f]);
        assert_eq!(udid.as_str(), "1234ab0f");
        assert_eq!(udid.to_bytes(), Some(vec![0x12, 0x34, 0xab, 0x0f]));
        assert_eq!(Udid::new("xyz").to_bytes(), None);
    }

    #[test]
    fn test_udid_hex_decoding() {
        assert_eq!(Udid::new("0A0b").to_bytes(), Some(vec![0x0a, 0x0b]));
        assert_eq!(Udid::new("abc").to_bytes(), None);
        assert_eq!(Udid::new("").to_bytes(), Some(Vec::new()));
        assert_eq!(Udid::from_bytes(&[]).as_str(), "");
    }

    #[test]
    fn test_unknown_is_default_kind() {
        assert_eq!(DeviceKind::default(), DeviceKind::Unknown);
        assert_eq!(DeviceInfo::default().kind(), DeviceKind::Unknown);
    }

    #[test]
    fn test_kind_from_type_tag() {
        assert_eq!(DeviceKind::from_type_tag("CU4SDM0"), DeviceKind::Sspd);
        assert_eq!(DeviceKind::from_type_tag("CU4SDM1V2"), DeviceKind::Sspd);
        assert_eq!(DeviceKind::from_type_tag("CU4TDM1"), DeviceKind::Temperature);
        assert_eq!(DeviceKind::from_type_tag("CU4HTM0"), DeviceKind::Heater);
        assert_eq!(DeviceKind::from_type_tag("None"), DeviceKind::Unknown);
    }

    #[test]
    fn test_device_record_schema() {
        let record = r#"
            address = 12
            udid = "00112233"
            type = "CU4TDM0"
            hardware_version = "1.0"
            firmware_version = "2.3"
            modification_version = "M0"
            description = "Cryostat temperature"
        "#;
        let info: DeviceInfo = toml::from_str(record).unwrap();
        assert_eq!(info.address, 12);
        assert_eq!(info.udid, Udid::new("00112233"));
        assert_eq!(info.kind(), DeviceKind::Temperature);
        assert_eq!(info.description, "Cryostat temperature");
    }
}
