//! Database metadata types.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::GeoIpError;
use crate::value::Value;

/// Metadata about a MaxMind DB file.
///
/// The four fields the format requires (`binary_format_major_version`,
/// `ip_version`, `record_size`, `node_count`) are validated at construction;
/// everything else is advisory and defaults when absent. The raw decoded
/// metadata map remains available through [`raw()`](Metadata::raw) for
/// vendor-specific keys.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    /// Major version of the binary format (always 2).
    pub binary_format_major_version: u16,
    /// Minor version of the binary format.
    pub binary_format_minor_version: u16,
    /// Unix timestamp when the database was built.
    pub build_epoch: u64,
    /// Database type (e.g., "GeoIP2-City", "GeoLite2-Country").
    pub database_type: String,
    /// Map of language codes to database descriptions.
    pub description: BTreeMap<String, String>,
    /// IP version supported (4 or 6).
    pub ip_version: u16,
    /// Languages available in the database.
    pub languages: Vec<String>,
    /// Number of nodes in the search tree.
    pub node_count: u32,
    /// Size of each record in bits (24, 28, or 32).
    pub record_size: u16,
    raw: BTreeMap<String, Value>,
}

impl Metadata {
    /// Builds and validates metadata from the decoded metadata map.
    pub(crate) fn from_value(value: Value) -> Result<Metadata, GeoIpError> {
        let Value::Map(raw) = value else {
            return Err(GeoIpError::invalid_database("metadata is not a map"));
        };

        let binary_format_major_version = require_u16(&raw, "binary_format_major_version")?;
        if binary_format_major_version != 2 {
            return Err(GeoIpError::invalid_database(format!(
                "unsupported binary format major version {binary_format_major_version}"
            )));
        }
        let ip_version = require_u16(&raw, "ip_version")?;
        if ip_version != 4 && ip_version != 6 {
            return Err(GeoIpError::invalid_database(format!(
                "invalid IP version {ip_version}"
            )));
        }
        let record_size = require_u16(&raw, "record_size")?;
        if record_size != 24 && record_size != 28 && record_size != 32 {
            return Err(GeoIpError::invalid_database(format!(
                "impossible record width {record_size}"
            )));
        }
        let node_count = raw
            .get("node_count")
            .and_then(Value::as_u32)
            .ok_or_else(|| GeoIpError::invalid_database("node_count not found in metadata"))?;

        let description = raw
            .get("description")
            .and_then(Value::as_map)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_owned())))
                    .collect()
            })
            .unwrap_or_default();
        let languages = raw
            .get("languages")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|v| Some(v.as_str()?.to_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Metadata {
            binary_format_major_version,
            binary_format_minor_version: raw
                .get("binary_format_minor_version")
                .and_then(Value::as_u16)
                .unwrap_or(0),
            build_epoch: raw
                .get("build_epoch")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            database_type: raw
                .get("database_type")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned(),
            description,
            ip_version,
            languages,
            node_count,
            record_size,
            raw,
        })
    }

    /// The decoded metadata map as stored in the file.
    pub fn raw(&self) -> &BTreeMap<String, Value> {
        &self.raw
    }

    /// Returns the database build time.
    ///
    /// Derived from the advisory `build_epoch` key; databases without it
    /// report the Unix epoch.
    #[must_use]
    pub fn build_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.build_epoch)
    }
}

fn require_u16(map: &BTreeMap<String, Value>, key: &str) -> Result<u16, GeoIpError> {
    map.get(key)
        .and_then(Value::as_u16)
        .ok_or_else(|| GeoIpError::invalid_database(format!("{key} not found in metadata")))
}
