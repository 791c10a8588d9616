//! MaxMind DB loading and IP lookup.

use std::fmt;
use std::fs;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use std::time::SystemTime;

use flate2::read::GzDecoder;
use ipnetwork::IpNetwork;
use log::debug;

use crate::decoder::{be_usize, Decoder};
use crate::error::GeoIpError;
use crate::metadata::Metadata;
use crate::record::Record;
use crate::value::Value;

const METADATA_MARKER: &[u8] = b"\xab\xcd\xefMaxMind.com";

/// The metadata map lives within this many bytes of the end of the file.
const METADATA_WINDOW: usize = 128 * 1024;

/// Size of the data section separator (16 zero bytes).
const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// The 96-bit prefix under which IPv4 addresses live in an IPv6 tree.
const V4_IN_V6_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

/// An in-memory database mapping IP addresses, either IPv4 or IPv6, to
/// geographical information.
///
/// The database is immutable after construction: create one instance and
/// share it by reference among the different parts of your application. All
/// lookup methods are read-only and safe to call from multiple threads
/// concurrently without coordination.
///
/// # Example
///
/// ```no_run
/// fn main() -> Result<(), geoip::GeoIpError> {
///     let db = geoip::Database::open("GeoLite2-City.mmdb")?;
///     if let Some(record) = db.lookup("89.160.20.112")? {
///         println!("{} ({})", record.country_code(), record.time_zone);
///     }
///     Ok(())
/// }
/// ```
pub struct Database {
    tree: Vec<u8>,
    data: Vec<u8>,
    ip_version: u16,
    record_bytes: usize,
    node_bytes: usize,
    node_bytes_even: bool,
    /// Bit position of a 28-bit record's top nibble (`record_bytes * 8`).
    record_shift: u32,
    node_count: usize,
    ipv4_start: usize,
    metadata: Metadata,
}

/// Where a walk through the search tree ended.
enum Terminal {
    /// A record value above `node_count`: points into the data section.
    Data(usize),
    /// The canonical "no data" terminator (`== node_count`).
    Empty,
    /// The address ran out of bits at this (internal) node.
    Exhausted(usize),
}

impl Database {
    /// Opens a database file, loading it fully into memory.
    ///
    /// Files with the `.gz` extension (e.g. `GeoLite2-City.mmdb.gz`) are
    /// inflated in memory before parsing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Database, GeoIpError> {
        let path = path.as_ref();
        let raw = fs::read(path)?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            debug!("inflating gzip-compressed database {}", path.display());
            let mut inflated = Vec::new();
            GzDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?;
            Database::from_bytes(&inflated)
        } else {
            Database::from_bytes(&raw)
        }
    }

    /// Builds a database from raw MMDB bytes.
    ///
    /// The tree and data sections are copied into owned buffers; the input
    /// slice can be dropped afterwards.
    pub fn from_bytes(buf: &[u8]) -> Result<Database, GeoIpError> {
        let metadata_start = find_metadata_start(buf)?;
        let metadata_value = Decoder::new(&buf[metadata_start..], 0).decode()?;
        let metadata = Metadata::from_value(metadata_value)?;

        let node_count = metadata.node_count as usize;
        let record_size = usize::from(metadata.record_size);
        let record_bytes = record_size / 8;
        let node_bytes = record_size * 2 / 8;
        let tree_size = node_bytes * node_count;

        let marker_start = metadata_start - METADATA_MARKER.len();
        let data_start = tree_size + DATA_SECTION_SEPARATOR_SIZE;
        if data_start > marker_start {
            return Err(GeoIpError::invalid_database(
                "file is too small for its search tree",
            ));
        }

        let mut db = Database {
            tree: buf[..tree_size].to_vec(),
            data: buf[data_start..marker_start].to_vec(),
            ip_version: metadata.ip_version,
            record_bytes,
            node_bytes,
            node_bytes_even: node_bytes % 2 == 0,
            record_shift: (record_bytes * 8) as u32,
            node_count,
            ipv4_start: 0,
            metadata,
        };

        if db.ip_version == 6 {
            // The subtree root is cached only when the walk consumes all 96
            // prefix bits and stops at an internal node; any other outcome
            // (including a corrupt tree) leaves IPv4 lookups at the root.
            if let Ok(Terminal::Exhausted(node)) = db.walk(&V4_IN_V6_PREFIX, 0) {
                db.ipv4_start = node;
            }
        }

        debug!(
            "opened {:?} database: {} nodes, {}-bit records, ipv4 subtree at node {}",
            db.metadata.database_type, db.node_count, db.metadata.record_size, db.ipv4_start
        );
        Ok(db)
    }

    /// Returns the IP version the loaded database provides, either 4 or 6.
    pub fn ip_version(&self) -> u16 {
        self.ip_version
    }

    /// Returns the date the loaded database was built, or the Unix epoch if
    /// the metadata does not say.
    pub fn build_time(&self) -> SystemTime {
        self.metadata.build_time()
    }

    /// Returns the database metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the geographical information for the given address, which
    /// may be an IPv4 or IPv6 literal or a CIDR (the network address of a
    /// CIDR is looked up).
    ///
    /// `Ok(None)` means the database holds no data for the address.
    pub fn lookup(&self, address: &str) -> Result<Option<Record>, GeoIpError> {
        self.lookup_ip(parse_address(address)?)
    }

    /// Like [`lookup`](Database::lookup), but takes an already-parsed
    /// address.
    pub fn lookup_ip(&self, address: IpAddr) -> Result<Option<Record>, GeoIpError> {
        match self.lookup_ip_value(address)? {
            Some(value) => Record::from_value(&value).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the raw decoded value stored for the given address.
    ///
    /// The value's shape depends on the database but is usually a map.
    pub fn lookup_ip_value(&self, address: IpAddr) -> Result<Option<Value>, GeoIpError> {
        let (bytes, len, start) = self.query_bytes(address)?;
        match self.walk(&bytes[..len], start)? {
            Terminal::Empty => Ok(None),
            Terminal::Data(record) => self.decode_data_record(record).map(Some),
            Terminal::Exhausted(_) => Err(GeoIpError::invalid_database(
                "search tree is deeper than the address",
            )),
        }
    }

    /// Chooses the byte form of the query address and the starting node.
    fn query_bytes(&self, address: IpAddr) -> Result<([u8; 16], usize, usize), GeoIpError> {
        let v4 = match address {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        };
        let mut bytes = [0u8; 16];
        match v4 {
            Some(v4) if self.ip_version == 4 || self.ipv4_start > 0 => {
                bytes[..4].copy_from_slice(&v4.octets());
                Ok((bytes, 4, self.ipv4_start))
            }
            Some(v4) => {
                // IPv6 database without a cached IPv4 subtree: walk the
                // v4-mapped form from the root.
                bytes.copy_from_slice(&v4.to_ipv6_mapped().octets());
                Ok((bytes, 16, 0))
            }
            None => match address {
                IpAddr::V6(v6) if self.ip_version == 6 => {
                    bytes.copy_from_slice(&v6.octets());
                    Ok((bytes, 16, 0))
                }
                _ => Err(GeoIpError::invalid_input(format!(
                    "address family mismatch: cannot look up IPv6 {address} in an IPv4-only database"
                ))),
            },
        }
    }

    /// Walks the search tree over the address bits, MSB first.
    fn walk(&self, address: &[u8], start: usize) -> Result<Terminal, GeoIpError> {
        let mut node = start;
        for bit_index in 0..address.len() * 8 {
            let byte = address[bit_index >> 3];
            let bit = (byte >> (7 - (bit_index & 7))) & 1;
            let next = self.read_node(node, bit == 1)?;
            if next == self.node_count {
                return Ok(Terminal::Empty);
            }
            if next > self.node_count {
                return Ok(Terminal::Data(next));
            }
            node = next;
        }
        Ok(Terminal::Exhausted(node))
    }

    /// Reads one child record of a node.
    fn read_node(&self, node: usize, right: bool) -> Result<usize, GeoIpError> {
        let offset = node * self.node_bytes;
        let bytes = self
            .tree
            .get(offset..offset + self.node_bytes)
            .ok_or_else(|| {
                GeoIpError::invalid_database(format!("search tree node {node} is out of bounds"))
            })?;
        if self.node_bytes_even {
            // 24- or 32-bit records: two big-endian values side by side.
            let record = if right {
                &bytes[self.record_bytes..]
            } else {
                &bytes[..self.record_bytes]
            };
            return Ok(be_usize(record));
        }
        // 28-bit records: the middle byte carries the top nibble of both
        // children, high nibble left, low nibble right.
        let middle = bytes[self.record_bytes];
        Ok(if right {
            be_usize(&bytes[self.record_bytes + 1..])
                | usize::from(middle & 0x0f) << self.record_shift
        } else {
            be_usize(&bytes[..self.record_bytes]) | usize::from(middle >> 4) << self.record_shift
        })
    }

    /// Resolves a data record from the search tree and decodes the value it
    /// points at.
    fn decode_data_record(&self, record: usize) -> Result<Value, GeoIpError> {
        let offset = (record - self.node_count)
            .checked_sub(DATA_SECTION_SEPARATOR_SIZE)
            .filter(|off| *off < self.data.len())
            .ok_or_else(|| {
                GeoIpError::invalid_database(format!(
                    "data record {record} resolves outside the data section"
                ))
            })?;
        Decoder::new(&self.data, offset).decode()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("ip_version", &self.ip_version)
            .field("node_count", &self.node_count)
            .field("record_size", &self.metadata.record_size)
            .field("database_type", &self.metadata.database_type)
            .finish_non_exhaustive()
    }
}

fn find_metadata_start(buf: &[u8]) -> Result<usize, GeoIpError> {
    let window_start = buf.len().saturating_sub(METADATA_WINDOW);
    memchr::memmem::rfind(&buf[window_start..], METADATA_MARKER)
        .map(|p| window_start + p + METADATA_MARKER.len())
        .ok_or_else(|| {
            GeoIpError::invalid_database("could not find the metadata marker; is this an MMDB file?")
        })
}

fn parse_address(address: &str) -> Result<IpAddr, GeoIpError> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }
    // A CIDR resolves to its network address.
    address
        .parse::<IpNetwork>()
        .map(|network| network.network())
        .map_err(|_| {
            GeoIpError::invalid_input(format!(
                "{address:?} is not a valid IPv4 or IPv6 address or CIDR"
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn synthetic_db(record_size: u16, tree: Vec<u8>, node_count: usize) -> Database {
        let metadata = Metadata::from_value(Value::Map(BTreeMap::from([
            (
                "binary_format_major_version".to_owned(),
                Value::Uint16(2),
            ),
            ("ip_version".to_owned(), Value::Uint16(4)),
            ("record_size".to_owned(), Value::Uint16(record_size)),
            ("node_count".to_owned(), Value::Uint32(node_count as u32)),
        ])))
        .unwrap();
        let record_bytes = usize::from(record_size) / 8;
        let node_bytes = usize::from(record_size) * 2 / 8;
        Database {
            tree,
            data: Vec::new(),
            ip_version: 4,
            record_bytes,
            node_bytes,
            node_bytes_even: node_bytes % 2 == 0,
            record_shift: (record_bytes as u32) * 8,
            node_count,
            ipv4_start: 0,
            metadata,
        }
    }

    #[test]
    fn test_node_decoding_parity() {
        // 24-bit records: plain concatenation.
        let db = synthetic_db(24, vec![0x00, 0x00, 0x2a, 0x00, 0x01, 0x00], 1);
        assert_eq!(db.read_node(0, false).unwrap(), 42);
        assert_eq!(db.read_node(0, true).unwrap(), 256);

        // 28-bit records: middle byte holds both top nibbles.
        let db = synthetic_db(28, vec![0x23, 0x45, 0x67, 0x18, 0x9a, 0xbc, 0xde], 1);
        assert_eq!(db.read_node(0, false).unwrap(), 0x0123_4567);
        assert_eq!(db.read_node(0, true).unwrap(), 0x089a_bcde);

        // 32-bit records.
        let db = synthetic_db(
            32,
            vec![0x00, 0x00, 0x00, 0x2a, 0x80, 0x00, 0x01, 0x00],
            1,
        );
        assert_eq!(db.read_node(0, false).unwrap(), 42);
        assert_eq!(db.read_node(0, true).unwrap(), 0x8000_0100);
    }

    #[test]
    fn test_node_out_of_bounds() {
        let db = synthetic_db(24, vec![0u8; 6], 1);
        assert!(db.read_node(1, false).is_err());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("1.2.3.4").unwrap(),
            "1.2.3.4".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            parse_address("1.2.3.4/24").unwrap(),
            "1.2.3.0".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            parse_address("2001:db8::1").unwrap(),
            "2001:db8::1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            parse_address("2001:db8::1/32").unwrap(),
            "2001:db8::".parse::<IpAddr>().unwrap()
        );
        assert!(matches!(
            parse_address("not an address"),
            Err(GeoIpError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_find_metadata_start() {
        let mut buf = vec![0u8; 64];
        buf.extend_from_slice(METADATA_MARKER);
        buf.push(0xe0); // empty map
        assert_eq!(find_metadata_start(&buf).unwrap(), 64 + METADATA_MARKER.len());
        assert!(find_metadata_start(b"not a database").is_err());
    }

    #[test]
    fn test_find_metadata_start_uses_last_marker() {
        let mut buf = Vec::new();
        buf.extend_from_slice(METADATA_MARKER);
        buf.extend_from_slice(&[0u8; 32]);
        buf.extend_from_slice(METADATA_MARKER);
        buf.push(0xe0);
        assert_eq!(
            find_metadata_start(&buf).unwrap(),
            buf.len() - 1
        );
    }
}
