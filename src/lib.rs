#![deny(trivial_casts, trivial_numeric_casts, unused_import_braces)]
//! # MaxMind DB geolocation reader
//!
//! This library reads the MaxMind DB binary format (major version 2),
//! including the GeoIP2 and GeoLite2 databases, and maps IPv4 and IPv6
//! addresses to geographical information.
//!
//! The whole database is loaded into memory up front: the search tree and
//! data sections are copied into owned buffers, so the source file or byte
//! slice can be dropped after construction. Files ending in `.gz` are
//! inflated in memory before parsing.
//!
//! ## Thread safety
//!
//! A [`Database`] is immutable and `Send + Sync`. Create one instance and
//! share it by reference; lookups are read-only and need no locking.
//!
//! ## Quick start
//!
//! ```no_run
//! fn main() -> Result<(), geoip::GeoIpError> {
//!     let db = geoip::Database::open("GeoLite2-City.mmdb.gz")?;
//!
//!     // Addresses may be IPv4/IPv6 literals or CIDRs.
//!     match db.lookup("89.160.20.112")? {
//!         Some(record) => {
//!             if let Some(country) = &record.country {
//!                 println!("{} ({})", country.name, country.code);
//!             }
//!             println!("{}, {}", record.latitude, record.longitude);
//!         }
//!         None => println!("address not in the database"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! When the typed [`Record`] projection is too coarse, the raw decoded
//! value is available too:
//!
//! ```no_run
//! # fn main() -> Result<(), geoip::GeoIpError> {
//! let db = geoip::Database::open("GeoLite2-City.mmdb")?;
//! if let Some(value) = db.lookup_ip_value("89.160.20.112".parse().unwrap())? {
//!     if let Some(map) = value.as_map() {
//!         println!("{:?}", map.keys().collect::<Vec<_>>());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod decoder;
mod error;
mod metadata;
mod reader;
mod record;
mod value;

pub use error::GeoIpError;
pub use metadata::Metadata;
pub use reader::Database;
pub use record::{Name, Place, Record};
pub use value::Value;

#[cfg(test)]
mod testdb;
