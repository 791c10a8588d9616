//! Reads log lines from stdin, extracts the first IP-shaped substring from
//! each and prints where the address is located.
//!
//! ```text
//! zcat -f /var/log/nginx/access.log.* | cargo run --example scanlog -- GeoLite2-City.mmdb
//! ```

use std::io::BufRead;

use geoip::Database;
use regex::Regex;

const IP_PATTERN: &str = "((((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?))|((?:[A-F0-9]{1,4}:){7}[A-F0-9]{1,4}))";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let db_path = std::env::args()
        .nth(1)
        .ok_or("First argument must be the path to the IP database")?;
    let db = Database::open(db_path)?;
    let ip_re = Regex::new(IP_PATTERN)?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let Some(ip) = ip_re.find(&line) else { continue };
        match db.lookup(ip.as_str()) {
            Ok(Some(record)) => {
                let country = record
                    .country
                    .as_ref()
                    .map(|c| c.name.to_string())
                    .unwrap_or_default();
                let city = record
                    .city
                    .as_ref()
                    .map(|c| c.name.to_string())
                    .unwrap_or_default();
                println!(
                    "{}\t{country}\t{city}\t{}\t{}",
                    ip.as_str(),
                    record.latitude,
                    record.longitude
                );
            }
            // Addresses the database does not cover are skipped.
            Ok(None) => {}
            Err(err) => eprintln!("{}: {err}", ip.as_str()),
        }
    }
    Ok(())
}
