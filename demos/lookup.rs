use geoip::Database;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .ok_or("First argument must be the path to the IP database")?;
    let db = Database::open(db_path)?;

    let address = args
        .next()
        .ok_or("Second argument must be the IP address, like 128.101.101.101")?;

    match db.lookup(&address)? {
        Some(record) => println!("Record for IP {address}: {record:#?}"),
        None => println!("No data found for IP {address}"),
    }
    Ok(())
}
