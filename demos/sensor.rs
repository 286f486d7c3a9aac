//! Sensor log example for LogDb
//!
//! This example demonstrates:
//! - Registering field names
//! - Appending typed rows
//! - Sequential and parallel scans
//! - Point reads by object id
//!
//! Run with `RUST_LOG=debug cargo run --example sensor` to see flushes.

use logdb::{Options, DB};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const STATIONS: [&str; 4] = ["north", "south", "east", "west"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    let path = std::env::temp_dir().join("logdb_sensor_example.logdb");
    if path.exists() {
        std::fs::remove_file(&path)?;
    }

    let options = Options::default()
        .max_batch_size(256 * 1024) // 256KB
        .use_mmap(true);

    // Write one day of readings, one per station per minute
    let mut db = DB::open(&path, options.clone())?;
    let ts = db.put_name("timestamp")?;
    let station = db.put_name("station")?;
    let temperature = db.put_name("temperature")?;
    let humidity = db.put_name("humidity")?;

    for minute in 0..24 * 60u64 {
        for (i, name) in STATIONS.iter().enumerate() {
            db.add(|obj| {
                obj.add_u64(ts, 1_700_000_000 + minute * 60)?;
                obj.add_str(station, name)?;
                obj.add_f32(temperature, 15.0 + (minute % 120) as f32 / 10.0 + i as f32)?;
                obj.add_u8(humidity, 40 + (minute % 30) as u8)
            })?;
        }
    }
    db.close()?;
    println!("Wrote readings to {}", path.display());

    // Reopen and look around
    let db = DB::open(&path, options)?;
    println!(
        "{} objects in {} transactions, fields: {:?}",
        db.object_count(),
        db.tx_count(),
        db.names()
    );

    // Sequential scan: remember where the hottest reading is
    let mut hottest: Option<(u64, f64)> = None;
    db.for_each(|id, obj| {
        if let Some(t) = obj.field(temperature)?.and_then(|f| f.as_f64()) {
            if hottest.map_or(true, |(_, max)| t > max) {
                hottest = Some((id, t));
            }
        }
        Ok(())
    })?;

    // Parallel scan: average humidity per station
    let sums = Mutex::new([0u64; STATIONS.len()]);
    let rows = AtomicU64::new(0);
    db.for_each_p(4, |_, _, obj| {
        let name = match obj.field(station)? {
            Some(field) => field.as_str()?,
            None => return Ok(()),
        };
        let h = obj.field(humidity)?.and_then(|f| f.as_u64()).unwrap_or(0);
        if let Some(i) = STATIONS.iter().position(|s| *s == name) {
            sums.lock().unwrap()[i] += h;
        }
        rows.fetch_add(1, Ordering::Relaxed);
        Ok(())
    })?;

    let per_station = rows.load(Ordering::Relaxed) / STATIONS.len() as u64;
    for (name, sum) in STATIONS.iter().zip(sums.lock().unwrap().iter()) {
        println!("{:>5}: average humidity {:.1}%", name, *sum as f64 / per_station as f64);
    }

    // Point read of the hottest reading
    if let Some((id, t)) = hottest {
        let (when, name) = db.read(id, |obj| {
            let when = obj.field(ts)?.and_then(|f| f.as_u64()).unwrap_or(0);
            let name = match obj.field(station)? {
                Some(field) => field.as_str()?.to_string(),
                None => String::new(),
            };
            Ok((when, name))
        })?;
        println!("Hottest reading: {:.1} at station {} (t={})", t, name, when);
    }

    db.close()?;
    std::fs::remove_file(&path)?;
    Ok(())
}
