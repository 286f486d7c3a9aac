// End-to-End Integration Tests for LogDb
// These tests verify write, reopen and scan flows through the public API

mod common;

use common::*;
use logdb::{Error, Options, DB};
use tempfile::TempDir;

/// Test writing across several flushes, reopening and scanning everything back
#[test]
fn test_e2e_file_roundtrip() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roundtrip.logdb");
    let rows = random_rows(1, 600, 12);

    let flushes = {
        let mut db = DB::open(&path, small_options()).unwrap();
        write_rows(&mut db, &rows[..200], 12).unwrap();
        db.flush().unwrap();
        let mut db_rows = rows[200..].iter();
        for row in db_rows.by_ref().take(150) {
            db.add(|obj| encode_row(obj, row)).unwrap();
        }
        db.flush().unwrap();
        for row in db_rows {
            db.add(|obj| encode_row(obj, row)).unwrap();
        }
        db.flush().unwrap();
        let flushes = db.tx_count();
        db.close().unwrap();
        flushes
    };

    let db = DB::open(&path, small_options()).unwrap();
    assert_eq!(db.object_count(), 600);
    assert_eq!(db.tx_count(), flushes);
    assert_eq!(db.batch_offsets().unwrap().len() as u64, flushes);

    let scanned = scan_rows(&db).unwrap();
    assert_eq!(scanned.len(), rows.len());
    for ((_, got), expected) in scanned.iter().zip(&rows) {
        assert_eq!(got, expected);
    }

    // offsets grow strictly in file order
    assert!(scanned.windows(2).all(|w| w[0].0 < w[1].0));
}

/// Test that transaction count equals the number of non-empty flushes
#[test]
fn test_e2e_tx_count_matches_flushes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tx.logdb");
    let options = Options::new().header_size(4096).max_object_size(1024).max_batch_size(1 << 20);

    {
        let mut db = DB::open(&path, options.clone()).unwrap();
        for round in 0..5u64 {
            for i in 0..10u64 {
                db.add(|obj| obj.add_u64(0, round * 10 + i)).unwrap();
            }
            db.flush().unwrap();
            // empty flush is a no-op
            db.flush().unwrap();
        }
        db.close().unwrap();
    }

    let db = DB::open(&path, options).unwrap();
    assert_eq!(db.tx_count(), 5);
    assert_eq!(db.object_count(), 50);
}

/// Test name table idempotence and persistence
#[test]
fn test_e2e_name_table() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("names.logdb");
    let names = ["timestamp", "station", "temperature", "humidity", "wind"];

    {
        let db = DB::open(&path, small_options()).unwrap();
        for (i, name) in names.iter().enumerate() {
            assert_eq!(db.put_name(name).unwrap() as usize, i);
        }
        for (i, name) in names.iter().enumerate() {
            assert_eq!(db.put_name(name).unwrap() as usize, i);
        }
        db.close().unwrap();
    }

    let db = DB::open(&path, small_options()).unwrap();
    assert_eq!(db.names(), names.to_vec());
    for (i, name) in names.iter().enumerate() {
        assert_eq!(db.index_by_name(name), Some(i as u16));
        assert_eq!(db.name_by_index(i as u16).as_deref(), Some(*name));
    }
    assert_eq!(db.index_by_name("pressure"), None);
    assert_eq!(db.name_by_index(names.len() as u16), None);

    // new names continue after the persisted ones
    assert_eq!(db.put_name("pressure").unwrap(), 5);
}

/// Test that the name table cannot outgrow the reserved header
#[test]
fn test_e2e_name_table_capacity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("full.logdb");
    let options = small_options().header_size(128);
    let db = DB::open(&path, options).unwrap();

    let mut added = 0;
    let err = loop {
        match db.put_name(&format!("a_rather_long_field_name_{}", added)) {
            Ok(_) => added += 1,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, Error::Capacity(_)));
    assert!(added > 0);
    assert_eq!(db.names().len(), added);
    db.close().unwrap();

    let db = DB::open(&path, small_options()).unwrap();
    assert_eq!(db.names().len(), added);
}

/// Test that every offset yielded by a scan reads back the same object
#[test]
fn test_e2e_point_reads_match_scan() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("points.logdb");
    let rows = random_rows(2, 400, 8);

    let mut db = DB::open(&path, small_options()).unwrap();
    write_rows(&mut db, &rows, 8).unwrap();
    db.flush().unwrap();

    let scanned = scan_rows(&db).unwrap();
    assert_eq!(scanned.len(), 400);

    // forwards, then backwards to force page reloads
    for (offset, row) in scanned.iter().chain(scanned.iter().rev()) {
        let got = db.read(*offset, |obj| decode_row(&obj)).unwrap();
        assert_eq!(&got, row);
    }

    let stats = db.cache_stats();
    assert!(stats.hits > 0);
    assert!(stats.misses > 0);
}

/// Test reopening an existing file and appending more data
#[test]
fn test_e2e_reopen_and_append() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("append.logdb");
    let rows = random_rows(3, 300, 4);

    {
        let mut db = DB::open(&path, small_options()).unwrap();
        write_rows(&mut db, &rows[..100], 4).unwrap();
        db.close().unwrap();
    }
    {
        let mut db = DB::open(&path, small_options()).unwrap();
        write_rows(&mut db, &rows[100..], 4).unwrap();
        db.close().unwrap();
    }

    let db = DB::open(&path, small_options()).unwrap();
    assert_eq!(db.object_count(), 300);
    assert_eq!(db.names().len(), 4);
    let scanned: Vec<_> = scan_rows(&db).unwrap().into_iter().map(|(_, row)| row).collect();
    assert_eq!(scanned, rows);
}

/// Test that an existing file keeps the header size it was created with
#[test]
fn test_e2e_stored_header_size_wins() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("header.logdb");

    {
        let mut db = DB::open(&path, small_options().header_size(2048)).unwrap();
        db.add(|obj| obj.add_str(0, "hello")).unwrap();
        db.close().unwrap();
    }

    let db = DB::open(&path, small_options().header_size(8192)).unwrap();
    assert_eq!(db.header_size(), 2048);
    assert_eq!(db.batch_offsets().unwrap(), vec![2048]);

    let rows = scan_rows(&db).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, 2048 + 8);
}

/// Test scanning a database without any data
#[test]
fn test_e2e_empty_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.logdb");
    let db = DB::open(&path, small_options()).unwrap();

    assert!(db.batch_offsets().unwrap().is_empty());
    assert!(scan_rows(&db).unwrap().is_empty());
    db.for_each_p(4, |_, _, _| panic!("no objects expected")).unwrap();
    db.close().unwrap();

    let db = DB::open(&path, small_options()).unwrap();
    assert_eq!(db.object_count(), 0);
    assert_eq!(db.file_size(), 4096);
}

/// Test that a failing visitor stops the scan with its own error
#[test]
fn test_e2e_visitor_error_propagates() {
    let dir = TempDir::new().unwrap();
    let mut db = DB::open(dir.path().join("visit.logdb"), small_options()).unwrap();
    for i in 0..100u32 {
        db.add(|obj| obj.add_u32(0, i)).unwrap();
    }
    db.flush().unwrap();

    let mut visited = 0;
    let err = db
        .for_each(|_, _| {
            visited += 1;
            if visited == 10 {
                return Err(Error::callback("enough"));
            }
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(visited, 10);

    let err = db.read(4096 + 8, |_| -> logdb::Result<()> { Err(Error::callback("no")) });
    assert!(matches!(err, Err(Error::Callback(_))));
}

/// Test the typed helpers against the typed readers
#[test]
fn test_e2e_typed_fields() {
    let dir = TempDir::new().unwrap();
    let mut db = DB::open(dir.path().join("typed.logdb"), small_options()).unwrap();
    let ts = db.put_name("timestamp").unwrap();
    let delta = db.put_name("delta").unwrap();
    let temp = db.put_name("temperature").unwrap();
    let station = db.put_name("station").unwrap();

    for i in 0..50i64 {
        db.add(|obj| {
            obj.add_u64(ts, 1_600_000_000 + i as u64)?;
            obj.add_i16(delta, (i - 25) as i16)?;
            obj.add_f64(temp, i as f64 / 2.0)?;
            obj.add_str(station, &format!("station-{}", i % 3))
        })
        .unwrap();
    }
    db.flush().unwrap();

    let mut i = 0i64;
    db.for_each(|_, obj| {
        assert_eq!(obj.field(ts)?.and_then(|f| f.as_u64()), Some(1_600_000_000 + i as u64));
        assert_eq!(obj.field(delta)?.and_then(|f| f.as_i64()), Some(i - 25));
        assert_eq!(obj.field(temp)?.and_then(|f| f.as_f64()), Some(i as f64 / 2.0));
        let name = obj.field(station)?.ok_or_else(|| Error::internal("missing station"))?;
        assert_eq!(name.as_str()?, format!("station-{}", i % 3));
        i += 1;
        Ok(())
    })
    .unwrap();
    assert_eq!(i, 50);
}

/// Test that an oversized object is rejected without touching the batch
#[test]
fn test_e2e_object_too_large() {
    let dir = TempDir::new().unwrap();
    let mut db = DB::open(dir.path().join("large.logdb"), small_options()).unwrap();

    db.add(|obj| obj.add_u8(0, 1)).unwrap();
    let err = db.add(|obj| obj.add_bytes(1, &[0u8; 2048])).unwrap_err();
    assert!(matches!(err, Error::Capacity(_)));
    db.add(|obj| obj.add_u8(0, 2)).unwrap();
    db.flush().unwrap();

    let rows = scan_rows(&db).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(db.object_count(), 2);
}
