// Compression Tests for LogDb
// These tests verify LZ4 compressed stores against plain ones

#![cfg(feature = "lz4-compression")]

mod common;

use common::*;
use logdb::{CompressionType, Error, Options, DB};
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

fn lz4_options() -> Options {
    small_options().compression(CompressionType::Lz4)
}

fn write_store(path: &Path, options: Options, rows: &[Row]) {
    let mut db = DB::open(path, options).unwrap();
    write_rows(&mut db, rows, 8).unwrap();
    db.close().unwrap();
}

fn contents(db: &DB) -> Vec<Row> {
    scan_rows(db).unwrap().into_iter().map(|(_, row)| row).collect()
}

/// Test that a compressed store holds the same rows as a plain one
#[test]
fn test_compressed_matches_plain() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let rows = random_rows(20, 1_500, 8);
    let plain = dir.path().join("plain.logdb");
    let packed = dir.path().join("packed.logdb");
    write_store(&plain, small_options(), &rows);
    write_store(&packed, lz4_options(), &rows);

    let plain = DB::open(&plain, small_options()).unwrap();
    let packed = DB::open(&packed, lz4_options()).unwrap();
    assert_eq!(packed.object_count(), plain.object_count());
    assert_eq!(packed.tx_count(), plain.tx_count());
    assert_eq!(packed.batch_offsets().unwrap().len(), plain.batch_offsets().unwrap().len());
    assert_eq!(contents(&plain), rows);
    assert_eq!(contents(&packed), rows);
}

/// Test that object ids of a compressed store point inside decompressed batches
#[test]
fn test_compressed_ids() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ids.logdb");
    let rows = random_rows(21, 600, 8);
    write_store(&path, lz4_options(), &rows);

    let db = DB::open(&path, lz4_options()).unwrap();
    let offsets = db.batch_offsets().unwrap();
    let ids: Vec<u64> = scan_rows(&db).unwrap().into_iter().map(|(id, _)| id).collect();

    // batch offset in the high bits, position behind the record header below
    assert!(offsets.len() > 1);
    assert_eq!(ids[0], (offsets[0] << 26) + 8);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    // the first id of every batch is above all ids of the batch before
    let firsts: Vec<u64> = offsets.iter().map(|off| (off << 26) + 8).collect();
    for first in &firsts {
        assert!(ids.contains(first), "no object at id {}", first);
    }
    assert!(ids.iter().all(|id| *id >> 26 >= offsets[0] && *id >> 26 < db.file_size()));
}

/// Test that compressed ids stay distinct when batches compress well
#[test]
fn test_compressed_ids_are_unique() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("unique.logdb");
    {
        // repetitive rows compress far below the raw batch size
        let mut db = DB::open(&path, lz4_options()).unwrap();
        for i in 0..2_000u32 {
            db.add(|obj| {
                obj.add_str(0, "the same station name over and over")?;
                obj.add_u32(1, i % 4)
            })
            .unwrap();
        }
        db.close().unwrap();
    }

    let db = DB::open(&path, lz4_options()).unwrap();
    let ids: Vec<u64> = scan_rows(&db).unwrap().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids.len(), 2_000);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

/// Test parallel and mapped scans over a compressed store
#[test]
fn test_compressed_parallel_and_mmap() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("parallel.logdb");
    let rows = random_rows(22, 2_000, 8);
    write_store(&path, lz4_options(), &rows);

    let reference = scan_rows(&DB::open(&path, lz4_options()).unwrap()).unwrap();
    assert_eq!(reference.len(), rows.len());

    for use_mmap in [false, true] {
        let db = DB::open(&path, lz4_options().use_mmap(use_mmap)).unwrap();
        assert_eq!(scan_rows(&db).unwrap(), reference);

        for concurrency in [1, 2, 5] {
            let seen = Mutex::new(Vec::new());
            db.for_each_p(concurrency, |_, id, obj| {
                let row = decode_row(&obj)?;
                seen.lock().unwrap().push((id, row));
                Ok(())
            })
            .unwrap();
            let mut seen = seen.into_inner().unwrap();
            seen.sort_by_key(|(id, _)| *id);
            assert_eq!(seen, reference);
        }
    }
}

/// Test point reads by id on a compressed store
#[test]
fn test_compressed_point_reads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("point.logdb");
    let rows = random_rows(23, 800, 8);
    write_store(&path, lz4_options(), &rows);

    for use_mmap in [false, true] {
        let db = DB::open(&path, lz4_options().use_mmap(use_mmap)).unwrap();
        let scanned = scan_rows(&db).unwrap();
        assert_eq!(scanned.len(), rows.len());

        for (id, row) in &scanned {
            assert_eq!(&db.read(*id, |obj| decode_row(&obj)).unwrap(), row);
        }
        // out of order, so batches are decompressed again
        for (id, row) in scanned.iter().rev().step_by(7) {
            assert_eq!(&db.read(*id, |obj| decode_row(&obj)).unwrap(), row);
        }
    }
}

/// Test that ids outside of the compressed batches are rejected
#[test]
fn test_compressed_point_read_bad_ids() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad_ids.logdb");
    write_store(&path, lz4_options(), &random_rows(24, 10, 8));

    let db = DB::open(&path, lz4_options()).unwrap();
    let offsets = db.batch_offsets().unwrap();
    let (id, _) = scan_rows(&db).unwrap().remove(0);
    assert_eq!(id >> 26, offsets[0]);

    let bad = [
        // inside the record header
        offsets[0] << 26,
        // past the end of the decompressed batch
        (offsets[0] << 26) + (1 << 26) - 1,
        // batch offsets inside the header and past the end of the file
        8,
        db.file_size() << 26,
        u64::MAX,
    ];
    for id in bad {
        let err = db.read(id, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "id {}: {:?}", id, err);
    }
}

/// Test that repetitive rows take less space when compressed
#[test]
fn test_compressed_store_is_smaller() {
    let dir = TempDir::new().unwrap();
    let plain = dir.path().join("plain.logdb");
    let packed = dir.path().join("packed.logdb");

    for (path, options) in [(&plain, small_options()), (&packed, lz4_options())] {
        let mut db = DB::open(path, options).unwrap();
        let station = db.put_name("station").unwrap();
        let reading = db.put_name("reading").unwrap();
        for i in 0..5_000u32 {
            db.add(|obj| {
                obj.add_str(station, "weather-station-north-field")?;
                obj.add_u32(reading, i % 16)
            })
            .unwrap();
        }
        db.close().unwrap();
    }

    let plain_len = std::fs::metadata(&plain).unwrap().len();
    let packed_len = std::fs::metadata(&packed).unwrap().len();
    assert!(packed_len < plain_len / 2, "{} vs {}", packed_len, plain_len);

    let db = DB::open(&packed, lz4_options()).unwrap();
    let mut count = 0u32;
    db.for_each(|_, obj| {
        assert_eq!(obj.field(1)?.and_then(|f| f.as_u64()), Some(u64::from(count % 16)));
        count += 1;
        Ok(())
    })
    .unwrap();
    assert_eq!(count, 5_000);
}
