use super::helpers::{open_engine, RUN_A, RUN_B};
use anyhow::Result;
use tempfile::tempdir;

fn kv(k: &str, v: &str) -> (Vec<u8>, Vec<u8>) {
    (k.as_bytes().to_vec(), v.as_bytes().to_vec())
}

#[test]
fn scan_bucket_returns_sorted_pairs() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"c".to_vec(), b"3".to_vec())?;
    engine.put(RUN_A.to_vec(), b"a".to_vec(), b"1".to_vec())?;
    engine.put(RUN_A.to_vec(), b"b".to_vec(), b"2".to_vec())?;
    engine.put(RUN_B.to_vec(), b"z".to_vec(), b"9".to_vec())?;

    assert_eq!(
        engine.scan_bucket(RUN_A)?,
        vec![kv("a", "1"), kv("b", "2"), kv("c", "3")]
    );
    assert_eq!(engine.scan_bucket(RUN_B)?, vec![kv("z", "9")]);
    assert!(engine.scan_bucket(b"nobody-20170101000000")?.is_empty());
    Ok(())
}

#[test]
fn scan_merges_memtable_and_tables_newest_wins() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"a".to_vec(), b"old".to_vec())?;
    engine.put(RUN_A.to_vec(), b"b".to_vec(), b"table".to_vec())?;
    engine.force_flush()?;
    engine.put(RUN_A.to_vec(), b"a".to_vec(), b"mid".to_vec())?;
    engine.force_flush()?;
    engine.put(RUN_A.to_vec(), b"a".to_vec(), b"new".to_vec())?;
    engine.put(RUN_A.to_vec(), b"c".to_vec(), b"mem".to_vec())?;

    assert_eq!(
        engine.scan_bucket(RUN_A)?,
        vec![kv("a", "new"), kv("b", "table"), kv("c", "mem")]
    );
    Ok(())
}

#[test]
fn scan_stops_at_drop_marker() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"gone".to_vec(), b"x".to_vec())?;
    engine.force_flush()?;
    engine.drop_bucket(RUN_A)?;
    engine.put(RUN_A.to_vec(), b"kept".to_vec(), b"y".to_vec())?;
    engine.force_flush()?;
    engine.put(RUN_A.to_vec(), b"fresh".to_vec(), b"z".to_vec())?;

    assert_eq!(
        engine.scan_bucket(RUN_A)?,
        vec![kv("fresh", "z"), kv("kept", "y")]
    );
    Ok(())
}

#[test]
fn scan_stops_at_memtable_drop_marker() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"gone".to_vec(), b"x".to_vec())?;
    engine.force_flush()?;
    engine.drop_bucket(RUN_A)?;
    assert!(engine.scan_bucket(RUN_A)?.is_empty());

    engine.put(RUN_A.to_vec(), b"kept".to_vec(), b"y".to_vec())?;
    assert_eq!(engine.scan_bucket(RUN_A)?, vec![kv("kept", "y")]);
    Ok(())
}

#[test]
fn buckets_lists_live_buckets_only() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;
    assert!(engine.buckets()?.is_empty());

    engine.put(RUN_B.to_vec(), b"k".to_vec(), b"v".to_vec())?;
    engine.force_flush()?;
    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v".to_vec())?;
    engine.put(b"carol-20170303000000".to_vec(), b"k".to_vec(), b"v".to_vec())?;
    engine.drop_bucket(b"carol-20170303000000")?;

    assert_eq!(engine.buckets()?, vec![RUN_A.to_vec(), RUN_B.to_vec()]);

    engine.drop_bucket(RUN_B)?;
    engine.force_flush()?;
    assert_eq!(engine.buckets()?, vec![RUN_A.to_vec()]);
    Ok(())
}

#[test]
fn read_path_prefers_l0_over_l1() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v1".to_vec())?;
    engine.force_flush()?;
    engine.put(RUN_A.to_vec(), b"other".to_vec(), b"x".to_vec())?;
    engine.force_flush()?;
    engine.compact()?;
    assert_eq!(engine.l1_sstable_count(), 1);

    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v2".to_vec())?;
    engine.force_flush()?;
    assert_eq!(engine.l0_sstable_count(), 1);

    assert_eq!(engine.get(RUN_A, b"k")?.unwrap().1, b"v2");
    Ok(())
}

#[test]
fn table_corruption_surfaces_as_error() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;
    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"precious".to_vec())?;
    engine.force_flush()?;
    drop(engine);

    let sst_dir = dir.path().join("sst");
    let table = std::fs::read_dir(&sst_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().map(|e| e == "sst").unwrap_or(false))
        .expect("one table");
    let mut bytes = std::fs::read(&table)?;
    let pos = bytes
        .windows(8)
        .position(|w| w == b"precious")
        .expect("value bytes present");
    bytes[pos] ^= 0xff;
    std::fs::write(&table, &bytes)?;

    let engine = open_engine(dir.path(), 1024 * 1024)?;
    assert!(engine.get(RUN_A, b"k").is_err());
    assert!(engine.scan_bucket(RUN_A).is_err());
    Ok(())
}
