use super::helpers::{count_sst_files, open_engine, RUN_A, RUN_B};
use crate::*;
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

// --------------------- Basic put / get ---------------------

#[test]
fn put_and_get() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"http://a.com".to_vec(), b"one".to_vec())?;
    let (seq, val) = engine.get(RUN_A, b"http://a.com")?.unwrap();
    assert_eq!(seq, 1);
    assert_eq!(val, b"one");
    Ok(())
}

#[test]
fn get_missing_bucket_or_key() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;
    assert!(engine.get(RUN_A, b"http://a.com")?.is_none());

    engine.put(RUN_A.to_vec(), b"http://a.com".to_vec(), b"one".to_vec())?;
    assert!(engine.get(RUN_A, b"http://b.com")?.is_none());
    assert!(engine.get(RUN_B, b"http://a.com")?.is_none());
    Ok(())
}

#[test]
fn overwrite_key() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v1".to_vec())?;
    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v2".to_vec())?;
    let (seq, val) = engine.get(RUN_A, b"k")?.unwrap();
    assert_eq!(seq, 2);
    assert_eq!(val, b"v2");
    assert_eq!(engine.scan_bucket(RUN_A)?.len(), 1);
    Ok(())
}

#[test]
fn buckets_are_independent() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"a".to_vec())?;
    engine.put(RUN_B.to_vec(), b"k".to_vec(), b"b".to_vec())?;
    assert_eq!(engine.get(RUN_A, b"k")?.unwrap().1, b"a");
    assert_eq!(engine.get(RUN_B, b"k")?.unwrap().1, b"b");
    Ok(())
}

// --------------------- Bucket drop ---------------------

#[test]
fn drop_bucket_hides_its_keys() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"k1".to_vec(), b"v".to_vec())?;
    engine.put(RUN_A.to_vec(), b"k2".to_vec(), b"v".to_vec())?;
    engine.put(RUN_B.to_vec(), b"k1".to_vec(), b"v".to_vec())?;

    assert!(engine.drop_bucket(RUN_A)?);
    assert!(engine.get(RUN_A, b"k1")?.is_none());
    assert!(engine.scan_bucket(RUN_A)?.is_empty());
    assert!(!engine.bucket_exists(RUN_A)?);
    assert!(engine.get(RUN_B, b"k1")?.is_some());
    Ok(())
}

#[test]
fn drop_missing_bucket_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    assert!(!engine.drop_bucket(RUN_A)?);
    assert_eq!(engine.seq(), 0);
    assert_eq!(fs::metadata(dir.path().join("wal.log"))?.len(), 0);

    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v".to_vec())?;
    assert!(engine.drop_bucket(RUN_A)?);
    assert!(!engine.drop_bucket(RUN_A)?, "second drop finds nothing");
    assert_eq!(engine.seq(), 2);
    Ok(())
}

#[test]
fn put_after_drop_starts_fresh_bucket() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"old".to_vec(), b"v".to_vec())?;
    engine.drop_bucket(RUN_A)?;
    engine.put(RUN_A.to_vec(), b"new".to_vec(), b"v".to_vec())?;

    assert!(engine.get(RUN_A, b"old")?.is_none());
    assert!(engine.get(RUN_A, b"new")?.is_some());
    assert!(engine.bucket_exists(RUN_A)?);
    Ok(())
}

#[test]
fn drop_marker_in_table_shadows_older_table() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"k1".to_vec(), b"v".to_vec())?;
    engine.force_flush()?;
    engine.drop_bucket(RUN_A)?;
    engine.force_flush()?;
    assert_eq!(engine.l0_sstable_count(), 2, "a lone drop marker still flushes");

    assert!(engine.get(RUN_A, b"k1")?.is_none());
    assert!(!engine.bucket_exists(RUN_A)?);

    engine.put(RUN_A.to_vec(), b"k2".to_vec(), b"v".to_vec())?;
    engine.force_flush()?;
    assert!(engine.get(RUN_A, b"k1")?.is_none());
    assert_eq!(engine.get(RUN_A, b"k2")?.unwrap().1, b"v");
    Ok(())
}

// --------------------- Flush ---------------------

#[test]
fn force_flush_empty_memtable_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;
    engine.force_flush()?;
    assert_eq!(engine.sstable_count(), 0);
    assert_eq!(count_sst_files(&dir.path().join("sst")), 0);
    Ok(())
}

#[test]
fn flush_writes_table_and_truncates_wal() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;

    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v".to_vec())?;
    assert!(fs::metadata(dir.path().join("wal.log"))?.len() > 0);

    engine.force_flush()?;
    assert_eq!(fs::metadata(dir.path().join("wal.log"))?.len(), 0);
    assert_eq!(count_sst_files(&dir.path().join("sst")), 1);
    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(engine.get(RUN_A, b"k")?.unwrap().1, b"v");
    Ok(())
}

#[test]
fn flush_triggers_at_threshold() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 10)?;

    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v".to_vec())?;
    assert_eq!(engine.sstable_count(), 0, "2 bytes is below the threshold");

    engine.put(RUN_A.to_vec(), b"key2".to_vec(), b"value2".to_vec())?;
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.memtable_len(), 0);
    Ok(())
}

#[test]
fn drop_flushes_memtable_to_table() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut engine = open_engine(dir.path(), 1024 * 1024)?;
        engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v".to_vec())?;
    }
    assert_eq!(count_sst_files(&dir.path().join("sst")), 1);
    Ok(())
}

// --------------------- Validation ---------------------

#[test]
fn put_rejects_empty_bucket_and_key() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;
    assert!(engine.put(Vec::new(), b"k".to_vec(), b"v".to_vec()).is_err());
    assert!(engine.put(RUN_A.to_vec(), Vec::new(), b"v".to_vec()).is_err());
    assert!(engine.drop_bucket(b"").is_err());
    assert_eq!(engine.seq(), 0, "rejected writes consume no seq");
    Ok(())
}

#[test]
fn put_rejects_oversized_inputs() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), usize::MAX)?;

    let big_bucket = vec![b'b'; MAX_BUCKET_SIZE + 1];
    assert!(engine.put(big_bucket, b"k".to_vec(), b"v".to_vec()).is_err());

    let big_key = vec![b'k'; MAX_KEY_SIZE + 1];
    let err = engine.put(RUN_A.to_vec(), big_key, b"v".to_vec()).unwrap_err();
    assert!(err.to_string().contains("key too large"));

    let big_value = vec![0u8; MAX_VALUE_SIZE + 1];
    let err = engine.put(RUN_A.to_vec(), b"k".to_vec(), big_value).unwrap_err();
    assert!(err.to_string().contains("value too large"));
    Ok(())
}

#[test]
fn put_accepts_max_key_size() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), usize::MAX)?;
    let key = vec![b'k'; MAX_KEY_SIZE];
    engine.put(RUN_A.to_vec(), key.clone(), b"v".to_vec())?;
    assert!(engine.get(RUN_A, &key)?.is_some());
    Ok(())
}

#[test]
fn seq_increments_on_every_mutation() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path(), 1024 * 1024)?;
    engine.put(RUN_A.to_vec(), b"a".to_vec(), b"1".to_vec())?;
    engine.put(RUN_B.to_vec(), b"b".to_vec(), b"2".to_vec())?;
    engine.drop_bucket(RUN_A)?;
    assert_eq!(engine.seq(), 3);
    Ok(())
}

#[test]
fn open_from_config_uses_its_settings() -> Result<()> {
    let dir = tempdir()?;
    let cfg = config::StoreConfig::new(dir.path().join("data"))
        .flush_threshold(4096)
        .wal_sync(false)
        .l0_compaction_trigger(7);
    let mut engine = Engine::open(&cfg)?;
    assert_eq!(engine.flush_threshold(), 4096);
    assert_eq!(engine.l0_compaction_trigger(), 7);

    engine.put(RUN_A.to_vec(), b"k".to_vec(), b"v".to_vec())?;
    assert!(cfg.wal_path().exists());
    assert!(cfg.sst_dir().is_dir());
    Ok(())
}

// --------------------- Flush failures ---------------------

#[test]
fn failed_threshold_flush_keeps_write_acknowledged() -> Result<()> {
    let dir = tempdir()?;
    let sst_dir = dir.path().join("sst");
    let mut engine = open_engine(dir.path(), 1)?;

    // Table files cannot be created while the directory is a plain file.
    fs::remove_dir_all(&sst_dir)?;
    fs::write(&sst_dir, b"")?;

    engine.put(RUN_A.to_vec(), b"a".to_vec(), b"1".to_vec())?;
    assert_eq!(engine.get(RUN_A, b"a")?, Some((1, b"1".to_vec())));
    assert_eq!(engine.memtable_len(), 1);
    assert_eq!(engine.sstable_count(), 0);

    fs::remove_file(&sst_dir)?;
    fs::create_dir(&sst_dir)?;

    // The next write retries the flush.
    engine.put(RUN_A.to_vec(), b"b".to_vec(), b"2".to_vec())?;
    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.get(RUN_A, b"a")?, Some((1, b"1".to_vec())));
    assert_eq!(engine.get(RUN_A, b"b")?, Some((2, b"2".to_vec())));
    Ok(())
}
