use crate::Engine;
use anyhow::Result;
use std::fs;
use std::path::Path;

pub const RUN_A: &[u8] = b"alice-20170101120000";
pub const RUN_B: &[u8] = b"bob-20170202000000";

/// Engine rooted at `dir` with auto-compaction disabled.
pub fn open_engine(dir: &Path, flush_threshold: usize) -> Result<Engine> {
    let mut engine = Engine::new(dir.join("wal.log"), dir.join("sst"), flush_threshold, false)?;
    engine.set_l0_compaction_trigger(0);
    Ok(engine)
}

pub fn count_sst_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "sst")
                .unwrap_or(false)
        })
        .count()
}
