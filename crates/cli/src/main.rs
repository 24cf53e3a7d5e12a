//! # CLI - ResultStore interactive shell
//!
//! A REPL over [`ResultStore`]: reads one command per line from stdin and
//! prints results to stdout. Usable interactively or scripted through a pipe.
//! Logs go to stderr, filtered by `RUST_LOG`.
//!
//! ## Commands
//!
//! ```text
//! PUT <record-json>                 Store a record (run and url come from the JSON)
//! GET <run> <url>                   Print the record as JSON, or "(nil)"
//! RUNS                              List run ids in the durable table
//! RANGE <run> <start> <end>         Cached records [start, end)
//! FILTER <run> <start> <min> <max>  One page of records with min <= diff% <= max
//! SORT <run> <field> <order>        Reorder the cached run
//! URLS <run>                        Normalized URL list
//! STATS <run>                       Counts and diff histogram
//! REMOVE <run>                      Delete a run
//! FLUSH                             Write buffered records to a table file
//! COMPACT                           Merge all table files
//! INFO                              Print store debug info
//! EXIT / QUIT                       Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! ```text
//! RESULTSTORE_CONFIG     JSON config file, read first
//! RESULTSTORE_DATA_DIR   Data directory             (default: "data")
//! RESULTSTORE_FLUSH_KB   Flush threshold in KiB     (default: 1024)
//! RESULTSTORE_WAL_SYNC   fsync every WAL append     (default: true)
//! RESULTSTORE_L0_TRIGGER L0 compaction trigger      (default: 4, 0 = disabled)
//! RESULTSTORE_PAGE_SIZE  Matches per FILTER page    (default: 20)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! > PUT {"runId":"alice-20170101120000","url":"http://www.google.com","diffMetrics":{...}}
//! OK
//! > URLS alice-20170101120000
//! google.com (http://www.)
//! (1 urls)
//! > EXIT
//! bye
//! ```

use anyhow::{bail, Context, Result};
use config::StoreConfig;
use resultstore::{Histogram, Record, ResultStore, SortField, SortOrder, HISTOGRAM_BUCKETS};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cfg = StoreConfig::from_env()?;
    let store = ResultStore::open(&cfg)?;

    println!(
        "ResultStore started (data_dir={}, flush={}KiB, l0_trigger={}, page_size={}, runs={})",
        cfg.data_dir.display(),
        cfg.flush_threshold / 1024,
        cfg.l0_compaction_trigger,
        store.page_size(),
        store.cached_run_ids().len()
    );
    println!("Commands: PUT json | GET run url | RUNS | RANGE run start end");
    println!("          FILTER run start min max | SORT run field order | URLS run");
    println!("          STATS run | REMOVE run | FLUSH | COMPACT | INFO | EXIT");
    prompt();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let (cmd, rest) = match line.trim().split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line.trim(), ""),
        };

        if !cmd.is_empty() {
            match cmd.to_uppercase().as_str() {
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                upper => {
                    if let Err(e) = execute(&store, upper, rest) {
                        println!("ERR {:#}", e);
                    }
                }
            }
        }
        prompt();
    }

    tracing::debug!("input closed; flushing store");
    store.close()?;
    Ok(())
}

fn prompt() {
    print!("> ");
    io::stdout().flush().ok();
}

/// Runs one command, printing its output. Errors are reported by the caller.
fn execute(store: &ResultStore, cmd: &str, rest: &str) -> Result<()> {
    let args: Vec<&str> = rest.split_whitespace().collect();

    match cmd {
        "PUT" => {
            if rest.is_empty() {
                bail!("usage: PUT <record-json>");
            }
            let record: Record = serde_json::from_str(rest).context("invalid record JSON")?;
            let (run_id, url) = (record.run_id.clone(), record.url.clone());
            store.put(&run_id, &url, record)?;
            println!("OK");
        }
        "GET" => {
            let [run_id, url] = &args[..] else {
                bail!("usage: GET <run> <url>");
            };
            match store.get(run_id, url)? {
                Some(record) => println!("{}", serde_json::to_string(&record)?),
                None => println!("(nil)"),
            }
        }
        "RUNS" => {
            let runs = store.get_all_run_ids()?;
            for run in &runs {
                println!("{}", run);
            }
            println!("({} runs)", runs.len());
        }
        "RANGE" => {
            let [run_id, start, end] = &args[..] else {
                bail!("usage: RANGE <run> <start> <end>");
            };
            let (start, end) = (parse_arg(start, "start")?, parse_arg(end, "end")?);
            let records = store.get_range(run_id, start, end)?;
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            println!("({} records)", records.len());
        }
        "FILTER" => {
            let [run_id, start, min, max] = &args[..] else {
                bail!("usage: FILTER <run> <start> <min> <max>");
            };
            let start: usize = parse_arg(start, "start")?;
            let min: f64 = parse_arg(min, "min")?;
            let max: f64 = parse_arg(max, "max")?;
            if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) || min > max {
                bail!("percent bounds must satisfy 0 <= min <= max <= 100");
            }

            let (records, next_idx) = store.get_filtered(run_id, start, min, max)?;
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            println!("({} records, next={})", records.len(), next_idx);
        }
        "SORT" => {
            let [run_id, field, order] = &args[..] else {
                bail!("usage: SORT <run> <field> <order>");
            };
            let field: SortField = field.parse()?;
            let order: SortOrder = order.parse()?;
            store.sort_run(run_id, field, order)?;
            println!("OK");
        }
        "URLS" => {
            let [run_id] = &args[..] else {
                bail!("usage: URLS <run>");
            };
            let urls = store.get_urls(run_id)?;
            for entry in &urls {
                println!("{} ({})", entry.text, entry.value);
            }
            println!("({} urls)", urls.len());
        }
        "STATS" => {
            let [run_id] = &args[..] else {
                bail!("usage: STATS <run>");
            };
            let (stats, histogram) = store.get_stats(run_id)?;
            println!("{}", serde_json::to_string(&stats)?);
            for idx in 0..HISTOGRAM_BUCKETS {
                println!("{} {}", Histogram::label(idx), histogram.counts()[idx]);
            }
        }
        "REMOVE" => {
            let [run_id] = &args[..] else {
                bail!("usage: REMOVE <run>");
            };
            store.remove_run(run_id)?;
            println!("OK");
        }
        "FLUSH" => {
            store.flush()?;
            println!("OK");
        }
        "COMPACT" => {
            store.compact()?;
            println!("OK");
        }
        "INFO" => println!("{:#?}", store),
        other => bail!("unknown command: {}", other),
    }
    Ok(())
}

fn parse_arg<T>(raw: &str, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("invalid {} {:?}", name, raw))
}
