//! Per-request timing log, flushed to CSV on shutdown.
//!
//! Each worker appends to its own shard, so recording never contends with
//! other workers. Shards are only merged when the table is written, sorted
//! by the simulation clock of the request.

mod error;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use chrono::Local;
use tracing::{info, warn};

pub use error::ProfilingError;

/// Column names of the profiling table.
pub const CSV_HEADER: [&str; 8] = [
    "thread",
    "now",
    "departure_time",
    "from",
    "to",
    "duration_ns",
    "travel_time_s",
    "request_id",
];

/// Timing record of one served request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilingEntry {
    pub worker_id: usize,
    pub simulation_now: u32,
    pub departure_time: u32,
    pub from: String,
    pub to: String,
    pub started_at: SystemTime,
    pub duration: Duration,
    /// Total travel time of the itinerary in seconds.
    pub travel_time: u32,
    pub request_id: Vec<u8>,
}

/// Per-worker sharded profiling log.
#[derive(Debug)]
pub struct ProfilingRegistry {
    enabled: bool,
    shards: Vec<Mutex<Vec<ProfilingEntry>>>,
}

impl ProfilingRegistry {
    pub fn new(workers: usize, enabled: bool) -> Self {
        Self {
            enabled,
            shards: (0..workers).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append an entry to its worker's shard.
    pub fn record(&self, entry: ProfilingEntry) {
        if !self.enabled {
            return;
        }
        let Some(shard) = self.shards.get(entry.worker_id) else {
            warn!(worker = entry.worker_id, "profiling entry for unknown worker dropped");
            return;
        };
        shard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Number of recorded entries across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, ordered by simulation clock. Entries with equal clocks
    /// keep worker order, then recording order.
    pub fn entries_sorted(&self) -> Vec<ProfilingEntry> {
        let mut entries: Vec<ProfilingEntry> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .collect();
        entries.sort_by_key(|entry| entry.simulation_now);
        entries
    }

    /// Write the merged table as CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<usize, ProfilingError> {
        let entries = self.entries_sorted();
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(CSV_HEADER)?;
        for entry in &entries {
            csv.write_record([
                entry.worker_id.to_string(),
                entry.simulation_now.to_string(),
                entry.departure_time.to_string(),
                entry.from.clone(),
                entry.to.clone(),
                entry.duration.as_nanos().to_string(),
                entry.travel_time.to_string(),
                request_id_decimal(&entry.request_id),
            ])?;
        }
        csv.flush().map_err(csv::Error::from)?;
        Ok(entries.len())
    }

    /// Write the table to `<dir>/<build_id>/routing-profiling-<timestamp>.csv`.
    ///
    /// Returns the file written, or `None` when profiling is disabled.
    pub fn flush(&self, dir: &Path, build_id: &str) -> Result<Option<PathBuf>, ProfilingError> {
        if !self.enabled {
            info!("profiling disabled, nothing to flush");
            return Ok(None);
        }

        let out_dir = dir.join(build_id);
        std::fs::create_dir_all(&out_dir).map_err(|source| ProfilingError::Io {
            path: out_dir.clone(),
            source,
        })?;

        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = out_dir.join(format!("routing-profiling-{timestamp}.csv"));
        let file = std::fs::File::create(&path).map_err(|source| ProfilingError::Io {
            path: path.clone(),
            source,
        })?;

        let rows = self.write_csv(std::io::BufWriter::new(file))?;
        info!(path = %path.display(), rows, "wrote profiling data");
        Ok(Some(path))
    }
}

/// Render a request id as the unsigned big-endian integer it encodes.
pub fn request_id_decimal(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    // Little-endian base 10^9 limbs.
    let mut limbs: Vec<u32> = vec![0];
    for &byte in bytes {
        let mut carry = u64::from(byte);
        for limb in &mut limbs {
            let value = u64::from(*limb) * 256 + carry;
            *limb = (value % 1_000_000_000) as u32;
            carry = value / 1_000_000_000;
        }
        while carry > 0 {
            limbs.push((carry % 1_000_000_000) as u32);
            carry /= 1_000_000_000;
        }
    }

    let mut out = String::new();
    let mut iter = limbs.iter().rev();
    if let Some(top) = iter.next() {
        out.push_str(&top.to_string());
    }
    for limb in iter {
        out.push_str(&format!("{limb:09}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(worker_id: usize, simulation_now: u32, request_id: &[u8]) -> ProfilingEntry {
        ProfilingEntry {
            worker_id,
            simulation_now,
            departure_time: 27126,
            from: "1112".into(),
            to: "4142".into(),
            started_at: SystemTime::UNIX_EPOCH,
            duration: Duration::from_nanos(1500),
            travel_time: 1566,
            request_id: request_id.to_vec(),
        }
    }

    #[test]
    fn request_id_rendering() {
        assert_eq!(request_id_decimal(&[]), "");
        assert_eq!(request_id_decimal(&[0]), "0");
        assert_eq!(request_id_decimal(&[1, 0]), "256");
        assert_eq!(request_id_decimal(&[0xff; 8]), u64::MAX.to_string());
        assert_eq!(
            request_id_decimal(&[0xff; 16]),
            u128::MAX.to_string()
        );
        assert_eq!(request_id_decimal(&[0, 0, 0x30, 0x39]), "12345");
    }

    #[test]
    fn sorted_by_simulation_clock() {
        let registry = ProfilingRegistry::new(3, true);
        registry.record(entry(2, 300, &[1]));
        registry.record(entry(0, 100, &[2]));
        registry.record(entry(1, 300, &[3]));
        registry.record(entry(1, 200, &[4]));

        let nows: Vec<_> = registry
            .entries_sorted()
            .iter()
            .map(|e| (e.simulation_now, e.worker_id))
            .collect();
        assert_eq!(nows, [(100, 0), (200, 1), (300, 1), (300, 2)]);
    }

    #[test]
    fn disabled_registry_records_nothing() {
        let registry = ProfilingRegistry::new(1, false);
        registry.record(entry(0, 1, &[1]));
        assert!(registry.is_empty());

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(registry.flush(dir.path(), "abc").unwrap(), None);
    }

    #[test]
    fn unknown_worker_is_dropped() {
        let registry = ProfilingRegistry::new(1, true);
        registry.record(entry(5, 1, &[1]));
        assert!(registry.is_empty());
    }

    #[test]
    fn csv_table() {
        let registry = ProfilingRegistry::new(2, true);
        registry.record(entry(1, 28800, &[1, 0]));
        registry.record(entry(0, 27000, &[]));

        let mut out = Vec::new();
        assert_eq!(registry.write_csv(&mut out).unwrap(), 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "thread,now,departure_time,from,to,duration_ns,travel_time_s,request_id",
                "0,27000,27126,1112,4142,1500,1566,",
                "1,28800,27126,1112,4142,1500,1566,256",
            ]
        );
    }

    #[test]
    fn flush_writes_under_build_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProfilingRegistry::new(1, true);
        registry.record(entry(0, 1, &[7]));

        let path = registry.flush(dir.path(), "abc1234").unwrap().unwrap();

        assert_eq!(path.parent().unwrap(), dir.path().join("abc1234"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("routing-profiling-"));
        assert!(name.ends_with(".csv"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn flush_reports_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let registry = ProfilingRegistry::new(1, true);
        assert!(matches!(
            registry.flush(&blocker, "abc"),
            Err(ProfilingError::Io { .. })
        ));
    }
}
