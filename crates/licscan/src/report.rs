//! CSV report persistence.
//!
//! The report is the only durable state: it is loaded once before a run to
//! decide which hosts are already licensed, and written once after all
//! workers finish.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use licscan_core::{HostKey, ReportRow};

use crate::error::{Result, ScanError};

/// Column names of the report, in order.
pub const HEADER: [&str; 3] = ["Hostname", "Windows Edition", "License Status"];

/// Prior report rows keyed by host. Read-only for the duration of a run.
pub type Snapshot = BTreeMap<HostKey, ReportRow>;

/// How rows are physically written to the report file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the file with a header and the given rows.
    Overwrite,
    /// Add the given rows to the end, with a header only for a new file.
    Append,
}

/// What the user asked for at the run level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// The report holds this run's hosts only.
    Overwrite,
    /// The report keeps every prior host; this run's outcomes replace by key.
    Append,
}

/// Everything read from the report before a run.
#[derive(Debug, Clone, Default)]
pub struct PriorReport {
    pub rows: Snapshot,
    /// Records that did not decode as a report row, in file order.
    pub unparsed: Vec<csv::ByteRecord>,
}

/// Rows to persist and how to write them.
#[derive(Debug, Clone)]
pub struct WritePlan {
    pub rows: Vec<ReportRow>,
    /// Undecoded records written back verbatim after `rows`.
    pub preserved: Vec<csv::ByteRecord>,
    pub mode: WriteMode,
}

/// Decide what to write at the end of a run.
///
/// `new_rows` arrive in completion order; a later row for the same host
/// replaces an earlier one. Hosts in `skipped` keep their prior row. In
/// append mode the file is only appended to when no new row collides with
/// a prior host; otherwise it is rewritten with the merged set so keys stay
/// unique; records that did not decode are carried into the rewrite.
pub fn plan_write(
    prior: &PriorReport,
    new_rows: &[ReportRow],
    skipped: &[HostKey],
    mode: ReportMode,
) -> WritePlan {
    let fresh: BTreeMap<HostKey, ReportRow> = new_rows
        .iter()
        .map(|row| (row.host.clone(), row.clone()))
        .collect();

    match mode {
        ReportMode::Overwrite => {
            let mut rows: BTreeMap<HostKey, ReportRow> = skipped
                .iter()
                .filter_map(|key| prior.rows.get(key).map(|row| (key.clone(), row.clone())))
                .collect();
            rows.extend(fresh);
            if !prior.unparsed.is_empty() {
                tracing::warn!(
                    dropped = prior.unparsed.len(),
                    "Overwrite drops unreadable report rows"
                );
            }
            WritePlan {
                rows: rows.into_values().collect(),
                preserved: Vec::new(),
                mode: WriteMode::Overwrite,
            }
        }
        ReportMode::Append => {
            if fresh.keys().any(|key| prior.rows.contains_key(key)) {
                let mut rows = prior.rows.clone();
                rows.extend(fresh);
                WritePlan {
                    rows: rows.into_values().collect(),
                    preserved: prior.unparsed.clone(),
                    mode: WriteMode::Overwrite,
                }
            } else {
                WritePlan {
                    rows: fresh.into_values().collect(),
                    preserved: Vec::new(),
                    mode: WriteMode::Append,
                }
            }
        }
    }
}

/// The report file.
#[derive(Debug, Clone)]
pub struct ReportStore {
    path: PathBuf,
}

impl ReportStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load prior rows. A missing file is an empty report. When a host
    /// appears twice the later row wins.
    pub fn load(&self) -> Result<Snapshot> {
        Ok(self.load_report()?.rows)
    }

    /// Load prior rows along with the records that do not decode.
    ///
    /// Undecoded records are kept as read, untrimmed, so a rewrite can put
    /// them back.
    pub fn load_report(&self) -> Result<PriorReport> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No prior report");
                return Ok(PriorReport::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let mut headers = reader
            .byte_headers()
            .map_err(|e| self.csv_error(e))?
            .clone();
        headers.trim();

        let mut prior = PriorReport::default();
        for (idx, record) in reader.byte_records().enumerate() {
            let raw = match record {
                Ok(raw) => raw,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    return Err(self.csv_error(e));
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        row = idx + 1,
                        error = %e,
                        "Dropping unreadable report record"
                    );
                    continue;
                }
            };

            match decode_row(&raw, &headers) {
                Ok(row) => {
                    prior.rows.insert(row.host.clone(), row);
                }
                Err(reason) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        row = idx + 1,
                        error = %reason,
                        "Skipping malformed report row"
                    );
                    prior.unparsed.push(raw);
                }
            }
        }

        tracing::info!(
            path = %self.path.display(),
            rows = prior.rows.len(),
            skipped = prior.unparsed.len(),
            "Loaded prior report"
        );
        Ok(prior)
    }

    /// Write rows sorted by host.
    pub fn save(&self, rows: &[ReportRow], mode: WriteMode) -> Result<()> {
        self.write(rows, &[], mode)
    }

    /// Carry out a plan from [`plan_write`].
    pub fn apply(&self, plan: &WritePlan) -> Result<()> {
        self.write(&plan.rows, &plan.preserved, plan.mode)
    }

    fn write(
        &self,
        rows: &[ReportRow],
        preserved: &[csv::ByteRecord],
        mode: WriteMode,
    ) -> Result<()> {
        let mut rows = rows.to_vec();
        rows.sort_by(|a, b| a.host.cmp(&b.host));

        match mode {
            WriteMode::Overwrite => self.overwrite(&rows, preserved)?,
            WriteMode::Append => self.append(&rows, preserved)?,
        }

        tracing::info!(
            path = %self.path.display(),
            rows = rows.len(),
            preserved = preserved.len(),
            mode = ?mode,
            "Report written"
        );
        Ok(())
    }

    /// Write to a sibling temp file and rename it over the report.
    fn overwrite(&self, rows: &[ReportRow], preserved: &[csv::ByteRecord]) -> Result<()> {
        let tmp = self.temp_path();
        let file = File::create(&tmp)?;
        self.write_rows(file, rows, preserved, true)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn append(&self, rows: &[ReportRow], preserved: &[csv::ByteRecord]) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;

        let len = file.metadata()?.len();
        if len > 0 && !ends_with_newline(&mut file, len)? {
            file.write_all(b"\n")?;
        }

        self.write_rows(file, rows, preserved, len == 0)
    }

    fn write_rows(
        &self,
        file: File,
        rows: &[ReportRow],
        preserved: &[csv::ByteRecord],
        header: bool,
    ) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(io::BufWriter::new(file));

        if header {
            writer
                .write_record(HEADER)
                .map_err(|e| self.csv_error(e))?;
        }
        for row in rows {
            writer.serialize(row).map_err(|e| self.csv_error(e))?;
        }
        for record in preserved {
            writer
                .write_byte_record(record)
                .map_err(|e| self.csv_error(e))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn csv_error(&self, source: csv::Error) -> ScanError {
        ScanError::Report {
            path: self.path.clone(),
            source,
        }
    }
}

/// Decode one record against the trimmed header, requiring an exact
/// column count.
fn decode_row(
    raw: &csv::ByteRecord,
    headers: &csv::ByteRecord,
) -> std::result::Result<ReportRow, String> {
    if raw.len() != headers.len() {
        return Err(format!("expected {} fields, found {}", headers.len(), raw.len()));
    }
    let mut record = raw.clone();
    record.trim();
    record
        .deserialize::<ReportRow>(Some(headers))
        .map_err(|e| e.to_string())
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(host: &str, edition: &str, status: &str) -> ReportRow {
        ReportRow {
            host: HostKey::from_name(host).unwrap(),
            edition: edition.to_string(),
            license_status: status.to_string(),
        }
    }

    fn key(host: &str) -> HostKey {
        HostKey::from_name(host).unwrap()
    }

    fn snapshot(rows: &[ReportRow]) -> Snapshot {
        rows.iter().map(|r| (r.host.clone(), r.clone())).collect()
    }

    fn prior(rows: &[ReportRow]) -> PriorReport {
        PriorReport {
            rows: snapshot(rows),
            unparsed: Vec::new(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("results.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_overwrite_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("results.csv"));
        let rows = vec![
            row("host2", "Windows Server 2019 Standard", "Licensed"),
            row("host1", "Offline", "N/A"),
            row("host3", "Error", "Error"),
        ];

        store.save(&rows, WriteMode::Overwrite).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, snapshot(&rows));
        let text = fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            text,
            "Hostname,Windows Edition,License Status\n\
             HOST1,Offline,N/A\n\
             HOST2,Windows Server 2019 Standard,Licensed\n\
             HOST3,Error,Error\n"
        );
    }

    #[test]
    fn test_overwrite_with_no_rows_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("results.csv"));
        store.save(&[], WriteMode::Overwrite).unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "Hostname,Windows Edition,License Status\n"
        );
        assert!(!dir.path().join("results.csv.tmp").exists());
    }

    #[test]
    fn test_edition_with_comma_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("results.csv"));
        let rows = vec![row("srv", "Windows(R), ServerStandard edition", "Licensed")];
        store.save(&rows, WriteMode::Overwrite).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("SRV,\"Windows(R), ServerStandard edition\",Licensed\n"));
        assert_eq!(store.load().unwrap(), snapshot(&rows));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(
            &path,
            "Hostname,Windows Edition,License Status\n\
             HOST1,Pro,Licensed\n\
             broken-row\n\
             ,Home,Unlicensed\n\
             host2.corp.local , Home , Unlicensed\n",
        )
        .unwrap();

        let loaded = ReportStore::new(&path).load_report().unwrap();
        assert_eq!(loaded.rows.len(), 2);
        assert!(loaded.rows[&key("HOST1")].is_licensed());
        assert_eq!(loaded.rows[&key("HOST2")], row("HOST2", "Home", "Unlicensed"));
        assert_eq!(loaded.unparsed.len(), 2);
        assert_eq!(&loaded.unparsed[0][0], b"broken-row");
    }

    #[test]
    fn test_later_duplicate_wins_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(
            &path,
            "Hostname,Windows Edition,License Status\nHOST1,Offline,N/A\nHOST1,Pro,Licensed\n",
        )
        .unwrap();

        let loaded = ReportStore::new(&path).load().unwrap();
        assert_eq!(loaded[&key("HOST1")], row("HOST1", "Pro", "Licensed"));
    }

    #[test]
    fn test_append_adds_header_only_for_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("results.csv"));

        store
            .save(&[row("host1", "Pro", "Licensed")], WriteMode::Append)
            .unwrap();
        store
            .save(&[row("host2", "Home", "Unlicensed")], WriteMode::Append)
            .unwrap();

        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "Hostname,Windows Edition,License Status\nHOST1,Pro,Licensed\nHOST2,Home,Unlicensed\n"
        );
    }

    #[test]
    fn test_append_repairs_missing_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "Hostname,Windows Edition,License Status\nHOST1,Pro,Licensed").unwrap();

        let store = ReportStore::new(&path);
        store
            .save(&[row("host2", "Home", "Unlicensed")], WriteMode::Append)
            .unwrap();

        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_plan_overwrite_keeps_skipped_rows_only() {
        let prior = prior(&[
            row("host1", "Pro", "Licensed"),
            row("retired", "Home", "Unlicensed"),
        ]);
        let new_rows = vec![row("host2", "Home", "Unlicensed")];

        let plan = plan_write(&prior, &new_rows, &[key("host1")], ReportMode::Overwrite);
        assert_eq!(plan.mode, WriteMode::Overwrite);
        assert_eq!(
            plan.rows,
            vec![row("host1", "Pro", "Licensed"), row("host2", "Home", "Unlicensed")]
        );
    }

    #[test]
    fn test_plan_append_without_collision_appends() {
        let prior = prior(&[row("host1", "Pro", "Licensed")]);
        let new_rows = vec![row("host2", "Home", "Unlicensed")];

        let plan = plan_write(&prior, &new_rows, &[key("host1")], ReportMode::Append);
        assert_eq!(plan.mode, WriteMode::Append);
        assert_eq!(plan.rows, new_rows);
    }

    #[test]
    fn test_plan_append_with_collision_rewrites_merged() {
        let prior = prior(&[
            row("host1", "Pro", "Licensed"),
            row("host2", "Offline", "N/A"),
        ]);
        let new_rows = vec![row("host2", "Home", "Unlicensed")];

        let plan = plan_write(&prior, &new_rows, &[], ReportMode::Append);
        assert_eq!(plan.mode, WriteMode::Overwrite);
        assert_eq!(
            plan.rows,
            vec![row("host1", "Pro", "Licensed"), row("host2", "Home", "Unlicensed")]
        );
    }

    #[test]
    fn test_plan_last_completed_duplicate_wins() {
        let new_rows = vec![row("host1", "Offline", "N/A"), row("host1", "Pro", "Licensed")];
        let plan = plan_write(&PriorReport::default(), &new_rows, &[], ReportMode::Overwrite);
        assert_eq!(plan.rows, vec![row("host1", "Pro", "Licensed")]);
    }

    #[test]
    fn test_append_rewrite_keeps_unreadable_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(
            &path,
            "Hostname,Windows Edition,License Status\n\
             HOST1,Offline,N/A\n\
             legacy,Pro\n\
             HOST9,Home,Unlicensed,extra\n",
        )
        .unwrap();

        let store = ReportStore::new(&path);
        let prior = store.load_report().unwrap();
        assert_eq!(prior.unparsed.len(), 2);

        let plan = plan_write(&prior, &[row("host1", "Pro", "Licensed")], &[], ReportMode::Append);
        assert_eq!(plan.mode, WriteMode::Overwrite);
        store.apply(&plan).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Hostname,Windows Edition,License Status\n\
             HOST1,Pro,Licensed\n\
             legacy,Pro\n\
             HOST9,Home,Unlicensed,extra\n"
        );
    }

    #[test]
    fn test_plan_overwrite_does_not_carry_unreadable_rows() {
        let mut report = prior(&[row("host1", "Pro", "Licensed")]);
        report.unparsed.push(csv::ByteRecord::from(vec!["legacy", "Pro"]));

        let new_rows = vec![row("host2", "Home", "Unlicensed")];

        let plan = plan_write(&report, &new_rows, &[], ReportMode::Overwrite);
        assert!(plan.preserved.is_empty());

        let plan = plan_write(&report, &new_rows, &[], ReportMode::Append);
        assert_eq!(plan.mode, WriteMode::Append);
        assert!(plan.preserved.is_empty());
    }
}
