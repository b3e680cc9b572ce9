//! Bulk export and import: ZIP archives with photos, CSV sheets and ICS calendars.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::AppError;
use crate::service::birthdays::BirthdayService;
use crate::service::calendar;
use crate::service::names::normalize_name;
use crate::storage::photos::PUBLIC_PREFIX;
use crate::types::{Birthday, NewBirthday};

pub const MANIFEST_NAME: &str = "birthdays.json";
pub const IMAGES_DIR: &str = "images/";
pub const CSV_HEADER: [&str; 5] = ["Name", "Birthday", "Age", "Gender", "Photo"];
const ERROR_LIMIT: usize = 10;
const PREVIEW_LIMIT: usize = 10;
const MAX_ENTRY_BYTES: u64 = 16 * 1024 * 1024;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Outcome of an import; only the first few errors are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub message: String,
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn note(&mut self, error: impl Into<String>) {
        if self.errors.len() < ERROR_LIMIT {
            self.errors.push(error.into());
        }
    }

    fn skip(&mut self, error: impl Into<String>) {
        self.skipped += 1;
        self.note(error);
    }

    fn finish(mut self) -> Self {
        self.message = format!(
            "Import completed: {} imported, {} skipped",
            self.imported, self.skipped
        );
        self
    }
}

/// One `birthdays.json` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub birthday: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

/// A CSV row as read, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvRow {
    pub name: String,
    pub birthday: String,
    pub gender: Option<String>,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviewCounts {
    pub total: usize,
    pub new: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsvPreview {
    pub preview: PreviewCounts,
    pub new_entries: Vec<CsvRow>,
    pub duplicates: Vec<CsvRow>,
    pub invalid: Vec<CsvRow>,
}

enum RowClass {
    New(NewBirthday),
    Duplicate(NewBirthday),
    Invalid(String),
}

#[derive(Clone)]
pub struct TransferService {
    birthdays: BirthdayService,
}

impl TransferService {
    pub fn new(birthdays: BirthdayService) -> Self {
        Self { birthdays }
    }

    /// `birthdays.json` plus every stored photo under `images/`.
    pub async fn export_zip(&self) -> Result<Vec<u8>, AppError> {
        let records = self.birthdays.store().list_all().await?;
        let mut entries = Vec::with_capacity(records.len());
        let mut images: Vec<(String, Vec<u8>)> = Vec::new();
        let mut seen = HashSet::new();

        for b in &records {
            let mut photo = None;
            if let Some(public) = b.photo.as_deref() {
                let file_name = public.strip_prefix(PUBLIC_PREFIX).unwrap_or(public).to_string();
                if seen.contains(&file_name) {
                    photo = Some(format!("{IMAGES_DIR}{file_name}"));
                } else {
                    match self.birthdays.photos().read(public).await {
                        Ok(bytes) => {
                            photo = Some(format!("{IMAGES_DIR}{file_name}"));
                            seen.insert(file_name.clone());
                            images.push((file_name, bytes));
                        }
                        Err(AppError::FileNotFound(_)) => {
                            warn!(id = b.id, path = public, "photo missing on disk, exported without it");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            entries.push(ArchiveEntry {
                name: b.name.clone(),
                birthday: b.birthdate.format("%Y-%m-%d").to_string(),
                gender: b.gender.map(|g| g.as_str().to_string()),
                photo,
            });
        }

        let manifest = serde_json::to_vec_pretty(&entries)?;
        let count = entries.len();
        let archive = tokio::task::spawn_blocking(move || write_archive(&manifest, &images))
            .await
            .map_err(|e| AppError::UnexpectedError(format!("zip task failed: {e}")))??;
        info!(count, bytes = archive.len(), "exported ZIP archive");
        Ok(archive)
    }

    /// Photos are stored first; the rows then land in one transaction, so a
    /// failed write leaves the previous records untouched even with `replace`.
    pub async fn import_zip(&self, bytes: Vec<u8>, replace: bool) -> Result<ImportReport, AppError> {
        let (manifest, images) = tokio::task::spawn_blocking(move || read_archive(bytes))
            .await
            .map_err(|e| AppError::UnexpectedError(format!("zip task failed: {e}")))??;

        let mut report = ImportReport::default();
        let Some(manifest) = manifest else {
            report.note(format!("{MANIFEST_NAME} not found in import file"));
            return Ok(report.finish());
        };
        let entries: Vec<ArchiveEntry> = match serde_json::from_slice(&manifest) {
            Ok(entries) => entries,
            Err(e) => {
                report.note(format!("{MANIFEST_NAME} is not valid: {e}"));
                return Ok(report.finish());
            }
        };

        let photos = self.birthdays.photos();
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let parsed = NewBirthday::parse(&entry.name, &entry.birthday, entry.gender.as_deref());
            let nb = match parsed {
                Ok(nb) => nb,
                Err(e) => {
                    report.skip(describe_invalid(&entry.name, &e));
                    continue;
                }
            };

            let image = entry
                .photo
                .as_deref()
                .and_then(|p| p.rsplit('/').next())
                .and_then(|file| images.get(file).map(|bytes| (file, bytes)));
            let photo = match image {
                Some((file, bytes)) => match photos.save(strip_unique_prefix(file), bytes.clone()).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        report.note(format!("Photo for {} not imported: {e}", entry.name));
                        None
                    }
                },
                None => None,
            };
            rows.push((nb, photo));
        }

        report.imported = self.birthdays.import_batch(rows, replace).await?;
        let report = report.finish();
        info!(imported = report.imported, skipped = report.skipped, replace, "ZIP import finished");
        Ok(report)
    }

    pub async fn export_csv(&self, today: NaiveDate) -> Result<Vec<u8>, AppError> {
        let records = self.birthdays.store().list_all().await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER)?;
        for b in &records {
            writer.write_record([
                b.name.as_str(),
                &b.birthdate.format("%Y-%m-%d").to_string(),
                &calendar::age_on(b.birthdate, today).to_string(),
                b.gender.map(|g| g.as_str()).unwrap_or(""),
                b.photo.as_deref().unwrap_or(""),
            ])?;
        }
        writer
            .into_inner()
            .map_err(|e| AppError::UnexpectedError(format!("csv flush failed: {e}")))
    }

    /// Classify rows without writing anything.
    pub async fn preview_csv(&self, bytes: &[u8]) -> Result<CsvPreview, AppError> {
        let rows = parse_csv(bytes)?;
        let mut known = self.existing_names().await?;
        let mut preview = CsvPreview::default();
        preview.preview.total = rows.len();

        for row in rows {
            match classify(&row, &mut known) {
                RowClass::New(_) => {
                    preview.preview.new += 1;
                    push_capped(&mut preview.new_entries, row);
                }
                RowClass::Duplicate(_) => {
                    preview.preview.duplicates += 1;
                    push_capped(&mut preview.duplicates, row);
                }
                RowClass::Invalid(_) => {
                    preview.preview.invalid += 1;
                    push_capped(&mut preview.invalid, row);
                }
            }
        }
        Ok(preview)
    }

    /// Rows are validated first, then written in a single transaction.
    pub async fn import_csv(
        &self,
        bytes: &[u8],
        replace: bool,
        skip_duplicates: bool,
    ) -> Result<ImportReport, AppError> {
        let rows = parse_csv(bytes)?;
        // replaced rows no longer count as duplicates
        let mut known = if replace {
            HashSet::new()
        } else {
            self.existing_names().await?
        };
        let mut report = ImportReport::default();
        let mut batch = Vec::with_capacity(rows.len());

        for row in rows {
            match classify(&row, &mut known) {
                RowClass::New(nb) => batch.push((nb, None)),
                RowClass::Duplicate(nb) if !skip_duplicates => batch.push((nb, None)),
                RowClass::Duplicate(_) => report.skip(format!("Skipped duplicate {}", row.name)),
                RowClass::Invalid(reason) => report.skip(reason),
            }
        }

        report.imported = self.birthdays.import_batch(batch, replace).await?;
        let report = report.finish();
        info!(imported = report.imported, skipped = report.skipped, replace, "CSV import finished");
        Ok(report)
    }

    pub async fn export_ics(&self, now: DateTime<Utc>) -> Result<String, AppError> {
        let records = self.birthdays.store().list_all().await?;
        Ok(render_ics(&records, now))
    }

    async fn existing_names(&self) -> Result<HashSet<String>, AppError> {
        Ok(self
            .birthdays
            .store()
            .list_all()
            .await?
            .iter()
            .map(|b| normalize_name(&b.name))
            .collect())
    }
}

fn write_archive(manifest: &[u8], images: &[(String, Vec<u8>)]) -> Result<Vec<u8>, AppError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MANIFEST_NAME, options)?;
    zip.write_all(manifest)?;
    for (name, bytes) in images {
        zip.start_file(format!("{IMAGES_DIR}{name}"), options)?;
        zip.write_all(bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

type ArchiveContents = (Option<Vec<u8>>, HashMap<String, Vec<u8>>);

/// Pull the manifest and `images/*` out of an archive, keyed by base name.
/// Entries that inflate past the size cap are skipped, whatever their
/// headers claim.
fn read_archive(bytes: Vec<u8>) -> Result<ArchiveContents, AppError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut manifest = None;
    let mut images = HashMap::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() || file.size() > MAX_ENTRY_BYTES {
            continue;
        }
        let name = file.name().to_string();
        let target = if name == MANIFEST_NAME {
            None
        } else if let Some(rest) = name.strip_prefix(IMAGES_DIR) {
            match rest.rsplit('/').next().unwrap_or(rest) {
                "" => continue,
                base => Some(base.to_string()),
            }
        } else {
            continue;
        };

        let mut buf = Vec::new();
        (&mut file).take(MAX_ENTRY_BYTES + 1).read_to_end(&mut buf)?;
        if buf.len() as u64 > MAX_ENTRY_BYTES {
            warn!(entry = %name, "archive entry exceeds size limit, skipped");
            continue;
        }
        match target {
            None => manifest = Some(buf),
            Some(base) => {
                images.insert(base, buf);
            }
        }
    }
    Ok((manifest, images))
}

/// `<16 hex>-name.png` -> `name.png`, so re-imports don't stack prefixes.
fn strip_unique_prefix(file: &str) -> &str {
    match file.split_once('-') {
        Some((prefix, rest))
            if prefix.len() == 16 && prefix.chars().all(|c| c.is_ascii_hexdigit()) && !rest.is_empty() =>
        {
            rest
        }
        _ => file,
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<CsvRow>, AppError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let column = |wanted: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(wanted));
    let (Some(name_col), Some(birthday_col)) = (column("name"), column("birthday")) else {
        return Err(AppError::validation("CSV must have Name and Birthday columns"));
    };
    let gender_col = column("gender");
    let photo_col = column("photo");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::to_string)
                .filter(|s| !s.is_empty())
        };
        rows.push(CsvRow {
            name: field(Some(name_col)).unwrap_or_default(),
            birthday: field(Some(birthday_col)).unwrap_or_default(),
            gender: field(gender_col),
            photo: field(photo_col),
        });
    }
    Ok(rows)
}

/// Duplicates are judged against stored names and earlier rows in the same file.
fn classify(row: &CsvRow, known: &mut HashSet<String>) -> RowClass {
    match NewBirthday::parse(&row.name, &row.birthday, row.gender.as_deref()) {
        Err(e) => RowClass::Invalid(describe_invalid(&row.name, &e)),
        Ok(nb) => {
            if known.insert(normalize_name(&nb.name)) {
                RowClass::New(nb)
            } else {
                RowClass::Duplicate(nb)
            }
        }
    }
}

fn describe_invalid(name: &str, err: &AppError) -> String {
    let name = name.trim();
    if name.is_empty() {
        "Skipped entry: missing name or birthday".to_string()
    } else {
        format!("Skipped {name}: {err}")
    }
}

fn push_capped(list: &mut Vec<CsvRow>, row: CsvRow) {
    if list.len() < PREVIEW_LIMIT {
        list.push(row);
    }
}

/// iCalendar with one yearly all-day event per record.
pub fn render_ics(records: &[Birthday], now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Birthday Reminder//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
    ];
    for b in records {
        let name = escape_ics_text(&b.name);
        let leap_day = b.birthdate.format("%m-%d").to_string() == "02-29";
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:birthday-{}@birthday-reminder", b.id));
        lines.push(format!("DTSTAMP:{stamp}"));
        lines.push(format!("DTSTART;VALUE=DATE:{}", b.birthdate.format("%Y%m%d")));
        lines.push(if leap_day {
            // Observe on the last day of February in common years.
            "RRULE:FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=-1".to_string()
        } else {
            "RRULE:FREQ=YEARLY".to_string()
        });
        lines.push(format!("SUMMARY:{name}'s Birthday"));
        lines.push(format!(
            "DESCRIPTION:Born {}. Happy Birthday to {name}!",
            b.birthdate.format("%Y-%m-%d")
        ));
        lines.push("TRANSP:TRANSPARENT".to_string());
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in lines {
        out.push_str(&fold_line(&line));
        out.push_str("\r\n");
    }
    out
}

fn escape_ics_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Fold at 75 octets without splitting a UTF-8 sequence.
fn fold_line(line: &str) -> String {
    const LIMIT: usize = 75;
    if line.len() <= LIMIT {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / LIMIT * 3);
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > LIMIT {
            out.push_str("\r\n ");
            // the leading space counts toward the next line
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out
}
