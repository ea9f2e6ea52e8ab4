use std::path::Path;

use crate::{error::ExportError, models::ResultRecord, telemetry};

/** \brief Download name used for every export. */
pub const EXPORT_FILE_NAME: &str = "resultats_openai.csv";

pub const CSV_HEADERS: [&str; 3] = ["requête", "modèle", "réponse"];

/** \brief Characters of the response kept in the preview view. */
pub const PREVIEW_CHARS: usize = 100;
pub const CONTINUATION_MARKER: &str = "...";

/**
 * \brief Encode records as UTF-8 CSV: header row first, then one row per record in order.
 */
pub fn to_csv(records: &[ResultRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;
    for record in records {
        writer.write_record([
            record.request.as_str(),
            record.model.as_str(),
            record.response.as_str(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    telemetry::log_event(
        "export",
        &format!("csv rows={} bytes={}", records.len(), bytes.len()),
    );
    Ok(bytes)
}

pub fn write_csv_file(records: &[ResultRecord], path: &Path) -> Result<(), ExportError> {
    let bytes = to_csv(records)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/**
 * \brief Display copy of the records with each response cut to `PREVIEW_CHARS` characters plus `...`.
 */
pub fn preview(records: &[ResultRecord]) -> Vec<ResultRecord> {
    records
        .iter()
        .map(|r| ResultRecord {
            response: truncate_response(&r.response),
            ..r.clone()
        })
        .collect()
}

pub fn truncate_response(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    out.push_str(CONTINUATION_MARKER);
    out
}
