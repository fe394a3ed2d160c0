use crate::domain::model::{Dataset, Record};
use crate::utils::error::{EtlError, Result};
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// Reads a CSV export with a header row. Short rows are padded with
/// empty cells.
pub fn read_csv(bytes: &[u8]) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let data = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), row.get(i).unwrap_or_default().to_string()))
            .collect();
        records.push(Record { data });
    }

    Ok(Dataset { headers, records })
}

pub fn write_csv(headers: &[String], records: &[Record]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for record in records {
        writer.write_record(
            headers
                .iter()
                .map(|h| record.data.get(h).map(String::as_str).unwrap_or_default()),
        )?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

/// `headers` followed by each of `extra` that it does not already contain.
pub fn with_columns(headers: &[String], extra: &[&str]) -> Vec<String> {
    let mut columns = headers.to_vec();
    for column in extra {
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
    }
    columns
}

/// Packs named files into an in-memory zip archive.
pub fn zip_files(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file::<_, ()>(*name, FileOptions::default())?;
        zip.write_all(data)?;
    }
    Ok(zip.finish()?.into_inner())
}
