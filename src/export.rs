//! xlsx export of the report views
//!
//! The workbook is rendered in memory, written to a uniquely named sibling file and
//! renamed onto the destination, so a failed or cancelled run never leaves a
//! half-written report behind.

use crate::error::{FxError, Result};
use crate::types::{ReportView, ReportViews, Source, SourceSelection, ViewRow};
use calamine::{open_workbook, Data, Reader, Xlsx};
use chrono::NaiveDate;
use rust_xlsxwriter::{Workbook, XlsxError};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Artifact file name: `{date_from}_{date_to}{suffix}.xlsx`
///
/// The suffix is empty when every source is active, otherwise `-{source}` for each
/// active source in a fixed order.
pub fn artifact_name(
    date_from: NaiveDate,
    date_to: NaiveDate,
    sources: &SourceSelection,
) -> String {
    let suffix: String = if sources.is_all() {
        String::new()
    } else {
        sources
            .active()
            .iter()
            .map(|s| format!("-{}", s))
            .collect()
    };

    format!(
        "{}_{}{}.xlsx",
        date_from.format("%Y-%m-%d"),
        date_to.format("%Y-%m-%d"),
        suffix
    )
}

fn export_error(err: XlsxError) -> FxError {
    FxError::ExportFailure(format!("xlsx: {}", err))
}

/// Render the three sheets into an in-memory xlsx file
pub fn render_workbook(views: &ReportViews) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    for (name, view) in views.sheets() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name).map_err(export_error)?;

        for (col, header) in ReportView::COLUMNS.iter().enumerate() {
            sheet
                .write_string(0, col as u16, *header)
                .map_err(export_error)?;
        }

        for (idx, row) in view.iter().enumerate() {
            let r = idx as u32 + 1;
            sheet
                .write_string(r, 0, row.currency.as_str())
                .map_err(export_error)?;
            sheet.write_string(r, 1, row.ts.as_str()).map_err(export_error)?;
            sheet.write_number(r, 2, row.value).map_err(export_error)?;
            sheet
                .write_string(r, 3, row.source.as_str())
                .map_err(export_error)?;
        }
    }

    workbook.save_to_buffer().map_err(export_error)
}

/// Write the report to `destination`, creating its directory if needed
pub fn export(views: &ReportViews, destination: &Path) -> Result<PathBuf> {
    let bytes = render_workbook(views)?;

    if let Some(dir) = destination.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| {
            FxError::ExportFailure(format!("cannot create {}: {}", dir.display(), e))
        })?;
    }

    let partial = partial_path(destination);
    if let Err(e) = write_synced(&partial, &bytes) {
        let _ = fs::remove_file(&partial);
        return Err(FxError::ExportFailure(format!(
            "cannot write {}: {}",
            destination.display(),
            e
        )));
    }

    if let Err(e) = fs::rename(&partial, destination) {
        let _ = fs::remove_file(&partial);
        return Err(FxError::ExportFailure(format!(
            "cannot move report into {}: {}",
            destination.display(),
            e
        )));
    }

    log::info!(
        "exported daily={} spot={} monthly={} rows to {}",
        views.daily.len(),
        views.spot.len(),
        views.monthly.len(),
        destination.display()
    );
    Ok(destination.to_path_buf())
}

fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.xlsx".to_string());
    destination.with_file_name(format!(".{}.{}.partial", name, uuid::Uuid::new_v4()))
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Read one sheet of an exported report back into rows
pub fn read_sheet(path: &Path, sheet: &str) -> Result<Vec<ViewRow>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| FxError::ExportFailure(format!("cannot open {}: {}", path.display(), e)))?;
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| FxError::ExportFailure(format!("sheet '{}': {}", sheet, e)))?;

    let mut rows = range.rows();
    match rows.next() {
        Some(header) => {
            let names: Vec<String> = header.iter().map(|c| c.to_string()).collect();
            if names != ReportView::COLUMNS {
                return Err(FxError::ExportFailure(format!(
                    "sheet '{}' has unexpected header {:?}",
                    sheet, names
                )));
            }
        }
        None => {
            return Err(FxError::ExportFailure(format!(
                "sheet '{}' is empty",
                sheet
            )))
        }
    }

    rows.enumerate()
        .map(|(idx, cells)| {
            parse_row(cells).map_err(|e| {
                FxError::ExportFailure(format!("sheet '{}' row {}: {}", sheet, idx + 2, e))
            })
        })
        .collect()
}

fn parse_row(cells: &[Data]) -> std::result::Result<ViewRow, String> {
    let text = |idx: usize| match cells.get(idx) {
        Some(Data::String(s)) => Ok(s.clone()),
        other => Err(format!("expected text in column {}, got {:?}", idx, other)),
    };

    let value = match cells.get(2) {
        Some(Data::Float(v)) => *v,
        Some(Data::Int(v)) => *v as f64,
        other => return Err(format!("expected number in column 2, got {:?}", other)),
    };
    let source = Source::from_str(&text(3)?).map_err(|e| e.to_string())?;

    Ok(ViewRow {
        currency: text(0)?,
        ts: text(1)?,
        value,
        source,
    })
}
