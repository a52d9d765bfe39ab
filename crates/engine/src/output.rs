// Output zip assembly and the rejection report.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::classify::{Category, ClassificationResult, MISSING_REASON, MISSING_STATUS_CODE};

/// Report row for one rejected document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectionRecord {
    /// Original entry name, directory prefix included.
    pub file_name: String,
    pub status_code: String,
    pub reason: String,
}

/// Path of the rejection report inside the output archive.
pub const REPORT_PATH: &str = "rejeitados/relatorio_erros.csv";

/// Marker entry written when the input was not a valid archive.
pub const INVALID_ARCHIVE_MARKER: &str = "ERRO.txt";

const INVALID_ARCHIVE_TEXT: &str = "O ficheiro enviado não era um ZIP válido.";

/// UTF-8 byte order mark. Locale-sensitive spreadsheet tools (Excel pt-BR)
/// need it to pick the right encoding when opening the report.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const REPORT_HEADER: [&str; 3] = ["Nome do Arquivo", "Código Status (cStat)", "Motivo (xMotivo)"];

/// Write-once builder for the output archive. Classified entries land under
/// their category folder; rejected entries additionally accumulate report
/// rows. `finish` seals the zip and returns its bytes.
pub struct OutputArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    rejections: Vec<RejectionRecord>,
}

impl OutputArchiveBuilder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            rejections: Vec::new(),
        }
    }

    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
    }

    /// Write one classified entry at `<category folder>/<base name>`.
    /// Any directory prefix in the original entry name is stripped.
    pub fn push(
        &mut self,
        name: &str,
        result: &ClassificationResult,
        bytes: &[u8],
    ) -> Result<(), String> {
        let path = format!("{}/{}", result.category.folder(), base_name(name));
        self.writer
            .start_file(path, Self::options())
            .map_err(|e| e.to_string())?;
        self.writer.write_all(bytes).map_err(|e| e.to_string())?;

        if result.category == Category::Rejected {
            self.rejections.push(RejectionRecord {
                file_name: name.to_string(),
                status_code: result
                    .status_code
                    .clone()
                    .unwrap_or_else(|| MISSING_STATUS_CODE.to_string()),
                reason: result
                    .reason
                    .clone()
                    .unwrap_or_else(|| MISSING_REASON.to_string()),
            });
        }
        Ok(())
    }

    /// Degraded path: a single fixed marker entry, no category folders.
    pub fn push_invalid_archive_marker(&mut self) -> Result<(), String> {
        self.writer
            .start_file(INVALID_ARCHIVE_MARKER, Self::options())
            .map_err(|e| e.to_string())?;
        self.writer
            .write_all(INVALID_ARCHIVE_TEXT.as_bytes())
            .map_err(|e| e.to_string())
    }

    pub fn rejections(&self) -> &[RejectionRecord] {
        &self.rejections
    }

    /// Seal the archive. If any entry was rejected, the report is written
    /// first; the finished zip bytes start at offset zero.
    pub fn finish(mut self) -> Result<Vec<u8>, String> {
        if !self.rejections.is_empty() {
            let report = render_report(&self.rejections)?;
            self.writer
                .start_file(REPORT_PATH, Self::options())
                .map_err(|e| e.to_string())?;
            self.writer.write_all(&report).map_err(|e| e.to_string())?;
        }
        let cursor = self.writer.finish().map_err(|e| e.to_string())?;
        Ok(cursor.into_inner())
    }
}

impl Default for OutputArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip any directory prefix, keeping the final path segment.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Semicolon-delimited CSV, BOM-prefixed for spreadsheet tools.
fn render_report(rejections: &[RejectionRecord]) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    out.extend_from_slice(UTF8_BOM);

    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(out);
    writer.write_record(REPORT_HEADER).map_err(|e| e.to_string())?;
    for record in rejections {
        writer
            .write_record([
                record.file_name.as_str(),
                record.status_code.as_str(),
                record.reason.as_str(),
            ])
            .map_err(|e| e.to_string())?;
    }
    writer.into_inner().map_err(|e| e.to_string())
}
