// Batch orchestration: reader -> classifier -> output builder.

use serde::Serialize;

use crate::archive::{read_document_entries, ArchiveError};
use crate::classify::{classify, Category, ClassificationResult};
use crate::output::OutputArchiveBuilder;

/// Per-category counts for one batch run. Read-only once the run completes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub approved: usize,
    pub contingency: usize,
    pub rejected: usize,
}

impl RunStatistics {
    fn record(&mut self, category: Category) {
        match category {
            Category::Approved => self.approved += 1,
            Category::Contingency => self.contingency += 1,
            Category::Rejected => self.rejected += 1,
        }
    }

    /// Number of document entries accepted into the run.
    pub fn total(&self) -> usize {
        self.approved + self.contingency + self.rejected
    }
}

/// Finished output archive plus the statistics snapshot.
#[derive(Debug)]
pub struct BatchResult {
    /// Sealed zip bytes, positioned at the start.
    pub archive: Vec<u8>,
    pub stats: RunStatistics,
}

/// Process one inbound archive: enumerate the XML entries, classify each one
/// and assemble the sorted output archive.
///
/// A malformed inbound archive is not an error: the result is a single
/// `ERRO.txt` marker archive with zeroed statistics. A malformed document
/// rejects that entry only; the rest of the batch continues. The `Err`
/// channel covers output-archive write failures, which are in-memory and
/// not expected in practice.
pub fn process_batch(input: &[u8]) -> Result<BatchResult, String> {
    let mut builder = OutputArchiveBuilder::new();
    let mut stats = RunStatistics::default();

    match read_document_entries(input) {
        Ok(entries) => {
            for entry in entries {
                let result = match classify(&entry.bytes) {
                    Ok(result) => result,
                    Err(e) => {
                        log::warn!("Failed to parse document '{}': {}", entry.name, e);
                        ClassificationResult::parse_failure()
                    }
                };
                builder.push(&entry.name, &result, &entry.bytes)?;
                stats.record(result.category);
            }
        }
        Err(ArchiveError::InvalidArchive(reason)) => {
            log::warn!("Input is not a valid zip archive: {}", reason);
            builder.push_invalid_archive_marker()?;
        }
    }

    let archive = builder.finish()?;
    Ok(BatchResult { archive, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::PARSE_ERROR_CODE;
    use crate::output::{INVALID_ARCHIVE_MARKER, REPORT_PATH};
    use std::io::{Cursor, Read, Write};
    use zip::write::SimpleFileOptions;
    use zip::{ZipArchive, ZipWriter};

    fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn nfe_xml(cstat: &str, tpemis: &str) -> String {
        format!(
            r#"<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe">
                <protNFe><infProt>
                    <cStat>{cstat}</cStat>
                    <xMotivo>Protocolo de autorização</xMotivo>
                </infProt></protNFe>
                <NFe><infNFe><ide><tpEmis>{tpemis}</tpEmis></ide></infNFe></NFe>
            </nfeProc>"#
        )
    }

    fn entry_names(data: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(data)).unwrap();
        archive.file_names().map(String::from).collect()
    }

    fn read_entry(data: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_mixed_batch_sorted_into_categories() {
        let approved = nfe_xml("100", "1");
        let contingency = nfe_xml("150", "9");
        let rejected = nfe_xml("135", "1");
        let input = make_zip(&[
            ("ok.xml", approved.as_bytes()),
            ("offline.xml", contingency.as_bytes()),
            ("negada.xml", rejected.as_bytes()),
            ("notas.txt", b"nao e xml"),
        ]);

        let result = process_batch(&input).unwrap();
        assert_eq!(result.stats.approved, 1);
        assert_eq!(result.stats.contingency, 1);
        assert_eq!(result.stats.rejected, 1);
        assert_eq!(result.stats.total(), 3);

        let names = entry_names(&result.archive);
        assert!(names.contains(&"aprovados/ok.xml".to_string()));
        assert!(names.contains(&"contingencia/offline.xml".to_string()));
        assert!(names.contains(&"rejeitados/negada.xml".to_string()));
        assert!(names.contains(&REPORT_PATH.to_string()));
        // The non-XML entry must not leak into the output.
        assert!(!names.iter().any(|n| n.contains("notas.txt")));
        // Three documents plus the report, nothing else.
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_malformed_document_rejected_with_sentinel() {
        let input = make_zip(&[("corrompida.xml", b"<nfe><cStat>100</err" as &[u8])]);

        let result = process_batch(&input).unwrap();
        assert_eq!(result.stats.rejected, 1);
        assert_eq!(result.stats.approved, 0);

        let report = read_entry(&result.archive, REPORT_PATH);
        let text = String::from_utf8_lossy(&report);
        assert!(
            text.contains(&format!("corrompida.xml;{PARSE_ERROR_CODE};")),
            "report should carry the parse sentinel, got: {text}"
        );
        // The original bytes are still preserved under rejeitados/.
        assert_eq!(read_entry(&result.archive, "rejeitados/corrompida.xml"), b"<nfe><cStat>100</err");
    }

    #[test]
    fn test_malformed_document_does_not_stop_the_batch() {
        let good = nfe_xml("100", "1");
        let input = make_zip(&[
            ("corrompida.xml", b"garbage bytes" as &[u8]),
            ("ok.xml", good.as_bytes()),
        ]);

        let result = process_batch(&input).unwrap();
        assert_eq!(result.stats.approved, 1);
        assert_eq!(result.stats.rejected, 1);
    }

    #[test]
    fn test_non_archive_input_degrades_to_marker() {
        let result = process_batch(b"this is not a zip at all").unwrap();
        assert_eq!(result.stats, RunStatistics::default());
        assert_eq!(entry_names(&result.archive), vec![INVALID_ARCHIVE_MARKER]);
    }

    #[test]
    fn test_report_present_iff_rejections() {
        let approved = nfe_xml("100", "1");
        let clean = process_batch(&make_zip(&[("ok.xml", approved.as_bytes())])).unwrap();
        assert!(!entry_names(&clean.archive).contains(&REPORT_PATH.to_string()));

        let rejected = nfe_xml("999", "1");
        let dirty = process_batch(&make_zip(&[("ruim.xml", rejected.as_bytes())])).unwrap();
        assert!(entry_names(&dirty.archive).contains(&REPORT_PATH.to_string()));
    }

    #[test]
    fn test_nested_entries_flattened_in_output() {
        let approved = nfe_xml("100", "1");
        let input = make_zip(&[("pasta1/pasta2/arquivo_teste.xml", approved.as_bytes())]);

        let result = process_batch(&input).unwrap();
        let names = entry_names(&result.archive);
        assert_eq!(names, vec!["aprovados/arquivo_teste.xml"]);
        assert!(
            !names.iter().any(|n| n.contains("pasta1") || n.contains("pasta2")),
            "directory structure must be flattened, got: {names:?}"
        );
    }

    #[test]
    fn test_empty_zip_yields_empty_archive() {
        let result = process_batch(&make_zip(&[])).unwrap();
        assert_eq!(result.stats.total(), 0);
        assert!(entry_names(&result.archive).is_empty());
    }
}
