//! Text extraction for uploaded documents.
//!
//! The parser is chosen from the filename extension alone:
//!
//! - `.txt`: UTF-8 decode (lossy for invalid sequences), one segment.
//! - `.pdf`: page-wise extraction with `lopdf`, one segment per non-blank page. Falls back to
//!   whole-document extraction with `pdf-extract` when no page yields text.
//! - `.docx` / `.doc`: paragraph-wise extraction with `docx-rs`, one segment per document.
//!
//! Parser panics are caught and reported as corrupt documents.

use super::types::{LoaderError, Metadata, TextSegment, UploadedFile};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Document formats recognized by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Plain text.
    Text,
    /// Portable Document Format.
    Pdf,
    /// Word document.
    Word,
}

impl DocumentFormat {
    /// Select a format from a filename's extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Result<Self, LoaderError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "txt" => Ok(Self::Text),
            "pdf" => Ok(Self::Pdf),
            "docx" | "doc" => Ok(Self::Word),
            _ => Err(LoaderError::UnsupportedFormat { extension }),
        }
    }
}

/// Extract text segments from an uploaded file.
///
/// Returns at least one segment with non-blank text on success.
pub fn load(file: &UploadedFile) -> Result<Vec<TextSegment>, LoaderError> {
    let format = DocumentFormat::from_filename(&file.filename)?;
    let filename = file.filename.as_str();
    tracing::debug!(
        filename,
        ?format,
        bytes = file.bytes.len(),
        content_type = file.content_type.as_deref().unwrap_or("unknown"),
        "Loading document"
    );

    let segments = match format {
        DocumentFormat::Text => load_text(&file.bytes, filename),
        DocumentFormat::Pdf => guard_parser(filename, || load_pdf(&file.bytes, filename))?,
        DocumentFormat::Word => guard_parser(filename, || load_word(&file.bytes, filename))?,
    };

    let segments: Vec<TextSegment> = segments
        .into_iter()
        .filter(|segment| !segment.text.trim().is_empty())
        .collect();
    if segments.is_empty() {
        return Err(LoaderError::EmptyDocument {
            filename: filename.to_string(),
        });
    }
    tracing::debug!(filename, segments = segments.len(), "Document loaded");
    Ok(segments)
}

fn guard_parser<F>(filename: &str, parse: F) -> Result<Vec<TextSegment>, LoaderError>
where
    F: FnOnce() -> Result<Vec<TextSegment>, LoaderError>,
{
    panic::catch_unwind(AssertUnwindSafe(parse)).unwrap_or_else(|_| {
        tracing::warn!(filename, "Document parser panicked");
        Err(LoaderError::CorruptDocument {
            filename: filename.to_string(),
            reason: "parser aborted while reading the document".into(),
        })
    })
}

fn source_metadata(filename: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), filename.to_string());
    metadata
}

fn load_text(bytes: &[u8], filename: &str) -> Vec<TextSegment> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(error) => {
            tracing::warn!(filename, error = %error, "Text upload is not valid UTF-8; decoding lossily");
            String::from_utf8_lossy(bytes).into_owned()
        }
    };
    let text = text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text);
    vec![TextSegment {
        text,
        metadata: source_metadata(filename),
    }]
}

fn load_pdf(bytes: &[u8], filename: &str) -> Result<Vec<TextSegment>, LoaderError> {
    let document =
        lopdf::Document::load_mem(bytes).map_err(|error| LoaderError::CorruptDocument {
            filename: filename.to_string(),
            reason: error.to_string(),
        })?;

    let mut segments = Vec::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) if !text.trim().is_empty() => {
                let mut metadata = source_metadata(filename);
                metadata.insert("page".into(), page_number.to_string());
                segments.push(TextSegment { text, metadata });
            }
            Ok(_) => {}
            Err(error) => {
                tracing::debug!(filename, page = page_number, error = %error, "Page text extraction failed");
            }
        }
    }

    if segments.is_empty() {
        tracing::debug!(filename, "No page text found; trying whole-document extraction");
        match pdf_extract::extract_text_from_mem(bytes) {
            Ok(text) => segments.push(TextSegment {
                text,
                metadata: source_metadata(filename),
            }),
            Err(error) => {
                tracing::warn!(filename, error = %error, "Whole-document PDF extraction failed");
            }
        }
    }

    Ok(segments)
}

fn load_word(bytes: &[u8], filename: &str) -> Result<Vec<TextSegment>, LoaderError> {
    let docx = docx_rs::read_docx(bytes).map_err(|error| LoaderError::CorruptDocument {
        filename: filename.to_string(),
        reason: error.to_string(),
    })?;

    let mut paragraphs = Vec::new();
    for child in docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut line = String::new();
            for child in paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(text) = child {
                            line.push_str(&text.text);
                        }
                    }
                }
            }
            if !line.trim().is_empty() {
                paragraphs.push(line);
            }
        }
    }

    Ok(vec![TextSegment {
        text: paragraphs.join("\n"),
        metadata: source_metadata(filename),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run};
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};
    use std::io::Cursor;

    fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let mut docx = Docx::new();
        for text in paragraphs {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
        }
        let mut cursor = Cursor::new(Vec::new());
        docx.build().pack(&mut cursor).expect("pack docx");
        cursor.into_inner()
    }

    fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode")));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        bytes
    }

    #[test]
    fn text_file_yields_single_segment_with_source() {
        let file = UploadedFile::new(
            "proposal.TXT",
            "\u{feff}Project budget: $500,000. Timeline: 6 months.",
        );
        let segments = load(&file).expect("segments");
        assert_eq!(segments.len(), 1);
        assert_eq!(
            segments[0].text,
            "Project budget: $500,000. Timeline: 6 months."
        );
        assert_eq!(segments[0].metadata["source"], "proposal.TXT");
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let file = UploadedFile::new("notes.txt", vec![b'o', b'k', 0xff, b'!']);
        let segments = load(&file).expect("segments");
        assert!(segments[0].text.starts_with("ok"));
    }

    #[test]
    fn csv_is_unsupported() {
        let error = load(&UploadedFile::new("budget.csv", "a,b\n1,2")).expect_err("unsupported");
        assert!(
            matches!(error, LoaderError::UnsupportedFormat { ref extension } if extension == "csv")
        );
    }

    #[test]
    fn missing_extension_is_unsupported() {
        let error = load(&UploadedFile::new("README", "text")).expect_err("unsupported");
        assert!(matches!(error, LoaderError::UnsupportedFormat { .. }));
    }

    #[test]
    fn blank_text_file_is_empty_document() {
        let error = load(&UploadedFile::new("blank.txt", " \n\t ")).expect_err("empty");
        assert!(matches!(error, LoaderError::EmptyDocument { .. }));
    }

    #[test]
    fn malformed_pdf_is_corrupt() {
        let error = load(&UploadedFile::new("broken.pdf", "%PDF-1.4 this is not a pdf"))
            .expect_err("corrupt");
        assert!(matches!(error, LoaderError::CorruptDocument { .. }));
    }

    #[test]
    fn pdf_pages_become_segments() {
        let bytes = pdf_bytes(&["Budget: $500,000", "Timeline: 6 months"]);
        let segments = load(&UploadedFile::new("proposal.pdf", bytes)).expect("segments");

        assert!(!segments.is_empty());
        assert!(segments.iter().all(|segment| !segment.text.trim().is_empty()));
        let joined: String = segments.iter().map(|segment| segment.text.as_str()).collect();
        assert!(joined.contains("500,000"));
        assert!(segments[0].metadata.contains_key("source"));
    }

    #[test]
    fn docx_paragraphs_are_joined_in_order() {
        let bytes = docx_bytes(&["Objectives: replace pipelines", "", "Beneficiaries: 10,000"]);
        let segments = load(&UploadedFile::new("proposal.docx", bytes)).expect("segments");

        assert_eq!(segments.len(), 1);
        assert_eq!(
            segments[0].text,
            "Objectives: replace pipelines\nBeneficiaries: 10,000"
        );
    }

    #[test]
    fn garbage_docx_is_corrupt() {
        let error = load(&UploadedFile::new("legacy.doc", vec![0xd0, 0xcf, 0x11, 0xe0]))
            .expect_err("corrupt");
        assert!(matches!(error, LoaderError::CorruptDocument { .. }));
    }
}
