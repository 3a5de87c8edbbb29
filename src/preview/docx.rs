use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

use super::PreviewResult;
use crate::error::BrowseError;

pub const DOCX_PREVIEW_PARAGRAPHS: usize = 100;

/// Plain paragraph text from a WordprocessingML package.
pub fn preview_docx(body: &[u8]) -> Result<PreviewResult, BrowseError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(body)).map_err(|e| {
        BrowseError::Decode(format!("not an Office Open XML document: {e}"))
    })?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| BrowseError::Decode(format!("document body missing: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| BrowseError::Decode(format!("unreadable document body: {e}")))?;

    Ok(PreviewResult::Docx {
        paragraphs: extract_paragraphs(&xml)?,
    })
}

fn extract_paragraphs(xml: &str) -> Result<Vec<String>, BrowseError> {
    // Whitespace inside <w:t xml:space="preserve"> is significant, so no trimming
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|e| BrowseError::Decode(format!("malformed document XML: {e}")))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                        if paragraphs.len() >= DOCX_PREVIEW_PARAGRAPHS {
                            break;
                        }
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(BrowseError::Decode(format!(
                    "malformed document XML at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Survey notes</w:t></w:r></w:p>
    <w:p></w:p>
    <w:p><w:r><w:t xml:space="preserve">Site </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>A &amp; B</w:t></w:r></w:p>
    <w:p><w:r><w:t>col1</w:t><w:tab/><w:t>col2</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn docx_with(document: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("[Content_Types].xml", options).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(document.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_paragraph_text_only() {
        let result = preview_docx(&docx_with(DOCUMENT)).unwrap();
        assert_eq!(
            result,
            PreviewResult::Docx {
                paragraphs: vec![
                    "Survey notes".to_string(),
                    "Site A & B".to_string(),
                    "col1\tcol2".to_string(),
                ]
            }
        );
    }

    #[test]
    fn test_paragraphs_are_capped() {
        let body: String = (0..150)
            .map(|i| format!("<w:p><w:r><w:t>p{i}</w:t></w:r></w:p>"))
            .collect();
        let document = format!("<w:document><w:body>{body}</w:body></w:document>");
        let PreviewResult::Docx { paragraphs } = preview_docx(&docx_with(&document)).unwrap()
        else {
            panic!("expected docx");
        };
        assert_eq!(paragraphs.len(), DOCX_PREVIEW_PARAGRAPHS);
        assert_eq!(paragraphs[0], "p0");
    }

    #[test]
    fn test_legacy_doc_is_a_decode_error() {
        // OLE2 compound file signature, as used by .doc
        let body = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1, 0, 0, 0, 0];
        assert!(matches!(preview_docx(&body), Err(BrowseError::Decode(_))));
    }

    #[test]
    fn test_zip_without_document_is_a_decode_error() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hi").unwrap();
        let body = writer.finish().unwrap().into_inner();
        assert!(matches!(preview_docx(&body), Err(BrowseError::Decode(_))));
    }
}
