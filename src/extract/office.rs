//! PDF and Office Open XML extraction.

use crate::error::{DocQaError, Result};
use quick_xml::events::Event;
use std::io::{Cursor, Read};

/// Maximum decompressed bytes read from a single archive entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

pub(super) fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| DocQaError::Extraction(format!("PDF extraction failed: {}", e)))
}

pub(super) fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    collect_text(&xml)
}

pub(super) fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|n| {
            let number = n
                .trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX);
            (number, n.to_string())
        })
        .collect();
    slides.sort();

    let mut out = String::new();
    for (_, name) in slides {
        let text = collect_text(&read_entry(&mut archive, &name)?)?;
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(text);
    }
    Ok(out)
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DocQaError::Extraction(format!("Not a valid Office document: {}", e)))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| DocQaError::Extraction(format!("{}: {}", name, e)))?;

    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(DocQaError::Extraction(format!(
            "{} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Concatenate `<*:t>` runs, ending each `<*:p>` paragraph with a newline.
/// WordprocessingML and DrawingML share these local names.
fn collect_text(xml: &[u8]) -> Result<String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| DocQaError::Extraction(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocQaError::Extraction(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_docx_paragraphs() {
        let xml = r#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t>First</w:t></w:r><w:r><w:t xml:space="preserve"> paragraph</w:t></w:r></w:p>
            <w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let bytes = archive(&[("word/document.xml", xml)]);

        assert_eq!(extract_docx(&bytes).unwrap(), "First paragraph\nFish & chips");
    }

    #[test]
    fn test_pptx_slides_in_numeric_order() {
        let slide = |text: &str| format!(r#"<p:sld xmlns:a="a" xmlns:p="p"><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>"#, text);
        let bytes = archive(&[
            ("ppt/slides/slide10.xml", slide("ten").as_str()),
            ("ppt/slides/slide2.xml", slide("two").as_str()),
            ("ppt/slides/slide1.xml", slide("one").as_str()),
        ]);

        assert_eq!(extract_pptx(&bytes).unwrap(), "one\n\ntwo\n\nten");
    }

    #[test]
    fn test_empty_docx_yields_empty_text() {
        let bytes = archive(&[("word/document.xml", "<w:document xmlns:w=\"w\"/>")]);
        assert_eq!(extract_docx(&bytes).unwrap(), "");
    }

    #[test]
    fn test_garbage_is_an_extraction_error() {
        assert!(matches!(extract_docx(b"not a zip"), Err(DocQaError::Extraction(_))));
        assert!(matches!(extract_pptx(b"PK"), Err(DocQaError::Extraction(_))));
    }
}
