//! Part lookup inside an OOXML package

use crate::helpers::xml::XmlReader;
use crate::spreadsheet::SpreadsheetError;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::ZipArchive;

/// XML reader over one package part.
pub(crate) type PartReader<'a, RS> = XmlReader<BufReader<ZipFile<'a, RS>>>;

/// Opens the part stored under `name`. Producers disagree on case and on the
/// path separator, so both are ignored. `None` when the package has no such part.
pub(crate) fn open_part<'a, RS: Read + Seek>(
    archive: &'a mut ZipArchive<RS>,
    name: &str,
) -> Result<Option<PartReader<'a, RS>>, SpreadsheetError> {
    let wanted = name.replace('\\', "/");
    let Some(index) = (0..archive.len()).find(|index| {
        archive
            .name_for_index(*index)
            .is_some_and(|entry| entry.replace('\\', "/").eq_ignore_ascii_case(&wanted))
    }) else {
        return Ok(None);
    };
    let file = archive.by_index(index)?;
    Ok(Some(XmlReader::new(BufReader::new(file))))
}

/// Like [`open_part`], but a missing part is an error.
pub(crate) fn require_part<'a, RS: Read + Seek>(
    archive: &'a mut ZipArchive<RS>,
    name: &str,
) -> Result<PartReader<'a, RS>, SpreadsheetError> {
    open_part(archive, name)?.ok_or_else(|| SpreadsheetError::FileError(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use crate::helpers::zip::*;
    use crate::match_xml_events;
    use quick_xml::events::Event;
    use std::io::Cursor;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn package() -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("XL/Workbook.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"<workbook/>").unwrap();
        let cursor = writer.finish().unwrap();
        ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap()
    }

    fn first_tag(reader: &mut PartReader<Cursor<Vec<u8>>>) -> Result<Option<String>, SpreadsheetError> {
        let mut tag = None;
        match_xml_events!(reader => {
            Event::Start(event) => {
                tag = Some(String::from_utf8_lossy(event.name().as_ref()).into_owned());
                break;
            }
        });
        Ok(tag)
    }

    #[test]
    fn finds_parts_ignoring_case() {
        let mut archive = package();
        let mut reader = open_part(&mut archive, "xl/workbook.xml").unwrap().unwrap();
        assert_eq!(first_tag(&mut reader).unwrap().as_deref(), Some("workbook"));
    }

    #[test]
    fn missing_parts() {
        let mut archive = package();
        assert!(open_part(&mut archive, "xl/styles.xml").unwrap().is_none());
        assert!(matches!(
            require_part(&mut archive, "xl/styles.xml"),
            Err(SpreadsheetError::FileError(name)) if name == "xl/styles.xml"
        ));
    }
}
