//! Event reading over the XML parts of a workbook package

use crate::spreadsheet::SpreadsheetError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Unknown entity '&{0};'")]
    UnknownEntity(String),

    #[error("Attribute {name}=\"{value}\" has an unexpected value")]
    InvalidAttribute { name: String, value: String },
}

/// Pull reader over one part. Empty elements are reported as a start/end pair
/// and text keeps its surrounding whitespace.
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(source: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(source);
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.check_end_names = false;
        config.trim_text(false);
        XmlReader {
            reader,
            buffer: Vec::with_capacity(1024),
        }
    }

    pub(crate) fn next_event(&'_ mut self) -> Result<Option<Event<'_>>, SpreadsheetError> {
        self.buffer.clear();
        let event = self.reader.read_event_into(&mut self.buffer)?;
        Ok(match event {
            Event::Eof => None,
            event => Some(event),
        })
    }
}

/// Attribute lookup on a start tag, returning unescaped owned values.
pub(crate) trait ElementExt {
    /// Value of the attribute with this qualified name
    fn attr(&self, name: &str) -> Result<Option<String>, SpreadsheetError>;

    /// Value of the first attribute with this local name, ignoring its prefix (`r:id`)
    fn attr_local(&self, local_name: &str) -> Result<Option<String>, SpreadsheetError>;

    fn attr_as<T: FromStr>(&self, name: &str) -> Result<Option<T>, SpreadsheetError> {
        match self.attr(name)? {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| XmlError::InvalidAttribute { name: name.to_owned(), value }.into()),
            None => Ok(None),
        }
    }
}

impl ElementExt for BytesStart<'_> {
    fn attr(&self, name: &str) -> Result<Option<String>, SpreadsheetError> {
        match self.try_get_attribute(name)? {
            Some(attribute) => Ok(Some(attribute.unescape_value()?.into_owned())),
            None => Ok(None),
        }
    }

    fn attr_local(&self, local_name: &str) -> Result<Option<String>, SpreadsheetError> {
        for attribute in self.attributes() {
            let attribute = attribute?;
            if attribute.key.local_name().as_ref() == local_name.as_bytes() {
                return Ok(Some(attribute.unescape_value()?.into_owned()));
            }
        }
        Ok(None)
    }
}

/// Appends the text of an entity (`&amp;`) or character reference (`&#10;`, `&#x41;`).
/// Code points that are not valid characters are dropped.
pub(crate) fn push_reference(text: &mut String, reference: &BytesRef) -> Result<(), SpreadsheetError> {
    let content = reference.xml_content()?;
    match content.strip_prefix('#') {
        Some(number) => {
            let code = match number.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16)?,
                None => number.parse::<u32>()?,
            };
            text.extend(char::from_u32(code));
        }
        None => {
            let entity = resolve_xml_entity(&content)
                .ok_or_else(|| XmlError::UnknownEntity(content.to_string()))?;
            text.push_str(entity);
        }
    }
    Ok(())
}

/// Runs the given match arms over every event of an [`XmlReader`] until the end
/// of the part; events no arm matches are ignored. Arms may `break` early.
#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(event) = $reader.next_event()? {
            match event {
                $($arms)*
                _ => (),
            }
        }
    };
}
