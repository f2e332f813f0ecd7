//! `connections.xml` reader (pre-6 DBeaver workspaces)
//!
//! ```xml
//! <drivers>
//!   <connections>
//!     <connection id="conn-2" name="Test DB 2" driver="mysql" folder="MyFolder">
//!       <property name="host" value="127.0.0.1"/>
//!     </connection>
//!   </connections>
//! </drivers>
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::types::Connection;

#[derive(Debug, Clone, Copy)]
enum Field {
    Host,
    Port,
    Database,
    User,
    Url,
    Description,
    ReadOnly,
}

/// `<property name=...>` values copied onto the connection; anything else is ignored
const PROPERTY_FIELDS: &[(&str, Field)] = &[
    ("host", Field::Host),
    ("port", Field::Port),
    ("database", Field::Database),
    ("user", Field::User),
    ("url", Field::Url),
    ("description", Field::Description),
    ("read-only", Field::ReadOnly),
    ("readonly", Field::ReadOnly),
];

/// Parse the file contents into connections, in document order
pub(crate) fn parse(contents: &str) -> Result<Vec<Connection>, String> {
    let mut reader = Reader::from_str(contents);
    reader.config_mut().trim_text(true);

    let mut connections = Vec::new();
    let mut current: Option<Connection> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("invalid XML at byte {}: {e}", reader.buffer_position()))?;

        match event {
            Event::Start(e) => {
                check_root(&e, depth, &mut saw_root)?;
                depth += 1;
                match e.name().as_ref() {
                    b"connection" => current = Some(connection_from_attributes(&e)?),
                    b"property" => apply_property(current.as_mut(), &e)?,
                    _ => {}
                }
            }
            Event::Empty(e) => {
                check_root(&e, depth, &mut saw_root)?;
                match e.name().as_ref() {
                    b"connection" => finish(connection_from_attributes(&e)?, &mut connections),
                    b"property" => apply_property(current.as_mut(), &e)?,
                    _ => {}
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if e.name().as_ref() == b"connection" {
                    if let Some(connection) = current.take() {
                        finish(connection, &mut connections);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err("document has no <drivers> root element".to_string());
    }
    if depth != 0 {
        return Err("unexpected end of document (unclosed element)".to_string());
    }

    Ok(connections)
}

fn check_root(e: &BytesStart<'_>, depth: usize, saw_root: &mut bool) -> Result<(), String> {
    if depth > 0 {
        return Ok(());
    }
    if *saw_root {
        return Err("document has more than one root element".to_string());
    }
    if e.name().as_ref() != b"drivers" {
        return Err(format!(
            "unexpected root element <{}>, expected <drivers>",
            String::from_utf8_lossy(e.name().as_ref())
        ));
    }
    *saw_root = true;
    Ok(())
}

fn finish(connection: Connection, connections: &mut Vec<Connection>) {
    if connection.id.is_empty() {
        tracing::warn!(name = %connection.name, "Skipping <connection> without an id attribute");
        return;
    }
    connections.push(connection);
}

fn connection_from_attributes(e: &BytesStart<'_>) -> Result<Connection, String> {
    let mut connection = Connection::default();

    for (key, value) in attributes(e)? {
        match key.as_str() {
            "id" => connection.id = value,
            "name" => connection.name = value,
            "driver" => connection.driver = value,
            "folder" => connection.folder = value,
            "description" => connection.description = value,
            "read-only" | "readonly" => connection.readonly = parse_flag(&value),
            _ => {}
        }
    }

    if connection.name.is_empty() {
        connection.name = connection.id.clone();
    }

    Ok(connection)
}

fn apply_property(connection: Option<&mut Connection>, e: &BytesStart<'_>) -> Result<(), String> {
    let Some(connection) = connection else {
        return Ok(());
    };

    let mut name = None;
    let mut value = None;
    for (key, attr_value) in attributes(e)? {
        match key.as_str() {
            "name" => name = Some(attr_value),
            "value" => value = Some(attr_value),
            _ => {}
        }
    }

    let (Some(name), Some(value)) = (name, value) else {
        return Ok(());
    };
    let Some(field) = PROPERTY_FIELDS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f) else {
        return Ok(());
    };

    let text = (!value.is_empty()).then(|| value.clone());
    match field {
        Field::Host => connection.host = text,
        Field::Port => connection.port = text,
        Field::Database => connection.database = text,
        Field::User => connection.user = text,
        Field::Url => connection.url = value,
        Field::Description => connection.description = value,
        Field::ReadOnly => connection.readonly = parse_flag(&value),
    }

    Ok(())
}

fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(|err| err.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|err| err.to_string())?.into_owned();
            Ok((key, value))
        })
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}
