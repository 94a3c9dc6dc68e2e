//! package:// path rewriting for URDF/Xacro files
//!
//! Converts `package://<package_name>/meshes/link.stl` into `meshes/link.stl`
//! so the robot description can be loaded without a ROS package index.
//! The document is streamed event by event, so comments, Xacro macros and
//! formatting outside the rewritten attributes are kept as they are.

use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Which elements and attributes get rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Qualified tag name of mesh reference elements
    pub tag: String,
    /// Attribute holding the mesh path
    pub attribute: String,
    /// Scheme marker followed by the package name segment
    pub scheme: String,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            tag: "mesh".to_string(),
            attribute: "filename".to_string(),
            scheme: "package://".to_string(),
        }
    }
}

/// One rewritten attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConversion {
    pub original: String,
    pub converted: String,
}

/// Rewritten document and the conversions applied, in document order
#[derive(Debug, Clone)]
pub struct RewriteOutput {
    pub xml: String,
    pub conversions: Vec<PathConversion>,
}

/// Errors that can occur while rewriting a robot description
#[derive(Debug, Clone, thiserror::Error)]
pub enum RewriteError {
    #[error("Input file '{path}' does not exist")]
    FileNotFound { path: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to parse XML: {0}")]
    Parse(String),

    #[error("Failed to write output: {0}")]
    Write(String),
}

/// Remove every `<scheme><package>/` occurrence from `value`
///
/// A match needs a non-empty package segment terminated by `/`, so
/// `package://` and `package://robot` are left alone. Returns `None` when
/// nothing was removed.
pub fn strip_package_uris(value: &str, scheme: &str) -> Option<String> {
    if scheme.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut changed = false;

    while let Some(pos) = rest.find(scheme) {
        let after = &rest[pos + scheme.len()..];
        match after.find('/') {
            Some(slash) if slash > 0 => {
                out.push_str(&rest[..pos]);
                rest = &after[slash + 1..];
                changed = true;
            }
            _ => {
                // No package segment here; resume the search one character later
                let step = pos + rest[pos..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&rest[..step]);
                rest = &rest[step..];
            }
        }
    }
    out.push_str(rest);

    changed.then_some(out)
}

/// Build a copy of `element` with the path attribute rewritten, if it needs it
fn rewrite_element(
    element: &BytesStart,
    options: &RewriteOptions,
) -> Result<Option<(BytesStart<'static>, PathConversion)>, RewriteError> {
    if element.name().as_ref() != options.tag.as_bytes() {
        return Ok(None);
    }

    let name = std::str::from_utf8(element.name().as_ref())
        .map_err(|e| RewriteError::Parse(e.to_string()))?
        .to_string();

    let mut rewritten = BytesStart::new(name);
    let mut conversion = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| RewriteError::Parse(e.to_string()))?;
        if conversion.is_none() && attr.key.as_ref() == options.attribute.as_bytes() {
            let original = attr
                .unescape_value()
                .map_err(|e| RewriteError::Parse(e.to_string()))?
                .into_owned();
            if let Some(converted) = strip_package_uris(&original, &options.scheme) {
                rewritten.push_attribute((options.attribute.as_str(), converted.as_str()));
                conversion = Some(PathConversion {
                    original,
                    converted,
                });
                continue;
            }
        }
        // Keep the original (still escaped) bytes for everything else
        rewritten.push_attribute(attr);
    }

    Ok(conversion.map(|c| (rewritten.into_owned(), c)))
}

/// Rewrite mesh paths in an XML document held in memory
pub fn rewrite_document(xml: &str, options: &RewriteOptions) -> Result<RewriteOutput, RewriteError> {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 64));

    let mut conversions = Vec::new();
    let mut declared = false;
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        let event = match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => event,
            Err(e) => {
                return Err(RewriteError::Parse(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        };

        if !declared {
            declared = true;
            write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
            if matches!(event, Event::Decl(_)) {
                continue;
            }
            write(&mut writer, Event::Text(BytesText::new("\n")))?;
        }

        let event = match event {
            Event::Decl(_) => {
                return Err(RewriteError::Parse(
                    "XML declaration is only allowed at the start".to_string(),
                ));
            }
            Event::Start(e) => {
                depth += 1;
                seen_root = true;
                match rewrite_element(&e, options)? {
                    Some((rewritten, conversion)) => {
                        log_conversion(&conversion);
                        conversions.push(conversion);
                        Event::Start(rewritten)
                    }
                    None => Event::Start(e),
                }
            }
            Event::Empty(e) => {
                seen_root = true;
                match rewrite_element(&e, options)? {
                    Some((rewritten, conversion)) => {
                        log_conversion(&conversion);
                        conversions.push(conversion);
                        Event::Empty(rewritten)
                    }
                    None => Event::Empty(e),
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                Event::End(e)
            }
            other => other,
        };

        write(&mut writer, event)?;
    }

    if depth != 0 {
        return Err(RewriteError::Parse(
            "unexpected end of document: unclosed element".to_string(),
        ));
    }
    if !seen_root {
        return Err(RewriteError::Parse("document has no root element".to_string()));
    }

    let xml = String::from_utf8(writer.into_inner()).map_err(|e| RewriteError::Write(e.to_string()))?;
    Ok(RewriteOutput { xml, conversions })
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), RewriteError> {
    writer
        .write_event(event)
        .map_err(|e| RewriteError::Write(e.to_string()))
}

fn log_conversion(conversion: &PathConversion) {
    tracing::info!("Converted: {} -> {}", conversion.original, conversion.converted);
}

/// Rewrite every package:// mesh path in a URDF/Xacro file
///
/// # Arguments
/// * `input` - URDF or Xacro file to read
/// * `output` - Destination file (overwritten; may be the same as `input`)
/// * `options` - Which tag/attribute/scheme to rewrite
///
/// # Returns
/// The conversions applied, in document order. Nothing is written when the
/// input is missing or cannot be parsed.
pub fn convert_urdf_paths(
    input: &Path,
    output: &Path,
    options: &RewriteOptions,
) -> Result<Vec<PathConversion>, RewriteError> {
    if !input.exists() {
        return Err(RewriteError::FileNotFound {
            path: input.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(input).map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => RewriteError::Parse(format!("input is not UTF-8: {}", e)),
        _ => RewriteError::Io(e.to_string()),
    })?;

    let RewriteOutput { xml, conversions } = rewrite_document(&content, options)?;

    std::fs::write(output, xml).map_err(|e| RewriteError::Write(e.to_string()))?;
    tracing::info!("Saved converted file to: {}", output.display());

    Ok(conversions)
}

/// Default output path next to the input: `robot.urdf` -> `robot_relative.urdf`
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("robot");
    let file_name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_relative.{}", stem, ext),
        None => format!("{}_relative", stem),
    };
    input.with_file_name(file_name)
}
