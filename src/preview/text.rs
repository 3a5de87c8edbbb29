use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use super::PreviewResult;

/// Characters of text returned to the viewer.
pub const TEXT_PREVIEW_CHARS: usize = 10_000;

const SNIFF_BYTES: usize = 8 * 1024;

pub fn preview_text(extension: &str, body: &[u8]) -> PreviewResult {
    if body[..body.len().min(SNIFF_BYTES)].contains(&0) {
        return PreviewResult::Binary;
    }
    let text = match std::str::from_utf8(body) {
        Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text),
        Err(_) => return PreviewResult::Binary,
    };
    // Bodies that already went through a lossy conversion somewhere upstream
    if text.contains('\u{fffd}') {
        return PreviewResult::Binary;
    }

    let formatted = match extension {
        "json" => pretty_json(text),
        "xml" => pretty_xml(text),
        _ => None,
    };
    let full = formatted.as_deref().unwrap_or(text);
    let (content, truncated) = truncate_chars(full, TEXT_PREVIEW_CHARS);

    PreviewResult::Text {
        content,
        language: language_for(extension).to_string(),
        truncated,
    }
}

fn pretty_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

fn pretty_xml(text: &str) -> Option<String> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => writer.write_event(event).ok()?,
            Err(_) => return None,
        }
    }

    String::from_utf8(writer.into_inner()).ok()
}

fn truncate_chars(text: &str, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text.to_string(), false),
    }
}

pub fn language_for(extension: &str) -> &'static str {
    match extension {
        "json" => "json",
        "xml" => "xml",
        "html" | "htm" => "html",
        "css" => "css",
        "js" => "javascript",
        "ts" => "typescript",
        "py" => "python",
        "md" => "markdown",
        "r" => "r",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "ini" | "cfg" => "ini",
        "sh" => "shell",
        "rs" => "rust",
        "sql" => "sql",
        _ => "plaintext",
    }
}
