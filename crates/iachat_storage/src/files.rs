use mime::Mime;
use unicode_normalization::UnicodeNormalization;

const FALLBACK_NAME: &str = "file";

/// Reduces a client-supplied filename to something safe to join onto the
/// upload directory: no path components, accents folded to their base letter,
/// ASCII alphanumerics plus `._-` only, whitespace folded to `_`, no leading
/// dots.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    let mut cleaned = String::with_capacity(base.len());
    for ch in base.nfkd() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
            cleaned.push(ch);
        } else if ch.is_whitespace() {
            cleaned.push('_');
        }
    }

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c == '_');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn media_type_for(file_name: &str) -> Mime {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "md" | "py" | "rs" | "ts" | "sql" | "ini" | "cfg" | "toml" | "yml" | "yaml" => {
            mime::TEXT_PLAIN_UTF_8
        }
        "csv" => mime::TEXT_CSV_UTF_8,
        "html" | "htm" => mime::TEXT_HTML_UTF_8,
        "css" => mime::TEXT_CSS_UTF_8,
        "js" => mime::APPLICATION_JAVASCRIPT_UTF_8,
        "xml" => mime::TEXT_XML,
        "json" => mime::APPLICATION_JSON,
        "pdf" => mime::APPLICATION_PDF,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "svg" => mime::IMAGE_SVG,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
