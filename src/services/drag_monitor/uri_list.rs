use crate::events::DragItem;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// Разобрать `text/uri-list`: по одному URI на строку, `#` - комментарий.
/// Берутся только локальные `file://` URI и голые абсолютные пути.
pub fn parse_uri_list(text: &str) -> Vec<DragItem> {
    text.lines()
        .map(|line| line.trim_end_matches('\r').trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(uri_to_path)
        .map(DragItem::from_path)
        .collect()
}

fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let encoded = if let Some(rest) = uri.strip_prefix("file://") {
        // file:///path или file://localhost/path
        let slash = rest.find('/')?;
        let host = &rest[..slash];
        if !host.is_empty() && host != "localhost" {
            return None;
        }
        &rest[slash..]
    } else if uri.starts_with('/') {
        uri
    } else {
        return None;
    };

    let bytes = urlencoding::decode_binary(encoded.as_bytes());
    Some(PathBuf::from(OsStr::from_bytes(&bytes)))
}
