use anyhow::Result;
use url::Url;

/// Derive a destination filename from a URL path, falling back to a
/// generated name when the path has no usable last segment.
pub fn filename_from_url(url_str: &str) -> Result<String> {
    let url = Url::parse(url_str)?;

    if let Some(segments) = url.path_segments() {
        if let Some(name) = segments.last() {
            if !name.is_empty() {
                return Ok(name.to_string());
            }
        }
    }

    Ok(format!("download_{}", uuid::Uuid::new_v4()))
}

/// Extract the `filename=` parameter from a `Content-Disposition` header
/// value, if present.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .find_map(|part| part.trim().strip_prefix("filename="))
        .map(|name| name.trim().trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(
        |c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_',
        "_",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_comes_from_last_path_segment() {
        let name = filename_from_url("https://example.com/files/archive.tar.gz?sig=abc").unwrap();
        assert_eq!(name, "archive.tar.gz");
    }

    #[test]
    fn empty_path_gets_generated_name() {
        let name = filename_from_url("https://example.com/").unwrap();
        assert!(name.starts_with("download_"));
    }

    #[test]
    fn content_disposition_quoted_filename() {
        let name =
            filename_from_content_disposition(r#"attachment; filename="report v2.pdf""#).unwrap();
        assert_eq!(name, "report v2.pdf");
    }

    #[test]
    fn content_disposition_without_filename() {
        assert_eq!(filename_from_content_disposition("inline"), None);
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize_filename("a/b\\c d.txt"), "a_b_c_d.txt");
    }
}
