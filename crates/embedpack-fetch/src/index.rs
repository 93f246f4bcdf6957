use log::debug;

const PACKAGE_INDEX_URL: &str = "https://pypi.org/simple";

/// A wheel file resolved from a package-index listing: the download URL
/// and the file name to store it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelRef {
    pub file_name: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("package index listing for {package} failed with HTTP {status}")]
    Status {
        package: String,
        status: reqwest::StatusCode,
    },
    #[error("no wheel entry for {package} in index listing")]
    NoWheel { package: String },
    #[error("malformed wheel entry for {package}: {line}")]
    MalformedEntry { package: String, line: String },
}

/// Resolve the latest wheel for `package` by scraping the index's "simple"
/// HTML listing.
///
/// # Errors
/// Returns an error if the listing cannot be fetched or contains no
/// parseable wheel entry.
pub async fn resolve_latest_wheel(
    client: &reqwest::Client,
    package: &str,
) -> Result<WheelRef, IndexError> {
    let url = format!("{PACKAGE_INDEX_URL}/{package}/");
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| IndexError::Request {
            url: url.clone(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(IndexError::Status {
            package: package.to_string(),
            status: response.status(),
        });
    }

    let listing = response.text().await.map_err(|source| IndexError::Request {
        url: url.clone(),
        source,
    })?;

    let wheel = parse_wheel_listing(&listing, package)?;
    debug!("resolved {package} to {}", wheel.file_name);
    Ok(wheel)
}

/// Pick the last wheel entry for `package` out of a "simple" listing page.
///
/// The listing is one anchor per line; entries are ordered oldest to
/// newest, so the last line mentioning the package, `whl`, and an `href`
/// attribute is the latest release.
///
/// # Errors
/// Returns an error when no line matches or the matching line has no
/// parseable href/file name.
pub fn parse_wheel_listing(listing: &str, package: &str) -> Result<WheelRef, IndexError> {
    let line = listing
        .lines()
        .filter(|line| line.contains(package) && line.contains("whl") && line.contains("href="))
        .next_back()
        .ok_or_else(|| IndexError::NoWheel {
            package: package.to_string(),
        })?;

    parse_anchor(line).ok_or_else(|| IndexError::MalformedEntry {
        package: package.to_string(),
        line: line.trim().to_string(),
    })
}

/// Pull the href URL and the anchor text (the wheel file name) out of a
/// single `<a href="...">name</a>` listing line.
fn parse_anchor(line: &str) -> Option<WheelRef> {
    let href_start = line.find("href=\"")? + "href=\"".len();
    let href_end = line[href_start..].find('"')? + href_start;
    let url = &line[href_start..href_end];

    let text_start = line[href_end..].find('>')? + href_end + 1;
    let text_end = line[text_start..].find('<')? + text_start;
    let file_name = line[text_start..text_end].trim();

    if url.is_empty() || file_name.is_empty() {
        return None;
    }

    Some(WheelRef {
        file_name: file_name.to_string(),
        url: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{IndexError, parse_wheel_listing};

    const LISTING: &str = r#"<!DOCTYPE html>
<html>
  <body>
    <a href="https://files.invalid/packages/pip-20.0.1.tar.gz#sha256=aaaa">pip-20.0.1.tar.gz</a><br/>
    <a href="https://files.invalid/packages/pip-20.0.1-py2.py3-none-any.whl#sha256=bbbb">pip-20.0.1-py2.py3-none-any.whl</a><br/>
    <a href="https://files.invalid/packages/pip-21.3.1-py3-none-any.whl#sha256=cccc">pip-21.3.1-py3-none-any.whl</a><br/>
  </body>
</html>"#;

    #[test]
    fn takes_the_last_wheel_entry() {
        let wheel = parse_wheel_listing(LISTING, "pip").unwrap();
        assert_eq!(wheel.file_name, "pip-21.3.1-py3-none-any.whl");
        assert_eq!(
            wheel.url,
            "https://files.invalid/packages/pip-21.3.1-py3-none-any.whl#sha256=cccc"
        );
    }

    #[test]
    fn ignores_non_wheel_entries() {
        let listing = r#"<a href="https://files.invalid/pip-20.0.1.tar.gz">pip-20.0.1.tar.gz</a>"#;
        let result = parse_wheel_listing(listing, "pip");
        assert!(matches!(result, Err(IndexError::NoWheel { .. })));
    }

    #[test]
    fn empty_listing_is_an_error() {
        let result = parse_wheel_listing("", "setuptools");
        assert!(matches!(result, Err(IndexError::NoWheel { ref package }) if package == "setuptools"));
    }

    #[test]
    fn anchor_without_href_quotes_is_malformed() {
        let listing = "whl pip href= broken line";
        let result = parse_wheel_listing(listing, "pip");
        assert!(matches!(result, Err(IndexError::MalformedEntry { .. })));
    }
}
