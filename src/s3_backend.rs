use crate::error::BrowseError;
use crate::models::{Entry, FileEntry, FolderEntry, ListingPage, ListingRequest};
use crate::object_store::{ByteStream, ObjectHead, ObjectStore};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use url::Url;

/// Anonymous, path-style access to an S3-compatible endpoint.
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    endpoint: Url,
}

impl S3Backend {
    pub fn new(endpoint_url: &str) -> Result<Self, BrowseError> {
        let endpoint = Url::parse(endpoint_url)
            .map_err(|e| BrowseError::Config(format!("invalid endpoint URL {endpoint_url}: {e}")))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| BrowseError::Config(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    fn bucket_url(&self, bucket: &str) -> Result<Url, BrowseError> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/{}", base, urlencoding::encode(bucket)))
            .map_err(|e| BrowseError::Config(e.to_string()))
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, BrowseError> {
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let base = self.bucket_url(bucket)?;
        Url::parse(&format!("{}/{}", base.as_str(), encoded_key))
            .map_err(|e| BrowseError::Config(e.to_string()))
    }

    fn list_url(&self, request: &ListingRequest) -> Result<Url, BrowseError> {
        let mut url = self.bucket_url(&request.bucket)?;
        // S3 wants %20 rather than form-style '+'
        let mut query = format!(
            "list-type=2&delimiter=%2F&prefix={}&max-keys={}",
            urlencoding::encode(&request.prefix),
            request.page_size
        );
        if let Some(token) = &request.page_token {
            query.push_str("&continuation-token=");
            query.push_str(&urlencoding::encode(token));
        }
        url.set_query(Some(&query));
        Ok(url)
    }

    async fn check_status(response: Response, what: &str) -> Result<Response, BrowseError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = match parse_error_response(&body) {
            Some((code, message)) => format!("{what}: {code}: {message}"),
            None => format!("{what}: HTTP {status}"),
        };

        Err(match status {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => BrowseError::AccessDenied(detail),
            StatusCode::NOT_FOUND => BrowseError::NotFound(detail),
            _ => BrowseError::Network(detail),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    async fn list_objects(&self, request: &ListingRequest) -> Result<ListingPage, BrowseError> {
        let url = self.list_url(request)?;
        tracing::debug!(
            "ListObjectsV2 bucket={} prefix={:?} token={}",
            request.bucket,
            request.prefix,
            request.page_token.is_some()
        );

        let response = self.client.get(url).send().await?;
        let response =
            Self::check_status(response, &format!("listing {}/{}", request.bucket, request.prefix))
                .await?;
        let xml = response.text().await?;

        parse_list_response(&xml, &request.prefix)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, BrowseError> {
        let url = self.object_url(bucket, key)?;
        let response = self.client.head(url).send().await?;
        let response = Self::check_status(response, &format!("head {bucket}/{key}")).await?;

        let size_bytes = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                BrowseError::Network(format!("head {bucket}/{key}: missing Content-Length"))
            })?;
        Ok(ObjectHead { size_bytes })
    }

    async fn open_object(&self, bucket: &str, key: &str) -> Result<ByteStream, BrowseError> {
        let url = self.object_url(bucket, key)?;
        let response = self.client.get(url).send().await?;
        let response = Self::check_status(response, &format!("get {bucket}/{key}")).await?;

        Ok(Box::pin(response.bytes_stream().map_err(BrowseError::from)))
    }
}

#[derive(Default)]
struct ContentsItem {
    key: Option<String>,
    size: u64,
    last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Key,
    Size,
    LastModified,
    Prefix,
    IsTruncated,
    NextToken,
}

/// Parse a `ListBucketResult` document, keeping entries in document order.
fn parse_list_response(xml: &str, prefix: &str) -> Result<ListingPage, BrowseError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut entries = Vec::new();
    let mut is_truncated = false;
    let mut next_token: Option<String> = None;

    let mut contents: Option<ContentsItem> = None;
    let mut common_prefix: Option<String> = None;
    let mut in_common_prefixes = false;
    let mut field = Field::None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match name.local_name().as_ref() {
                    b"Contents" => contents = Some(ContentsItem::default()),
                    b"CommonPrefixes" => in_common_prefixes = true,
                    b"Key" if contents.is_some() => field = Field::Key,
                    b"Size" if contents.is_some() => field = Field::Size,
                    b"LastModified" if contents.is_some() => field = Field::LastModified,
                    b"Prefix" if in_common_prefixes => field = Field::Prefix,
                    b"IsTruncated" => field = Field::IsTruncated,
                    b"NextContinuationToken" => field = Field::NextToken,
                    _ => field = Field::None,
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| BrowseError::Network(format!("malformed listing: {e}")))?;
                match field {
                    Field::Key => {
                        if let Some(item) = contents.as_mut() {
                            item.key = Some(text.into_owned());
                        }
                    }
                    Field::Size => {
                        if let Some(item) = contents.as_mut() {
                            item.size = text.parse().unwrap_or(0);
                        }
                    }
                    Field::LastModified => {
                        if let Some(item) = contents.as_mut() {
                            item.last_modified = chrono::DateTime::parse_from_rfc3339(&text)
                                .ok()
                                .map(|dt| dt.with_timezone(&chrono::Utc));
                        }
                    }
                    Field::Prefix => common_prefix = Some(text.into_owned()),
                    Field::IsTruncated => is_truncated = text.eq_ignore_ascii_case("true"),
                    Field::NextToken => next_token = Some(text.into_owned()),
                    Field::None => {}
                }
            }
            Ok(Event::End(e)) => {
                field = Field::None;
                let name = e.name();
                match name.local_name().as_ref() {
                    b"Contents" => {
                        if let Some(ContentsItem {
                            key: Some(key),
                            size,
                            last_modified,
                        }) = contents.take()
                        {
                            // The prefix object itself and directory markers are not files
                            if key != prefix && !key.ends_with('/') {
                                entries.push(Entry::File(FileEntry::new(
                                    &key,
                                    size,
                                    last_modified,
                                )));
                            }
                        }
                    }
                    b"CommonPrefixes" => {
                        in_common_prefixes = false;
                        if let Some(p) = common_prefix.take() {
                            entries.push(Entry::Folder(FolderEntry::from_prefix(&p)));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(BrowseError::Network(format!(
                    "malformed listing at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(ListingPage::new(entries, is_truncated, next_token))
}

/// Extract `Code` and `Message` from an S3 `<Error>` document.
fn parse_error_response(xml: &str) -> Option<(String, String)> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut code = None;
    let mut message = String::new();
    let mut current: Option<Vec<u8>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => current = Some(e.local_name().as_ref().to_vec()),
            Ok(Event::Text(e)) => {
                let text = e.unescape().ok()?.into_owned();
                match current.as_deref() {
                    Some(b"Code") => code = Some(text),
                    Some(b"Message") => message = text,
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    code.map(|c| (c, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUNCATED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>public-data</Name>
  <Prefix>raw/</Prefix>
  <KeyCount>4</KeyCount>
  <MaxKeys>4</MaxKeys>
  <Delimiter>/</Delimiter>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=</NextContinuationToken>
  <Contents>
    <Key>raw/</Key>
    <LastModified>2024-03-01T10:00:00.000Z</LastModified>
    <Size>0</Size>
  </Contents>
  <Contents>
    <Key>raw/notes &amp; todo.md</Key>
    <LastModified>2024-03-01T10:05:00.000Z</LastModified>
    <ETag>"abc"</ETag>
    <Size>2048</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <CommonPrefixes>
    <Prefix>raw/images/</Prefix>
  </CommonPrefixes>
  <CommonPrefixes>
    <Prefix>raw/tables/</Prefix>
  </CommonPrefixes>
</ListBucketResult>"#;

    #[test]
    fn test_parse_truncated_listing() {
        let page = parse_list_response(TRUNCATED, "raw/").unwrap();

        assert!(page.is_truncated());
        assert_eq!(
            page.next_token(),
            Some("1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=")
        );
        assert_eq!(page.entries().len(), 3);

        match &page.entries()[0] {
            Entry::File(file) => {
                assert_eq!(file.key, "raw/notes & todo.md");
                assert_eq!(file.name, "notes & todo.md");
                assert_eq!(file.size_bytes, 2048);
                assert_eq!(file.extension, "md");
                assert!(file.last_modified.is_some());
            }
            other => panic!("expected file, got {other:?}"),
        }
        assert_eq!(
            page.entries()[1],
            Entry::Folder(FolderEntry::from_prefix("raw/images/"))
        );
        assert_eq!(
            page.entries()[2],
            Entry::Folder(FolderEntry::from_prefix("raw/tables/"))
        );
    }

    #[test]
    fn test_parse_last_page() {
        let xml = r#"<ListBucketResult>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>a.csv</Key><Size>12</Size></Contents>
</ListBucketResult>"#;
        let page = parse_list_response(xml, "").unwrap();
        assert!(!page.is_truncated());
        assert_eq!(page.next_token(), None);
        assert_eq!(page.entries().len(), 1);
    }

    #[test]
    fn test_parse_malformed_listing() {
        let result = parse_list_response("<ListBucketResult><Contents></Key>", "");
        assert!(matches!(result, Err(BrowseError::Network(_))));
    }

    #[test]
    fn test_parse_error_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchBucket</Code><Message>The specified bucket does not exist</Message></Error>"#;
        assert_eq!(
            parse_error_response(xml),
            Some((
                "NoSuchBucket".to_string(),
                "The specified bucket does not exist".to_string()
            ))
        );
        assert_eq!(parse_error_response("not xml at all"), None);
    }

    #[test]
    fn test_urls() {
        let backend = S3Backend::new("https://s3.example.org/").unwrap();
        let url = backend
            .object_url("bucket", "dir one/file#1.txt")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://s3.example.org/bucket/dir%20one/file%231.txt"
        );

        let request = ListingRequest {
            bucket: "bucket".into(),
            prefix: "a b/".into(),
            page_token: Some("t+1/=".into()),
            page_size: 50,
        };
        let url = backend.list_url(&request).unwrap();
        assert!(url.as_str().contains("prefix=a%20b%2F"));
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("prefix".into(), "a b/".into())));
        assert!(pairs.contains(&("continuation-token".into(), "t+1/=".into())));
        assert!(pairs.contains(&("max-keys".into(), "50".into())));
        assert!(pairs.contains(&("list-type".into(), "2".into())));
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            S3Backend::new("not a url"),
            Err(BrowseError::Config(_))
        ));
    }
}
