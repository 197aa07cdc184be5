//! Object store client: paginated folder and file enumeration plus public
//! URL formatting.
//!
//! The network side sits behind [`ListObjects`], one page per call, so the
//! pagination loop and key normalization run the same against S3 and
//! against an in-memory fake.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    Client as S3Client,
};
use serde::Serialize;

use crate::{
    error::{LookupError, Result},
    settings::StoreConfig,
};

pub const DELIMITER: &str = "/";

/// One `ListObjectsV2` request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: Option<String>,
    pub delimiter: String,
    pub continuation_token: Option<String>,
}

/// The fields of a `ListObjectsV2` response the client cares about.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub common_prefixes: Vec<String>,
    pub keys: Vec<String>,
    pub next_continuation_token: Option<String>,
    pub is_truncated: bool,
}

#[async_trait]
pub trait ListObjects: Send + Sync {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage>;
}

/// `ListObjects` over the AWS SDK, path-style addressing, static keys.
pub struct S3Lister {
    client: S3Client,
    bucket: String,
}

impl S3Lister {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: to_s3_client(config),
            bucket: config.bucket.clone(),
        }
    }
}

fn to_s3_client(config: &StoreConfig) -> S3Client {
    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        "s3-weburl",
    );

    let s3_config = aws_sdk_s3::config::Builder::new()
        .behavior_version_latest()
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(config.endpoint.clone())
        .force_path_style(true)
        .build();

    S3Client::from_conf(s3_config)
}

#[async_trait]
impl ListObjects for S3Lister {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(self.bucket.clone())
            .delimiter(request.delimiter.clone())
            .set_prefix(request.prefix.clone())
            .set_continuation_token(request.continuation_token.clone())
            .send()
            .await
            .map_err(|err| LookupError::StoreUnavailable(DisplayErrorContext(&err).to_string()))?;

        Ok(ListPage {
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|prefix| prefix.prefix().map(str::to_string))
                .collect(),
            keys: output
                .contents()
                .iter()
                .filter_map(|item| item.key().map(str::to_string))
                .collect(),
            next_continuation_token: output.next_continuation_token().map(str::to_string),
            is_truncated: output.is_truncated().unwrap_or(false),
        })
    }
}

/// A common prefix ending in the delimiter, e.g. `photos/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub prefix: String,
}

impl Folder {
    pub fn display_name(&self) -> &str {
        self.prefix.trim_end_matches(DELIMITER)
    }
}

/// An object directly under a folder, with the folder prefix stripped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
}

impl FileEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Formats `{endpoint}/{bucket}/{key}` links.
#[derive(Clone, Debug)]
pub struct PublicUrls {
    base: String,
}

impl PublicUrls {
    pub fn new(endpoint: &str, bucket: &str) -> Self {
        Self {
            base: format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
        }
    }

    pub fn for_key(&self, key: &str) -> String {
        format!("{}/{key}", self.base)
    }

    pub fn for_file(&self, folder_prefix: &str, file: &FileEntry) -> String {
        format!("{}/{folder_prefix}{}", self.base, file.name)
    }
}

pub struct ObjectStore {
    lister: Box<dyn ListObjects>,
    urls: PublicUrls,
}

impl ObjectStore {
    pub fn new(lister: Box<dyn ListObjects>, urls: PublicUrls) -> Self {
        Self { lister, urls }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            Box::new(S3Lister::new(config)),
            PublicUrls::new(&config.endpoint, &config.bucket),
        )
    }

    pub fn urls(&self) -> &PublicUrls {
        &self.urls
    }

    /// Follows continuation tokens until the store reports the listing is
    /// complete. Any failed page (or a raised cancel flag) aborts the loop
    /// and the pages fetched so far are dropped.
    async fn list_all(
        &self,
        prefix: Option<&str>,
        cancel_flag: &AtomicBool,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut request = ListRequest {
            prefix: prefix.map(str::to_string),
            delimiter: DELIMITER.to_string(),
            continuation_token: None,
        };
        let mut common_prefixes = Vec::new();
        let mut keys = Vec::new();
        let mut page_count = 0usize;

        loop {
            if cancel_flag.load(Ordering::SeqCst) {
                tracing::debug!(prefix = ?prefix, page_count, "listing cancelled");
                return Err(LookupError::Cancelled);
            }

            let page = self.lister.list_page(&request).await.inspect_err(|err| {
                tracing::warn!(prefix = ?prefix, page_count, error = %err, "listing page failed");
            })?;
            page_count += 1;
            tracing::debug!(
                prefix = ?prefix,
                page = page_count,
                prefixes = page.common_prefixes.len(),
                keys = page.keys.len(),
                "listing page fetched"
            );

            common_prefixes.extend(page.common_prefixes);
            keys.extend(page.keys);

            if !page.is_truncated {
                break;
            }
            match page.next_continuation_token {
                Some(token) => request.continuation_token = Some(token),
                None => {
                    tracing::warn!(prefix = ?prefix, "truncated page without continuation token");
                    break;
                }
            }
        }

        // Superseded while the last page was in flight.
        if cancel_flag.load(Ordering::SeqCst) {
            tracing::debug!(prefix = ?prefix, page_count, "listing cancelled after last page");
            return Err(LookupError::Cancelled);
        }

        Ok((common_prefixes, keys))
    }

    pub async fn list_folders(&self, cancel_flag: &AtomicBool) -> Result<Vec<Folder>> {
        let (prefixes, _) = self.list_all(None, cancel_flag).await?;
        Ok(prefixes
            .into_iter()
            .map(|prefix| Folder { prefix })
            .collect())
    }

    /// Files directly under `folder_prefix`. Nested folders are grouped away
    /// by the delimiter, and the folder marker object itself is skipped.
    pub async fn list_files(
        &self,
        folder_prefix: &str,
        cancel_flag: &AtomicBool,
    ) -> Result<Vec<FileEntry>> {
        let (_, keys) = self.list_all(Some(folder_prefix), cancel_flag).await?;
        Ok(keys
            .iter()
            .filter(|key| !key.ends_with(DELIMITER))
            .filter_map(|key| key.strip_prefix(folder_prefix))
            .filter(|name| !name.is_empty())
            .map(FileEntry::new)
            .collect())
    }

    pub fn public_url_for(&self, key: &str) -> String {
        self.urls.for_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct PagedLister {
        pages: Vec<ListPage>,
        requests: Arc<Mutex<Vec<ListRequest>>>,
        fail_at: Option<usize>,
    }

    impl PagedLister {
        fn new(pages: Vec<ListPage>) -> Self {
            Self {
                pages,
                requests: Arc::new(Mutex::new(Vec::new())),
                fail_at: None,
            }
        }
    }

    #[async_trait]
    impl ListObjects for PagedLister {
        async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
            let mut requests = self.requests.lock().unwrap();
            let index = requests.len();
            requests.push(request.clone());
            if self.fail_at == Some(index) {
                return Err(LookupError::StoreUnavailable("connection reset".into()));
            }
            Ok(self.pages[index].clone())
        }
    }

    fn page(prefixes: &[&str], keys: &[&str], next: Option<&str>) -> ListPage {
        ListPage {
            common_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            next_continuation_token: next.map(str::to_string),
            is_truncated: next.is_some(),
        }
    }

    fn store(lister: PagedLister) -> ObjectStore {
        ObjectStore::new(
            Box::new(lister),
            PublicUrls::new("https://storage.example.com", "media"),
        )
    }

    #[tokio::test]
    async fn folders_accumulate_across_pages() {
        let lister = PagedLister::new(vec![
            page(&["a/", "b/"], &[], Some("t1")),
            page(&["c/"], &[], Some("t2")),
            page(&["d/"], &["root.txt"], None),
        ]);
        let store = store(lister);
        let folders = store.list_folders(&AtomicBool::new(false)).await.unwrap();
        let names: Vec<_> = folders.iter().map(|f| f.prefix.as_str()).collect();
        assert_eq!(names, vec!["a/", "b/", "c/", "d/"]);
    }

    #[tokio::test]
    async fn continuation_token_is_resubmitted() {
        let lister = PagedLister::new(vec![
            page(&[], &["docs/x.pdf"], Some("t1")),
            page(&[], &["docs/y.pdf"], None),
        ]);
        let requests = Arc::clone(&lister.requests);
        let store = store(lister);
        store
            .list_files("docs/", &AtomicBool::new(false))
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].continuation_token, None);
        assert_eq!(requests[1].continuation_token.as_deref(), Some("t1"));
        assert_eq!(requests[1].prefix.as_deref(), Some("docs/"));
        assert_eq!(requests[1].delimiter, DELIMITER);
    }

    #[tokio::test]
    async fn failed_page_discards_everything() {
        let mut lister = PagedLister::new(vec![
            page(&["a/"], &[], Some("t1")),
            page(&["b/"], &[], None),
        ]);
        lister.fail_at = Some(1);
        let store = store(lister);
        let err = store.list_folders(&AtomicBool::new(false)).await.unwrap_err();
        assert!(matches!(err, LookupError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn raised_flag_cancels_before_request() {
        let store = store(PagedLister::new(vec![page(&["a/"], &[], None)]));
        let err = store.list_folders(&AtomicBool::new(true)).await.unwrap_err();
        assert!(matches!(err, LookupError::Cancelled));
    }

    struct CancellingLister {
        flag: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ListObjects for CancellingLister {
        async fn list_page(&self, _request: &ListRequest) -> Result<ListPage> {
            self.flag.store(true, Ordering::SeqCst);
            Ok(page(&[], &["docs/a.pdf"], None))
        }
    }

    #[tokio::test]
    async fn flag_raised_during_last_page_cancels() {
        let flag = Arc::new(AtomicBool::new(false));
        let store = ObjectStore::new(
            Box::new(CancellingLister {
                flag: Arc::clone(&flag),
            }),
            PublicUrls::new("https://storage.example.com", "media"),
        );
        let err = store.list_files("docs/", &flag).await.unwrap_err();
        assert!(matches!(err, LookupError::Cancelled));
    }

    #[tokio::test]
    async fn files_strip_prefix_and_skip_marker() {
        let store = store(PagedLister::new(vec![
            page(&["docs/nested/"], &["docs/", "docs/Report.pdf"], Some("t1")),
            page(&[], &["docs/logo_1.png"], None),
        ]));
        let files = store
            .list_files("docs/", &AtomicBool::new(false))
            .await
            .unwrap();
        assert_eq!(
            files,
            vec![FileEntry::new("Report.pdf"), FileEntry::new("logo_1.png")]
        );
    }

    #[tokio::test]
    async fn truncated_page_without_token_stops() {
        let mut broken = page(&["a/"], &[], None);
        broken.is_truncated = true;
        let store = store(PagedLister::new(vec![broken]));
        let folders = store.list_folders(&AtomicBool::new(false)).await.unwrap();
        assert_eq!(folders.len(), 1);
    }

    #[test]
    fn public_urls_are_path_style() {
        let urls = PublicUrls::new("https://storage.example.com/", "media");
        assert_eq!(
            urls.for_key("docs/Report.pdf"),
            "https://storage.example.com/media/docs/Report.pdf"
        );
        assert_eq!(
            urls.for_file("docs/", &FileEntry::new("a.png")),
            "https://storage.example.com/media/docs/a.png"
        );
    }

    #[test]
    fn folder_display_name_trims_delimiter() {
        let folder = Folder {
            prefix: "photos/".into(),
        };
        assert_eq!(folder.display_name(), "photos");
    }
}
