use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use tokio::sync::Notify;

use s3_weburl_lib::{
    ListObjects, ListPage, ListRequest, LookupError, ObjectStore, PublicUrls, Result, Session,
};

pub const ENDPOINT: &str = "https://storage.example.com";
pub const BUCKET: &str = "media";

type Pages = Vec<(Vec<String>, Vec<String>)>;

#[derive(Default)]
struct State {
    listings: Mutex<HashMap<String, Pages>>,
    requests: Mutex<Vec<ListRequest>>,
    failing: AtomicBool,
    held_prefix: Mutex<Option<String>>,
    started: Notify,
    release: Notify,
}

/// In-memory bucket answering `ListObjectsV2` pages from a script.
#[derive(Clone, Default)]
pub struct FakeBucket {
    state: Arc<State>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl FakeBucket {
    /// `prefix` is `""` for the bucket root. Each tuple is one page of
    /// (common prefixes, keys).
    pub fn set_pages(&self, prefix: &str, pages: &[(&[&str], &[&str])]) {
        let pages = pages
            .iter()
            .map(|(prefixes, keys)| (owned(prefixes), owned(keys)))
            .collect();
        self.state
            .listings
            .lock()
            .unwrap()
            .insert(prefix.to_string(), pages);
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// The first page for `prefix` waits until [`FakeBucket::release`].
    pub fn hold_first_page(&self, prefix: &str) {
        *self.state.held_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub async fn wait_started(&self) {
        self.state.started.notified().await;
    }

    pub fn release(&self) {
        self.state.release.notify_one();
    }

    pub fn requests_for(&self, prefix: &str) -> usize {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.prefix.as_deref().unwrap_or("") == prefix)
            .count()
    }

    pub fn session(&self) -> Session {
        Session::new(ObjectStore::new(
            Box::new(self.clone()),
            PublicUrls::new(ENDPOINT, BUCKET),
        ))
    }
}

#[async_trait]
impl ListObjects for FakeBucket {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        self.state.requests.lock().unwrap().push(request.clone());
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(LookupError::StoreUnavailable("403 Forbidden".to_string()));
        }

        let prefix = request.prefix.clone().unwrap_or_default();
        let index: usize = request
            .continuation_token
            .as_deref()
            .and_then(|token| token.strip_prefix("page-"))
            .and_then(|number| number.parse().ok())
            .unwrap_or(0);

        let held = index == 0
            && self.state.held_prefix.lock().unwrap().as_deref() == Some(prefix.as_str());
        if held {
            self.state.started.notify_one();
            self.state.release.notified().await;
        }

        let pages = self
            .state
            .listings
            .lock()
            .unwrap()
            .get(&prefix)
            .cloned()
            .unwrap_or_default();
        let (common_prefixes, keys) = pages.get(index).cloned().unwrap_or_default();
        let has_more = index + 1 < pages.len();
        tokio::task::yield_now().await;

        Ok(ListPage {
            common_prefixes,
            keys,
            next_continuation_token: has_more.then(|| format!("page-{}", index + 1)),
            is_truncated: has_more,
        })
    }
}
