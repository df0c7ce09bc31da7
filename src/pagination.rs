//! Offset and cursor pagination shared by every list endpoint.
//!
//! A [`PageRequest`] with `page` set selects offset mode; otherwise cursor mode
//! is used. Record sources only need to answer a [`PageQuery`] and count their
//! rows, so posts, comments, chats and messages all go through
//! [`Paginator::paginate`].

use serde::{Deserialize, Serialize};
use std::future::Future;
use url::Url;

pub const DEFAULT_TAKE: u32 = 20;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

fn default_take() -> u32 {
    DEFAULT_TAKE
}

/// Query parameters accepted by list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: Option<u32>,
    pub cursor_id: Option<i64>,
    #[serde(default)]
    pub order: Order,
    #[serde(default = "default_take")]
    pub take: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: None,
            cursor_id: None,
            order: Order::Asc,
            take: DEFAULT_TAKE,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PageRequestError {
    TakeNotPositive,
    PageNotPositive,
}

impl std::fmt::Display for PageRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageRequestError::TakeNotPositive => write!(f, "take must be a positive integer"),
            PageRequestError::PageNotPositive => write!(f, "page must be a positive integer"),
        }
    }
}

impl std::error::Error for PageRequestError {}

impl PageRequest {
    pub fn validate(&self) -> Result<(), PageRequestError> {
        if self.take == 0 {
            return Err(PageRequestError::TakeNotPositive);
        }
        if self.page == Some(0) {
            return Err(PageRequestError::PageNotPositive);
        }
        Ok(())
    }
}

/// Keyset bound on the id column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdBound {
    /// `id > n`
    After(i64),
    /// `id < n`
    Before(i64),
}

impl IdBound {
    pub fn admits(&self, id: i64) -> bool {
        match *self {
            IdBound::After(n) => id > n,
            IdBound::Before(n) => id < n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    CreatedAtThenId,
}

/// What a record source is asked to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub id_bound: Option<IdBound>,
    pub sort: SortKey,
    pub order: Order,
    pub offset: u64,
    pub limit: u64,
}

/// Records with a stable, monotonically assigned id.
pub trait Identified {
    fn id(&self) -> i64;
}

/// A filtered collection that can be fetched in pages.
pub trait RecordSource {
    type Item: Identified + Send;
    type Error;

    fn fetch(
        &self,
        query: &PageQuery,
    ) -> impl Future<Output = Result<Vec<Self::Item>, Self::Error>> + Send;

    /// Total rows matching the source's filter, ignoring paging.
    fn count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffsetPage<T> {
    pub data: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub data: Vec<T>,
    pub count: usize,
    pub cursor_id: Option<i64>,
    pub has_next_page: bool,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Page<T> {
    Offset(OffsetPage<T>),
    Cursor(CursorPage<T>),
}

/// Builds pages and their continuation links against a public base URL.
#[derive(Debug, Clone)]
pub struct Paginator {
    base_url: Url,
}

impl Paginator {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch one page of `source`. `path` is the collection path used for the `next` link.
    pub async fn paginate<S: RecordSource>(
        &self,
        request: &PageRequest,
        source: &S,
        path: &str,
    ) -> Result<Page<S::Item>, S::Error> {
        match request.page {
            Some(page) => self.offset_page(request, page, source).await.map(Page::Offset),
            None => self.cursor_page(request, source, path).await.map(Page::Cursor),
        }
    }

    async fn offset_page<S: RecordSource>(
        &self,
        request: &PageRequest,
        page: u32,
        source: &S,
    ) -> Result<OffsetPage<S::Item>, S::Error> {
        let take = u64::from(request.take);
        let query = PageQuery {
            id_bound: None,
            sort: SortKey::CreatedAtThenId,
            order: request.order,
            offset: take * u64::from(page.saturating_sub(1)),
            limit: take,
        };

        let data = source.fetch(&query).await?;
        let total = source.count().await?;

        Ok(OffsetPage { data, total })
    }

    async fn cursor_page<S: RecordSource>(
        &self,
        request: &PageRequest,
        source: &S,
        path: &str,
    ) -> Result<CursorPage<S::Item>, S::Error> {
        let take = request.take as usize;
        let id_bound = request.cursor_id.map(|id| match request.order {
            Order::Asc => IdBound::After(id),
            Order::Desc => IdBound::Before(id),
        });

        // One extra row tells us whether another page exists
        let query = PageQuery {
            id_bound,
            sort: SortKey::Id,
            order: request.order,
            offset: 0,
            limit: u64::from(request.take) + 1,
        };

        let mut data = source.fetch(&query).await?;
        let has_next_page = data.len() > take;
        if has_next_page {
            data.truncate(take);
        }

        let cursor_id = if has_next_page {
            data.last().map(Identified::id)
        } else {
            None
        };
        let next = cursor_id.map(|id| self.next_link(path, request, id).to_string());

        Ok(CursorPage {
            count: data.len(),
            data,
            cursor_id,
            has_next_page,
            next,
        })
    }

    /// Continuation URL: `cursorId` set to `cursor_id`, every other non-null field echoed.
    pub fn next_link(&self, path: &str, request: &PageRequest, cursor_id: i64) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);

        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("cursorId", &cursor_id.to_string());
            if let Some(page) = request.page {
                query.append_pair("page", &page.to_string());
            }
            query.append_pair("order", request.order.as_str());
            query.append_pair("take", &request.take.to_string());
        }

        url
    }
}
