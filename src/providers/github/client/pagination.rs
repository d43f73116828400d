use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use log::debug;
use reqwest::RequestBuilder;

use super::core::GitHubClient;
use crate::error::{FlowLensError, Result};

/// Position of the next page to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// 1-based REST page number
    Page(u32),
    /// GraphQL `endCursor` of the previous page
    After(String),
}

#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Rest,
    GraphQl,
}

/// One paginated collection exposed by the API.
pub trait Listing {
    type Item;

    /// Human-readable name used in logs.
    fn describe(&self) -> String;

    fn endpoint(&self) -> Endpoint;

    fn request(&self, client: &GitHubClient, cursor: Option<&Cursor>) -> Result<RequestBuilder>;

    fn parse(&self, body: &str, cursor: Option<&Cursor>, page_size: u32) -> Result<Page<Self::Item>>;
}

/// Page number a REST request should ask for.
pub fn page_number(cursor: Option<&Cursor>) -> u32 {
    match cursor {
        Some(Cursor::Page(n)) => *n,
        _ => 1,
    }
}

/// A short REST page is the last one.
pub fn next_rest_page(cursor: Option<&Cursor>, received: usize, page_size: u32) -> Option<Cursor> {
    if received < page_size as usize {
        None
    } else {
        Some(Cursor::Page(page_number(cursor) + 1))
    }
}

pub fn after(cursor: Option<&Cursor>) -> Option<&str> {
    match cursor {
        Some(Cursor::After(c)) => Some(c.as_str()),
        _ => None,
    }
}

impl GitHubClient {
    pub async fn fetch_page<L: Listing>(
        &self,
        listing: &L,
        cursor: Option<&Cursor>,
    ) -> Result<Page<L::Item>> {
        debug!("Fetching {} ({cursor:?})", listing.describe());
        let body = self
            .execute(listing.endpoint(), || listing.request(self, cursor))
            .await?;
        listing.parse(&body, cursor, self.page_size())
    }

    /// Lazily walks every page of `listing`.
    ///
    /// A page is only requested once the consumer has drained the previous
    /// one, so per-item work interleaves with page fetches.
    pub fn list<'a, L>(&'a self, listing: L) -> impl Stream<Item = Result<L::Item>> + 'a
    where
        L: Listing + 'a,
    {
        let listing = Arc::new(listing);

        // None: exhausted, Some(None): first page, Some(Some(c)): page at c
        stream::try_unfold(Some(None::<Cursor>), move |state| {
            let listing = Arc::clone(&listing);
            async move {
                let Some(cursor) = state else {
                    return Ok::<_, FlowLensError>(None);
                };
                let page = self.fetch_page(listing.as_ref(), cursor.as_ref()).await?;
                Ok(Some((page.items, page.next.map(Some))))
            }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, FlowLensError>)))
        .try_flatten()
    }

    pub async fn list_all<L: Listing>(&self, listing: L) -> Result<Vec<L::Item>> {
        let items: Vec<L::Item> = self.list(listing).try_collect().await?;
        Ok(items)
    }
}
