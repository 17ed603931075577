//! Lazy pagination over windowed list responses.
//!
//! A [`Pager`] wraps the initial page object of a list endpoint and presents
//! the whole listing as a pull-based sequence of JSON items. Continuation
//! pages are fetched one at a time, only when the consumer advances past the
//! buffered window, and each fetch replaces the buffer wholesale. A pager is
//! a single forward cursor: re-iterating requires a fresh initial fetch.

use serde_json::Value;

use crate::{
    error::Error,
    http::{Http, Route},
    types::PageObject,
};

/// Lazy, finite sequence of items from a paginated endpoint.
///
/// Iteration stops when the server-reported `total` is reached, when the
/// optional caller-supplied cap is reached, or when the buffered window is
/// exhausted with no continuation URL left. The last case is a defensive
/// stop: a server claiming more items than it links to must terminate the
/// pager rather than loop forever.
pub struct Pager<'a> {
    http: &'a Http,
    key: Option<String>,
    cursor_based: bool,
    cap: Option<u64>,
    pos: u64,
    window_start: u64,
    total: Option<u64>,
    next: Option<String>,
    items: Vec<Value>,
}

impl<'a> Pager<'a> {
    /// Wraps an offset-paginated page object.
    pub fn new(http: &'a Http, page: &Value, cap: Option<u64>) -> crate::Result<Self> {
        Self::from_parts(http, page, None, false, cap)
    }

    /// Wraps one named section of a multi-type search response (e.g. the
    /// `tracks` portion); traversal is otherwise identical to [`new`].
    ///
    /// [`new`]: Self::new
    pub fn search(
        http: &'a Http,
        page: &Value,
        key: impl Into<String>,
        cap: Option<u64>,
    ) -> crate::Result<Self> {
        Self::from_parts(http, page, Some(key.into()), false, cap)
    }

    /// Wraps a cursor-paginated listing (e.g. followed artists), where
    /// continuation runs on an opaque cursor instead of an offset.
    pub fn cursor(
        http: &'a Http,
        page: &Value,
        key: impl Into<String>,
        cap: Option<u64>,
    ) -> crate::Result<Self> {
        Self::from_parts(http, page, Some(key.into()), true, cap)
    }

    fn from_parts(
        http: &'a Http,
        page: &Value,
        key: Option<String>,
        cursor_based: bool,
        cap: Option<u64>,
    ) -> crate::Result<Self> {
        let mut pager = Pager {
            http,
            key,
            cursor_based,
            cap,
            pos: 0,
            window_start: 0,
            total: None,
            next: None,
            items: Vec::new(),
        };
        pager.set_page(page)?;
        Ok(pager)
    }

    /// Replaces the buffered window and cursor with a new page object.
    fn set_page(&mut self, page: &Value) -> crate::Result<()> {
        let section = match &self.key {
            Some(key) => page.get(key).unwrap_or(&Value::Null),
            None => page,
        };

        let parsed: PageObject = serde_json::from_value(section.clone())?;

        // Cursor-based listings carry no usable offset; the window starts
        // wherever consumption currently stands.
        self.window_start = if self.cursor_based {
            self.pos
        } else {
            parsed.offset.unwrap_or(0)
        };

        self.total = parsed.total;
        self.next = parsed.next;
        self.items = parsed.items;
        Ok(())
    }

    async fn fetch_next_page(&mut self, next: String) -> crate::Result<()> {
        let route = Route::get(next);
        let page = self
            .http
            .request(&route, None, true)
            .await?
            .ok_or_else(|| Error::EmptyResponse("pagination continuation".into()))?;
        self.set_page(&page)
    }

    /// Yields the next item, fetching at most one continuation page, or
    /// `None` once the sequence is finished.
    pub async fn next_item(&mut self) -> crate::Result<Option<Value>> {
        if let Some(total) = self.total {
            if self.pos >= total {
                return Ok(None);
            }
        }

        if let Some(cap) = self.cap {
            if self.pos >= cap {
                return Ok(None);
            }
        }

        if self.pos >= self.window_start + self.items.len() as u64 {
            // defensive stop: no continuation even though total claims more
            let Some(next) = self.next.take() else {
                return Ok(None);
            };
            self.fetch_next_page(next).await?;

            if self.items.is_empty() {
                return Ok(None);
            }
        }

        // another defensive stop: a continuation page whose offset jumped
        // past the consumed position cannot be indexed into
        let Some(index) = self.pos.checked_sub(self.window_start) else {
            return Ok(None);
        };

        match self.items.get(index as usize) {
            Some(item) => {
                self.pos += 1;
                Ok(Some(item.clone()))
            }
            None => Ok(None),
        }
    }

    /// Drains the remaining items into a vector.
    pub async fn collect(mut self) -> crate::Result<Vec<Value>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item().await? {
            items.push(item);
        }
        Ok(items)
    }
}
