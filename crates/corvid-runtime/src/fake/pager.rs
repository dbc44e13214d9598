//! Scripted paged responses.

use std::collections::VecDeque;

use reqwest::StatusCode;
use serde::Serialize;

use crate::error::{Result, RuntimeError};
use crate::fake::responder::ErrorResponder;
use crate::http::{Request, Response};

/// Query parameter used in injected next links.
pub const FAKE_PAGE_PARAM: &str = "$fakePage";

/// A page type whose continuation link the fake can overwrite.
pub trait SetNextLink {
    fn set_next_link(&mut self, link: Option<String>);
}

#[derive(Debug)]
enum PageEntry<P> {
    Page { status: StatusCode, page: P },
    Error(ErrorResponder),
}

/// A sequence of pages and errors returned one per request.
///
/// The transport injects next links pointing back at the request path so
/// the client's pager keeps calling the fake until the script runs out.
#[derive(Debug)]
pub struct PagerResponder<P> {
    entries: VecDeque<PageEntry<P>>,
}

impl<P> Default for PagerResponder<P> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<P> PagerResponder<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page.
    pub fn add_page(&mut self, status: StatusCode, page: P) {
        self.entries.push_back(PageEntry::Page { status, page });
    }

    /// Append an error in place of a page.
    pub fn add_error(&mut self, error: ErrorResponder) {
        self.entries.push_back(PageEntry::Error(error));
    }

    /// Builder form of [`add_page`](Self::add_page).
    pub fn with_page(mut self, status: StatusCode, page: P) -> Self {
        self.add_page(status, page);
        self
    }

    /// Builder form of [`add_error`](Self::add_error).
    pub fn with_error(mut self, error: ErrorResponder) -> Self {
        self.add_error(error);
        self
    }

    /// Whether entries remain.
    pub fn more(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Point every page except the last entry at the next one.
    pub fn inject_next_links(&mut self, request: &Request)
    where
        P: SetNextLink,
    {
        let last = self.entries.len().saturating_sub(1);
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if let PageEntry::Page { page, .. } = entry {
                let link = (i < last).then(|| next_link(request, i + 1));
                page.set_next_link(link);
            }
        }
    }

    /// Return the next scripted response.
    pub fn next(&mut self, request: &Request) -> Result<Response>
    where
        P: Serialize,
    {
        match self.entries.pop_front() {
            Some(PageEntry::Page { status, page }) => Response::json_body(status, &page),
            Some(PageEntry::Error(error)) => error.into_response(request),
            None => Err(RuntimeError::InvalidResponder(
                "PagerResponder has no more pages".to_string(),
            )),
        }
    }
}

fn next_link(request: &Request, page: usize) -> String {
    let mut url = request.url().clone();
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair(FAKE_PAGE_PARAM, &page.to_string());
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::get_request;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Page {
        value: Vec<u32>,
        #[serde(rename = "nextLink", skip_serializing_if = "Option::is_none")]
        next_link: Option<String>,
    }

    impl SetNextLink for Page {
        fn set_next_link(&mut self, link: Option<String>) {
            self.next_link = link;
        }
    }

    fn page(values: &[u32]) -> Page {
        Page {
            value: values.to_vec(),
            next_link: None,
        }
    }

    #[test]
    fn test_pages_with_injected_links() {
        let request = get_request("https://fake.test/widgets?top=3");
        let mut pager = PagerResponder::new()
            .with_page(StatusCode::OK, page(&[1, 2, 3]))
            .with_page(StatusCode::OK, page(&[4]));
        pager.inject_next_links(&request);

        let first: Page = pager.next(&request).unwrap().json().unwrap();
        assert_eq!(first.value, vec![1, 2, 3]);
        let link = first.next_link.unwrap();
        assert!(link.starts_with("https://fake.test/widgets?"));
        assert!(link.contains("fakePage=1"));
        assert!(!link.contains("top=3"));
        assert!(pager.more());

        let second: Page = pager.next(&request).unwrap().json().unwrap();
        assert_eq!(second.value, vec![4]);
        assert!(second.next_link.is_none());
        assert!(!pager.more());

        assert!(matches!(
            pager.next(&request),
            Err(RuntimeError::InvalidResponder(_))
        ));
    }

    #[test]
    fn test_error_entry() {
        let request = get_request("https://fake.test/widgets");
        let mut pager = PagerResponder::<Page>::new()
            .with_page(StatusCode::OK, page(&[1]))
            .with_error(ErrorResponder::status(StatusCode::INTERNAL_SERVER_ERROR));
        pager.inject_next_links(&request);

        let first: Page = pager.next(&request).unwrap().json().unwrap();
        assert!(first.next_link.is_some());
        let failed = pager.next(&request).unwrap();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
