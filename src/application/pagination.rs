//! Page-number pagination for feeds.
//!
//! Page resolution is forgiving: a missing or malformed `page` query value
//! falls back to the first page, and any integer outside `1..=num_pages`
//! resolves to the last page. An empty feed still has one (empty) page.

use serde::Serialize;

/// Number of pages shown on either side of the current page before the
/// link list collapses into gaps.
const LINK_WINDOW: u32 = 2;

/// Translates an item count and a page size into page numbers and row slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    count: u64,
    per_page: u32,
}

/// Rows to fetch for one resolved page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlice {
    pub limit: u32,
    pub offset: u64,
}

impl Paginator {
    pub fn new(count: u64, per_page: u32) -> Self {
        Self {
            count,
            per_page: per_page.max(1),
        }
    }

    pub fn num_pages(&self) -> u32 {
        let pages = self.count.div_ceil(u64::from(self.per_page)).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Resolve the raw `page` query value to a valid page number.
    pub fn resolve(&self, raw: Option<&str>) -> u32 {
        let last = self.num_pages();
        let Some(raw) = raw.map(str::trim) else {
            return 1;
        };
        let requested = match raw.parse::<i64>() {
            Ok(requested) => requested,
            // Integers too wide for i64 are still out of range, not garbage.
            Err(_) if is_integer(raw) => return last,
            Err(_) => return 1,
        };

        if requested < 1 || requested > i64::from(last) {
            last
        } else {
            requested as u32
        }
    }

    pub fn slice(&self, number: u32) -> PageSlice {
        let number = number.clamp(1, self.num_pages());
        PageSlice {
            limit: self.per_page,
            offset: u64::from(number - 1) * u64::from(self.per_page),
        }
    }

    pub fn page<T>(&self, number: u32, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number: number.clamp(1, self.num_pages()),
            num_pages: self.num_pages(),
            count: self.count,
            per_page: self.per_page,
        }
    }
}

/// One page of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub count: u64,
    pub per_page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageLink {
    Number(u32),
    Gap,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }

    pub fn previous_page_number(&self) -> Option<u32> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_page_number(&self) -> Option<u32> {
        self.has_next().then(|| self.number + 1)
    }

    /// First and last page, the current page and its neighbours; skipped
    /// runs collapse into a single [`PageLink::Gap`].
    pub fn links(&self) -> Vec<PageLink> {
        let mut links = Vec::new();
        let mut last_pushed = 0;
        for candidate in 1..=self.num_pages {
            let near_current = candidate.abs_diff(self.number) <= LINK_WINDOW;
            if candidate == 1 || candidate == self.num_pages || near_current {
                if candidate > last_pushed + 1 {
                    links.push(PageLink::Gap);
                }
                links.push(PageLink::Number(candidate));
                last_pushed = candidate;
            }
        }
        links
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            count: self.count,
            per_page: self.per_page,
        }
    }
}

fn is_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
