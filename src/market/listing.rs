//! Ordering, filtering and pagination for read-many endpoints.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;

use crate::error::FieldErrors;

// --- Ordering ---

/// Client-visible ordering fields mapped to the SQL column they sort by.
#[derive(Debug)]
pub struct OrderingSpec {
    pub fields: &'static [(&'static str, &'static str)],
    pub default: &'static str,
    pub tiebreak: &'static str,
}

pub const AD_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[
        ("id", "a.id"),
        ("title", "a.title"),
        ("price", "a.price_cents"),
        ("created_at", "a.created_at"),
        ("updated_at", "a.updated_at"),
    ],
    default: "-created_at",
    tiebreak: "a.id",
};

pub const COMMENT_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[("id", "c.id"), ("created_at", "c.created_at")],
    default: "-created_at",
    tiebreak: "c.id",
};

pub const USER_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[("id", "u.id"), ("email", "u.email")],
    default: "id",
    tiebreak: "u.id",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    column: &'static str,
    tiebreak: &'static str,
    descending: bool,
}

impl Ordering {
    /// `ORDER BY` body. Columns only ever come from an allow-list.
    pub fn to_sql(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        if self.column == self.tiebreak {
            format!("{} {direction}", self.column)
        } else {
            format!("{} {direction}, {} {direction}", self.column, self.tiebreak)
        }
    }
}

impl OrderingSpec {
    pub fn parse(&self, raw: Option<&str>) -> Result<Ordering, FieldErrors> {
        let requested = raw.map(str::trim).filter(|s| !s.is_empty());
        let key = requested.unwrap_or(self.default);
        let (name, descending) = match key.strip_prefix('-') {
            Some(name) => (name, true),
            None => (key, false),
        };

        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|&(_, column)| Ordering {
                column,
                tiebreak: self.tiebreak,
                descending,
            })
            .ok_or_else(|| {
                FieldErrors::single("ordering", format!("Unknown ordering field '{name}'."))
            })
    }
}

// --- Pagination ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Fixed(u64),
    Adjustable { default: u64, max: u64 },
}

pub const AD_PAGE_SIZE: PageSize = PageSize::Fixed(4);
pub const COMMENT_PAGE_SIZE: PageSize = PageSize::Adjustable {
    default: 10,
    max: 50,
};
pub const USER_PAGE_SIZE: PageSize = PageSize::Fixed(10);

impl PageSize {
    /// Unusable sizes fall back to the default; oversized ones are capped.
    fn resolve(&self, raw: Option<&str>) -> u64 {
        match *self {
            PageSize::Fixed(size) => size,
            PageSize::Adjustable { default, max } => raw
                .and_then(|s| s.trim().parse::<u64>().ok())
                .filter(|size| *size > 0)
                .map_or(default, |size| size.min(max)),
        }
    }
}

/// Raw query parameters shared by every list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u64,
    pub size: u64,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        (self.number - 1).saturating_mul(self.size)
    }

    fn parse(raw: Option<&str>, size: u64) -> Result<Self, FieldErrors> {
        let number = match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => 1,
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| FieldErrors::single("page", "A valid integer is required."))?,
        };
        Ok(Self { number, size })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRequest {
    pub page: PageRequest,
    pub ordering: Ordering,
}

impl ListRequest {
    pub fn parse(
        params: &ListParams,
        size: PageSize,
        ordering: &OrderingSpec,
    ) -> Result<Self, FieldErrors> {
        let size = size.resolve(params.page_size.as_deref());
        let page = PageRequest::parse(params.page.as_deref(), size);
        let ordering = ordering.parse(params.ordering.as_deref());
        match (page, ordering) {
            (Ok(page), Ok(ordering)) => Ok(Self { page, ordering }),
            (page, ordering) => {
                let mut errors = FieldErrors::new();
                if let Err(e) = page {
                    errors.merge(e);
                }
                if let Err(e) = ordering {
                    errors.merge(e);
                }
                Err(errors)
            }
        }
    }
}

/// Absolute URL of the current request, used to derive neighbour links.
/// A path on the base (a service mounted under `/api`) is kept as a prefix.
#[derive(Debug, Clone)]
pub struct PageLinks {
    current: Url,
}

impl PageLinks {
    pub fn new(base: &str, path_and_query: &str) -> Result<Self, url::ParseError> {
        let current = Url::parse(&format!("{}{}", base.trim_end_matches('/'), path_and_query))?;
        Ok(Self { current })
    }

    /// Link to `page`, keeping every other query parameter. Page 1 is
    /// addressed without a `page` parameter.
    pub fn link(&self, page: u64) -> String {
        let mut url = self.current.clone();
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "page")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if page > 1 {
            pairs.push(("page".to_string(), page.to_string()));
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(&pairs);
        }
        url.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Pages past the end come back empty with no `next` link.
    pub fn new(results: Vec<T>, count: u64, request: &PageRequest, links: &PageLinks) -> Self {
        let seen = request.number.saturating_mul(request.size);
        let next = (seen < count).then(|| links.link(request.number + 1));
        let previous = (request.number > 1).then(|| links.link(request.number - 1));
        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

// --- Ad search ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdSearchParams {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "author__email")]
    pub author_email: Option<String>,
    #[serde(rename = "price__gte")]
    pub price_gte: Option<String>,
    #[serde(rename = "price__lte")]
    pub price_lte: Option<String>,
}

/// Conjunction of ad predicates. Text fields match case-insensitive
/// substrings; price bounds are inclusive and held in cents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdFilter {
    pub author_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub author_email: Option<String>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
}

impl AdFilter {
    pub fn parse(params: &AdSearchParams) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let min_price_cents = parse_bound(
            &mut errors,
            "price__gte",
            params.price_gte.as_deref(),
            Decimal::ceil,
        );
        let max_price_cents = parse_bound(
            &mut errors,
            "price__lte",
            params.price_lte.as_deref(),
            Decimal::floor,
        );
        errors_or(errors)?;

        Ok(Self {
            author_id: None,
            title: non_blank(params.title.as_deref()),
            description: non_blank(params.description.as_deref()),
            author_email: non_blank(params.author_email.as_deref()),
            min_price_cents,
            max_price_cents,
        })
    }

    pub fn authored_by(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }
}

fn errors_or(errors: FieldErrors) -> Result<(), FieldErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_bound(
    errors: &mut FieldErrors,
    field: &str,
    raw: Option<&str>,
    round: fn(&Decimal) -> Decimal,
) -> Option<i64> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match Decimal::from_str(raw) {
        Ok(value) => {
            let saturated = if value.is_sign_negative() {
                i64::MIN
            } else {
                i64::MAX
            };
            let cents = value
                .checked_mul(Decimal::ONE_HUNDRED)
                .map(|cents| round(&cents))
                .and_then(|cents| cents.to_i64());
            Some(cents.unwrap_or(saturated))
        }
        Err(_) => {
            errors.add(field, "Enter a number.");
            None
        }
    }
}
