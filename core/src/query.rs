//! Search criteria, filters and pagination.
//!
//! A search request is an ordered list of `(field, value)` terms. [`build`] folds
//! the terms into a single conjunctive [`Filter`], one [`MatchPredicate`] per
//! term and in input order, and pairs it with the requested [`PageRequest`].
//! Store adapters translate the filter into their own query language; the
//! in-memory adapter evaluates it directly with [`Filter::matches`].
//!
//! # Example
//!
//! ```
//! use listings_core::listing::{ListingField, SortDirection};
//! use listings_core::query::{build, PageRequest, SearchCriteria};
//!
//! let criteria = SearchCriteria::new()
//!     .term(ListingField::Make, "Toyota")
//!     .term(ListingField::Model, "Camry");
//! let query = build(&criteria, PageRequest::new(0, 20, ListingField::Mileage, SortDirection::Asc));
//!
//! assert_eq!(query.filter.predicates().len(), 2);
//! assert_eq!(query.filter.explain(), r#"make ~ "Toyota" AND model ~ "Camry""#);
//! ```

use crate::listing::{Listing, ListingField, SortDirection};
use serde::{Deserialize, Serialize};

/// One `(field, value)` pair of a search request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchTerm {
    /// Field to match
    pub field: ListingField,
    /// Text the field must contain
    pub value: String,
}

impl SearchTerm {
    /// Create a search term.
    #[must_use]
    pub fn new(field: ListingField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// Ordered sequence of search terms, combined with logical AND.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchCriteria {
    terms: Vec<SearchTerm>,
}

impl SearchCriteria {
    /// Create empty criteria (matches every listing).
    #[must_use]
    pub const fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Append a term.
    #[must_use]
    pub fn term(mut self, field: ListingField, value: impl Into<String>) -> Self {
        self.terms.push(SearchTerm::new(field, value));
        self
    }

    /// Terms in input order.
    #[must_use]
    pub fn terms(&self) -> &[SearchTerm] {
        &self.terms
    }

    /// Whether there are no terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl From<Vec<SearchTerm>> for SearchCriteria {
    fn from(terms: Vec<SearchTerm>) -> Self {
        Self { terms }
    }
}

/// "Field contains value" predicate.
///
/// Matching is a case-insensitive substring test against the field's rendered
/// value; a listing without a value for the field never matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MatchPredicate {
    /// Field to test
    pub field: ListingField,
    /// Text to look for
    pub value: String,
}

impl MatchPredicate {
    /// Create a predicate.
    #[must_use]
    pub fn new(field: ListingField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    /// Evaluate the predicate against a listing.
    #[must_use]
    pub fn matches(&self, listing: &Listing) -> bool {
        self.field.render(listing).is_some_and(|rendered| {
            rendered
                .to_lowercase()
                .contains(&self.value.to_lowercase())
        })
    }
}

/// Conjunction of match predicates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    predicates: Vec<MatchPredicate>,
}

impl Filter {
    /// Filter that accepts every listing.
    #[must_use]
    pub const fn match_all() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// AND another predicate onto this filter.
    #[must_use]
    pub fn and(mut self, predicate: MatchPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Predicates in the order they were added.
    #[must_use]
    pub fn predicates(&self) -> &[MatchPredicate] {
        &self.predicates
    }

    /// Evaluate the filter against a listing.
    #[must_use]
    pub fn matches(&self, listing: &Listing) -> bool {
        self.predicates.iter().all(|p| p.matches(listing))
    }

    /// Human-readable rendering for logs.
    #[must_use]
    pub fn explain(&self) -> String {
        if self.predicates.is_empty() {
            return "*".to_string();
        }
        self.predicates
            .iter()
            .map(|p| format!("{} ~ {:?}", p.field, p.value))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Page number, page size and sort order of a paginated read.
///
/// Pages are zero-based. Values are passed to the store unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based page number
    pub page: u32,
    /// Page size
    pub size: u32,
    /// Sort field
    pub sort: ListingField,
    /// Sort direction
    pub direction: SortDirection,
}

impl PageRequest {
    /// Create a page request.
    #[must_use]
    pub const fn new(page: u32, size: u32, sort: ListingField, direction: SortDirection) -> Self {
        Self {
            page,
            size,
            sort,
            direction,
        }
    }

    /// Number of records to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }

    /// Number of pages needed for `total_elements` records.
    #[must_use]
    pub const fn total_pages(&self, total_elements: u64) -> u64 {
        if self.size == 0 {
            0
        } else {
            total_elements.div_ceil(self.size as u64)
        }
    }
}

/// One page of records as returned by a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Records of this page, in sort order
    pub content: Vec<T>,
    /// Number of records matching the query across all pages
    pub total_elements: u64,
}

impl<T> Page<T> {
    /// Create a page.
    #[must_use]
    pub const fn new(content: Vec<T>, total_elements: u64) -> Self {
        Self {
            content,
            total_elements,
        }
    }
}

/// Paginated result handed to callers of the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    /// Requested page number
    pub page: u32,
    /// Requested page size
    pub size: u32,
    /// Requested sort field
    pub sort: ListingField,
    /// Requested sort direction
    pub sort_direction: SortDirection,
    /// Total records matching
    pub total_elements: u64,
    /// Total pages at this page size
    pub total_pages: u64,
    /// Listings of this page
    pub content: Vec<Listing>,
}

impl ResultPage {
    /// Combine a page request with the page the store returned.
    #[must_use]
    pub fn from_page(request: &PageRequest, page: Page<Listing>) -> Self {
        Self {
            page: request.page,
            size: request.size,
            sort: request.sort,
            sort_direction: request.direction,
            total_elements: page.total_elements,
            total_pages: request.total_pages(page.total_elements),
            content: page.content,
        }
    }
}

/// Filter plus pagination, ready to hand to a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    /// Conjunctive filter
    pub filter: Filter,
    /// Pagination and sort
    pub page_request: PageRequest,
}

/// Build a store query from search criteria.
///
/// Each term becomes one match predicate, AND-ed onto the filter in input order.
/// The page request is passed through unchanged.
#[must_use]
pub fn build(criteria: &SearchCriteria, page_request: PageRequest) -> SearchQuery {
    let filter = criteria
        .terms()
        .iter()
        .fold(Filter::match_all(), |filter, term| {
            filter.and(MatchPredicate::new(term.field, term.value.clone()))
        });

    SearchQuery {
        filter,
        page_request,
    }
}
