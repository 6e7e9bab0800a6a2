//! Cloudsmith HTTP API boundary.
//!
//! A thin request/response layer: bearer-token authentication, status
//! classification, JSON decoding and page-total header parsing. Everything
//! resource-specific lives in [`crate::resources`].

mod client;
mod types;

pub use client::{CloudsmithClient, PAGE_TOTAL_HEADER, parse_page_total};
pub use types::{ListFilter, Page, PageRequest, UserSelf};
