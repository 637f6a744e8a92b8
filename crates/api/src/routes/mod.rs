//! HTTP route handlers.

pub mod inventory;
pub mod ops;
pub mod orders;
pub mod payments;

use serde::Deserialize;

use common::PageRequest;

/// `?page=&page_size=` on list routes. Out-of-range values are clamped.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageQuery {
    pub fn to_request(&self) -> PageRequest {
        PageRequest::from_query(self.page, self.page_size)
    }
}
