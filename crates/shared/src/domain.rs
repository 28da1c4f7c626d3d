use serde::{Deserialize, Serialize};

/// Number of results the backend returns per page; also the fetch stride.
pub const PAGE_SIZE: u32 = 10;

/// Number of page numerals exposed as navigation controls.
pub const MAX_VISIBLE_PAGES: u32 = 7;

pub const FIRST_BUTTON_FLAG: &str = "first-button";
pub const LAST_BUTTON_FLAG: &str = "last-button";
pub const FETCH_PAGE_ERROR_EVENT: &str = "fetch-page-error";

macro_rules! count_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub $inner);
    };
}

count_newtype!(SessionId, u64);

/// Pages needed to show `total_items` results at `PAGE_SIZE` per page.
pub fn total_page_count(total_items: u64) -> u32 {
    let pages = total_items.div_ceil(u64::from(PAGE_SIZE));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Zero-based index of the first result on `page` (pages start at 1).
pub fn start_index(page: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(PAGE_SIZE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    FirstPage,
    LastPage,
}

impl Affordance {
    pub fn flag_key(self) -> &'static str {
        match self {
            Affordance::FirstPage => FIRST_BUTTON_FLAG,
            Affordance::LastPage => LAST_BUTTON_FLAG,
        }
    }
}
