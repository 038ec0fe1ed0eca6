mod page_views;

pub(crate) use page_views::validate_create;
pub use page_views::PageViewRepo;
