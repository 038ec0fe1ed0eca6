mod common;
mod page_views;

pub use page_views::SqlitePageViewRepo;
