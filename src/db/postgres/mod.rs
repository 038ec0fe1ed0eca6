mod page_views;

pub use page_views::PostgresPageViewRepo;
