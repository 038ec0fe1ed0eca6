mod page_view;

pub use page_view::*;
