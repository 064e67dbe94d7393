pub mod error_pages;
pub mod health;
