pub mod content_cache;
pub mod property_cache;
