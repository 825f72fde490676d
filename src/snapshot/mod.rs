pub mod fetcher;
pub mod resources;
pub mod status;
