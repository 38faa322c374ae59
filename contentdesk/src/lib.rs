// Library interface for contentdesk modules
// This allows tests and the binary to import modules

pub mod assistant;
pub mod llm;
pub mod news;
pub mod records;
pub mod scraping;
pub mod text;
pub mod translation;
pub mod vector_store;
