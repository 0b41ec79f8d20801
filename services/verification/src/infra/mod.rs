pub mod codegen;
pub mod db;
pub mod fetcher;
pub mod mailer;
