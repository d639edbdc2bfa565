pub mod analytics;
pub mod db;
