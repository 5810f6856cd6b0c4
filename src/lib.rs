pub mod config;
pub mod db;
pub mod grading;
pub mod models;
pub mod report;
pub mod similarity;
pub mod uploads;
