pub mod admin;
pub mod auth;
pub mod cron;
pub mod dashboard;
pub mod email_logs;
pub mod health;
pub mod integrations;
pub mod mood;
pub mod reports;
pub mod tokens;
