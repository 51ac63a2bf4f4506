pub mod email_log;
pub mod integration_token;
pub mod job;
pub mod mood;
pub mod profile;
pub mod report;
