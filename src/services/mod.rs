pub mod email;
pub mod mood;
pub mod oauth;
pub mod providers;
pub mod queue;
pub mod reconnection;
pub mod render;
pub mod report;
pub mod scheduler;
pub mod token_refresh;
pub mod token_store;
pub mod token_validator;
pub mod weather;
