pub mod agent;
pub mod config;
pub mod pipeline;
pub mod run;
pub mod tools;
