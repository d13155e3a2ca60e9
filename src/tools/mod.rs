pub mod market;
pub mod posts;
pub mod telegram;
