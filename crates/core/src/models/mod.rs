pub mod basket;
pub mod feed;
pub mod history;
pub mod rate;
pub mod settings;
