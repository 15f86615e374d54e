pub mod basket_store;
pub mod normalizer;
pub mod observers;
pub mod performance_calculator;
pub mod performance_tracker;
pub mod price_service;
pub mod scheduler;
