pub mod analytics;
pub mod debug;
pub mod health;
pub mod ledger;
pub mod pairs;
pub mod quote;
pub mod risk;
pub mod tokens;
