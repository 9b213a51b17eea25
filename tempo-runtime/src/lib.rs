pub mod compliance;
pub mod decimal;
pub mod error;
pub mod kafka;
pub mod ledger;
pub mod pairs;
pub mod proto;
pub mod quote;
pub mod registry;
pub mod rpc;
pub mod settings;
pub mod store;
pub mod types;

pub use error::TempoError;
pub use settings::Settings;
pub use types::{NoteAction, STABLE_SYMBOL};
