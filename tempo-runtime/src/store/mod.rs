pub mod olap;
pub mod postgres;

pub use olap::OlapStore;
pub use postgres::PgStore;
