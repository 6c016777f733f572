pub mod postgres;

pub use postgres::PostgresLedgerStore;
