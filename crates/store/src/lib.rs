pub mod connector;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use connector::{StoreConnector, TableStatus};
pub use error::StoreError;
pub use memory::MemoryTableStore;
pub use postgres::PgTableStore;
pub use traits::{Durability, TableStore};
