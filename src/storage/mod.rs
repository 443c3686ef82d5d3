pub mod catalog;
pub mod memory;
pub mod statement;
pub mod table;

pub use catalog::Catalog;
pub use memory::MemoryStore;
pub use statement::Mutation;
pub use table::Table;
