pub mod builders;
pub mod db;

pub use builders::PolicyBuilder;
pub use db::TestDb;
