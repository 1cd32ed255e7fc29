pub mod external_id;
pub mod handle;
pub mod vector;
