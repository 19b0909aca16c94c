pub mod directory;
pub mod memory;
pub mod supabase;

pub use directory::*;
pub use memory::*;
pub use supabase::*;
