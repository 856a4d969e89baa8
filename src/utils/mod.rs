//! Commonly used utilities like versioned handles and hashed names.

#[macro_use]
pub mod handle;
pub mod handle_pool;
pub mod hash_value;

pub use self::handle::{Handle, HandleIndex};
pub use self::handle_pool::HandlePool;
pub use self::hash_value::HashValue;

pub mod prelude {
    pub use super::{Handle, HandleIndex, HandlePool, HashValue};
}
