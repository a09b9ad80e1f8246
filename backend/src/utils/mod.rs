pub mod cookies;
pub mod jwt;

pub use cookies::*;
pub use jwt::*;
