pub mod error;
pub mod handlers;
pub mod jwt;
pub mod middleware;

pub use error::AuthError;
pub use jwt::{Claims, JwtCreateResult, create_jwt, verify_jwt};
pub use middleware::AuthUser;
