mod guard;
mod handlers;
mod server;
#[cfg(test)]
mod tests;

pub use handlers::ApiError;
pub use server::{ApiServer, ApiServerBuilder, ApiState};
