pub mod approvals;
pub mod common;
pub mod deliveries;
pub mod materials;
pub mod purchase_orders;
pub mod purchase_requests;
pub mod vendors;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
