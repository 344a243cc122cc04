// Domain rules with no I/O
pub mod delivery_reconciler;
pub mod materials;
pub mod state_machine;

// Engines and collaborators backed by the store
pub mod approval_workflow;
pub mod vendors;

// Request-handling façade
pub mod procurement;
