//! `services` crate — the `Service` trait and the action tables tasks dispatch to.
//!
//! Every service a workflow task names, built-in or application-supplied,
//! must implement [`Service`]. The engine crate resolves
//! `(service_id, action)` pairs and dispatches through this trait object.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod table;
pub mod traits;

pub use error::ServiceError;
pub use table::ActionTable;
pub use traits::{ActionInput, Service};
