//! HTTP API handlers for bevid-id

pub mod decision;
pub mod health;
pub mod predictions;
pub mod session;
pub mod sse;
pub mod training;
pub mod ui;

pub use decision::decision_routes;
pub use health::health_routes;
pub use predictions::prediction_routes;
pub use session::session_routes;
pub use sse::event_stream;
pub use training::training_routes;
pub use ui::ui_routes;
