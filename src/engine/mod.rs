pub mod dispatch;
pub mod queue;
pub mod sweep;
