pub mod calendar_board;
pub mod insights;
pub mod planner;
pub mod runtime;
pub mod session;
