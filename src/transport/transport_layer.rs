// Transport layer - turns chat events into core calls and core results into replies.

pub mod console;
pub mod handlers;
