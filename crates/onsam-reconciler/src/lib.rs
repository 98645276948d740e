pub mod fsm;

pub use fsm::{AuditFsm, FsmState};
