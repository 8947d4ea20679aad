pub mod execution_slot;
pub mod session_record;
pub mod slot_ctx;

pub use execution_slot::{ExecutionSlot, SlotEnv, SlotPolicy};
pub use session_record::SessionRecord;
pub use slot_ctx::SlotCtx;
