pub mod micrograph_flow;
pub mod micrograph_task;

pub use micrograph_flow::{FlowResult, MicrographFlow, PickOutcome, TAU_INCREMENT};
pub use micrograph_task::{is_micrograph, MicrographTask};
