pub mod fps;
pub mod mailbox;
pub mod orchestrator;
pub mod quit;

pub use fps::{FpsCounter, StreamRates};
pub use mailbox::{FrameMailbox, MailboxStats};
pub use orchestrator::{run_acquisition, Orchestrator, PipelineError, TickError, TickOutcome};
pub use quit::QuitSignal;
