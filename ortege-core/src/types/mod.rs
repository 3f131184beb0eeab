pub use bridged_message::*;
pub use checkpoint::*;
pub use submission::*;

mod bridged_message;
mod checkpoint;
mod submission;
