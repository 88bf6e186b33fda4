pub mod job;
pub mod message;
pub mod response;

pub use job::{JobRecord, JobStatus};
pub use message::{MessageMeta, WireMessage};
pub use response::ResponseEnvelope;
