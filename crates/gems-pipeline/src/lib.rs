//! Background submission pipeline: stage local images, upload them, persist
//! the record, and keep every step observable through the queue.

pub mod config;
pub mod endpoints;
pub mod error;
pub mod orchestrator;
pub mod persister;
pub mod retry;
pub mod stager;
pub mod transport;
pub mod uploader;

pub use config::PipelineConfig;
pub use endpoints::{endpoint, Confirmation, Endpoint, UrlShape};
pub use error::{PersistError, PipelineError, RetryError, StageError, SubmitError, UploadError};
pub use orchestrator::{Orchestrator, SubmissionHandle, SubmissionOutcome};
pub use persister::{build_persist_body, check_confirmation, MetadataPersister};
pub use retry::RetryCoordinator;
pub use stager::{ContentResolver, ImageStager, MountedContentResolver, StagedImage};
pub use transport::{HttpReply, HttpTransport, Transport, TransportError, UploadFile};
pub use uploader::{resolve_upload_url, Uploader};
