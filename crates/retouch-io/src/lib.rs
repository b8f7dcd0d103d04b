//! retouch-io: Network access and job orchestration.
//!
//! Talks to the remote inpainting service: authenticated JSON requests
//! with retry, multipart uploads with progress, typed endpoint bindings,
//! and the [`Orchestrator`] that takes an edit from strokes to a
//! finished job. The HTTP layer sits behind the [`Transport`] trait so
//! everything above it runs against a scripted transport in tests.

pub mod api;
pub mod client;
pub mod config;
pub mod draft;
pub mod error;
pub mod multipart;
pub mod orchestrator;
pub mod session;
pub mod transport;

pub use api::{
    ImageKind, InpaintApi, InpaintModel, ModelPreset, ProcessRecord, ProcessTicket, RecordStatus,
    RemoteId, UploadedFile,
};
pub use client::{Client, RequestSpec, Sleeper, ThreadSleeper};
pub use config::{ClientConfig, CompletionPolicy, RetryPolicy};
pub use draft::Draft;
pub use error::{ErrorKind, NetworkError, ProcessError, ValidationError};
pub use orchestrator::{
    AbandonHandle, EditRequest, JobReport, JobStatus, Orchestrator, ProcessJob, ProgressObserver,
};
pub use session::{DeviceInfo, Session};
pub use transport::{HttpRequest, HttpResponse, Method, Transport, TransportError, UreqTransport};
