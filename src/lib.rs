pub mod api;
pub mod config;
pub mod core;
pub mod uploaders;
pub mod utils;

// 重新导出核心类型
pub use crate::core::{
    Category,
    CredentialStore,
    GameId,
    GameMetadata,
    GameRegistry,
    BinaryTransport,
    Navigator,
    Result,
    UploadSession,
    UploadStep,
    UploadWorkflow,
    UploadWorkflowHandle,
    WorkflowError,
    WorkflowEvent,
};

pub use api::ApiClient;
pub use uploaders::PresignedUploader;
