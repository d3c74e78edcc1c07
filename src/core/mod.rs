mod errors;
mod manager;
mod poller;
mod session;
mod traits;
mod transfer;
mod types;
mod worker;

pub use errors::{Result, WorkflowError};
pub use manager::{FilteredEventReceiver, UploadWorkflow, UploadWorkflowHandle};
pub use session::UploadSession;
pub use traits::{BinaryTransport, CredentialStore, GameRegistry, Navigator};
pub use types::{
    Category,
    ExistingAsset,
    Game,
    GameId,
    GameMetadata,
    GameQuery,
    GameStatus,
    Page,
    ProgressCallback,
    Role,
    SessionId,
    StatusResponse,
    Tags,
    TransferProgress,
    UploadStep,
    UploadTarget,
    User,
    UserQuery,
    WorkflowEvent,
    ZipStatus,
};
