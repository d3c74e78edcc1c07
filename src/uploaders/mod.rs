pub mod presigned;

pub use presigned::PresignedUploader;
