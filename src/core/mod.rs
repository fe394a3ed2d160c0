pub mod etl;
pub mod partition;
pub mod rotation;

pub use crate::domain::model::{Dataset, Record, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
pub use etl::EtlEngine;
pub use partition::{partition, worker_count};
pub use rotation::{Credential, CredentialPool, CredentialRotationCaller, Fallback};
