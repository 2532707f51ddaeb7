//! Per-item operations for the batch commands. Each one implements
//! [`ItemOperation`](crate::batch::ItemOperation) and talks to the service
//! only through [`Remote`](crate::api::Remote).

pub mod delete;
pub mod deploy;
pub mod fix_names;
pub mod generate;
pub mod publish;
pub mod update;

pub use delete::{delete_targets, DeleteOp};
pub use deploy::{deploy_targets, DeployOp, DeploySettings};
pub use fix_names::{fix_name_targets, needs_name_fix, recreate_payload, FixNamesOp};
pub use generate::GenerateOp;
pub use publish::{publish_targets, PublishOp};
pub use update::UpdateOp;
