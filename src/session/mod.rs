mod recovery;
pub mod tags;

pub use recovery::{recover, RecoveryReason, RecoveryReport};
pub use tags::{SessionTagSync, TagUpdate, GROUP_TAG, MEMBER_TAG};
