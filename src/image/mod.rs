//! Image model and transfer pipelines: references, sessions, the on-disk
//! layout, and the pull/push drivers

pub mod layout;
pub mod pull;
pub mod push;
pub mod reference;
pub mod session;
