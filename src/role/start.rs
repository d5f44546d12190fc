//! The null role, active during open/close transitions

/// Rejects every RPC and client request with `NotOpen`. Holds no state;
/// rejection is handled in the role dispatch.
pub(crate) struct StartRole;
