//! Domain models for FleetQ.

pub mod command;

pub use command::{
    ClaimCommandsRequest, ClaimCommandsResponse, ClaimedCommand, Command, CommandListResponse,
    CommandPagination, CommandStatus, CreateCommandRequest, DeviceCommandsQuery,
    ExtendVisibilityRequest, ExtendVisibilityResponse, SubmitResultRequest, SubmitResultResponse,
    DEFAULT_PRIORITY,
};
