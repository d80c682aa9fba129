//! Shared types for the options-trading simulation workspace.

pub mod order;
pub mod types;

pub use order::{
    ChannelError, OptionOrder, OptionPosition, OrderResultSink, OrderStatus, OrderSubmissionChannel, OrderType, Side,
};
pub use types::{Clock, CommonError, FixedClock, OptionType, PositionKey, Strike, SystemClock, time_to_expiry_years};
