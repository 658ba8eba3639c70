pub mod clock;
pub mod commands;
pub mod compose;
pub mod config;
pub mod dedupe;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod forms;
pub mod parser;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{
    render_filtered_help, render_help, CommandDescriptor, CommandSpec, CommandTable, HandlerFn,
    HandlerRegistry, ResponseSource, ResponseSpec, ResponseValue, ADMIN_GROUP,
};
pub use compose::{compose, OutboundSend};
pub use dedupe::DeliveryLedger;
pub use dispatch::{
    substitute_args, Dispatcher, DEFAULT_ACCESS_DENIED_REPLY, HANDLER_FAILURE_REPLY,
};
pub use errors::{CommandTableError, HandlerError, MalformedEventError};
pub use events::{
    ActionEvent, EventId, MessageEvent, NormalizedEvent, ResponseMode, SlashCommandEvent,
};
pub use forms::{FormIngest, FormTracker, InteractionForm, TERMINAL_SUFFIX};
pub use parser::{parse_user_tag, ParsedCommand};
