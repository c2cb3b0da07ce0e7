mod core;
mod editing;
mod state;
mod streaming;


pub use state::{
    ActiveTurn, ConversationManager, ConversationSnapshot, EditState, Rejected, TurnId,
    TurnProgress,
};
