pub mod assembler;
pub mod conversation;
pub mod message;
pub mod stream_block;

pub use assembler::{Applied, BlockAssembler};
pub use conversation::{
    ActiveTurn, ConversationManager, ConversationSnapshot, EditState, Rejected, TurnId,
    TurnProgress,
};
pub use message::{DisplayMessage, MessageId, MessageStatus, Role};
pub use stream_block::ContentBlock;
