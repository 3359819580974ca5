use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("turn channel closed: no further user input can arrive")]
    InputClosed,
}
