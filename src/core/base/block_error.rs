use super::BlockType;
use crate::Error;
use std::fmt;

pub const BREAKER_OPEN_MSG: &str = "circuit breaker is open";
pub const SERVICE_OVERLOADED_MSG: &str = "service overloaded";

/// BlockError indicates the request was rejected by an admission control primitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockError {
    block_type: BlockType,
    // block_msg provides additional message for the block error.
    block_msg: String,
}

impl BlockError {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            ..Self::default()
        }
    }

    pub fn new_with_msg(block_type: BlockType, block_msg: String) -> Self {
        Self {
            block_type,
            block_msg,
        }
    }

    /// The rejection of an open circuit breaker.
    pub fn breaker_open() -> Self {
        Self::new_with_msg(BlockType::CircuitBreaking, BREAKER_OPEN_MSG.into())
    }

    /// The rejection of an overloaded service.
    pub fn service_overloaded() -> Self {
        Self::new_with_msg(BlockType::Overload, SERVICE_OVERLOADED_MSG.into())
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn block_msg(&self) -> String {
        self.block_msg.clone()
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.block_msg.is_empty() {
            write!(f, "BlockError: {}", self.block_type)
        } else {
            write!(f, "{}", self.block_msg)
        }
    }
}

impl std::error::Error for BlockError {}

fn block_type_of(err: &Error) -> Option<BlockType> {
    err.downcast_ref::<BlockError>().map(BlockError::block_type)
}

/// `is_breaker_open` checks whether the error is a rejection of a circuit breaker.
pub fn is_breaker_open(err: &Error) -> bool {
    block_type_of(err) == Some(BlockType::CircuitBreaking)
}

/// `is_overloaded` checks whether the error is a rejection of a load shedder.
pub fn is_overloaded(err: &Error) -> bool {
    block_type_of(err) == Some(BlockType::Overload)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_create() {
        let err = BlockError::new(BlockType::Overload);
        assert_eq!(err.block_type(), BlockType::Overload);
        assert_eq!(err.block_msg(), String::default());
        assert_eq!(err.to_string(), "BlockError: Overload");

        let err = BlockError::breaker_open();
        assert_eq!(err.block_type(), BlockType::CircuitBreaking);
        assert_eq!(err.to_string(), BREAKER_OPEN_MSG);
    }

    #[test]
    fn classify() {
        let open: Error = BlockError::breaker_open().into();
        let overloaded: Error = BlockError::service_overloaded().into();
        let other = Error::msg(BREAKER_OPEN_MSG);
        assert!(is_breaker_open(&open));
        assert!(!is_overloaded(&open));
        assert!(is_overloaded(&overloaded));
        assert!(!is_breaker_open(&overloaded));
        // only the typed error counts, not the message
        assert!(!is_breaker_open(&other));
    }
}
